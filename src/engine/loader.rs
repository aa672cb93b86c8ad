// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Decoding whole sample files into memory for playback.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::error::EngineError;
use crate::audio::sample_source::{
    create_sample_source_from_file, MemorySampleSource, SampleSource,
};

/// Frames read from the decoder at a time.
const READ_CHUNK_FRAMES: usize = 4096;

/// A decoded sample in its native format.
/// The sample data is stored in an Arc so voices can share it.
#[derive(Clone)]
pub struct LoadedSample {
    /// Interleaved f32 samples.
    data: Arc<Vec<f32>>,
    channel_count: u16,
    sample_rate: u32,
}

impl LoadedSample {
    /// Reads and decodes the whole file. Runs on a reader thread.
    pub fn load(path: &Path) -> Result<LoadedSample, EngineError> {
        let file_read = |source| EngineError::FileRead {
            path: path.to_path_buf(),
            source,
        };

        let mut source = create_sample_source_from_file(path).map_err(file_read)?;
        let channel_count = source.channel_count();
        let sample_rate = source.sample_rate();

        let mut data = Vec::new();
        let mut planar: Vec<Vec<f32>> =
            vec![Vec::with_capacity(READ_CHUNK_FRAMES); channel_count as usize];
        loop {
            let frames = source
                .next_chunk(&mut planar, READ_CHUNK_FRAMES)
                .map_err(file_read)?;
            if frames == 0 {
                break;
            }
            for frame in 0..frames {
                for channel in &planar {
                    data.push(channel[frame]);
                }
            }
        }

        let loaded = LoadedSample {
            data: Arc::new(data),
            channel_count,
            sample_rate,
        };

        info!(
            path = ?path,
            channels = loaded.channel_count(),
            sample_rate = loaded.sample_rate(),
            duration_ms = loaded.duration().as_millis(),
            memory_kb = loaded.memory_size() / 1024,
            "Sample loaded"
        );

        Ok(loaded)
    }

    /// Creates a new source that plays this sample from the start.
    pub fn create_source(&self) -> MemorySampleSource {
        MemorySampleSource::from_shared(self.data.clone(), self.channel_count, self.sample_rate)
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// Returns the native sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames.
    pub fn frame_count(&self) -> usize {
        self.data.len() / self.channel_count.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate.max(1) as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}
