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
use std::sync::Arc;
use std::time::Duration;

use super::error::SampleSourceError;
use super::traits::SampleSource;

#[cfg(test)]
use super::traits::SampleSourceTestExt;

/// A sample source that plays a fully decoded sample out of memory.
///
/// The interleaved data is shared, so any number of voices can play the same
/// decoded sample without copying it.
pub struct MemorySampleSource {
    data: Arc<Vec<f32>>,
    /// Current position in frames
    current_frame: usize,
    channel_count: u16,
    sample_rate: u32,
}

impl MemorySampleSource {
    /// Creates a new memory sample source that owns its interleaved samples.
    pub fn new(interleaved_samples: Vec<f32>, channel_count: u16, sample_rate: u32) -> Self {
        Self::from_shared(Arc::new(interleaved_samples), channel_count, sample_rate)
    }

    /// Creates a new memory sample source over shared interleaved samples.
    pub fn from_shared(data: Arc<Vec<f32>>, channel_count: u16, sample_rate: u32) -> Self {
        Self {
            data,
            current_frame: 0,
            channel_count,
            sample_rate,
        }
    }

    fn total_frames(&self) -> usize {
        if self.channel_count == 0 {
            return 0;
        }
        self.data.len() / self.channel_count as usize
    }
}

impl SampleSource for MemorySampleSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        let num_channels = self.channel_count as usize;
        if output.len() != num_channels {
            return Err(SampleSourceError::SampleConversionFailed(format!(
                "Output has {} channels, expected {}",
                output.len(),
                num_channels
            )));
        }

        for ch in output.iter_mut() {
            ch.clear();
        }

        let available = self.total_frames().saturating_sub(self.current_frame);
        let to_copy = available.min(max_frames);
        if to_copy == 0 {
            return Ok(0);
        }

        let start = self.current_frame * num_channels;
        let end = start + to_copy * num_channels;
        for frame in self.data[start..end].chunks_exact(num_channels) {
            for (out, sample) in output.iter_mut().zip(frame) {
                out.push(*sample);
            }
        }
        self.current_frame += to_copy;

        Ok(to_copy)
    }

    fn channel_count(&self) -> u16 {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bits_per_sample(&self) -> u16 {
        32 // Memory samples are 32-bit float
    }

    fn sample_format(&self) -> crate::audio::SampleFormat {
        crate::audio::SampleFormat::Float
    }

    fn duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(
            self.total_frames() as f64 / self.sample_rate as f64,
        ))
    }
}

#[cfg(test)]
impl SampleSourceTestExt for MemorySampleSource {
    fn is_finished(&self) -> bool {
        self.current_frame >= self.total_frames()
    }
}
