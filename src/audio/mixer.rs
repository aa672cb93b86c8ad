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
// Core audio mixing logic shared by the cpal and mock devices
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::RwLock;
use tracing::warn;

use super::format::SessionFormat;
use super::input::InputNode;
use super::sample_source::ConvertedSource;

/// The summing mixer between the input node, the playback voices and the
/// hardware output.
pub struct AudioMixer {
    /// Active audio sources currently playing
    active_sources: RwLock<Vec<ActiveSource>>,
    /// The hardware input, mixed in for monitoring
    input: Arc<InputNode>,
    /// Notified with the ID of every source that runs out of samples
    finished: Sender<u64>,
    num_channels: AtomicU16,
    sample_rate: AtomicU32,
}

/// Represents an active audio source in the mixer
pub struct ActiveSource {
    /// Unique ID for this source
    pub id: u64,
    /// The source, already converted to the session format
    pub source: ConvertedSource,
    /// Whether this source has finished playing
    pub is_finished: bool,
}

impl ActiveSource {
    pub fn new(id: u64, source: ConvertedSource) -> Self {
        Self {
            id,
            source,
            is_finished: false,
        }
    }
}

impl AudioMixer {
    /// Creates a new audio mixer. The output format is set by `configure`
    /// once the hardware session is active.
    pub fn new(input: Arc<InputNode>, finished: Sender<u64>) -> Self {
        Self {
            active_sources: RwLock::new(Vec::new()),
            input,
            finished,
            num_channels: AtomicU16::new(2),
            sample_rate: AtomicU32::new(44100),
        }
    }

    /// Adopts the output side of an activated session.
    pub fn configure(&self, session: &SessionFormat) {
        self.num_channels
            .store(session.output_channels, Ordering::Relaxed);
        self.sample_rate
            .store(session.sample_rate, Ordering::Relaxed);
        self.input.configure(session);
    }

    /// Adds a new audio source to the mixer
    pub fn add_source(&self, source: ActiveSource) {
        self.active_sources.write().push(source);
    }

    /// Removes a source by ID. Returns true if it was attached.
    pub fn remove_source(&self, source_id: u64) -> bool {
        let mut sources = self.active_sources.write();
        let before = sources.len();
        sources.retain(|source| source.id != source_id);
        sources.len() != before
    }

    /// Removes sources by ID, returning how many were attached.
    pub fn remove_sources(&self, source_ids: &[u64]) -> usize {
        let mut sources = self.active_sources.write();
        let before = sources.len();
        sources.retain(|source| !source_ids.contains(&source.id));
        before - sources.len()
    }

    /// Number of attached sources, finished or not.
    pub fn source_count(&self) -> usize {
        self.active_sources.read().len()
    }

    /// Renders `frames` frames into an interleaved output buffer, replacing
    /// its contents. Sources that run dry are marked finished and reported,
    /// but stay attached until removed.
    pub fn process_into_output(&self, output: &mut [f32], frames: usize) {
        let channels = self.num_channels() as usize;
        let len = (frames * channels).min(output.len());
        output.fill(0.0);
        let output = &mut output[..len];
        let frames = len / channels;

        self.input.render_monitor(output);

        let mut sources = self.active_sources.write();
        for active_source in sources.iter_mut() {
            if active_source.is_finished {
                continue;
            }
            match active_source.source.mix_into(output, frames) {
                Ok(rendered) if rendered >= frames => {}
                Ok(_) => {
                    active_source.is_finished = true;
                    let _ = self.finished.send(active_source.id);
                }
                Err(e) => {
                    warn!(id = active_source.id, err = %e, "Source failed, stopping it");
                    active_source.is_finished = true;
                    let _ = self.finished.send(active_source.id);
                }
            }
        }
    }

    /// Renders `num_frames` frames into a new buffer.
    pub fn process_frames(&self, num_frames: usize) -> Vec<f32> {
        let mut frames = vec![0.0; num_frames * self.num_channels() as usize];
        self.process_into_output(&mut frames, num_frames);
        frames
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels.load(Ordering::Relaxed)
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn input(&self) -> &Arc<InputNode> {
        &self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sample_source::MemorySampleSource;
    use crossbeam_channel::Receiver;

    fn create_mixer(output_channels: u16) -> (AudioMixer, Receiver<u64>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mixer = AudioMixer::new(Arc::new(InputNode::new(0.0)), tx);
        mixer.configure(&SessionFormat::new(44100, 1, output_channels).unwrap());
        (mixer, rx)
    }

    fn create_test_source(
        id: u64,
        samples: Vec<f32>,
        channel_count: u16,
        rate: u32,
    ) -> ActiveSource {
        let memory_source = MemorySampleSource::new(samples, channel_count, rate);
        ActiveSource::new(
            id,
            ConvertedSource::new(Box::new(memory_source), 44100, 2).unwrap(),
        )
    }

    #[test]
    fn test_basic_mixing() {
        let (mixer, _rx) = create_mixer(2);
        mixer.add_source(create_test_source(1, vec![0.5, 0.8], 1, 44100));

        let frames = mixer.process_frames(2);
        assert_eq!(frames, vec![0.5, 0.5, 0.8, 0.8]);
    }

    #[test]
    fn test_multiple_source_mixing() {
        let (mixer, _rx) = create_mixer(2);
        mixer.add_source(create_test_source(1, vec![0.5, 0.25], 2, 44100));
        mixer.add_source(create_test_source(2, vec![0.25, 0.125], 2, 44100));

        let frame = mixer.process_frames(1);
        assert_eq!(frame, vec![0.75, 0.375]);
    }

    #[test]
    fn test_finished_sources_are_reported_once() {
        let (mixer, rx) = create_mixer(2);
        mixer.add_source(create_test_source(7, vec![0.5; 4], 1, 44100));
        mixer.add_source(create_test_source(8, vec![0.5; 64], 1, 44100));

        let frames = mixer.process_frames(8);
        assert_eq!(frames[..8], [0.5; 8]);
        assert!(frames[8..].iter().all(|s| *s == 0.0));
        assert_eq!(rx.try_recv(), Ok(7));

        mixer.process_frames(8);
        assert!(rx.try_recv().is_err());
        assert_eq!(mixer.source_count(), 2);

        assert!(mixer.remove_source(7));
        assert!(!mixer.remove_source(7));
        assert_eq!(mixer.remove_sources(&[8, 9]), 1);
        assert_eq!(mixer.source_count(), 0);
    }

    #[test]
    fn test_sample_rate_conversion() {
        let (mixer, rx) = create_mixer(2);
        // Half the session rate, so every frame plays twice as long.
        mixer.add_source(create_test_source(1, vec![0.5; 100], 1, 22050));

        let frames = mixer.process_frames(256);
        let rendered = frames.chunks_exact(2).filter(|f| f[0] != 0.0).count();
        assert_eq!(rendered, 199);
        assert_eq!(rx.try_recv(), Ok(1));
    }

    #[test]
    fn test_monitor_is_mixed_in() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let input = Arc::new(InputNode::new(1.0));
        let mixer = AudioMixer::new(input.clone(), tx);
        mixer.configure(&SessionFormat::new(44100, 1, 2).unwrap());

        input.process(&[0.25, 0.25]);
        mixer.add_source(create_test_source(1, vec![0.5, 0.5], 1, 44100));
        let frames = mixer.process_frames(2);
        assert_eq!(frames, vec![0.75; 4]);
    }
}
