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
use hound::WavReader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use super::error::SampleSourceError;
use super::traits::SampleSource;

#[cfg(test)]
use super::traits::SampleSourceTestExt;

/// A sample source that reads WAV files through hound. This is the reader for
/// our own capture files, so it reports the exact frame count of the file.
pub struct WavSampleSource {
    wav_reader: WavReader<BufReader<File>>,
    is_finished: bool,
    // Interleaved scratch, reused between chunks
    interleaved: Vec<f32>,
    bits_per_sample: u16,
    channels: u16,
    sample_rate: u32,
    sample_format: crate::audio::SampleFormat,
    frame_count: u32,
}

impl SampleSource for WavSampleSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        let channels = self.channels as usize;
        if output.len() != channels {
            return Err(SampleSourceError::SampleConversionFailed(format!(
                "Output has {} channels, expected {}",
                output.len(),
                channels
            )));
        }
        for ch in output.iter_mut() {
            ch.clear();
        }
        if self.is_finished {
            return Ok(0);
        }

        self.interleaved.clear();
        let wanted = max_frames * channels;
        match self.sample_format {
            crate::audio::SampleFormat::Float => {
                for sample in self.wav_reader.samples::<f32>().take(wanted) {
                    self.interleaved.push(sample?);
                }
            }
            crate::audio::SampleFormat::Int => {
                // Use i64 to avoid overflow for 32-bit samples
                let scale_factor = 1.0 / (1i64 << (self.bits_per_sample - 1)) as f32;
                for sample in self.wav_reader.samples::<i32>().take(wanted) {
                    self.interleaved.push(sample? as f32 * scale_factor);
                }
            }
        }

        let frames = self.interleaved.len() / channels;
        if frames == 0 {
            self.is_finished = true;
            return Ok(0);
        }

        for frame in self.interleaved.chunks_exact(channels) {
            for (out, sample) in output.iter_mut().zip(frame) {
                out.push(*sample);
            }
        }

        Ok(frames)
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    fn sample_format(&self) -> crate::audio::SampleFormat {
        self.sample_format
    }

    fn duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(
            self.frame_count as f64 / self.sample_rate as f64,
        ))
    }
}

impl WavSampleSource {
    /// Creates a new WAV sample source from a file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SampleSourceError> {
        let wav_reader = WavReader::open(&path)?;
        let spec = wav_reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(SampleSourceError::SampleConversionFailed(format!(
                "'{}': invalid WAV header",
                path.as_ref().display()
            )));
        }

        let sample_format = match spec.sample_format {
            hound::SampleFormat::Float => crate::audio::SampleFormat::Float,
            hound::SampleFormat::Int => crate::audio::SampleFormat::Int,
        };

        Ok(Self {
            frame_count: wav_reader.duration(),
            wav_reader,
            is_finished: false,
            interleaved: Vec::new(),
            bits_per_sample: spec.bits_per_sample,
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            sample_format,
        })
    }

    /// Number of frames (samples per channel) in the file.
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }
}

#[cfg(test)]
impl SampleSourceTestExt for WavSampleSource {
    fn is_finished(&self) -> bool {
        self.is_finished
    }
}
