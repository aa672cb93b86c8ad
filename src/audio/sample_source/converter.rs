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

//! Streaming conversion from a source's native format to the session format.
//!
//! Sample rate conversion is linear interpolation, which is plenty for
//! one-shot pad samples. Channel conversion follows [`remix_frame_into`].

use super::error::SampleSourceError;
use super::traits::SampleSource;

/// Frames pulled from the underlying source at a time.
const CHUNK_FRAMES: usize = 1024;

/// Adds one frame in the input channel layout to one frame in the output
/// layout.
///
/// - Equal channel counts pass straight through.
/// - Mono input is copied to every output channel.
/// - Mono output receives the average of all input channels.
/// - Otherwise channels map by index; extra inputs are dropped and extra
///   outputs receive nothing.
pub fn remix_frame_into(input: &[f32], output: &mut [f32]) {
    if input.is_empty() || output.is_empty() {
        return;
    }
    if input.len() == output.len() {
        for (out, sample) in output.iter_mut().zip(input) {
            *out += *sample;
        }
    } else if input.len() == 1 {
        for out in output.iter_mut() {
            *out += input[0];
        }
    } else if output.len() == 1 {
        output[0] += input.iter().sum::<f32>() / input.len() as f32;
    } else {
        for (out, sample) in output.iter_mut().zip(input) {
            *out += *sample;
        }
    }
}

/// Wraps a sample source and renders it at the output rate and channel count.
pub struct ConvertedSource {
    source: Box<dyn SampleSource>,
    source_channels: usize,
    source_rate: u32,
    output_channels: usize,
    /// Source frames advanced per output frame
    step: f64,
    /// Position between frame_a and frame_b
    frac: f64,
    frame_a: Vec<f32>,
    frame_b: Vec<f32>,
    have_a: bool,
    have_b: bool,
    primed: bool,
    chunk: Vec<Vec<f32>>,
    chunk_len: usize,
    chunk_pos: usize,
    source_done: bool,
    interpolated: Vec<f32>,
}

impl ConvertedSource {
    /// Creates a converter for the given source. The output rate and channel
    /// count must be non-zero.
    pub fn new(
        source: Box<dyn SampleSource>,
        output_rate: u32,
        output_channels: u16,
    ) -> Result<Self, SampleSourceError> {
        let source_channels = source.channel_count() as usize;
        let source_rate = source.sample_rate();
        if source_channels == 0 || source_rate == 0 {
            return Err(SampleSourceError::SampleConversionFailed(format!(
                "Source has an invalid format ({} Hz, {} channels)",
                source_rate, source_channels
            )));
        }
        if output_rate == 0 || output_channels == 0 {
            return Err(SampleSourceError::SampleConversionFailed(format!(
                "Output has an invalid format ({} Hz, {} channels)",
                output_rate, output_channels
            )));
        }

        Ok(Self {
            source,
            source_channels,
            source_rate,
            output_channels: output_channels as usize,
            step: source_rate as f64 / output_rate as f64,
            frac: 0.0,
            frame_a: vec![0.0; source_channels],
            frame_b: vec![0.0; source_channels],
            have_a: false,
            have_b: false,
            primed: false,
            chunk: vec![Vec::with_capacity(CHUNK_FRAMES); source_channels],
            chunk_len: 0,
            chunk_pos: 0,
            source_done: false,
            interpolated: vec![0.0; source_channels],
        })
    }

    /// Native sample rate of the wrapped source.
    pub fn source_sample_rate(&self) -> u32 {
        self.source_rate
    }

    /// Native channel count of the wrapped source.
    pub fn source_channel_count(&self) -> u16 {
        self.source_channels as u16
    }

    /// Whether every source frame has been rendered.
    pub fn is_finished(&self) -> bool {
        self.primed && !self.have_a
    }

    /// Renders up to `frames` output frames and adds them to the interleaved
    /// `output`. Returns the number of frames rendered. Fewer than requested
    /// means the source is exhausted.
    pub fn mix_into(
        &mut self,
        output: &mut [f32],
        frames: usize,
    ) -> Result<usize, SampleSourceError> {
        if !self.primed {
            self.primed = true;
            self.have_a = self.pull_frame()?;
            if self.have_a {
                std::mem::swap(&mut self.frame_a, &mut self.frame_b);
                self.have_b = self.pull_frame()?;
            }
        }

        let frames = frames.min(output.len() / self.output_channels);
        let mut produced = 0;
        while produced < frames && self.have_a {
            let t = self.frac as f32;
            if self.have_b {
                for ((dst, a), b) in self
                    .interpolated
                    .iter_mut()
                    .zip(&self.frame_a)
                    .zip(&self.frame_b)
                {
                    *dst = a + (b - a) * t;
                }
            } else {
                self.interpolated.copy_from_slice(&self.frame_a);
            }

            let start = produced * self.output_channels;
            remix_frame_into(
                &self.interpolated,
                &mut output[start..start + self.output_channels],
            );
            produced += 1;
            self.advance()?;
        }

        Ok(produced)
    }

    fn advance(&mut self) -> Result<(), SampleSourceError> {
        self.frac += self.step;
        while self.frac >= 1.0 && self.have_a {
            self.frac -= 1.0;
            std::mem::swap(&mut self.frame_a, &mut self.frame_b);
            self.have_a = self.have_b;
            self.have_b = if self.have_a {
                self.pull_frame()?
            } else {
                false
            };
        }
        // Past the last frame with nothing to interpolate towards.
        if !self.have_b && self.frac > f64::EPSILON {
            self.have_a = false;
        }
        Ok(())
    }

    /// Reads the next source frame into frame_b.
    fn pull_frame(&mut self) -> Result<bool, SampleSourceError> {
        if self.chunk_pos >= self.chunk_len {
            if self.source_done {
                return Ok(false);
            }
            self.chunk_len = self.source.next_chunk(&mut self.chunk, CHUNK_FRAMES)?;
            self.chunk_pos = 0;
            if self.chunk_len == 0 {
                self.source_done = true;
                return Ok(false);
            }
        }
        for (dst, channel) in self.frame_b.iter_mut().zip(&self.chunk) {
            *dst = channel[self.chunk_pos];
        }
        self.chunk_pos += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sample_source::MemorySampleSource;

    fn convert(
        samples: Vec<f32>,
        channels: u16,
        rate: u32,
        out_rate: u32,
        out_channels: u16,
    ) -> Vec<f32> {
        let source = MemorySampleSource::new(samples, channels, rate);
        let mut converter =
            ConvertedSource::new(Box::new(source), out_rate, out_channels).unwrap();
        let mut output = vec![0.0; 64 * out_channels as usize];
        let frames = converter.mix_into(&mut output, 64).unwrap();
        assert!(converter.is_finished());
        output.truncate(frames * out_channels as usize);
        output
    }

    #[test]
    fn test_remix_frame_into() {
        let mut out = [0.0; 2];
        remix_frame_into(&[0.5], &mut out);
        assert_eq!(out, [0.5, 0.5]);

        let mut out = [0.0; 1];
        remix_frame_into(&[0.2, 0.6], &mut out);
        assert!((out[0] - 0.4).abs() < 1e-6);

        let mut out = [0.0; 2];
        remix_frame_into(&[0.1, 0.2, 0.3, 0.4], &mut out);
        assert_eq!(out, [0.1, 0.2]);

        let mut out = [1.0; 4];
        remix_frame_into(&[0.5, 0.25], &mut out);
        assert_eq!(out, [1.5, 1.25, 1.0, 1.0]);
    }

    #[test]
    fn test_passthrough() {
        let output = convert(vec![0.1, 0.2, 0.3, 0.4], 2, 44100, 44100, 2);
        assert_eq!(output, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_mono_to_stereo() {
        let output = convert(vec![0.1, 0.2, 0.3], 1, 48000, 48000, 2);
        assert_eq!(output, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_upsample_interpolates() {
        let output = convert(vec![0.0, 1.0, 2.0, 3.0], 1, 22050, 44100, 1);
        let expected = [0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0];
        assert_eq!(output.len(), expected.len());
        for (actual, expected) in output.iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_downsample_skips_frames() {
        let output = convert(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0], 1, 48000, 24000, 1);
        assert_eq!(output, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_mix_adds_and_resumes_across_calls() {
        let source = MemorySampleSource::new(vec![0.25; 10], 1, 44100);
        let mut converter = ConvertedSource::new(Box::new(source), 44100, 2).unwrap();

        let mut output = vec![0.5; 8];
        assert_eq!(converter.mix_into(&mut output, 4).unwrap(), 4);
        assert!(output.iter().all(|s| (s - 0.75).abs() < 1e-6));
        assert!(!converter.is_finished());

        let mut output = vec![0.0; 16];
        assert_eq!(converter.mix_into(&mut output, 8).unwrap(), 6);
        assert!(converter.is_finished());
        assert_eq!(converter.mix_into(&mut output, 8).unwrap(), 0);
    }

    #[test]
    fn test_rejects_invalid_output_format() {
        let source = MemorySampleSource::new(vec![0.0; 4], 1, 44100);
        assert!(ConvertedSource::new(Box::new(source), 0, 2).is_err());
    }
}
