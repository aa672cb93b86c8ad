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
use super::error::SampleSourceError;

/// Something that yields decoded audio in its native format.
///
/// Chunks are planar: one `Vec` per channel, each holding the same number
/// of frames. Decoders produce planar data, and the converter consumes it a
/// frame at a time.
pub trait SampleSource: Send + Sync {
    /// Clears the vectors in `output` and fills them with up to `max_frames`
    /// frames. `output` must hold exactly `channel_count()` vectors.
    /// Returns the number of frames read; 0 means the source is exhausted.
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError>;

    fn channel_count(&self) -> u16;

    /// Native sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Bit depth of the encoded data.
    fn bits_per_sample(&self) -> u16;

    /// Whether the encoded data is integer or float.
    fn sample_format(&self) -> crate::audio::SampleFormat;

    /// Length of the source, when the container says.
    fn duration(&self) -> Option<std::time::Duration>;
}

#[cfg(test)]
pub trait SampleSourceTestExt {
    /// True once every frame has been handed out.
    fn is_finished(&self) -> bool;
}
