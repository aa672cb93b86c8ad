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

//! The hardware input node: input monitoring and the capture tap.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use super::format::SessionFormat;
use super::ring::CircularBuffer;
use super::sample_source::remix_frame_into;

/// Most output channels a monitored frame can be remixed into.
const MAX_MONITOR_CHANNELS: usize = 64;

/// Monitor ring size in frames.
const MONITOR_FRAMES: usize = 8192;

/// Capture ring size in samples, a few seconds of multichannel input.
const CAPTURE_SAMPLES: usize = 1 << 20;

/// Receives every buffer the hardware delivers. While the capture tap is
/// open, buffers are copied unchanged into the capture ring for the writer
/// thread. They're also remixed into the monitor ring the mixer reads from
/// while the monitoring volume is non-zero. Neither path allocates or locks.
pub struct InputNode {
    /// Monitoring volume, stored as f32 bits.
    volume: AtomicU32,
    input_channels: AtomicU16,
    output_channels: AtomicU16,
    monitor: CircularBuffer,
    capture: Arc<CircularBuffer>,
    tap_open: AtomicBool,
    /// Samples that didn't fit in the capture ring since the tap opened
    dropped: AtomicU64,
}

impl InputNode {
    pub fn new(volume: f32) -> Self {
        Self {
            volume: AtomicU32::new(volume.to_bits()),
            input_channels: AtomicU16::new(1),
            output_channels: AtomicU16::new(2),
            monitor: CircularBuffer::new(MONITOR_FRAMES * 2),
            capture: Arc::new(CircularBuffer::new(CAPTURE_SAMPLES)),
            tap_open: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Adopts the channel layout of an activated session.
    pub fn configure(&self, session: &SessionFormat) {
        self.input_channels
            .store(session.input_channels, Ordering::Relaxed);
        self.output_channels
            .store(session.output_channels, Ordering::Relaxed);
        self.monitor.clear();
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Opens the capture tap and returns the ring it fills. The caller is
    /// the ring's only reader until the tap is closed.
    pub fn open_tap(&self) -> Arc<CircularBuffer> {
        // Nothing writes to the ring while the tap is closed.
        self.capture.clear();
        self.dropped.store(0, Ordering::Relaxed);
        self.tap_open.store(true, Ordering::Release);
        self.capture.clone()
    }

    /// Closes the capture tap. Returns how many samples were dropped because
    /// the reader fell behind.
    pub fn close_tap(&self) -> u64 {
        self.tap_open.store(false, Ordering::Release);
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn has_tap(&self) -> bool {
        self.tap_open.load(Ordering::Acquire)
    }

    /// Called from the input callback with interleaved samples in the
    /// session's input layout.
    pub fn process(&self, data: &[f32]) {
        if data.is_empty() {
            return;
        }

        if self.has_tap() {
            let written = self.capture.write(data);
            if written < data.len() {
                self.dropped
                    .fetch_add((data.len() - written) as u64, Ordering::Relaxed);
            }
        }

        if self.volume() <= 0.0 {
            return;
        }

        let input_channels = self.input_channels.load(Ordering::Relaxed).max(1) as usize;
        let output_channels = (self.output_channels.load(Ordering::Relaxed) as usize)
            .clamp(1, MAX_MONITOR_CHANNELS);
        let mut scratch = [0.0f32; MAX_MONITOR_CHANNELS];
        let frame = &mut scratch[..output_channels];
        for input_frame in data.chunks_exact(input_channels) {
            if self.monitor.space() < output_channels {
                break;
            }
            frame.fill(0.0);
            remix_frame_into(input_frame, frame);
            self.monitor.write(frame);
        }
    }

    /// Adds the monitored input, scaled by the volume, into an interleaved
    /// output buffer. Called from the output side.
    pub fn render_monitor(&self, output: &mut [f32]) {
        let volume = self.volume();
        if volume <= 0.0 {
            self.monitor.clear();
            return;
        }
        self.monitor.read_add(output, volume);
    }
}

impl Default for InputNode {
    fn default() -> Self {
        Self::new(1.0)
    }
}
