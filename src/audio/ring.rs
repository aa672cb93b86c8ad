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
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free single producer, single consumer circular buffer of samples.
/// Used between the mixing thread and the output callback, and between the
/// input callback and the mixer for input monitoring.
pub struct CircularBuffer {
    /// Backing buffer
    buffer: Box<[UnsafeCell<f32>]>,
    /// Capacity (always a power of 2)
    capacity: usize,
    /// Read position (consumer)
    read_pos: AtomicUsize,
    /// Write position (producer)
    write_pos: AtomicUsize,
}

// Slots between read_pos and write_pos are owned by the consumer, all others by
// the producer, so the two sides never touch the same cell.
unsafe impl Sync for CircularBuffer {}
unsafe impl Send for CircularBuffer {}

impl CircularBuffer {
    pub fn new(capacity: usize) -> Self {
        // Round up to next power of 2 for efficient modulo
        let cap = capacity.max(2).next_power_of_two();
        Self {
            buffer: (0..cap).map(|_| UnsafeCell::new(0.0)).collect(),
            capacity: cap,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Get number of samples available to read
    #[inline]
    pub fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        if write >= read {
            write - read
        } else {
            self.capacity - read + write
        }
    }

    /// Get space available to write
    #[inline]
    pub fn space(&self) -> usize {
        self.capacity - self.available() - 1
    }

    /// Writes as many samples as fit. Returns the number written.
    pub fn write(&self, samples: &[f32]) -> usize {
        let to_write = self.space().min(samples.len());
        if to_write == 0 {
            return 0;
        }
        let write = self.write_pos.load(Ordering::Acquire);
        let mask = self.capacity - 1;

        for (i, sample) in samples[..to_write].iter().enumerate() {
            unsafe {
                *self.buffer[(write + i) & mask].get() = *sample;
            }
        }

        self.write_pos
            .store((write + to_write) & mask, Ordering::Release);
        to_write
    }

    /// Reads up to `output.len()` samples. Returns the number read.
    pub fn read(&self, output: &mut [f32]) -> usize {
        let to_read = self.available().min(output.len());
        if to_read == 0 {
            return 0;
        }
        let read = self.read_pos.load(Ordering::Acquire);
        let mask = self.capacity - 1;

        for (i, out) in output[..to_read].iter_mut().enumerate() {
            unsafe {
                *out = *self.buffer[(read + i) & mask].get();
            }
        }

        self.read_pos
            .store((read + to_read) & mask, Ordering::Release);
        to_read
    }

    /// Reads up to `output.len()` samples and adds them, scaled by `gain`, into
    /// `output`. Returns the number consumed.
    pub fn read_add(&self, output: &mut [f32], gain: f32) -> usize {
        let to_read = self.available().min(output.len());
        if to_read == 0 {
            return 0;
        }
        let read = self.read_pos.load(Ordering::Acquire);
        let mask = self.capacity - 1;

        for (i, out) in output[..to_read].iter_mut().enumerate() {
            unsafe {
                *out += *self.buffer[(read + i) & mask].get() * gain;
            }
        }

        self.read_pos
            .store((read + to_read) & mask, Ordering::Release);
        to_read
    }

    /// Discards everything currently buffered. Consumer side only.
    pub fn clear(&self) {
        let write = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write, Ordering::Release);
    }
}
