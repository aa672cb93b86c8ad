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
use std::str::FromStr;

use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::{CaptureFormat, SampleFormat};

const DEFAULT_READ_THREADS: usize = 2;
const DEFAULT_THREAD_PRIORITY: u8 = 70;
const DEFAULT_BUFFER_SIZE: usize = 512;

/// A named CPAL stream buffer size.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NamedBufferSize {
    /// Use the backend's default (may be high latency on some systems).
    Default,
    /// Use the device's minimum supported period size (lowest latency, most jitter-sensitive).
    Min,
}

/// How to choose the CPAL stream buffer size (period size). Affects latency vs underrun tolerance.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum StreamBufferSize {
    Named(NamedBufferSize),
    /// A fixed size in frames.
    Fixed(usize),
}

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device: "default", a cpal device name, or "mock".
    device: String,

    /// CPAL stream buffer: "default", "min", or a number of frames (default: 512).
    stream_buffer_size: Option<StreamBufferSize>,

    /// Number of worker threads that decode files for playback.
    read_threads: Option<usize>,

    /// Priority (0-99) of the thread that mixes output (default: 70).
    thread_priority: Option<u8>,

    /// Whether to try realtime scheduling for the mixing thread (default: true).
    realtime: Option<bool>,

    /// Capture sample format, "float" or "int" (default: "float").
    capture_sample_format: Option<String>,

    /// Capture bits per sample (default: 32).
    capture_bits_per_sample: Option<u16>,

    /// Whether input monitoring starts enabled (default: true).
    monitor_input: Option<bool>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            stream_buffer_size: None,
            read_threads: None,
            thread_priority: None,
            realtime: None,
            capture_sample_format: None,
            capture_bits_per_sample: None,
            monitor_input: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the stream buffer size choice for CPAL.
    pub fn stream_buffer_size(&self) -> StreamBufferSize {
        self.stream_buffer_size
            .unwrap_or(StreamBufferSize::Fixed(DEFAULT_BUFFER_SIZE))
    }

    /// Returns the number of reader threads, at least 1.
    pub fn read_threads(&self) -> usize {
        self.read_threads.unwrap_or(DEFAULT_READ_THREADS).max(1)
    }

    /// Returns the mixing thread priority, clamped to 0-99.
    pub fn thread_priority(&self) -> u8 {
        self.thread_priority
            .unwrap_or(DEFAULT_THREAD_PRIORITY)
            .min(99)
    }

    /// Returns whether realtime scheduling should be attempted.
    pub fn realtime(&self) -> bool {
        self.realtime.unwrap_or(true)
    }

    /// Returns the encoding for capture files (default: 32-bit float).
    pub fn capture_format(&self) -> Result<CaptureFormat, ConfigError> {
        let sample_format = match self.capture_sample_format.as_deref() {
            Some(format) => SampleFormat::from_str(format)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            None => SampleFormat::Float,
        };
        let bits_per_sample = self.capture_bits_per_sample.unwrap_or(match sample_format {
            SampleFormat::Float => 32,
            SampleFormat::Int => 16,
        });
        CaptureFormat::new(sample_format, bits_per_sample)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Returns whether input monitoring starts enabled.
    pub fn monitor_input(&self) -> bool {
        self.monitor_input.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Audio {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let audio = parse("device: mock");
        assert_eq!(audio.device(), "mock");
        assert_eq!(audio.stream_buffer_size(), StreamBufferSize::Fixed(512));
        assert_eq!(audio.read_threads(), 2);
        assert_eq!(audio.thread_priority(), 70);
        assert!(audio.realtime());
        assert_eq!(audio.capture_format().unwrap(), CaptureFormat::default());
        assert!(audio.monitor_input());
    }

    #[test]
    fn test_stream_buffer_size() {
        let audio = parse("device: mock\nstream_buffer_size: min");
        assert_eq!(
            audio.stream_buffer_size(),
            StreamBufferSize::Named(NamedBufferSize::Min)
        );
        let audio = parse("device: mock\nstream_buffer_size: 256");
        assert_eq!(audio.stream_buffer_size(), StreamBufferSize::Fixed(256));
    }

    #[test]
    fn test_capture_format() {
        let audio = parse("device: mock\ncapture_sample_format: int");
        let format = audio.capture_format().unwrap();
        assert_eq!(format.sample_format, SampleFormat::Int);
        assert_eq!(format.bits_per_sample, 16);

        let audio = parse(
            "device: mock\ncapture_sample_format: int\ncapture_bits_per_sample: 24",
        );
        assert_eq!(audio.capture_format().unwrap().bits_per_sample, 24);

        let audio = parse("device: mock\ncapture_sample_format: double");
        assert!(matches!(
            audio.capture_format(),
            Err(ConfigError::Invalid(_))
        ));

        let audio = parse("device: mock\ncapture_bits_per_sample: 8");
        assert!(audio.capture_format().is_err());
    }

    #[test]
    fn test_clamps() {
        let audio = parse("device: mock\nread_threads: 0\nthread_priority: 120");
        assert_eq!(audio.read_threads(), 1);
        assert_eq!(audio.thread_priority(), 99);
    }
}
