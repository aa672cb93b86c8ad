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
use std::{any::Any, error::Error, fmt, sync::Arc};

use crate::config;

pub mod cpal;
pub mod format;
pub mod input;
pub mod mixer;
pub mod mock;
pub mod ring;
pub mod sample_source;
pub mod thread_priority;

pub use format::{CaptureFormat, SampleFormat, SessionFormat};
pub use input::InputNode;
pub use mixer::{ActiveSource, AudioMixer};

/// The process wide duplex hardware session.
///
/// A device is activated once to learn its native format, then started with
/// the mixer that feeds its output. While running, every input buffer is
/// handed to the mixer's input node and the output is rendered by the mixer.
pub trait Device: Any + fmt::Display + Send + Sync {
    /// Activates the session for simultaneous input and output and returns
    /// its native format. Idempotent.
    fn activate(&self) -> Result<SessionFormat, Box<dyn Error>>;

    /// Starts the hardware streams. Activates the session if needed. Starting
    /// a running device does nothing.
    fn start(&self, mixer: Arc<AudioMixer>) -> Result<(), Box<dyn Error>>;

    /// Stops the hardware streams. The session stays active.
    fn stop(&self);

    /// Whether the hardware streams are running.
    fn is_running(&self) -> bool;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn Error>>;
}

/// A summary of a device known to cpal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_input_channels: u16,
    pub max_output_channels: u16,
    pub default_sample_rate: Option<u32>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Inputs={}, Outputs={}",
            self.name, self.max_input_channels, self.max_output_channels
        )?;
        if let Some(rate) = self.default_sample_rate {
            write!(f, ", {} Hz", rate)?;
        }
        write!(f, ") ({})", self.host)
    }
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<DeviceInfo>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the device named by the configuration. Names starting with "mock"
/// select a mock device that runs on its own clock.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::realtime(device)));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_mock_device() {
        let device = get_device(&config::Audio::new("mock-interface")).unwrap();
        assert_eq!(device.to_string(), "mock-interface (Mock)");
        assert!(device.to_mock().is_ok());
        assert!(!device.is_running());
    }

    #[test]
    fn test_device_info_display() {
        let info = DeviceInfo {
            name: "Interface".to_string(),
            host: "ALSA".to_string(),
            max_input_channels: 2,
            max_output_channels: 8,
            default_sample_rate: Some(48000),
        };
        assert_eq!(
            info.to_string(),
            "Interface (Inputs=2, Outputs=8, 48000 Hz) (ALSA)"
        );
    }
}
