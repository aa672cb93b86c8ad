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
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;

mod audio;
mod error;

pub use self::audio::{Audio, NamedBufferSize, StreamBufferSize};
pub use self::error::ConfigError;

const DEFAULT_RECORDINGS_DIR: &str = "recordings";

/// The top level configuration for the sampler.
#[derive(Deserialize, Clone, Debug)]
pub struct SamplerConfig {
    /// The audio configuration.
    audio: Audio,

    /// Directory new recordings are written to (default: "recordings").
    recordings: Option<String>,
}

impl SamplerConfig {
    /// Creates a configuration for the given device with all defaults.
    pub fn new(device: &str) -> SamplerConfig {
        SamplerConfig {
            audio: Audio::new(device),
            recordings: None,
        }
    }

    /// Parse a sampler configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<SamplerConfig, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<SamplerConfig>()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.device().trim().is_empty() {
            return Err(ConfigError::Invalid("audio device must not be empty".into()));
        }
        self.audio.capture_format()?;
        Ok(())
    }

    /// Returns the audio configuration.
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Returns the directory recordings are written to. Relative paths are
    /// resolved against the directory of the configuration file by the caller.
    pub fn recordings_dir(&self) -> PathBuf {
        PathBuf::from(
            self.recordings
                .as_deref()
                .unwrap_or(DEFAULT_RECORDINGS_DIR),
        )
    }
}
