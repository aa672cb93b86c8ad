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
use std::path::PathBuf;

use crate::audio::sample_source::SampleSourceError;

/// Errors returned by the audio engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The hardware session could not be activated or started.
    #[error("audio session configuration failed: {0}")]
    SessionConfig(String),

    #[error("unable to create capture file {}: {source}", path.display())]
    FileCreate {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("unable to read {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: SampleSourceError,
    },

    #[error("a capture is already in progress")]
    AlreadyCapturing,

    /// Microphone access was denied. Callers check this precondition before
    /// driving the engine.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// Engine threads could not be started.
    #[error("unable to start engine threads: {0}")]
    Startup(String),

    /// The control thread is gone.
    #[error("the audio engine has shut down")]
    Shutdown,
}

impl EngineError {
    /// Wraps a device layer error.
    pub(crate) fn session(err: Box<dyn std::error::Error>) -> Self {
        EngineError::SessionConfig(err.to_string())
    }
}
