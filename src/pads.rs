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

//! The bank of eight pads and the hand-off from a finished capture to a pad.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use crate::engine::{AudioEngine, EngineError, VoiceHandle};


/// Number of pads in a bank.
pub const PAD_COUNT: usize = 8;

static NEXT_SAMPLE_ID: AtomicU64 = AtomicU64::new(1);

/// Numbers recordings named within the same second.
static NEXT_RECORDING: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("pad index {0} is out of range (0-{max})", max = PAD_COUNT - 1)]
    InvalidIndex(usize),

    /// The last recording has to be assigned or discarded first.
    #[error("a staged recording is waiting to be assigned or discarded")]
    StagedRecordingPending,

    /// The recording was already assigned or discarded, or was never staged
    /// by this bank.
    #[error("no recording is staged")]
    NothingStaged,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleId(u64);

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sample#{}", self.0)
    }
}

/// A recorded audio file and its length.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    id: SampleId,
    path: PathBuf,
    duration: Duration,
}

impl Sample {
    fn new(path: PathBuf, duration: Duration) -> Sample {
        Sample {
            id: SampleId(NEXT_SAMPLE_ID.fetch_add(1, Ordering::Relaxed)),
            path,
            duration,
        }
    }

    pub fn id(&self) -> SampleId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Deletes the backing file. Only do this once no pad holds the sample.
    pub fn remove_file(&self) -> io::Result<()> {
        fs::remove_file(&self.path)?;
        info!(sample = %self.id, path = ?self.path, "Removed sample file");
        Ok(())
    }
}

/// The last capture, waiting to be assigned to a pad.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRecording {
    sample: Sample,
}

impl StagedRecording {
    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn path(&self) -> &Path {
        self.sample.path()
    }

    pub fn duration(&self) -> Duration {
        self.sample.duration()
    }
}

/// One slot in the bank.
#[derive(Debug, Clone, PartialEq)]
pub struct Pad {
    index: usize,
    sample: Option<Sample>,
}

impl Pad {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn sample(&self) -> Option<&Sample> {
        self.sample.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.sample.is_none()
    }
}

/// What the bank is doing, for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadState {
    Idle,
    Capturing,
    /// A recording is waiting to be assigned.
    Staged,
}

impl fmt::Display for PadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PadState::Idle => "idle",
            PadState::Capturing => "recording",
            PadState::Staged => "recording ready",
        })
    }
}

/// Eight pads, each optionally holding a sample, in front of an engine.
pub struct PadBank {
    engine: Arc<AudioEngine>,
    pads: [Pad; PAD_COUNT],
    staged: Option<StagedRecording>,
}

impl PadBank {
    pub fn new(engine: Arc<AudioEngine>) -> PadBank {
        PadBank {
            engine,
            pads: std::array::from_fn(|index| Pad {
                index,
                sample: None,
            }),
            staged: None,
        }
    }

    pub fn engine(&self) -> &Arc<AudioEngine> {
        &self.engine
    }

    /// A fresh capture file name in `dir`.
    pub fn recording_path(dir: &Path) -> PathBuf {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        let n = NEXT_RECORDING.fetch_add(1, Ordering::Relaxed);
        dir.join(format!("sample_{}_{}.wav", timestamp, n))
    }

    /// Starts capturing to `destination`.
    pub fn start_capture(&mut self, destination: impl Into<PathBuf>) -> Result<(), BankError> {
        if let Some(staged) = &self.staged {
            warn!(path = ?staged.path(), "Staged recording not assigned yet");
            return Err(BankError::StagedRecordingPending);
        }
        self.engine.start_capture(destination)?;
        Ok(())
    }

    /// Finishes the capture and stages it for assignment.
    pub fn stop_capture_and_stage(&mut self) -> Option<StagedRecording> {
        let Some(path) = self.engine.stop_capture() else {
            warn!("Nothing is being recorded");
            return None;
        };

        let duration = match recording_duration(&path) {
            Ok(duration) => duration,
            Err(e) => {
                error!(path = ?path, err = %e, "Unable to read recording");
                return None;
            }
        };

        if let Some(previous) = self.staged.take() {
            warn!(path = ?previous.path(), "Replacing unassigned staged recording");
        }
        let staged = StagedRecording {
            sample: Sample::new(path, duration),
        };
        info!(
            sample = %staged.sample.id,
            path = ?staged.path(),
            duration_ms = duration.as_millis(),
            "Recording staged"
        );
        self.staged = Some(staged.clone());
        Some(staged)
    }

    /// Moves the staged sample onto a pad. `staged` has to be the recording
    /// currently staged; once assigned it can't be assigned again. Returns
    /// the sample the pad held before, whose file is now the caller's to
    /// delete.
    pub fn assign(
        &mut self,
        index: usize,
        staged: &StagedRecording,
    ) -> Result<Option<Sample>, BankError> {
        let pad = self
            .pads
            .get_mut(index)
            .ok_or(BankError::InvalidIndex(index))?;
        let current = match self.staged.take() {
            Some(current) if current.sample.id == staged.sample.id => current,
            other => {
                self.staged = other;
                warn!(pad = index, sample = %staged.sample.id, "Recording is not staged");
                return Err(BankError::NothingStaged);
            }
        };

        let previous = pad.sample.replace(current.sample);
        info!(pad = index, sample = %staged.sample.id, "Sample assigned");
        Ok(previous)
    }

    /// Empties a pad and returns its sample.
    pub fn clear(&mut self, index: usize) -> Result<Option<Sample>, BankError> {
        let pad = self
            .pads
            .get_mut(index)
            .ok_or(BankError::InvalidIndex(index))?;
        let sample = pad.sample.take();
        if let Some(sample) = &sample {
            info!(pad = index, sample = %sample.id, "Pad cleared");
        }
        Ok(sample)
    }

    /// Plays the pad's sample. Empty pads do nothing.
    pub fn play(&self, index: usize) -> Result<Option<VoiceHandle>, BankError> {
        let pad = self.pad(index)?;
        Ok(pad
            .sample
            .as_ref()
            .map(|sample| self.engine.play_sample(sample.path())))
    }

    /// Drops the staged recording without assigning it.
    pub fn discard_staged(&mut self) -> Option<StagedRecording> {
        let staged = self.staged.take();
        if let Some(staged) = &staged {
            info!(path = ?staged.path(), "Staged recording discarded");
        }
        staged
    }

    pub fn stop_all(&self) -> usize {
        self.engine.stop_all()
    }

    pub fn pad(&self, index: usize) -> Result<&Pad, BankError> {
        self.pads.get(index).ok_or(BankError::InvalidIndex(index))
    }

    pub fn pads(&self) -> &[Pad] {
        &self.pads
    }

    pub fn staged(&self) -> Option<&StagedRecording> {
        self.staged.as_ref()
    }

    pub fn state(&self) -> PadState {
        if self.engine.is_capturing() {
            PadState::Capturing
        } else if self.staged.is_some() {
            PadState::Staged
        } else {
            PadState::Idle
        }
    }
}

/// Length of a WAV file from its header.
fn recording_duration(path: &Path) -> Result<Duration, hound::Error> {
    let reader = hound::WavReader::open(path)?;
    let sample_rate = reader.spec().sample_rate;
    if sample_rate == 0 {
        return Err(hound::Error::FormatError("sample rate is zero"));
    }
    Ok(Duration::from_secs_f64(
        reader.duration() as f64 / sample_rate as f64,
    ))
}
