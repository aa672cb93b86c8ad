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

//! The audio engine: a persistent input to mixer to output graph, capture of
//! the input to WAV files and overlapping playback of samples.
//!
//! All graph changes run on a single control thread. Public calls post
//! commands to it; most of them wait for the reply, `play_sample` doesn't.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::audio::{CaptureFormat, Device, InputNode, SessionFormat};
use crate::config::{self, ConfigError};

mod capture;
mod control;
mod error;
mod loader;
mod voice;

#[cfg(test)]
mod tests;

use control::{Command, Control};

pub use error::EngineError;
pub use loader::LoadedSample;
pub use voice::{VoiceHandle, VoiceId};

/// Events kept for readers. Past this the oldest are dropped.
const EVENT_QUEUE_SIZE: usize = 256;

/// Options for building an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Threads decoding sample files.
    pub read_threads: usize,
    /// Whether the input is monitored on the output until a capture starts.
    pub monitor_input: bool,
    /// Encoding of capture files.
    pub capture_format: CaptureFormat,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            read_threads: 2,
            monitor_input: true,
            capture_format: CaptureFormat::default(),
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &config::Audio) -> Result<Self, ConfigError> {
        Ok(EngineOptions {
            read_threads: config.read_threads(),
            monitor_input: config.monitor_input(),
            capture_format: config.capture_format()?,
        })
    }
}

/// Things that happened on the control or writer threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The voice is attached to the mixer and playing.
    VoiceStarted(VoiceId),
    /// The voice ran out of samples and was detached.
    VoiceFinished(VoiceId),
    /// The voice was stopped (or cancelled before it started) by `stop_all`.
    VoiceStopped(VoiceId),
    /// The voice never started.
    PlaybackFailed {
        voice: VoiceId,
        path: PathBuf,
        error: String,
    },
    /// Writing the capture file failed. The file is incomplete.
    CaptureFailed { path: PathBuf, error: String },
}

/// State published by the control thread for queries.
pub(crate) struct EngineStatus {
    capturing: AtomicBool,
    live_voices: Arc<RwLock<HashSet<VoiceId>>>,
    session: RwLock<Option<SessionFormat>>,
}

/// Bounded event queue that keeps the newest events. Publishing never
/// blocks; when the queue is full the oldest event is dropped.
#[derive(Clone)]
pub(crate) struct EventQueue {
    tx: Sender<EngineEvent>,
    rx: Receiver<EngineEvent>,
}

impl EventQueue {
    fn new(capacity: usize) -> EventQueue {
        let (tx, rx) = bounded(capacity);
        EventQueue { tx, rx }
    }

    pub(crate) fn publish(&self, event: EngineEvent) {
        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(oldest) = self.rx.try_recv() {
                        debug!(event = ?oldest, "Event queue full, dropping oldest event");
                    }
                    event = rejected;
                }
                // Unreachable while this queue holds a receiver.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    fn receiver(&self) -> Receiver<EngineEvent> {
        self.rx.clone()
    }
}

/// Owns the audio graph. There should only be one per process since the
/// hardware session is shared; pass it around in an `Arc`.
pub struct AudioEngine {
    device: Arc<dyn Device>,
    input: Arc<InputNode>,
    commands: Sender<Command>,
    events: Receiver<EngineEvent>,
    status: Arc<EngineStatus>,
    control_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl AudioEngine {
    /// Creates the engine and its threads. The hardware isn't touched until
    /// the first capture or playback.
    pub fn new(
        device: Arc<dyn Device>,
        options: EngineOptions,
    ) -> Result<AudioEngine, EngineError> {
        let input = Arc::new(InputNode::new(if options.monitor_input {
            1.0
        } else {
            0.0
        }));
        let status = Arc::new(EngineStatus {
            capturing: AtomicBool::new(false),
            live_voices: Arc::new(RwLock::new(HashSet::new())),
            session: RwLock::new(None),
        });
        let (commands_tx, commands_rx) = unbounded();
        let events = EventQueue::new(EVENT_QUEUE_SIZE);

        let control = Control::new(
            device.clone(),
            input.clone(),
            &options,
            commands_tx.clone(),
            events.clone(),
            status.clone(),
        )?;
        let control_thread = thread::Builder::new()
            .name("audio-control".to_string())
            .spawn(move || control.run(commands_rx))
            .map_err(|e| EngineError::Startup(e.to_string()))?;

        info!(
            device = %device,
            read_threads = options.read_threads,
            monitor_input = options.monitor_input,
            "Audio engine created"
        );

        Ok(AudioEngine {
            device,
            input,
            commands: commands_tx,
            events: events.receiver(),
            status,
            control_thread: Mutex::new(Some(control_thread)),
        })
    }

    /// Builds the graph without starting the hardware.
    pub fn initialize(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Initialize { reply })
    }

    /// Starts capturing the input to a WAV file at `destination`. Input
    /// monitoring is muted for the capture and stays muted afterwards.
    pub fn start_capture(&self, destination: impl Into<PathBuf>) -> Result<(), EngineError> {
        let destination = destination.into();
        self.request(|reply| Command::StartCapture { destination, reply })?
    }

    /// Finalizes the capture and returns its path, or None if nothing was
    /// being captured.
    pub fn stop_capture(&self) -> Option<PathBuf> {
        match self.request(|reply| Command::StopCapture { reply }) {
            Ok(path) => path,
            Err(e) => {
                warn!(err = %e, "Unable to stop capture");
                None
            }
        }
    }

    /// Starts playing the file at `source` on a new voice. Returns right
    /// away; failures are published as `EngineEvent::PlaybackFailed`.
    pub fn play_sample(&self, source: impl Into<PathBuf>) -> VoiceHandle {
        let voice = VoiceId::next();
        let path = source.into();
        if self
            .commands
            .send(Command::Play {
                voice,
                path: path.clone(),
            })
            .is_err()
        {
            error!(voice = %voice, path = ?path, "Audio engine has shut down, not playing");
        }
        VoiceHandle::new(voice)
    }

    /// Stops every voice, including ones still being read. Returns how many
    /// were stopped.
    pub fn stop_all(&self) -> usize {
        match self.request(|reply| Command::StopAll { reply }) {
            Ok(stopped) => stopped,
            Err(e) => {
                warn!(err = %e, "Unable to stop voices");
                0
            }
        }
    }

    pub fn set_input_monitoring(&self, enabled: bool) {
        self.input.set_volume(if enabled { 1.0 } else { 0.0 });
        info!(enabled, "Input monitoring");
    }

    pub fn input_monitoring(&self) -> bool {
        self.input.volume() > 0.0
    }

    pub fn is_capturing(&self) -> bool {
        self.status.capturing.load(Ordering::Relaxed)
    }

    /// Whether the hardware streams are running.
    pub fn is_running(&self) -> bool {
        self.device.is_running()
    }

    pub fn live_voice_count(&self) -> usize {
        self.status.live_voices.read().len()
    }

    pub fn is_voice_live(&self, handle: &VoiceHandle) -> bool {
        self.status.live_voices.read().contains(&handle.id())
    }

    /// The format of the hardware session, once it has been activated.
    pub fn session_format(&self) -> Option<SessionFormat> {
        *self.status.session.read()
    }

    /// A receiver for engine events. All receivers share one queue, which
    /// holds the most recent events; if nobody reads, older events are
    /// dropped to make room.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.events.clone()
    }

    /// Sends a command and waits for its reply.
    fn request<T>(&self, command: impl FnOnce(Sender<T>) -> Command) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.commands
            .send(command(reply_tx))
            .map_err(|_| EngineError::Shutdown)?;
        reply_rx.recv().map_err(|_| EngineError::Shutdown)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.control_thread.lock().take() {
            if handle.join().is_err() {
                error!("Audio control thread panicked");
            }
        }
    }
}
