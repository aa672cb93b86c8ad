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

//! The control thread. Every change to the audio graph happens here, one
//! command at a time.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::{never, select, unbounded, Receiver, Sender};
use tracing::{debug, error, info, span, warn, Level};

use super::capture::{self, Capture};
use super::error::EngineError;
use super::loader::LoadedSample;
use super::voice::{VoiceId, VoiceSet};
use super::{EngineEvent, EngineOptions, EngineStatus, EventQueue};
use crate::audio::sample_source::ConvertedSource;
use crate::audio::{ActiveSource, AudioMixer, CaptureFormat, Device, InputNode, SessionFormat};

/// Messages handled by the control thread.
pub(super) enum Command {
    Initialize {
        reply: Sender<()>,
    },
    StartCapture {
        destination: PathBuf,
        reply: Sender<Result<(), EngineError>>,
    },
    StopCapture {
        reply: Sender<Option<PathBuf>>,
    },
    Play {
        voice: VoiceId,
        path: PathBuf,
    },
    /// Posted by a reader when a file has been decoded (or failed to).
    Attach {
        voice: VoiceId,
        path: PathBuf,
        result: Result<LoadedSample, EngineError>,
    },
    StopAll {
        reply: Sender<usize>,
    },
    Shutdown,
}

/// The static part of the graph: input node, mixer and the channel the mixer
/// reports finished voices on.
struct Graph {
    mixer: Arc<AudioMixer>,
    finished: Receiver<u64>,
}

impl Graph {
    fn new(input: Arc<InputNode>) -> Graph {
        let (finished_tx, finished) = unbounded();
        info!("Audio graph built");
        Graph {
            mixer: Arc::new(AudioMixer::new(input, finished_tx)),
            finished,
        }
    }
}

pub(super) struct Control {
    device: Arc<dyn Device>,
    input: Arc<InputNode>,
    graph: Option<Graph>,
    session: Option<SessionFormat>,
    capture_format: CaptureFormat,
    capture: Option<Capture>,
    voices: VoiceSet,
    readers: rayon::ThreadPool,
    /// Lets readers post decoded samples back to this thread.
    commands: Sender<Command>,
    events: EventQueue,
    status: Arc<EngineStatus>,
}

impl Control {
    pub fn new(
        device: Arc<dyn Device>,
        input: Arc<InputNode>,
        options: &EngineOptions,
        commands: Sender<Command>,
        events: EventQueue,
        status: Arc<EngineStatus>,
    ) -> Result<Control, EngineError> {
        let readers = rayon::ThreadPoolBuilder::new()
            .num_threads(options.read_threads.max(1))
            .thread_name(|i| format!("sample-reader-{}", i))
            .build()
            .map_err(|e| EngineError::Startup(e.to_string()))?;

        Ok(Control {
            device,
            input,
            graph: None,
            session: None,
            capture_format: options.capture_format,
            capture: None,
            voices: VoiceSet::new(status.live_voices.clone()),
            readers,
            commands,
            events,
            status,
        })
    }

    /// Runs until shut down.
    pub fn run(mut self, commands: Receiver<Command>) {
        loop {
            let finished = self
                .graph
                .as_ref()
                .map(|graph| graph.finished.clone())
                .unwrap_or_else(never);

            select! {
                recv(commands) -> command => match command {
                    Ok(Command::Shutdown) | Err(_) => {
                        self.shutdown();
                        return;
                    }
                    Ok(command) => self.handle(command),
                },
                recv(finished) -> id => {
                    if let Ok(id) = id {
                        self.voice_finished(VoiceId::from(id));
                    }
                }
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Initialize { reply } => {
                self.graph();
                let _ = reply.send(());
            }
            Command::StartCapture { destination, reply } => {
                let _ = reply.send(self.start_capture(destination));
            }
            Command::StopCapture { reply } => {
                let _ = reply.send(self.stop_capture());
            }
            Command::Play { voice, path } => self.play(voice, path),
            Command::Attach {
                voice,
                path,
                result,
            } => self.attach(voice, path, result),
            Command::StopAll { reply } => {
                let _ = reply.send(self.stop_all());
            }
            Command::Shutdown => {}
        }
    }

    /// Builds the graph if it doesn't exist yet. Doesn't touch the hardware.
    fn graph(&mut self) -> Arc<AudioMixer> {
        let input = &self.input;
        self.graph
            .get_or_insert_with(|| Graph::new(input.clone()))
            .mixer
            .clone()
    }

    /// Activates the hardware session and fits the graph to its format.
    fn activate(&mut self) -> Result<SessionFormat, EngineError> {
        let mixer = self.graph();
        let session = self.device.activate().map_err(EngineError::session)?;
        if self.session != Some(session) {
            mixer.configure(&session);
            self.session = Some(session);
            *self.status.session.write() = Some(session);
        }
        Ok(session)
    }

    /// Starts the hardware streams if they aren't running.
    fn ensure_running(&mut self) -> Result<SessionFormat, EngineError> {
        let session = self.activate()?;
        if !self.device.is_running() {
            let span = span!(Level::INFO, "start hardware");
            let _enter = span.enter();
            let mixer = self.graph();
            self.device.start(mixer).map_err(EngineError::session)?;
            info!(device = %self.device, format = %session, "Audio running");
        }
        Ok(session)
    }

    fn start_capture(&mut self, destination: PathBuf) -> Result<(), EngineError> {
        if let Some(capture) = &self.capture {
            warn!(
                requested = ?destination,
                active = ?capture.path(),
                "Capture already in progress"
            );
            return Err(EngineError::AlreadyCapturing);
        }

        let session = self.activate()?;
        let writer = capture::create_writer(&destination, self.capture_format, &session)?;

        // Monitoring would feed the speakers back into the capture.
        let previous_volume = self.input.volume();
        self.input.set_volume(0.0);

        let result = self.ensure_running().and_then(|_| {
            Capture::start(
                destination.clone(),
                writer,
                self.capture_format,
                &self.input,
                self.events.clone(),
            )
        });
        match result {
            Ok(capture) => {
                self.capture = Some(capture);
                self.status.capturing.store(true, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                error!(path = ?destination, err = %e, "Unable to start capture");
                self.input.set_volume(previous_volume);
                if let Err(remove_err) = fs::remove_file(&destination) {
                    warn!(path = ?destination, err = %remove_err, "Unable to remove capture file");
                }
                Err(e)
            }
        }
    }

    fn stop_capture(&mut self) -> Option<PathBuf> {
        let capture = self.capture.take()?;
        let path = capture.stop(&self.input);
        self.status.capturing.store(false, Ordering::Relaxed);
        Some(path)
    }

    fn play(&mut self, voice: VoiceId, path: PathBuf) {
        self.graph();
        self.voices.add_pending(voice, path.clone());
        debug!(
            voice = %voice,
            path = ?path,
            pending = self.voices.pending_count(),
            "Reading sample"
        );

        let commands = self.commands.clone();
        self.readers.spawn(move || {
            let result = LoadedSample::load(&path);
            let _ = commands.send(Command::Attach {
                voice,
                path,
                result,
            });
        });
    }

    fn attach(
        &mut self,
        voice: VoiceId,
        path: PathBuf,
        result: Result<LoadedSample, EngineError>,
    ) {
        if !self.voices.take_pending(voice) {
            debug!(voice = %voice, "Voice was stopped before it started");
            return;
        }

        let sample = match result {
            Ok(sample) => sample,
            Err(e) => return self.playback_failed(voice, path, e),
        };
        let session = match self.activate() {
            Ok(session) => session,
            Err(e) => return self.playback_failed(voice, path, e),
        };
        let source = match ConvertedSource::new(
            Box::new(sample.create_source()),
            session.sample_rate,
            session.output_channels,
        ) {
            Ok(source) => source,
            Err(source) => {
                let e = EngineError::FileRead {
                    path: path.clone(),
                    source,
                };
                return self.playback_failed(voice, path, e);
            }
        };
        // Only a voice that can play starts the hardware.
        if let Err(e) = self.ensure_running() {
            return self.playback_failed(voice, path, e);
        }

        let channels = source.source_channel_count();
        let sample_rate = source.source_sample_rate();
        self.graph()
            .add_source(ActiveSource::new(voice.as_u64(), source));
        self.voices.add_live(voice, path.clone());
        info!(
            voice = %voice,
            path = ?path,
            channels,
            sample_rate,
            live = self.voices.live_count(),
            "Voice started"
        );
        self.publish(EngineEvent::VoiceStarted(voice));
    }

    fn playback_failed(&mut self, voice: VoiceId, path: PathBuf, e: EngineError) {
        error!(voice = %voice, path = ?path, err = %e, "Playback failed");
        self.publish(EngineEvent::PlaybackFailed {
            voice,
            path,
            error: e.to_string(),
        });
    }

    fn voice_finished(&mut self, voice: VoiceId) {
        if let Some(graph) = &self.graph {
            graph.mixer.remove_source(voice.as_u64());
        }
        // Stopped voices can still report in; they're already gone.
        if self.voices.remove_live(voice) {
            debug!(voice = %voice, live = self.voices.live_count(), "Voice finished");
            self.publish(EngineEvent::VoiceFinished(voice));
        }
    }

    fn stop_all(&mut self) -> usize {
        let (live, pending) = self.voices.clear();
        if let Some(graph) = &self.graph {
            let ids: Vec<u64> = live.iter().map(|voice| voice.as_u64()).collect();
            graph.mixer.remove_sources(&ids);
        }
        for voice in live.iter().chain(pending.iter()) {
            self.publish(EngineEvent::VoiceStopped(*voice));
        }
        if !live.is_empty() || !pending.is_empty() {
            info!(
                stopped = live.len(),
                cancelled = pending.len(),
                "Stopped all voices"
            );
        }
        live.len() + pending.len()
    }

    fn shutdown(&mut self) {
        if let Some(path) = self.stop_capture() {
            info!(path = ?path, "Capture finalized at shutdown");
        }
        self.stop_all();
        self.device.stop();
        info!("Audio engine shut down");
    }

    fn publish(&self, event: EngineEvent) {
        self.events.publish(event);
    }
}
