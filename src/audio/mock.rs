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
use std::{
    error::Error,
    f32::consts::PI,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{bounded, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{info, span, Level};

use super::format::SessionFormat;
use super::mixer::AudioMixer;
use super::Device as _;

/// Frames delivered per simulated hardware callback.
const BLOCK_FRAMES: usize = 256;

/// Frequency of the simulated input signal.
const INPUT_FREQUENCY: f32 = 440.0;

/// Amplitude of the simulated input signal.
const INPUT_AMPLITUDE: f32 = 0.25;

/// How the mock hardware clock moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Clock {
    /// Time only passes when `advance` is called.
    Manual,
    /// A thread runs the callbacks at the session rate.
    Realtime,
}

/// A mock device. It delivers a sine wave as input and renders output from
/// the mixer, either on demand or on its own clock.
#[derive(Clone)]
pub struct Device {
    name: String,
    format: SessionFormat,
    clock: Clock,
    state: Arc<State>,
}

struct State {
    active: AtomicBool,
    running: AtomicBool,
    fail_activation: AtomicBool,
    fail_start: AtomicBool,
    /// Input frames delivered so far, for a continuous input signal
    input_frames: AtomicU64,
    mixer: Mutex<Option<Arc<AudioMixer>>>,
    clock_thread: Mutex<Option<(Sender<()>, thread::JoinHandle<()>)>>,
}

impl Device {
    /// A mock device whose clock only moves when `advance` is called.
    pub fn get(name: &str) -> Device {
        Self::with_clock(name, Clock::Manual)
    }

    /// A mock device that runs in real time, like hardware would.
    pub fn realtime(name: &str) -> Device {
        Self::with_clock(name, Clock::Realtime)
    }

    fn with_clock(name: &str, clock: Clock) -> Device {
        Device {
            name: name.to_string(),
            format: SessionFormat {
                sample_rate: 44100,
                input_channels: 1,
                output_channels: 2,
            },
            clock,
            state: Arc::new(State {
                active: AtomicBool::new(false),
                running: AtomicBool::new(false),
                fail_activation: AtomicBool::new(false),
                fail_start: AtomicBool::new(false),
                input_frames: AtomicU64::new(0),
                mixer: Mutex::new(None),
                clock_thread: Mutex::new(None),
            }),
        }
    }

    /// Replaces the native session format.
    pub fn with_format(mut self, format: SessionFormat) -> Device {
        self.format = format;
        self
    }

    /// Makes activation fail until reset.
    pub fn set_fail_activation(&self, fail: bool) {
        self.state.fail_activation.store(fail, Ordering::Relaxed);
    }

    /// Makes starting the streams fail until reset.
    pub fn set_fail_start(&self, fail: bool) {
        self.state.fail_start.store(fail, Ordering::Relaxed);
    }

    /// Returns true if the session has been activated.
    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::Relaxed)
    }

    /// Runs the hardware callbacks for the given amount of time and returns
    /// the rendered output. Nothing happens unless the device is running.
    pub fn advance(&self, duration: Duration) -> Vec<f32> {
        let frames = (duration.as_secs_f64() * self.format.sample_rate as f64).round() as usize;
        self.run_frames(frames)
    }

    fn run_frames(&self, frames: usize) -> Vec<f32> {
        let mixer = match self.state.mixer.lock().clone() {
            Some(mixer) if self.is_running() => mixer,
            _ => return Vec::new(),
        };

        let out_channels = self.format.output_channels as usize;
        let mut output = Vec::with_capacity(frames * out_channels);
        let mut input = Vec::with_capacity(BLOCK_FRAMES * self.format.input_channels as usize);
        let mut block = vec![0.0; BLOCK_FRAMES * out_channels];

        let mut remaining = frames;
        while remaining > 0 {
            let block_frames = remaining.min(BLOCK_FRAMES);
            self.fill_input(&mut input, block_frames);
            mixer.input().process(&input);

            let chunk = &mut block[..block_frames * out_channels];
            mixer.process_into_output(chunk, block_frames);
            output.extend_from_slice(chunk);
            remaining -= block_frames;
        }
        output
    }

    fn fill_input(&self, input: &mut Vec<f32>, frames: usize) {
        let start = self
            .state
            .input_frames
            .fetch_add(frames as u64, Ordering::Relaxed);
        let rate = self.format.sample_rate as f32;
        input.clear();
        for frame in 0..frames as u64 {
            let t = ((start + frame) % self.format.sample_rate as u64) as f32 / rate;
            let sample = INPUT_AMPLITUDE * (2.0 * PI * INPUT_FREQUENCY * t).sin();
            for _ in 0..self.format.input_channels {
                input.push(sample);
            }
        }
    }

    fn spawn_clock(&self) {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let device = self.clone();
        let block = Duration::from_secs_f64(BLOCK_FRAMES as f64 / self.format.sample_rate as f64);
        let handle = thread::spawn(move || loop {
            match stop_rx.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => return,
            }
            device.run_frames(BLOCK_FRAMES);
            spin_sleep::sleep(block);
        });
        *self.state.clock_thread.lock() = Some((stop_tx, handle));
    }
}

impl super::Device for Device {
    fn activate(&self) -> Result<SessionFormat, Box<dyn Error>> {
        if self.state.fail_activation.load(Ordering::Relaxed) {
            return Err(format!("{}: unable to activate the audio session", self.name).into());
        }
        if !self.state.active.swap(true, Ordering::Relaxed) {
            info!(device = self.name, format = %self.format, "Activated audio session");
        }
        Ok(self.format)
    }

    fn start(&self, mixer: Arc<AudioMixer>) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "start audio (mock)");
        let _enter = span.enter();

        self.activate()?;
        if self.is_running() {
            return Ok(());
        }
        if self.state.fail_start.load(Ordering::Relaxed) {
            return Err(format!("{}: unable to start the audio streams", self.name).into());
        }

        *self.state.mixer.lock() = Some(mixer);
        self.state.running.store(true, Ordering::Relaxed);
        if self.clock == Clock::Realtime {
            self.spawn_clock();
        }
        info!(device = self.name, "Started audio streams");
        Ok(())
    }

    fn stop(&self) {
        if !self.state.running.swap(false, Ordering::Relaxed) {
            return;
        }
        if let Some((stop_tx, handle)) = self.state.clock_thread.lock().take() {
            let _ = stop_tx.send(());
            let _ = handle.join();
        }
        *self.state.mixer.lock() = None;
        info!(device = self.name, "Stopped audio streams");
    }

    fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, Box<dyn Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
