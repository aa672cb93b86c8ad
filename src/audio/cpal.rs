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
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample;
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use super::format::SessionFormat;
use super::input::InputNode;
use super::mixer::AudioMixer;
use super::ring::CircularBuffer;
use super::thread_priority::{configure_audio_thread_priority, AudioThreadPriority};
use super::DeviceInfo;
use crate::config::{self, NamedBufferSize, StreamBufferSize};

/// Frames mixed per producer iteration. Small for low latency.
const PRODUCER_BLOCK_FRAMES: usize = 256;

/// A duplex session on a cpal output device and an input device, which is
/// the same device when it can record.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The device rendering the mixer output.
    output_device: cpal::Device,
    /// The device capturing input.
    input_device: cpal::Device,
    /// Stream buffer size choice.
    stream_buffer_size: StreamBufferSize,
    /// Scheduling for the producer thread.
    priority: AudioThreadPriority,
    /// The negotiated session, once activated.
    session: Mutex<Option<Session>>,
    /// The running streams, if started.
    streams: Mutex<Option<RunningStreams>>,
}

#[derive(Clone, Copy)]
struct Session {
    format: SessionFormat,
    input_sample_format: cpal::SampleFormat,
    output_sample_format: cpal::SampleFormat,
    buffer_size: cpal::BufferSize,
}

/// Threads owning the running streams.
struct RunningStreams {
    /// Tells the stream thread to drop the streams.
    stop_tx: Sender<()>,
    /// Tells the producer thread to exit.
    producer_stop: Arc<AtomicBool>,
    stream_thread: thread::JoinHandle<()>,
    producer_thread: thread::JoinHandle<()>,
}

impl RunningStreams {
    fn shutdown(self) {
        self.producer_stop.store(true, Ordering::Relaxed);
        let _ = self.stop_tx.send(());
        let _ = self.stream_thread.join();
        let _ = self.producer_thread.join();
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.host_id.name())
    }
}

/// Input callback: convert to f32 and hand the buffer to the input node.
fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    input: Arc<InputNode>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            scratch.clear();
            scratch.extend(data.iter().map(|s| s.to_sample::<f32>()));
            input.process(&scratch);
        },
        |err| error!(err = %err, "CPAL input stream error"),
        None,
    )
}

/// Output callback: read from the ring and convert.
fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: Arc<CircularBuffer>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            let read = ring.read(&mut scratch);
            // Zero-fill any shortfall
            scratch[read..].fill(0.0);
            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        |err| error!(err = %err, "CPAL output stream error"),
        None,
    )
}

fn build_streams(
    input_device: &cpal::Device,
    output_device: &cpal::Device,
    session: Session,
    input: Arc<InputNode>,
    ring: Arc<CircularBuffer>,
) -> Result<(cpal::Stream, cpal::Stream), Box<dyn Error>> {
    let input_config = cpal::StreamConfig {
        channels: session.format.input_channels,
        sample_rate: cpal::SampleRate(session.format.sample_rate),
        buffer_size: session.buffer_size,
    };
    let output_config = cpal::StreamConfig {
        channels: session.format.output_channels,
        sample_rate: cpal::SampleRate(session.format.sample_rate),
        buffer_size: session.buffer_size,
    };

    let input_stream = match session.input_sample_format {
        cpal::SampleFormat::F32 => build_input_stream::<f32>(input_device, &input_config, input)?,
        cpal::SampleFormat::I16 => build_input_stream::<i16>(input_device, &input_config, input)?,
        cpal::SampleFormat::I32 => build_input_stream::<i32>(input_device, &input_config, input)?,
        cpal::SampleFormat::U16 => build_input_stream::<u16>(input_device, &input_config, input)?,
        other => return Err(format!("Unsupported input sample format {:?}", other).into()),
    };
    let output_stream = match session.output_sample_format {
        cpal::SampleFormat::F32 => build_output_stream::<f32>(output_device, &output_config, ring)?,
        cpal::SampleFormat::I16 => build_output_stream::<i16>(output_device, &output_config, ring)?,
        cpal::SampleFormat::I32 => build_output_stream::<i32>(output_device, &output_config, ring)?,
        cpal::SampleFormat::U16 => build_output_stream::<u16>(output_device, &output_config, ring)?,
        other => return Err(format!("Unsupported output sample format {:?}", other).into()),
    };

    input_stream.play()?;
    output_stream.play()?;
    Ok((input_stream, output_stream))
}

impl Device {
    /// Lists cpal devices that can record or play.
    pub fn list() -> Result<Vec<DeviceInfo>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let max_output_channels = device
                    .supported_output_configs()
                    .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
                    .unwrap_or(0);
                let max_input_channels = device
                    .supported_input_configs()
                    .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
                    .unwrap_or(0);
                if max_input_channels == 0 && max_output_channels == 0 {
                    continue;
                }

                let Ok(name) = device.name() else {
                    continue;
                };
                devices.push(DeviceInfo {
                    name,
                    host: host_id.name().to_string(),
                    max_input_channels,
                    max_output_channels,
                    default_sample_rate: device
                        .default_output_config()
                        .ok()
                        .map(|c| c.sample_rate().0),
                });
            }
        }

        devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(devices)
    }

    /// Gets the configured cpal device. "default" picks the host's default
    /// input and output devices.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let name = config.device();
        let host = cpal::default_host();

        let (output_device, input_device) = if name == "default" {
            (
                host.default_output_device()
                    .ok_or("no default output device")?,
                host.default_input_device()
                    .ok_or("no default input device")?,
            )
        } else {
            let _shh_stderr = shh::stderr()?;
            let output_device = host
                .output_devices()?
                .find(|device| device.name().is_ok_and(|n| n.trim() == name))
                .ok_or_else(|| format!("no device found with name {}", name))?;
            let can_record = output_device
                .supported_input_configs()
                .is_ok_and(|mut configs| configs.next().is_some());
            let input_device = if can_record {
                output_device.clone()
            } else {
                info!(device = name, "Device can't record, using the default input");
                host.default_input_device()
                    .ok_or("no default input device")?
            };
            (output_device, input_device)
        };

        Ok(Device {
            name: output_device.name()?,
            host_id: host.id(),
            output_device,
            input_device,
            stream_buffer_size: config.stream_buffer_size(),
            priority: AudioThreadPriority::from(config),
            session: Mutex::new(None),
            streams: Mutex::new(None),
        })
    }

    /// Negotiates a rate both sides support, starting from the output's
    /// default.
    fn negotiate(&self) -> Result<Session, Box<dyn Error>> {
        let output_config = self.output_device.default_output_config()?;
        let rate = output_config.sample_rate();

        let input_config = match self.input_device.default_input_config() {
            Ok(config) if config.sample_rate() == rate => config,
            _ => self
                .input_device
                .supported_input_configs()?
                .filter(|c| c.min_sample_rate() <= rate && rate <= c.max_sample_rate())
                .min_by_key(|c| c.channels())
                .map(|c| c.with_sample_rate(rate))
                .ok_or_else(|| {
                    format!("input device does not support the output rate of {} Hz", rate.0)
                })?,
        };

        let buffer_size = match self.stream_buffer_size {
            StreamBufferSize::Fixed(frames) => cpal::BufferSize::Fixed(frames as u32),
            StreamBufferSize::Named(NamedBufferSize::Default) => cpal::BufferSize::Default,
            StreamBufferSize::Named(NamedBufferSize::Min) => match output_config.buffer_size() {
                cpal::SupportedBufferSize::Range { min, .. } => cpal::BufferSize::Fixed(*min),
                cpal::SupportedBufferSize::Unknown => cpal::BufferSize::Default,
            },
        };

        Ok(Session {
            format: SessionFormat::new(
                rate.0,
                input_config.channels(),
                output_config.channels(),
            )?,
            input_sample_format: input_config.sample_format(),
            output_sample_format: output_config.sample_format(),
            buffer_size,
        })
    }

    fn active_session(&self) -> Result<Session, Box<dyn Error>> {
        let mut session = self.session.lock();
        if let Some(session) = *session {
            return Ok(session);
        }
        let negotiated = self.negotiate()?;
        info!(device = self.name, format = %negotiated.format, "Activated audio session");
        *session = Some(negotiated);
        Ok(negotiated)
    }
}

impl super::Device for Device {
    fn activate(&self) -> Result<SessionFormat, Box<dyn Error>> {
        Ok(self.active_session()?.format)
    }

    fn start(&self, mixer: Arc<AudioMixer>) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "start audio (cpal)");
        let _enter = span.enter();

        let session = self.active_session()?;
        let mut streams = self.streams.lock();
        if streams.is_some() {
            return Ok(());
        }

        // ~100ms of output between the producer and the output callback
        let num_channels = session.format.output_channels as usize;
        let capacity_samples = (session.format.sample_rate as usize * num_channels) / 10;
        let ring = Arc::new(CircularBuffer::new(capacity_samples.max(4096)));

        // Producer thread: mix into the ring ahead of the output callback
        let producer_stop = Arc::new(AtomicBool::new(false));
        let producer_thread = {
            let mixer = mixer.clone();
            let ring = ring.clone();
            let stop = producer_stop.clone();
            let priority = self.priority;
            thread::spawn(move || {
                configure_audio_thread_priority(priority);
                let block_samples = PRODUCER_BLOCK_FRAMES * num_channels;
                let mut scratch = vec![0.0f32; block_samples];

                while !stop.load(Ordering::Relaxed) {
                    if ring.space() >= block_samples {
                        mixer.process_into_output(&mut scratch, PRODUCER_BLOCK_FRAMES);
                        ring.write(&scratch);
                    } else {
                        // Ring full, yield briefly
                        thread::sleep(Duration::from_micros(500));
                    }
                }
            })
        };

        // cpal streams aren't Send everywhere, so one thread builds and owns them.
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (result_tx, result_rx) = bounded::<Result<(), String>>(1);
        let stream_thread = {
            let input_device = self.input_device.clone();
            let output_device = self.output_device.clone();
            let input = mixer.input().clone();
            thread::spawn(move || {
                match build_streams(&input_device, &output_device, session, input, ring) {
                    Ok(streams) => {
                        let _ = result_tx.send(Ok(()));
                        // Keep the streams alive until told to stop
                        let _ = stop_rx.recv();
                        drop(streams);
                    }
                    Err(e) => {
                        let _ = result_tx.send(Err(e.to_string()));
                    }
                }
            })
        };

        let running = RunningStreams {
            stop_tx,
            producer_stop,
            stream_thread,
            producer_thread,
        };
        match result_rx.recv() {
            Ok(Ok(())) => {
                info!(device = self.name, format = %session.format, "CPAL streams started");
                *streams = Some(running);
                Ok(())
            }
            Ok(Err(e)) => {
                running.shutdown();
                Err(format!("failed to start streams on {}: {}", self.name, e).into())
            }
            Err(_) => {
                running.shutdown();
                Err(format!("stream thread for {} exited unexpectedly", self.name).into())
            }
        }
    }

    fn stop(&self) {
        if let Some(running) = self.streams.lock().take() {
            running.shutdown();
            info!(device = self.name, "CPAL streams stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.streams.lock().is_some()
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Some(running) = self.streams.get_mut().take() {
            running.shutdown();
        }
    }
}
