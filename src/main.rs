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
use std::collections::HashSet;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Args, Parser, Subcommand};
use duration_string::DurationString;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use padsampler::audio;
use padsampler::config::SamplerConfig;
use padsampler::engine::{AudioEngine, EngineEvent, EngineOptions};
use padsampler::pads::{PadBank, Sample, PAD_COUNT};
use padsampler::util::{duration_display, filename_display};

const PADS_HELP: &str = r#"Commands:
  r          start or stop recording
  a <pad>    assign the last recording to a pad
  p <pad>    play a pad
  c <pad>    clear a pad
  d          discard the last recording
  s          stop all voices
  m on|off   input monitoring
  l          list pads
  q          quit
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "An eight pad sampler."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DeviceArgs {
    /// The path to a sampler config file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// The audio device to use when no config file is given: "default", a
    /// device name from `devices`, or "mock".
    #[arg(short, long, default_value = "default")]
    device: String,
}

impl DeviceArgs {
    /// Loads the config file or builds one for the named device.
    fn load(&self) -> Result<(SamplerConfig, PathBuf), Box<dyn Error>> {
        match &self.config {
            Some(path) => {
                let config = SamplerConfig::deserialize(path)?;
                let base = path.parent().unwrap_or(Path::new("."));
                let recordings = base.join(config.recordings_dir());
                Ok((config, recordings))
            }
            None => {
                let config = SamplerConfig::new(&self.device);
                let recordings = config.recordings_dir();
                Ok((config, recordings))
            }
        }
    }

    fn engine(&self) -> Result<(Arc<AudioEngine>, PathBuf), Box<dyn Error>> {
        let (config, recordings) = self.load()?;
        let device = audio::get_device(config.audio())?;
        let options = EngineOptions::from_config(config.audio())?;
        let engine = Arc::new(AudioEngine::new(device, options)?);
        engine.initialize()?;
        Ok((engine, recordings))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio devices.
    Devices {},
    /// Records the input to a WAV file.
    Record {
        /// Where to write the recording.
        path: PathBuf,
        /// How long to record, e.g. 2s or 500ms. Records until Ctrl-C if not given.
        #[arg(short, long)]
        length: Option<String>,
        #[clap(flatten)]
        device: DeviceArgs,
    },
    /// Plays the given files at the same time.
    Play {
        /// The files to play.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[clap(flatten)]
        device: DeviceArgs,
    },
    /// Starts an interactive pad session on stdin.
    Pads {
        #[clap(flatten)]
        device: DeviceArgs,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Record {
            path,
            length,
            device,
        } => {
            let length: Option<Duration> = match length {
                Some(length) => Some(DurationString::from_string(length)?.into()),
                None => None,
            };
            let (engine, _) = device.engine()?;
            record(&engine, path, length).await?;
        }
        Commands::Play { paths, device } => {
            let (engine, _) = device.engine()?;
            play(engine, paths).await?;
        }
        Commands::Pads { device } => {
            let (engine, recordings) = device.engine()?;
            fs::create_dir_all(&recordings)?;
            pads(PadBank::new(engine), &recordings).await?;
        }
    }

    Ok(())
}

async fn record(
    engine: &AudioEngine,
    path: PathBuf,
    length: Option<Duration>,
) -> Result<(), Box<dyn Error>> {
    engine.start_capture(&path)?;
    match length {
        Some(length) => {
            println!("Recording {} for {:?}...", path.display(), length);
            tokio::select! {
                _ = tokio::time::sleep(length) => {},
                _ = tokio::signal::ctrl_c() => {},
            }
        }
        None => {
            println!("Recording {}, press Ctrl-C to stop...", path.display());
            tokio::signal::ctrl_c().await?;
        }
    }

    if let Some(path) = engine.stop_capture() {
        let reader = hound::WavReader::open(&path)?;
        let duration =
            Duration::from_secs_f64(reader.duration() as f64 / reader.spec().sample_rate as f64);
        println!(
            "Recorded {} ({})",
            filename_display(&path),
            duration_display(duration)
        );
    }
    Ok(())
}

async fn play(engine: Arc<AudioEngine>, paths: Vec<PathBuf>) -> Result<(), Box<dyn Error>> {
    let events = engine.events();
    let mut waiting: HashSet<_> = paths
        .iter()
        .map(|path| {
            println!("Playing {}", filename_display(path));
            engine.play_sample(path).id()
        })
        .collect();

    let wait = tokio::task::spawn_blocking(move || {
        while !waiting.is_empty() {
            match events.recv() {
                Ok(EngineEvent::VoiceFinished(voice)) | Ok(EngineEvent::VoiceStopped(voice)) => {
                    waiting.remove(&voice);
                }
                Ok(EngineEvent::PlaybackFailed { voice, path, error }) => {
                    eprintln!("Unable to play {}: {}", path.display(), error);
                    waiting.remove(&voice);
                }
                Ok(_) => {}
                Err(_) => return,
            }
        }
    });

    tokio::select! {
        result = wait => result?,
        _ = tokio::signal::ctrl_c() => {
            info!(stopped = engine.stop_all(), "Interrupted");
        }
    }
    Ok(())
}

async fn pads(mut bank: PadBank, recordings: &Path) -> Result<(), Box<dyn Error>> {
    print!("{}", PADS_HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        let argument = words.next();
        if command == "q" {
            break;
        }
        if let Err(e) = pad_command(&mut bank, recordings, command, argument) {
            println!("Error: {}", e);
        }
        println!("[{}]", bank.state());
    }

    if bank.engine().is_capturing() {
        if let Some(staged) = bank.stop_capture_and_stage() {
            println!("Recording kept at {}", staged.path().display());
        }
    }
    bank.stop_all();
    Ok(())
}

fn pad_command(
    bank: &mut PadBank,
    recordings: &Path,
    command: &str,
    argument: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let pad = || -> Result<usize, Box<dyn Error>> {
        let index: usize = argument.ok_or("missing pad number")?.parse()?;
        // Pads are numbered from 1 for people.
        index
            .checked_sub(1)
            .ok_or_else(|| format!("pads are numbered 1-{}", PAD_COUNT).into())
    };

    match command {
        "r" if bank.engine().is_capturing() => match bank.stop_capture_and_stage() {
            Some(staged) => println!(
                "Recorded {} ({})",
                filename_display(staged.path()),
                duration_display(staged.duration())
            ),
            None => println!("Recording failed"),
        },
        "r" => {
            let path = PadBank::recording_path(recordings);
            bank.start_capture(&path)?;
            println!("Recording to {}", filename_display(&path));
        }
        "a" => {
            let staged = bank.staged().cloned().ok_or("nothing recorded")?;
            let index = pad()?;
            if let Some(displaced) = bank.assign(index, &staged)? {
                remove_sample(&displaced);
            }
        }
        "p" => {
            if bank.play(pad()?)?.is_none() {
                println!("Pad is empty");
            }
        }
        "c" => {
            if let Some(sample) = bank.clear(pad()?)? {
                remove_sample(&sample);
            }
        }
        "d" => {
            if let Some(staged) = bank.discard_staged() {
                remove_sample(staged.sample());
            }
        }
        "s" => println!("Stopped {} voices", bank.stop_all()),
        "m" => match argument {
            Some("on") => bank.engine().set_input_monitoring(true),
            Some("off") => bank.engine().set_input_monitoring(false),
            _ => return Err("use m on or m off".into()),
        },
        "l" => {
            for pad in bank.pads() {
                match pad.sample() {
                    Some(sample) => println!(
                        "{}: {} ({})",
                        pad.index() + 1,
                        filename_display(sample.path()),
                        duration_display(sample.duration())
                    ),
                    None => println!("{}: empty", pad.index() + 1),
                }
            }
        }
        "" => {}
        _ => print!("{}", PADS_HELP),
    }
    Ok(())
}

/// Deletes a sample's file unless another pad still plays it.
/// Each recording is on at most one pad, so a sample that leaves the bank
/// can go.
fn remove_sample(sample: &Sample) {
    if let Err(e) = sample.remove_file() {
        warn!(path = ?sample.path(), err = %e, "Unable to remove sample file");
    }
}
