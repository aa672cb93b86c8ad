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

//! Capturing input to a WAV file.
//!
//! The input node copies every buffer it receives into a preallocated ring.
//! A writer thread drains the ring to the file in delivery order and
//! finalizes the file once it's told to stop.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use hound::WavWriter;
use tracing::{error, info, warn};

use super::error::EngineError;
use super::{EngineEvent, EventQueue};
use crate::audio::ring::CircularBuffer;
use crate::audio::{CaptureFormat, InputNode, SampleFormat, SessionFormat};

type CaptureWriter = WavWriter<BufWriter<File>>;

/// How often the writer drains the ring.
const DRAIN_INTERVAL: Duration = Duration::from_millis(5);

/// Samples moved out of the ring per read.
const DRAIN_SAMPLES: usize = 4096;

/// Creates the capture file.
pub(super) fn create_writer(
    path: &Path,
    format: CaptureFormat,
    session: &SessionFormat,
) -> Result<CaptureWriter, EngineError> {
    WavWriter::create(path, format.wav_spec(session)).map_err(|source| EngineError::FileCreate {
        path: path.to_path_buf(),
        source,
    })
}

/// An in-progress capture.
pub(super) struct Capture {
    path: PathBuf,
    stop: Sender<()>,
    writer_thread: thread::JoinHandle<Result<u64, hound::Error>>,
}

impl Capture {
    /// Opens the tap on the input node and spawns the writer thread.
    pub fn start(
        path: PathBuf,
        writer: CaptureWriter,
        format: CaptureFormat,
        input: &InputNode,
        events: EventQueue,
    ) -> Result<Capture, EngineError> {
        let (stop, stopped) = bounded::<()>(1);
        let ring = input.open_tap();
        let thread_path = path.clone();
        let writer_thread = thread::Builder::new()
            .name("capture-writer".to_string())
            .spawn(move || {
                let result = write_ring(writer, &ring, stopped, format);
                if let Err(e) = &result {
                    error!(path = ?thread_path, err = %e, "Capture failed");
                    events.publish(EngineEvent::CaptureFailed {
                        path: thread_path,
                        error: e.to_string(),
                    });
                }
                result
            })
            .map_err(|e| {
                input.close_tap();
                EngineError::Startup(e.to_string())
            })?;

        info!(path = ?path, "Capture started");
        Ok(Capture {
            path,
            stop,
            writer_thread,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the tap, waits for everything already delivered to be written
    /// and finalizes the file. Returns the path of the capture.
    pub fn stop(self, input: &InputNode) -> PathBuf {
        let dropped = input.close_tap();
        if dropped > 0 {
            warn!(path = ?self.path, dropped, "Capture writer fell behind, samples were lost");
        }
        // The writer also stops if this end is gone.
        let _ = self.stop.send(());
        match self.writer_thread.join() {
            Ok(Ok(frames)) => info!(path = ?self.path, frames, "Capture finished"),
            Ok(Err(_)) => {}
            Err(_) => error!(path = ?self.path, "Capture writer panicked"),
        }
        self.path
    }
}

/// Drains the ring until told to stop, then drains it once more and
/// finalizes the file. Returns the number of frames written.
fn write_ring(
    mut writer: CaptureWriter,
    ring: &CircularBuffer,
    stopped: Receiver<()>,
    format: CaptureFormat,
) -> Result<u64, hound::Error> {
    let channels = writer.spec().channels.max(1) as u64;
    let mut samples = 0u64;
    let mut scratch = vec![0.0f32; DRAIN_SAMPLES];
    // Largest positive value for the integer depth
    let scale = ((1i64 << (format.bits_per_sample - 1)) - 1) as f32;

    loop {
        let stopping = !matches!(
            stopped.recv_timeout(DRAIN_INTERVAL),
            Err(RecvTimeoutError::Timeout)
        );

        loop {
            let read = ring.read(&mut scratch);
            if read == 0 {
                break;
            }
            match format.sample_format {
                SampleFormat::Float => {
                    for sample in &scratch[..read] {
                        writer.write_sample(*sample)?;
                    }
                }
                SampleFormat::Int => {
                    for sample in &scratch[..read] {
                        writer.write_sample((sample.clamp(-1.0, 1.0) * scale) as i32)?;
                    }
                }
            }
            samples += read as u64;
        }

        if stopping {
            break;
        }
    }

    writer.finalize()?;
    Ok(samples / channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionFormat {
        SessionFormat::new(8000, 1, 2).unwrap()
    }

    #[test]
    fn test_capture_writes_buffers_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.wav");
        let format = CaptureFormat::default();
        let input = InputNode::new(0.0);
        let events = EventQueue::new(4);

        let writer = create_writer(&path, format, &session()).unwrap();
        let capture = Capture::start(path.clone(), writer, format, &input, events).unwrap();
        assert_eq!(capture.path(), path);
        assert!(input.has_tap());

        input.process(&[0.1, 0.2]);
        input.process(&[0.3]);
        assert_eq!(capture.stop(&input), path);
        assert!(!input.has_tap());

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_capture_int_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture16.wav");
        let format = CaptureFormat::new(SampleFormat::Int, 16).unwrap();
        let input = InputNode::new(0.0);
        let events = EventQueue::new(4);

        let writer = create_writer(&path, format, &session()).unwrap();
        let capture = Capture::start(path.clone(), writer, format, &input, events).unwrap();
        input.process(&[1.0, -1.0, 0.5, 2.0]);
        capture.stop(&input);

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![32767, -32767, 16383, 32767]);
    }

    #[test]
    fn test_capture_spanning_many_drains() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        let format = CaptureFormat::default();
        let input = InputNode::new(0.0);
        let events = EventQueue::new(4);

        let writer = create_writer(&path, format, &session()).unwrap();
        let capture = Capture::start(path.clone(), writer, format, &input, events).unwrap();
        let expected: Vec<f32> = (0..DRAIN_SAMPLES * 5).map(|i| i as f32 / 65536.0).collect();
        for block in expected.chunks(300) {
            input.process(block);
        }
        capture.stop(&input);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, expected);
    }

    #[test]
    fn test_create_writer_in_missing_directory() {
        let result = create_writer(
            Path::new("/nonexistent/dir/capture.wav"),
            CaptureFormat::default(),
            &session(),
        );
        assert!(matches!(result, Err(EngineError::FileCreate { .. })));
    }
}
