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
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::*;
use crate::audio::{mock, Device as _};
use crate::testutil::{calculate_rms, eventually, sine_wave, write_wav};

const RATE: u32 = 44100;

fn engine(device: &Arc<mock::Device>) -> AudioEngine {
    AudioEngine::new(
        device.clone(),
        EngineOptions {
            monitor_input: false,
            ..Default::default()
        },
    )
    .unwrap()
}

fn sample_file(dir: &Path, name: &str, rate: u32, seconds: f32) -> PathBuf {
    let path = dir.join(name);
    let frames = (rate as f32 * seconds) as usize;
    write_wav(&path, vec![sine_wave(440.0, 0.5, rate, frames)], rate).unwrap();
    path
}

/// Splits interleaved output into its channels.
fn channel(output: &[f32], channels: usize, index: usize) -> Vec<f32> {
    output.iter().skip(index).step_by(channels).copied().collect()
}

fn drain(events: &Receiver<EngineEvent>) -> Vec<EngineEvent> {
    events.try_iter().collect()
}

/// Receives events until `expected` arrives. Returns everything received.
fn wait_for(events: &Receiver<EngineEvent>, expected: &EngineEvent) -> Vec<EngineEvent> {
    let mut received = Vec::new();
    while !received.contains(expected) {
        match events.recv_timeout(Duration::from_secs(5)) {
            Ok(event) => received.push(event),
            Err(_) => panic!("Timed out waiting for {:?}, got {:?}", expected, received),
        }
    }
    received
}

#[test]
fn test_initialize_does_not_start_hardware() {
    let device = Arc::new(mock::Device::get("mock-initialize"));
    let engine = engine(&device);

    engine.initialize().unwrap();
    engine.initialize().unwrap();

    assert!(!engine.is_running());
    assert!(!device.is_active());
    assert!(engine.session_format().is_none());
    assert!(!engine.is_capturing());
}

#[test]
fn test_concurrent_plays_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let short = sample_file(dir.path(), "short.wav", RATE, 0.1);
    let long = sample_file(dir.path(), "long.wav", RATE, 2.0);
    let device = Arc::new(mock::Device::get("mock-concurrent"));
    let engine = engine(&device);
    let events = engine.events();

    let a = engine.play_sample(&short);
    let b = engine.play_sample(&long);
    let c = engine.play_sample(&long);
    assert_ne!(a.id(), b.id());
    assert_ne!(b.id(), c.id());

    eventually(
        || engine.live_voice_count() == 3,
        "All three voices should start",
    );
    assert!(engine.is_running());

    let output = device.advance(Duration::from_millis(300));
    assert!(calculate_rms(&output) > 0.1);

    let events = wait_for(&events, &EngineEvent::VoiceFinished(a.id()));
    assert!(!engine.is_voice_live(&a));
    assert!(engine.is_voice_live(&b));
    assert!(engine.is_voice_live(&c));
    assert_eq!(engine.live_voice_count(), 2);

    let started = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::VoiceStarted(_)))
        .count();
    assert_eq!(started, 3);
    assert!(!events.contains(&EngineEvent::VoiceFinished(b.id())));
}

#[test]
fn test_second_capture_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.wav");
    let second = dir.path().join("second.wav");
    let device = Arc::new(mock::Device::get("mock-double-capture"));
    let engine = engine(&device);

    engine.start_capture(&first).unwrap();
    assert!(engine.is_capturing());
    device.advance(Duration::from_millis(500));

    let result = engine.start_capture(&second);
    assert!(matches!(result, Err(EngineError::AlreadyCapturing)));
    assert!(!second.exists());
    assert!(engine.is_capturing());

    device.advance(Duration::from_millis(500));
    assert_eq!(engine.stop_capture(), Some(first.clone()));
    assert!(!engine.is_capturing());
    assert_eq!(engine.stop_capture(), None);

    let reader = hound::WavReader::open(&first).unwrap();
    assert_eq!(reader.spec().sample_rate, RATE);
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().sample_format, hound::SampleFormat::Float);
    assert_eq!(reader.duration(), RATE);
}

#[test]
fn test_stop_all_leaves_no_voices() {
    let dir = tempfile::tempdir().unwrap();
    let path = sample_file(dir.path(), "sample.wav", RATE, 1.0);
    let device = Arc::new(mock::Device::get("mock-stop-all"));
    let engine = engine(&device);
    let events = engine.events();

    // Some of these may still be reading when stop_all arrives.
    let handles: Vec<VoiceHandle> = (0..6).map(|_| engine.play_sample(&path)).collect();
    assert_eq!(engine.stop_all(), handles.len());
    assert_eq!(engine.live_voice_count(), 0);

    // Cancelled reads must not come back to life.
    thread::sleep(Duration::from_millis(200));
    assert_eq!(engine.live_voice_count(), 0);
    let stopped = drain(&events)
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::VoiceStopped(_)))
        .count();
    assert_eq!(stopped, handles.len());

    // Live voices, some of them finished.
    let short = sample_file(dir.path(), "short.wav", RATE, 0.05);
    for _ in 0..3 {
        engine.play_sample(&path);
        engine.play_sample(&short);
    }
    eventually(|| engine.live_voice_count() == 6, "Voices should start");
    device.advance(Duration::from_millis(100));
    eventually(
        || engine.live_voice_count() == 3,
        "Short voices should finish",
    );
    assert_eq!(engine.stop_all(), 3);
    assert_eq!(engine.live_voice_count(), 0);

    let output = device.advance(Duration::from_millis(100));
    assert_eq!(calculate_rms(&output), 0.0);
    assert_eq!(engine.stop_all(), 0);
}

#[test]
fn test_activation_failure_leaves_engine_idle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.wav");
    let device = Arc::new(mock::Device::get("mock-activation"));
    let engine = engine(&device);

    device.set_fail_activation(true);
    let result = engine.start_capture(&path);
    assert!(matches!(result, Err(EngineError::SessionConfig(_))));
    assert!(!engine.is_capturing());
    assert!(!engine.is_running());
    assert!(!path.exists());

    device.set_fail_activation(false);
    engine.start_capture(&path).unwrap();
    assert!(engine.is_capturing());
    assert!(engine.is_running());
    assert_eq!(
        engine.session_format(),
        Some(SessionFormat::new(RATE, 1, 2).unwrap())
    );
}

#[test]
fn test_start_failure_removes_capture_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.wav");
    let device = Arc::new(mock::Device::get("mock-start"));
    let engine = engine(&device);
    engine.set_input_monitoring(true);

    device.set_fail_start(true);
    let result = engine.start_capture(&path);
    assert!(matches!(result, Err(EngineError::SessionConfig(_))));
    assert!(!path.exists());
    assert!(!engine.is_capturing());
    assert!(engine.input_monitoring());

    device.set_fail_start(false);
    engine.start_capture(&path).unwrap();
    assert!(path.exists());
}

#[test]
fn test_capture_file_in_missing_directory() {
    let device = Arc::new(mock::Device::get("mock-file-create"));
    let engine = engine(&device);

    let result = engine.start_capture("/nonexistent/dir/capture.wav");
    assert!(matches!(result, Err(EngineError::FileCreate { .. })));
    assert!(!engine.is_capturing());
    assert!(!engine.is_running());
}

#[test]
fn test_missing_file_fails_playback() {
    let dir = tempfile::tempdir().unwrap();
    let device = Arc::new(mock::Device::get("mock-missing"));
    let engine = engine(&device);
    let events = engine.events();

    let handle = engine.play_sample(dir.path().join("missing.wav"));
    match events.recv_timeout(Duration::from_secs(5)).unwrap() {
        EngineEvent::PlaybackFailed { voice, path, .. } => {
            assert_eq!(voice, handle.id());
            assert_eq!(path, dir.path().join("missing.wav"));
        }
        other => panic!("Unexpected event {:?}", other),
    }
    assert!(!engine.is_voice_live(&handle));
    assert_eq!(engine.live_voice_count(), 0);
    assert!(!engine.is_running());
}

#[test]
fn test_unplayable_voice_leaves_hardware_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let path = sample_file(dir.path(), "sample.wav", RATE, 0.1);
    // A session the converter can't render into
    let format = SessionFormat {
        sample_rate: 0,
        input_channels: 1,
        output_channels: 2,
    };
    let device = Arc::new(mock::Device::get("mock-unplayable").with_format(format));
    let engine = engine(&device);
    let events = engine.events();

    let handle = engine.play_sample(&path);
    match events.recv_timeout(Duration::from_secs(5)).unwrap() {
        EngineEvent::PlaybackFailed { voice, .. } => assert_eq!(voice, handle.id()),
        other => panic!("Unexpected event {:?}", other),
    }
    assert!(device.is_active());
    assert!(!device.is_running());
    assert!(!engine.is_running());
    assert_eq!(engine.live_voice_count(), 0);
}

#[test]
fn test_voice_started_after_hardware_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = sample_file(dir.path(), "sample.wav", 22050, 0.1);
    let device = Arc::new(mock::Device::get("mock-start-voice"));
    let engine = engine(&device);
    let events = engine.events();

    device.set_fail_start(true);
    let failed = engine.play_sample(&path);
    match events.recv_timeout(Duration::from_secs(5)).unwrap() {
        EngineEvent::PlaybackFailed { voice, .. } => assert_eq!(voice, failed.id()),
        other => panic!("Unexpected event {:?}", other),
    }
    assert_eq!(engine.live_voice_count(), 0);

    device.set_fail_start(false);
    let handle = engine.play_sample(&path);
    wait_for(&events, &EngineEvent::VoiceStarted(handle.id()));
    assert!(engine.is_running());
    assert!(engine.is_voice_live(&handle));
}

#[test]
fn test_event_queue_drops_oldest() {
    let queue = EventQueue::new(2);
    let receiver = queue.receiver();
    let voices: Vec<VoiceId> = (0..3).map(|_| VoiceId::next()).collect();
    for voice in &voices {
        queue.publish(EngineEvent::VoiceFinished(*voice));
    }

    assert_eq!(
        drain(&receiver),
        vec![
            EngineEvent::VoiceFinished(voices[1]),
            EngineEvent::VoiceFinished(voices[2]),
        ]
    );
}

#[test]
fn test_unread_events_keep_the_newest() {
    let dir = tempfile::tempdir().unwrap();
    let valid = sample_file(dir.path(), "sample.wav", RATE, 0.1);
    let missing = dir.path().join("missing.wav");
    let device = Arc::new(mock::Device::get("mock-event-overflow"));
    // One reader keeps attach order the same as play order.
    let engine = AudioEngine::new(
        device.clone(),
        EngineOptions {
            read_threads: 1,
            monitor_input: false,
            ..Default::default()
        },
    )
    .unwrap();
    let events = engine.events();

    let failed: Vec<VoiceId> = (0..EVENT_QUEUE_SIZE + 10)
        .map(|_| engine.play_sample(&missing).id())
        .collect();
    let handle = engine.play_sample(&valid);
    eventually(|| engine.is_voice_live(&handle), "Last voice should start");
    assert_eq!(engine.stop_all(), 1);

    let received = drain(&events);
    assert_eq!(received.len(), EVENT_QUEUE_SIZE);
    assert_eq!(
        received[EVENT_QUEUE_SIZE - 2..],
        [
            EngineEvent::VoiceStarted(handle.id()),
            EngineEvent::VoiceStopped(handle.id()),
        ]
    );
    // 268 events were published, so the first 12 failures were dropped.
    match &received[0] {
        EngineEvent::PlaybackFailed { voice, .. } => assert_eq!(*voice, failed[12]),
        other => panic!("Unexpected event {:?}", other),
    }
}

#[test]
fn test_capture_mutes_monitoring() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.wav");
    let device = Arc::new(mock::Device::get("mock-monitoring"));
    let engine = AudioEngine::new(device.clone(), EngineOptions::default()).unwrap();
    assert!(engine.input_monitoring());

    engine.start_capture(&path).unwrap();
    assert!(!engine.input_monitoring());
    let output = device.advance(Duration::from_millis(100));
    assert_eq!(calculate_rms(&output), 0.0);

    engine.stop_capture();
    assert!(!engine.input_monitoring());
    assert!(engine.is_running());

    engine.set_input_monitoring(true);
    let output = device.advance(Duration::from_millis(100));
    assert!(calculate_rms(&output) > 0.1);
}

#[test]
fn test_playback_is_converted_to_session_format() {
    let dir = tempfile::tempdir().unwrap();
    // Mono at 22.05 kHz into a stereo 48 kHz session
    let path = sample_file(dir.path(), "low.wav", 22050, 0.5);
    let format = SessionFormat::new(48000, 1, 2).unwrap();
    let device = Arc::new(mock::Device::get("mock-convert").with_format(format));
    let engine = engine(&device);

    let handle = engine.play_sample(&path);
    eventually(|| engine.is_voice_live(&handle), "Voice should start");

    let output = device.advance(Duration::from_secs(1));
    assert_eq!(output.len(), 96000);
    let left = channel(&output, 2, 0);
    let right = channel(&output, 2, 1);
    assert_eq!(left, right);
    assert!(calculate_rms(&left[..19200]) > 0.3);
    assert_eq!(calculate_rms(&left[28800..]), 0.0);

    eventually(|| !engine.is_voice_live(&handle), "Voice should finish");
}

#[test]
fn test_drop_finalizes_capture() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.wav");
    let device = Arc::new(mock::Device::get("mock-drop"));
    let engine = engine(&device);

    engine.start_capture(&path).unwrap();
    device.advance(Duration::from_millis(250));
    drop(engine);

    assert!(!device.is_running());
    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.duration(), 11025);
}

#[test]
fn test_engine_options_from_config() {
    let audio = crate::config::Audio::new("mock");
    let options = EngineOptions::from_config(&audio).unwrap();
    assert_eq!(options, EngineOptions::default());
}
