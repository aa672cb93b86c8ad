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
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Scheduling wanted for the thread that mixes output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioThreadPriority {
    /// Crossplatform priority, 0-99.
    pub priority: u8,
    /// Whether to attempt SCHED_FIFO on unix.
    pub realtime: bool,
}

impl Default for AudioThreadPriority {
    fn default() -> Self {
        Self {
            priority: 70,
            realtime: true,
        }
    }
}

impl From<&crate::config::Audio> for AudioThreadPriority {
    fn from(config: &crate::config::Audio) -> Self {
        Self {
            priority: config.thread_priority(),
            realtime: config.realtime(),
        }
    }
}

/// Applies the priority to the calling thread. Failures are only logged.
pub fn configure_audio_thread_priority(settings: AudioThreadPriority) {
    let value = match ThreadPriorityValue::try_from(settings.priority.min(99)) {
        Ok(value) => value,
        Err(e) => {
            warn!(priority = settings.priority, err = ?e, "Invalid audio thread priority");
            return;
        }
    };
    let tp = ThreadPriority::Crossplatform(value);
    if let Err(e) = set_current_thread_priority(tp) {
        warn!(err = ?e, "Failed to raise audio thread priority");
    }

    #[cfg(unix)]
    if settings.realtime {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for audio thread");
            }
            Err(e) => {
                warn!(err = ?e, "Failed to set RT SCHED_FIFO for audio thread");
            }
        }
    }
}
