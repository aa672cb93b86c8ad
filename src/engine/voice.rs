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

//! Voice bookkeeping for overlapping sample playback.
//!
//! A voice is pending from the moment it is requested until its file has been
//! decoded, then live until it runs out of samples or is stopped.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::debug;

/// Global voice ID counter. IDs are never reused.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one playback voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u64);

impl VoiceId {
    /// Issues a fresh ID.
    pub(crate) fn next() -> VoiceId {
        VoiceId(NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The ID used for this voice's source in the mixer.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for VoiceId {
    fn from(id: u64) -> Self {
        VoiceId(id)
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Returned by `play_sample` before the voice exists. Used to ask whether
/// the voice is live and to match engine events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    id: VoiceId,
}

impl VoiceHandle {
    pub(crate) fn new(id: VoiceId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }
}

/// A voice attached to the mixer.
struct Voice {
    path: PathBuf,
    start_time: Instant,
}

/// The pending and live voices. Owned by the control thread; the live IDs
/// are mirrored for queries from other threads.
pub(crate) struct VoiceSet {
    pending: HashMap<VoiceId, PathBuf>,
    live: HashMap<VoiceId, Voice>,
    mirror: Arc<RwLock<HashSet<VoiceId>>>,
}

impl VoiceSet {
    pub fn new(mirror: Arc<RwLock<HashSet<VoiceId>>>) -> Self {
        Self {
            pending: HashMap::new(),
            live: HashMap::new(),
            mirror,
        }
    }

    /// Records a voice whose file is being read.
    pub fn add_pending(&mut self, id: VoiceId, path: PathBuf) {
        self.pending.insert(id, path);
    }

    /// Takes a pending voice. Returns false if it was cancelled.
    pub fn take_pending(&mut self, id: VoiceId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Records a voice that is now attached to the mixer.
    pub fn add_live(&mut self, id: VoiceId, path: PathBuf) {
        self.live.insert(
            id,
            Voice {
                path,
                start_time: Instant::now(),
            },
        );
        self.mirror.write().insert(id);
    }

    /// Removes a live voice. Returns false if it wasn't live.
    pub fn remove_live(&mut self, id: VoiceId) -> bool {
        match self.live.remove(&id) {
            Some(voice) => {
                debug!(
                    voice = %id,
                    path = ?voice.path,
                    played_ms = voice.start_time.elapsed().as_millis(),
                    "Voice removed"
                );
                self.mirror.write().remove(&id);
                true
            }
            None => false,
        }
    }

    /// Empties both sets. Returns the live IDs and the cancelled pending IDs.
    pub fn clear(&mut self) -> (Vec<VoiceId>, Vec<VoiceId>) {
        let live: Vec<VoiceId> = self.live.drain().map(|(id, _)| id).collect();
        let pending: Vec<VoiceId> = self.pending.drain().map(|(id, _)| id).collect();
        self.mirror.write().clear();
        (live, pending)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
