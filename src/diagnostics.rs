//! Host-wide diagnostics ring buffer.
//!
//! Loader rejections, executor faults, and plugin `ctx.log` calls all land
//! here as structured entries. The buffer is fixed-capacity: old entries are
//! evicted, ids keep increasing, and reads come back in chronological order.
//! Everything is also mirrored to `tracing` for whoever is subscribed.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub(crate) const DIAGNOSTICS_CAPACITY: usize = 1000;

/// A single diagnostics entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub id: u64,
    pub timestamp_ms: i64,
    pub level: String,
    /// Which component produced the entry: a plugin id, "loader", "executor".
    pub source: String,
    pub message: String,
}

struct Ring {
    entries: VecDeque<DiagnosticEntry>,
    capacity: usize,
    next_id: u64,
}

/// Fixed-capacity, thread-safe diagnostics store.
pub struct Diagnostics {
    ring: Mutex<Ring>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::with_capacity(DIAGNOSTICS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity.min(64)),
                capacity,
                next_id: 1,
            }),
        }
    }

    pub fn warn(&self, source: &str, message: &str) -> u64 {
        tracing::warn!(source, "{message}");
        self.push("warn", source, message)
    }

    pub fn error(&self, source: &str, message: &str) -> u64 {
        tracing::error!(source, "{message}");
        self.push("error", source, message)
    }

    fn push(&self, level: &str, source: &str, message: &str) -> u64 {
        let mut ring = self.ring.lock();
        let id = ring.next_id;
        ring.next_id += 1;

        let entry = DiagnosticEntry {
            id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            level: level.to_string(),
            source: source.to_string(),
            message: message.to_string(),
        };

        if ring.entries.len() == ring.capacity {
            ring.entries.pop_front();
        }
        ring.entries.push_back(entry);
        id
    }

    /// Entries in chronological order (oldest first), up to `limit`.
    /// A `limit` of 0 returns everything currently stored.
    pub fn recent(&self, limit: usize) -> Vec<DiagnosticEntry> {
        let ring = self.ring.lock();
        let count = ring.entries.len();
        let effective = if limit == 0 { count } else { limit.min(count) };
        ring.entries
            .iter()
            .skip(count - effective)
            .cloned()
            .collect()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
