//! Consumer counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters, updated by the accept and poll threads.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    pub(crate) connections_accepted: AtomicU64,
    pub(crate) connections_closed: AtomicU64,
    pub(crate) frames_handled: AtomicU64,
    pub(crate) frames_unhandled: AtomicU64,
    pub(crate) frames_malformed: AtomicU64,
    pub(crate) sender_dropped: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Connections accepted.
    pub connections_accepted: u64,
    /// Connections closed after hang-up or error.
    pub connections_closed: u64,
    /// Frames consumed by a handler.
    pub frames_handled: u64,
    /// Well-formed frames of a type with no handler.
    pub frames_unhandled: u64,
    /// Frames dropped as oversized, truncated, or undecodable.
    pub frames_malformed: u64,
    /// Events senders reported as lost before reaching the socket.
    pub sender_dropped: u64,
}

impl StatsSnapshot {
    /// Renders the snapshot as one JSON object, for log lines.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}

impl ConsumerStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        let _ = counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            frames_handled: self.frames_handled.load(Ordering::Relaxed),
            frames_unhandled: self.frames_unhandled.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            sender_dropped: self.sender_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_copies_the_counters() {
        let stats = ConsumerStats::default();
        ConsumerStats::bump(&stats.connections_accepted);
        ConsumerStats::bump(&stats.frames_handled);
        ConsumerStats::bump(&stats.frames_handled);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_accepted, 1);
        assert_eq!(snapshot.frames_handled, 2);
        assert_eq!(snapshot.frames_malformed, 0);
    }

    #[test]
    fn json_line_round_trips() {
        let snapshot = StatsSnapshot {
            frames_unhandled: 3,
            sender_dropped: 7,
            ..StatsSnapshot::default()
        };
        let line = snapshot.to_json();
        assert!(line.contains("\"sender_dropped\":7"), "{line}");
        let parsed: StatsSnapshot = serde_json::from_str(&line).expect("parse");
        assert_eq!(parsed, snapshot);
    }
}
