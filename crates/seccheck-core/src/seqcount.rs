//! Sequence counter for store-free reads of rarely written data.
//!
//! Writers bump the counter to an odd value before mutating and back to an
//! even value afterwards. Readers record an even value, read, and retry if
//! the counter moved in between. Writers must be serialized externally.

use std::hint;
use std::sync::atomic::{AtomicU64, Ordering, fence};

#[derive(Debug, Default)]
pub(crate) struct SeqCount {
    epoch: AtomicU64,
}

/// Counter value observed at the start of a read.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Epoch(u64);

impl SeqCount {
    pub(crate) const fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
        }
    }

    /// Waits out any in-progress write and returns the current epoch.
    pub(crate) fn begin_read(&self) -> Epoch {
        loop {
            let epoch = self.epoch.load(Ordering::Acquire);
            if epoch & 1 == 0 {
                return Epoch(epoch);
            }
            hint::spin_loop();
        }
    }

    /// Whether no write happened since `epoch` was taken.
    pub(crate) fn read_ok(&self, epoch: Epoch) -> bool {
        fence(Ordering::Acquire);
        self.epoch.load(Ordering::Relaxed) == epoch.0
    }

    pub(crate) fn begin_write(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        debug_assert!(epoch & 1 == 0, "nested seqcount write");
        fence(Ordering::Release);
    }

    pub(crate) fn end_write(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::Release);
        debug_assert!(epoch & 1 == 1, "seqcount write was not started");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_fails_across_a_write() {
        let seq = SeqCount::new();
        let epoch = seq.begin_read();
        seq.begin_write();
        seq.end_write();
        assert!(!seq.read_ok(epoch));
        assert!(seq.read_ok(seq.begin_read()));
    }

    #[test]
    fn read_fails_during_a_write() {
        let seq = SeqCount::new();
        let epoch = seq.begin_read();
        seq.begin_write();
        assert!(!seq.read_ok(epoch));
        seq.end_write();
    }
}
