//! Start/end pairing for duration events.

use std::collections::HashMap;

/// A registered start event waiting for its paired end.
#[derive(Debug, Clone)]
pub struct PendingSpan {
    pub label: String,
    pub start_ts: u64,
}

/// A start/end pair resolved into a single slice.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSpan {
    pub label: String,
    pub start_ts: u64,
    pub dur: i64,
}

/// Pairs start and end events by correlation key.
///
/// Keys embed the event kind as a prefix (e.g. `irq_handler-42@0`), so keys
/// from different kinds never collide. At most one span is pending per key;
/// opening over a live key drops the earlier span, which is never emitted.
#[derive(Debug, Default)]
pub struct DurationTracker {
    pending: HashMap<String, PendingSpan>,
    overwrites: u64,
    unmatched: u64,
}

impl DurationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the start half of a span.
    pub fn open(&mut self, key: &str, label: String, start_ts: u64) {
        let span = PendingSpan { label, start_ts };
        if let Some(old) = self.pending.insert(key.to_string(), span) {
            eprintln!(
                "Warning: missing the paired end event for {key}, dropping pending span \"{}\"",
                old.label
            );
            self.overwrites += 1;
        }
    }

    /// Pair the end half of a span.
    ///
    /// Returns `None` when no start was registered for `key`. Durations are
    /// signed so a non-monotonic timestamp shows up downstream as a negative
    /// value instead of aborting the conversion.
    pub fn close(&mut self, key: &str, end_ts: u64) -> Option<CompletedSpan> {
        match self.pending.remove(key) {
            Some(span) => Some(CompletedSpan {
                label: span.label,
                start_ts: span.start_ts,
                dur: end_ts as i64 - span.start_ts as i64,
            }),
            None => {
                eprintln!("Warning: missing the paired start event for {key}");
                self.unmatched += 1;
                None
            }
        }
    }

    pub fn overwrites(&self) -> u64 {
        self.overwrites
    }

    pub fn unmatched_closes(&self) -> u64 {
        self.unmatched
    }

    /// Spans still open at end of input. They are dropped, never emitted.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
