//! Bounded response log
//!
//! Every line that crosses the wire (in either direction) lands here, tagged
//! with a log-type mask. The web frontend polls with a cursor and a mask of
//! the bits it cares about; the cursor only advances over entries the mask
//! matched, so an entry skipped under one mask can still be fetched later
//! under another.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

/// One logged line.
#[derive(Debug, Clone, Serialize)]
pub struct PrinterResponse {
    /// Monotonic per-printer id, starting at 1.
    pub id: u32,
    /// The logged line, without terminator.
    pub message: String,
    /// OR of `logmask` bits.
    pub log_type: u8,
    /// Arrival time.
    pub timestamp: DateTime<Local>,
}

impl PrinterResponse {
    /// Wall-clock time as `HH:MM:SS`, the format the frontend renders.
    pub fn time_string(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

struct LogInner {
    entries: VecDeque<Arc<PrinterResponse>>,
    next_id: u32,
}

/// Bounded ring of tagged responses with monotonically increasing ids.
pub struct ResponseLog {
    inner: Mutex<LogInner>,
    capacity: usize,
}

impl ResponseLog {
    /// Create a log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                entries: VecDeque::new(),
                next_id: 0,
            }),
            capacity,
        }
    }

    /// Append an entry, dropping the oldest when full.
    pub fn push(&self, message: impl Into<String>, log_type: u8) {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let response = Arc::new(PrinterResponse {
            id: inner.next_id,
            message: message.into(),
            log_type,
            timestamp: Local::now(),
        });
        inner.entries.push_back(response);
        if inner.entries.len() > self.capacity {
            inner.entries.pop_front();
        }
    }

    /// All entries with `id > cursor` whose log type intersects `mask`,
    /// plus the cursor to poll with next time.
    ///
    /// The returned cursor is the highest *matched* id, or `cursor`
    /// unchanged when nothing matched.
    pub fn since(&self, cursor: u32, mask: u8) -> (Vec<Arc<PrinterResponse>>, u32) {
        let inner = self.inner.lock();
        let mut new_cursor = cursor;
        let mut matched = Vec::new();
        for entry in &inner.entries {
            if entry.id > cursor && entry.log_type & mask != 0 {
                new_cursor = entry.id;
                matched.push(Arc::clone(entry));
            }
        }
        (matched, new_cursor)
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True when nothing has been logged yet (or everything aged out).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id of the most recently pushed entry.
    pub fn last_id(&self) -> u32 {
        self.inner.lock().next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printhost_core::logmask;

    #[test]
    fn ids_are_monotonic_from_one() {
        let log = ResponseLog::new(10);
        log.push("a", logmask::INFO);
        log.push("b", logmask::INFO);
        let (entries, cursor) = log.since(0, logmask::ALL);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, 1);
        assert_eq!(entries[1].id, 2);
        assert_eq!(cursor, 2);
    }

    #[test]
    fn overflow_drops_oldest_but_keeps_ids() {
        let log = ResponseLog::new(3);
        for i in 0..5 {
            log.push(format!("line {i}"), logmask::INFO);
        }
        assert_eq!(log.len(), 3);
        let (entries, cursor) = log.since(0, logmask::ALL);
        assert_eq!(entries[0].id, 3);
        assert_eq!(cursor, 5);
    }

    #[test]
    fn mask_filters_entries() {
        let log = ResponseLog::new(10);
        log.push("sent", logmask::SENT);
        log.push("ok", logmask::ACK);
        log.push("oops", logmask::ERROR);
        let (entries, cursor) = log.since(0, logmask::ERROR);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "oops");
        assert_eq!(cursor, 3);
    }

    #[test]
    fn cursor_does_not_advance_past_unmatched_entries() {
        let log = ResponseLog::new(10);
        log.push("sent", logmask::SENT); // id 1
        log.push("info", logmask::INFO); // id 2
        let (entries, cursor) = log.since(0, logmask::SENT);
        assert_eq!(entries.len(), 1);
        // id 2 did not match; a later poll with another mask must still
        // be able to fetch it.
        assert_eq!(cursor, 1);
        let (entries, cursor) = log.since(cursor, logmask::INFO);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, 2);
        assert_eq!(cursor, 2);
    }

    #[test]
    fn since_with_no_matches_returns_cursor_unchanged() {
        let log = ResponseLog::new(10);
        log.push("info", logmask::INFO);
        let (entries, cursor) = log.since(7, logmask::ALL);
        assert!(entries.is_empty());
        assert_eq!(cursor, 7);
    }
}
