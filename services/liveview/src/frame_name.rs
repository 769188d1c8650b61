//! Unique, sortable frame filenames.
//!
//! Every accepted upload gets an id equal to its ingestion time in epoch
//! milliseconds, bumped past the previously issued id when two uploads land
//! in the same millisecond or the wall clock steps backwards.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Identifier of one ingested frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(i64);

impl FrameId {
    /// Epoch milliseconds this id stands for
    pub fn millis(self) -> i64 {
        self.0
    }
}

/// Issues strictly increasing frame ids and the filenames built from them.
pub struct FrameNamer {
    clock: Box<dyn Clock>,
    extension: String,
    last: AtomicI64,
}

impl FrameNamer {
    pub fn new(clock: Box<dyn Clock>, extension: impl Into<String>) -> Self {
        Self {
            clock,
            extension: extension.into(),
            last: AtomicI64::new(i64::MIN),
        }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> FrameId {
        let now = self.clock.now_millis();
        let mut prev = self.last.load(Ordering::Acquire);

        loop {
            let candidate = now.max(prev.saturating_add(1));
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return FrameId(candidate),
                Err(actual) => prev = actual,
            }
        }
    }

    /// Make sure future ids sort after `id`.
    pub fn observe(&self, id: FrameId) {
        self.last.fetch_max(id.0, Ordering::AcqRel);
    }

    /// Filename for a frame id
    pub fn filename(&self, id: FrameId) -> String {
        format!("{}.{}", id.0, self.extension)
    }

    /// Recover the id from a filename this namer would produce.
    pub fn parse(&self, filename: &str) -> Option<FrameId> {
        let (stem, extension) = filename.rsplit_once('.')?;
        if extension != self.extension
            || stem.is_empty()
            || !stem.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        stem.parse().ok().map(FrameId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn test_uses_clock_time() {
        let namer = FrameNamer::new(Box::new(FixedClock(1000)), "jpg");
        let id = namer.next_id();
        assert_eq!(id.millis(), 1000);
        assert_eq!(namer.filename(id), "1000.jpg");
    }

    #[test]
    fn test_same_millisecond_gets_distinct_ids() {
        let namer = FrameNamer::new(Box::new(FixedClock(1000)), "jpg");
        let first = namer.next_id();
        let second = namer.next_id();

        assert_eq!(first.millis(), 1000);
        assert_eq!(second.millis(), 1001);
    }

    #[test]
    fn test_observe_moves_past_restored_id() {
        let namer = FrameNamer::new(Box::new(FixedClock(1000)), "jpg");
        namer.observe(FrameId(5000));
        assert_eq!(namer.next_id().millis(), 5001);
    }

    #[test]
    fn test_parse_round_trip() {
        let namer = FrameNamer::new(Box::new(SystemClock), "jpg");
        let id = namer.next_id();
        assert_eq!(namer.parse(&namer.filename(id)), Some(id));

        assert_eq!(namer.parse("1000.png"), None);
        assert_eq!(namer.parse("image_20240115.jpg"), None);
        assert_eq!(namer.parse(".jpg"), None);
        assert_eq!(namer.parse("-5.jpg"), None);
    }

    #[test]
    fn test_concurrent_ids_unique() {
        let namer = Arc::new(FrameNamer::new(Box::new(FixedClock(1000)), "jpg"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let namer = namer.clone();
                std::thread::spawn(move || (0..250).map(|_| namer.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 2000);
    }
}
