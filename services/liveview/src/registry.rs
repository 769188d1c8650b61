use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Identity of one accepted frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameRecord {
    /// Stored blob filename
    pub filename: String,
    /// Ingestion time in Unix epoch milliseconds
    pub timestamp: i64,
    /// Payload size
    pub byte_length: u64,
}

impl FrameRecord {
    /// Ingestion time as a UTC datetime
    pub fn ingested_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }

    /// Retrieval path for this frame's bytes
    pub fn url(&self) -> String {
        format!("/images/{}", self.filename)
    }
}

/// Single-slot holder of the most recently accepted frame.
///
/// Starts empty and only ever moves to (or stays) populated. Callers must
/// finish writing the blob before calling [`update`](Self::update); the lock
/// is held only for the pointer swap itself.
#[derive(Debug, Default)]
pub struct LatestFrameRegistry {
    slot: RwLock<Option<FrameRecord>>,
}

impl LatestFrameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame.
    pub fn update(&self, record: FrameRecord) {
        *self.slot.write() = Some(record);
    }

    /// Snapshot of the current frame, `None` before the first upload.
    pub fn read(&self) -> Option<FrameRecord> {
        self.slot.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.read().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(timestamp: i64) -> FrameRecord {
        FrameRecord {
            filename: format!("{}.jpg", timestamp),
            timestamp,
            byte_length: 10,
        }
    }

    #[test]
    fn test_starts_empty() {
        let registry = LatestFrameRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.read(), None);
    }

    #[test]
    fn test_last_update_wins() {
        let registry = LatestFrameRegistry::new();
        registry.update(record(2000));
        registry.update(record(1000));

        // Completion order decides, not the timestamp
        assert_eq!(registry.read(), Some(record(1000)));
    }

    #[test]
    fn test_record_url_and_time() {
        let r = record(1000);
        assert_eq!(r.url(), "/images/1000.jpg");
        assert_eq!(r.ingested_at().unwrap().timestamp_millis(), 1000);
    }

    #[test]
    fn test_concurrent_readers_see_whole_records() {
        let registry = Arc::new(LatestFrameRegistry::new());

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        registry.update(record(w * 10_000 + i));
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if let Some(r) = registry.read() {
                            assert_eq!(r.filename, format!("{}.jpg", r.timestamp));
                        }
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }

        assert!(!registry.is_empty());
    }
}
