//! Bounded, deduplicating record store
//!
//! The tailer is the only writer. Readers never take a lock: after every
//! insert (and its eviction, if any) the writer publishes a new immutable
//! [`Snapshot`] through `ArcSwap`, and `snapshot()` is a single atomic load.
//!
//! To keep publishing cheap with a large capacity, records are kept in
//! fixed-size sealed segments plus one open segment. A published view
//! shares the sealed segments with the writer and only copies the open one.

use arc_swap::ArcSwap;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use crate::record::RequestRecord;

/// Default number of records retained
pub const DEFAULT_CAPACITY: usize = 1_000_000;

const SEGMENT_LEN: usize = 512;

type Segment = Arc<[Arc<RequestRecord>]>;

/// Point-in-time, oldest-first view of the store
#[derive(Debug, Default)]
pub struct Snapshot {
    sealed: Vec<Segment>,
    /// Records of `sealed[0]` that were already evicted
    skip: usize,
    open: Vec<Arc<RequestRecord>>,
    len: usize,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &RequestRecord> + '_ {
        self.sealed
            .iter()
            .enumerate()
            .flat_map(move |(i, segment)| {
                let start = if i == 0 { self.skip } else { 0 };
                segment[start..].iter()
            })
            .chain(self.open.iter())
            .map(|record| record.as_ref())
    }
}

/// Writer-side state, guarded by a mutex that only the tailer contends on
#[derive(Default)]
struct Segments {
    sealed: VecDeque<Segment>,
    skip: usize,
    open: Vec<Arc<RequestRecord>>,
    len: usize,
    index: HashSet<String>,
}

impl Segments {
    fn push(&mut self, record: Arc<RequestRecord>) {
        self.index.insert(record.request_id.clone());
        self.open.push(record);
        self.len += 1;

        if self.open.len() == SEGMENT_LEN {
            let full = std::mem::replace(&mut self.open, Vec::with_capacity(SEGMENT_LEN));
            self.sealed.push_back(Arc::from(full));
        }
    }

    fn evict_oldest(&mut self) -> Option<Arc<RequestRecord>> {
        let evicted = match self.sealed.front() {
            Some(segment) => {
                let record = segment[self.skip].clone();
                self.skip += 1;
                if self.skip == segment.len() {
                    self.sealed.pop_front();
                    self.skip = 0;
                }
                record
            }
            None if !self.open.is_empty() => self.open.remove(0),
            None => return None,
        };

        self.index.remove(&evicted.request_id);
        self.len -= 1;
        Some(evicted)
    }

    fn view(&self) -> Snapshot {
        Snapshot {
            sealed: self.sealed.iter().cloned().collect(),
            skip: self.skip,
            open: self.open.clone(),
            len: self.len,
        }
    }
}

/// In-memory window of the most recent requests
pub struct RecordStore {
    capacity: usize,
    writer: Mutex<Segments>,
    published: ArcSwap<Snapshot>,
}

impl RecordStore {
    /// Create an empty store. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            writer: Mutex::new(Segments::default()),
            published: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    /// Append a record unless its request id is already live.
    ///
    /// Returns `false` for a duplicate, which leaves the store untouched.
    /// When the append pushes the store over capacity the single oldest
    /// record is evicted and its id forgotten, so a later redelivery of
    /// that id is admitted again.
    pub fn try_insert(&self, record: RequestRecord) -> bool {
        let mut segments = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        if segments.index.contains(&record.request_id) {
            crate::metrics::record_line("duplicate");
            return false;
        }

        segments.push(Arc::new(record));
        if segments.len > self.capacity {
            if let Some(evicted) = segments.evict_oldest() {
                tracing::trace!(request_id = %evicted.request_id, "Evicted oldest record");
                crate::metrics::record_eviction();
            }
        }

        self.published.store(Arc::new(segments.view()));
        crate::metrics::set_store_size(segments.len);
        true
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.published.load_full()
    }

    pub fn len(&self) -> usize {
        self.published.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::DateTime;

    pub(crate) fn record(id: &str, service: &str, status: u16, request_time: f64) -> RequestRecord {
        RequestRecord {
            request_id: id.to_string(),
            timestamp: DateTime::parse_from_rfc3339("2026-10-19T10:15:32+00:00").unwrap(),
            service_name: service.to_string(),
            remote_addr: "192.168.1.10".to_string(),
            http_verb: "GET".to_string(),
            url: "/".to_string(),
            http_referer: "-".to_string(),
            user_agent: "curl/8.5.0".to_string(),
            status_code: status,
            body_bytes_sent: 0,
            request_length: 80,
            request_time,
            alternate_upstream: String::new(),
            upstream_addr: "10.1.2.3:8080".to_string(),
            upstream_response_length: 0,
            upstream_response_time: request_time,
            upstream_status: status.to_string(),
        }
    }

    fn ids(snapshot: &Snapshot) -> Vec<String> {
        snapshot.iter().map(|r| r.request_id.clone()).collect()
    }

    #[test]
    fn test_insert_and_snapshot_order() {
        let store = RecordStore::new(10);
        assert!(store.try_insert(record("a", "api", 200, 0.1)));
        assert!(store.try_insert(record("b", "api", 503, 0.1)));

        assert_eq!(store.len(), 2);
        assert_eq!(ids(&store.snapshot()), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let store = RecordStore::new(10);
        assert!(store.try_insert(record("a", "api", 200, 0.1)));
        assert!(store.try_insert(record("b", "api", 200, 0.1)));
        assert!(!store.try_insert(record("a", "other", 500, 9.0)));

        let snapshot = store.snapshot();
        assert_eq!(ids(&snapshot), vec!["a", "b"]);
        let first = snapshot.iter().next().unwrap();
        assert_eq!(first.service_name, "api");
        assert_eq!(first.status_code, 200);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = RecordStore::new(2);
        store.try_insert(record("a", "api", 200, 0.1));
        store.try_insert(record("b", "api", 200, 0.1));
        store.try_insert(record("c", "api", 200, 0.1));

        assert_eq!(store.len(), 2);
        assert_eq!(ids(&store.snapshot()), vec!["b", "c"]);
    }

    #[test]
    fn test_evicted_id_is_readmitted() {
        let store = RecordStore::new(2);
        store.try_insert(record("a", "api", 200, 0.1));
        store.try_insert(record("b", "api", 200, 0.1));
        store.try_insert(record("c", "api", 200, 0.1));

        assert!(store.try_insert(record("a", "api", 200, 0.1)));
        assert_eq!(ids(&store.snapshot()), vec!["c", "a"]);
        // "b" was evicted by the re-admission; "c" is still live
        assert!(!store.try_insert(record("c", "api", 200, 0.1)));
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let store = RecordStore::new(10);
        store.try_insert(record("a", "api", 200, 0.1));
        let before = store.snapshot();
        store.try_insert(record("b", "api", 200, 0.1));

        assert_eq!(ids(&before), vec!["a"]);
        assert_eq!(ids(&store.snapshot()), vec!["a", "b"]);
    }

    #[test]
    fn test_eviction_across_segments() {
        let capacity = SEGMENT_LEN + 7;
        let store = RecordStore::new(capacity);
        let total = SEGMENT_LEN * 3 + 11;

        for i in 0..total {
            store.try_insert(record(&format!("{:x}", i), "api", 200, 0.1));
            assert!(store.len() <= capacity);
        }

        let snapshot = store.snapshot();
        let expected: Vec<String> = (total - capacity..total).map(|i| format!("{:x}", i)).collect();
        assert_eq!(snapshot.len(), capacity);
        assert_eq!(ids(&snapshot), expected);

        // The oldest surviving id is still indexed, the one before it is not
        let oldest = format!("{:x}", total - capacity);
        let gone = format!("{:x}", total - capacity - 1);
        assert!(!store.try_insert(record(&oldest, "api", 200, 0.1)));
        assert!(store.try_insert(record(&gone, "api", 200, 0.1)));
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let store = RecordStore::new(0);
        assert_eq!(store.capacity(), 1);
        store.try_insert(record("a", "api", 200, 0.1));
        store.try_insert(record("b", "api", 200, 0.1));
        assert_eq!(ids(&store.snapshot()), vec!["b"]);
    }

    #[test]
    fn test_concurrent_readers_see_consistent_views() {
        let store = Arc::new(RecordStore::new(64));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = store.snapshot();
                        let seen: Vec<_> = snapshot.iter().collect();
                        assert_eq!(seen.len(), snapshot.len());
                        assert!(seen.len() <= 64);
                        let unique: HashSet<_> = seen.iter().map(|r| &r.request_id).collect();
                        assert_eq!(unique.len(), seen.len());
                    }
                })
            })
            .collect();

        for i in 0..2_000 {
            store.try_insert(record(&format!("{:x}", i), "api", 200, 0.1));
        }

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.len(), 64);
    }
}
