//! Record interface shim: the scanning core's only contract with the
//! surrounding record database.
//!
//! The core never reaches into a record's internals. It reads a handful of
//! fields through the [`Record`] trait and calls `lock`/`process`/`unlock`
//! around evaluation. Everything else (storage, field types, user code) is
//! out of scope and lives with the embedder.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Opaque key identifying a record to the scanning core.
///
/// The original system pins a scratch pointer directly on the record; this
/// implementation instead keys a sidecar table owned by the engine (see
/// [`crate::element::ElementTable`]), so `RecordId` only needs to be a small
/// `Copy` value with no lifetime tied to the record itself.
pub type RecordId = u64;

/// Per-record choice of when the record is scanned.
///
/// Wire-stable encoding (see [`ScanPolicy::from_code`] / [`ScanPolicy::to_code`]):
/// `0 = Passive`, `1 = Event`, `2 = IoEvent`, `3..N+2 = Periodic(code - 3)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanPolicy {
    /// Never scanned by this engine; some other mechanism drives processing.
    Passive,
    /// Scanned when a matching software event is posted.
    Event,
    /// Scanned when a hardware I/O source requests it.
    IoEvent,
    /// Scanned on a fixed period, indexed into the periodic registry.
    Periodic(usize),
}

impl ScanPolicy {
    /// Decode a wire-stable scan value.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ScanPolicy::Passive),
            1 => Some(ScanPolicy::Event),
            2 => Some(ScanPolicy::IoEvent),
            n if n >= 3 => Some(ScanPolicy::Periodic((n - 3) as usize)),
            _ => None,
        }
    }

    /// Encode back to the wire-stable representation.
    pub fn to_code(self) -> i32 {
        match self {
            ScanPolicy::Passive => 0,
            ScanPolicy::Event => 1,
            ScanPolicy::IoEvent => 2,
            ScanPolicy::Periodic(i) => 3 + i as i32,
        }
    }
}

impl fmt::Display for ScanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanPolicy::Passive => write!(f, "Passive"),
            ScanPolicy::Event => write!(f, "Event"),
            ScanPolicy::IoEvent => write!(f, "IoEvent"),
            ScanPolicy::Periodic(i) => write!(f, "Periodic({i})"),
        }
    }
}

/// Command passed to [`Record::io_info`], mirroring the original
/// `get_ioint_info(cmd, record)` device-support capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCmd {
    /// The record is joining the I/O-event scanner.
    Add,
    /// The record is leaving the I/O-event scanner.
    Remove,
}

/// Result of querying a record's device support for I/O-event routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoInfo {
    /// The device has no priority-indexed array to offer; the legacy I/O
    /// routing path would have handled this in the original system. This
    /// implementation has no legacy path (see `membership`) and simply
    /// drops the record with a log.
    Legacy,
    /// A hardware source identified by `source` accepted the record.
    Source { source: u64 },
}

/// Everything the scanning core needs from a record.
///
/// Implementations own storage, field types, and processing logic; the core
/// only ever calls through this trait.
pub trait Record: Send + Sync {
    /// Stable identity used to key the element table.
    fn id(&self) -> RecordId;

    /// Current scan policy.
    fn scan(&self) -> ScanPolicy;

    /// Event identifier, meaningful only when `scan() == ScanPolicy::Event`.
    /// The valid space is `[0, 256)`, matching the engine's wire-stable
    /// event id width (see `DESIGN.md`), so a byte covers every legal value.
    fn event_id(&self) -> u8;

    /// Callback priority, meaningful only when `scan() == ScanPolicy::IoEvent`.
    fn priority(&self) -> usize;

    /// Secondary ordering key within a single list; lower values visit first.
    fn phase(&self) -> i16;

    /// Acquire the record's own lock. Distinct records may process
    /// concurrently; the same record never processes concurrently with
    /// itself.
    fn lock(&self);

    /// Release the record's own lock.
    fn unlock(&self);

    /// Evaluate the record. May call back into `scan_add`/`scan_delete` on
    /// any record, including itself, from inside this call.
    fn process(&self);

    /// Query device support for I/O-event routing. Returns `None` for
    /// records with no device support at all (treated as an error by the
    /// membership manager, see `membership::scan_add`).
    fn io_info(&self, _cmd: IoCmd) -> Option<IoInfo> {
        None
    }
}

/// The record database stand-in: out of scope per the engine's own
/// boundary, but the engine needs *some* way to turn a `RecordId` visited
/// during traversal back into the trait object it calls `lock`/`process`/
/// `unlock` on. Embedders are free to replace this with their own lookup
/// (anything implementing the same get/insert contract).
#[derive(Default)]
pub struct RecordRegistry {
    records: Mutex<HashMap<RecordId, Arc<dyn Record>>>,
}

impl RecordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a record.
    pub fn insert(&self, record: Arc<dyn Record>) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.id(), record);
    }

    /// Remove a record from the database.
    pub fn remove(&self, id: RecordId) -> Option<Arc<dyn Record>> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }

    /// Look up a record by id.
    pub fn get(&self, id: RecordId) -> Option<Arc<dyn Record>> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    /// All currently-known records, for boot-time `scan_add` enumeration.
    pub fn all(&self) -> Vec<Arc<dyn Record>> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

/// `lock(record); process(record); unlock(record)`, the scanning core's
/// only way of invoking record evaluation.
pub fn process_record(registry: &RecordRegistry, id: RecordId) {
    let Some(record) = registry.get(id) else {
        return;
    };
    record.lock();
    record.process();
    record.unlock();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_policy_round_trips_through_wire_codes() {
        for (code, policy) in [
            (0, ScanPolicy::Passive),
            (1, ScanPolicy::Event),
            (2, ScanPolicy::IoEvent),
            (3, ScanPolicy::Periodic(0)),
            (5, ScanPolicy::Periodic(2)),
        ] {
            assert_eq!(ScanPolicy::from_code(code), Some(policy));
            assert_eq!(policy.to_code(), code);
        }
    }

    #[test]
    fn negative_scan_code_is_rejected() {
        assert_eq!(ScanPolicy::from_code(-1), None);
    }

    struct NoopRecord(RecordId);
    impl Record for NoopRecord {
        fn id(&self) -> RecordId {
            self.0
        }
        fn scan(&self) -> ScanPolicy {
            ScanPolicy::Passive
        }
        fn event_id(&self) -> u8 {
            0
        }
        fn priority(&self) -> usize {
            0
        }
        fn phase(&self) -> i16 {
            0
        }
        fn lock(&self) {}
        fn unlock(&self) {}
        fn process(&self) {}
    }

    #[test]
    fn registry_round_trips_a_record() {
        let registry = RecordRegistry::new();
        registry.insert(Arc::new(NoopRecord(1)));
        assert!(registry.get(1).is_some());
        assert!(registry.remove(1).is_some());
        assert!(registry.get(1).is_none());
    }

    #[test]
    fn process_record_on_unknown_id_is_a_no_op() {
        let registry = RecordRegistry::new();
        process_record(&registry, 42);
    }
}
