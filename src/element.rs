//! Per-record membership node and the sidecar table that owns it.
//!
//! The original system pins a scratch pointer (`spvt`) directly on each
//! record to hold its `ScanElement`. This implementation instead keys a
//! typed table owned by the engine (the redesign note in `DESIGN.md`), so
//! the element's lifetime is explicit and cannot be aliased through the
//! record itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::record::RecordId;
use crate::scan_list::ScanList;

/// The per-record membership node.
///
/// Holds a weak-in-spirit back-pointer to the list currently holding this
/// record: `None` means detached. Created once per record and reused across
/// list moves; never reallocated for the lifetime of the record in the
/// engine.
pub struct ScanElementHandle {
    pub(crate) record: RecordId,
    pub(crate) list: Mutex<Option<Arc<ScanList>>>,
    /// Phase as of the element's last insertion, used by `ScanList::add` to
    /// find the insertion point. Not read outside a list's own lock-step
    /// insertion; a later phase change takes effect on the next `add`.
    pub(crate) phase: Mutex<i16>,
}

impl ScanElementHandle {
    fn new(record: RecordId) -> Self {
        Self {
            record,
            list: Mutex::new(None),
            phase: Mutex::new(0),
        }
    }

    /// The list this element currently belongs to, or `None` if detached.
    pub fn current_list(&self) -> Option<Arc<ScanList>> {
        self.list.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Phase recorded at the element's last insertion.
    pub fn current_phase(&self) -> i16 {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Sidecar table mapping each known record to its single `ScanElement`.
///
/// Satisfies the single-element invariant: at most one handle exists per
/// record for as long as that record is known to the engine.
pub struct ElementTable {
    elements: Mutex<HashMap<RecordId, Arc<ScanElementHandle>>>,
}

impl ElementTable {
    pub fn new() -> Self {
        Self {
            elements: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the element for `record`, creating it if this is the record's
    /// first membership anywhere.
    pub fn get_or_create(&self, record: RecordId) -> Arc<ScanElementHandle> {
        let mut elements = self.elements.lock().unwrap_or_else(|e| e.into_inner());
        elements
            .entry(record)
            .or_insert_with(|| Arc::new(ScanElementHandle::new(record)))
            .clone()
    }

    /// Fetch the element for `record` if one has ever been created.
    pub fn get(&self, record: RecordId) -> Option<Arc<ScanElementHandle>> {
        self.elements
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&record)
            .cloned()
    }
}

impl Default for ElementTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_the_same_handle_for_a_record() {
        let table = ElementTable::new();
        let a = table.get_or_create(1);
        let b = table.get_or_create(1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_records_get_distinct_handles() {
        let table = ElementTable::new();
        let a = table.get_or_create(1);
        let b = table.get_or_create(2);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn fresh_element_is_detached() {
        let table = ElementTable::new();
        let handle = table.get_or_create(1);
        assert!(handle.current_list().is_none());
    }

    #[test]
    fn get_on_unknown_record_is_none() {
        let table = ElementTable::new();
        assert!(table.get(99).is_none());
    }
}
