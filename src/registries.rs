//! The three list registries: periodic (immutable after init), event
//! (lazily populated), and I/O-event (populated as devices register
//! hardware sources).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::scan_list::{ScanList, ScanListKind};

/// Immutable-after-init sequence of periodic lists, indexed by period
/// ordinal (`0` = first configured period).
pub struct PeriodicRegistry {
    lists: Vec<Arc<ScanList>>,
}

impl PeriodicRegistry {
    /// Build one list per entry in `ticks_per_period`, ordinal-indexed.
    pub fn new(ticks_per_period: Vec<u64>) -> Self {
        let lists = ticks_per_period
            .into_iter()
            .enumerate()
            .map(|(i, ticks)| ScanList::new(ScanListKind::Periodic(i), Some(ticks)))
            .collect();
        Self { lists }
    }

    /// The list for period ordinal `i`, or `None` if out of range.
    pub fn get(&self, i: usize) -> Option<Arc<ScanList>> {
        self.lists.get(i).cloned()
    }

    /// Number of configured periodic lists.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// True if no periodic lists are configured.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// All lists in ordinal order, for boot-time worker spawning and dumps.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Arc<ScanList>)> {
        self.lists.iter().enumerate()
    }
}

/// Sparse `event_id -> ScanList` mapping, lazily allocated on first use.
///
/// Slot publication is atomic: `get_or_create` either returns an
/// already-published list or creates and publishes exactly one new list for
/// a given event id, never a torn half-initialized list.
pub struct EventRegistry {
    max_events: usize,
    slots: Mutex<HashMap<u8, Arc<ScanList>>>,
}

impl EventRegistry {
    pub fn new(max_events: u16) -> Self {
        Self {
            max_events: max_events as usize,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Size of the valid event id space, `[0, max_events)`.
    pub fn max_events(&self) -> usize {
        self.max_events
    }

    /// Fetch the list for `event_id`, creating and publishing it if this is
    /// the first reference.
    pub fn get_or_create(&self, event_id: u8) -> Arc<ScanList> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(event_id)
            .or_insert_with(|| ScanList::new(ScanListKind::Event(event_id), None))
            .clone()
    }

    /// Fetch the list for `event_id` if one has ever been created, without
    /// creating it.
    pub fn get(&self, event_id: u8) -> Option<Arc<ScanList>> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&event_id)
            .cloned()
    }

    /// All currently-allocated event lists, for `scanpel`-style dumps.
    pub fn snapshot(&self) -> Vec<(u8, Arc<ScanList>)> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, list)| (*id, list.clone()))
            .collect()
    }
}

/// Per-hardware-source array of `NumPriorities` lists, plus the global
/// per-priority chains used for `scanpiol`-style inspection.
pub struct IoEventRegistry {
    num_priorities: usize,
    sources: Mutex<HashMap<u64, Vec<Arc<ScanList>>>>,
}

impl IoEventRegistry {
    pub fn new(num_priorities: usize) -> Self {
        Self {
            num_priorities,
            sources: Mutex::new(HashMap::new()),
        }
    }

    pub fn num_priorities(&self) -> usize {
        self.num_priorities
    }

    /// Register a new hardware source, allocating one list per priority
    /// level. Re-registering the same source replaces its array.
    pub fn register(&self, source: u64) -> Vec<Arc<ScanList>> {
        let lists: Vec<Arc<ScanList>> = (0..self.num_priorities)
            .map(|priority| ScanList::new(ScanListKind::IoEvent { source, priority }, None))
            .collect();
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(source, lists.clone());
        lists
    }

    /// The full priority array for `source`, or `None` if unregistered.
    pub fn lists_for(&self, source: u64) -> Option<Vec<Arc<ScanList>>> {
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&source)
            .cloned()
    }

    /// The list for `(source, priority)`, or `None` if the source isn't
    /// registered or the priority is out of range.
    pub fn slot(&self, source: u64, priority: usize) -> Option<Arc<ScanList>> {
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&source)
            .and_then(|lists| lists.get(priority))
            .cloned()
    }

    /// All registered sources and their priority arrays, for `scanpiol`.
    pub fn snapshot(&self) -> Vec<(u64, Vec<Arc<ScanList>>)> {
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(source, lists)| (*source, lists.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_registry_indexes_by_ordinal() {
        let reg = PeriodicRegistry::new(vec![100, 1000]);
        assert_eq!(reg.len(), 2);
        assert!(reg.get(0).is_some());
        assert!(reg.get(2).is_none());
    }

    #[test]
    fn event_registry_lazily_creates_once_per_id() {
        let reg = EventRegistry::new(256);
        assert!(reg.get(7).is_none());
        let a = reg.get_or_create(7);
        let b = reg.get_or_create(7);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn io_event_registry_registers_priority_array() {
        let reg = IoEventRegistry::new(3);
        let lists = reg.register(42);
        assert_eq!(lists.len(), 3);
        assert!(reg.slot(42, 0).is_some());
        assert!(reg.slot(42, 3).is_none());
        assert!(reg.slot(99, 0).is_none());
    }
}
