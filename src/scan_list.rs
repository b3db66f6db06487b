//! Phase-ordered, mutation-safe scan lists.
//!
//! A `ScanList` is an ordered container of scan elements guarded by a
//! single mutex, with a `modified` flag that lets a traversing worker detect
//! concurrent mutation and resynchronize instead of invalidating its
//! iterator. This is the central data structure of the engine: see
//! [`ScanList::traverse`] for the mutation-safe iteration protocol.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::element::ScanElementHandle;
use crate::record::RecordId;

fn lock_ok<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// What a list is for, kept only for logging and the debug dumps
/// (`scanppl`/`scanpel`/`scanpiol`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanListKind {
    /// One of the engine's configured periodic lists.
    Periodic(usize),
    /// A lazily-created event list for a given event id.
    Event(u8),
    /// One priority slot of an I/O-event source's list array.
    IoEvent { source: u64, priority: usize },
}

impl fmt::Display for ScanListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanListKind::Periodic(i) => write!(f, "periodic[{i}]"),
            ScanListKind::Event(e) => write!(f, "event[{e}]"),
            ScanListKind::IoEvent { source, priority } => {
                write!(f, "ioevent[source={source}, priority={priority}]")
            }
        }
    }
}

struct ScanListInner {
    order: Vec<Arc<ScanElementHandle>>,
    modified: bool,
}

/// An ordered, lockable container of scan elements.
///
/// Insertion order within the list is non-decreasing `phase`, ties broken
/// by insertion order. See [`ScanList::traverse`] for the protocol that
/// makes iteration safe across arbitrary concurrent membership changes.
pub struct ScanList {
    pub kind: ScanListKind,
    /// Tick count between passes, meaningful only for periodic lists.
    pub ticks_per_period: Option<u64>,
    inner: Mutex<ScanListInner>,
}

impl ScanList {
    pub fn new(kind: ScanListKind, ticks_per_period: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            ticks_per_period,
            inner: Mutex::new(ScanListInner {
                order: Vec::new(),
                modified: false,
            }),
        })
    }

    /// Insert `element` in phase order. If already present (on this list or
    /// any other), it is removed first so a changed phase is honored.
    pub fn add(self: &Arc<Self>, element: Arc<ScanElementHandle>, phase: i16) {
        if let Some(existing) = element.current_list() {
            existing.remove(&element);
        }

        *lock_ok(&element.phase) = phase;

        let mut inner = lock_ok(&self.inner);
        let pos = inner
            .order
            .iter()
            .position(|e| e.current_phase() > phase)
            .unwrap_or(inner.order.len());
        inner.order.insert(pos, element.clone());
        inner.modified = true;
        drop(inner);

        *lock_ok(&element.list) = Some(self.clone());
    }

    /// Remove `element` from this list. A no-op if the element isn't
    /// attached to anything. Logs and leaves state unchanged if the
    /// element's back-pointer names a different list (`ListMismatch`).
    pub fn remove(self: &Arc<Self>, element: &Arc<ScanElementHandle>) {
        match element.current_list() {
            None => return,
            Some(current) if !Arc::ptr_eq(&current, self) => {
                debug!(
                    record = element.record,
                    list = %self.kind,
                    "list mismatch on remove, leaving state unchanged"
                );
                return;
            }
            Some(_) => {}
        }

        let mut inner = lock_ok(&self.inner);
        if let Some(idx) = inner.order.iter().position(|e| Arc::ptr_eq(e, element)) {
            inner.order.remove(idx);
            inner.modified = true;
        }
        drop(inner);

        *lock_ok(&element.list) = None;
    }

    /// True if `element` is currently on this list, per its own back-pointer.
    fn element_on_this(self: &Arc<Self>, element: &Arc<ScanElementHandle>) -> bool {
        element
            .current_list()
            .map(|l| Arc::ptr_eq(&l, self))
            .unwrap_or(false)
    }

    fn successor_locked(
        inner: &ScanListInner,
        element: &Arc<ScanElementHandle>,
    ) -> Option<Arc<ScanElementHandle>> {
        inner
            .order
            .iter()
            .position(|e| Arc::ptr_eq(e, element))
            .and_then(|idx| inner.order.get(idx + 1).cloned())
    }

    fn predecessor_locked(
        inner: &ScanListInner,
        element: &Arc<ScanElementHandle>,
    ) -> Option<Arc<ScanElementHandle>> {
        inner
            .order
            .iter()
            .position(|e| Arc::ptr_eq(e, element))
            .and_then(|idx| idx.checked_sub(1))
            .and_then(|idx| inner.order.get(idx).cloned())
    }

    /// Mutation-safe traversal. `visit` is invoked once per element with
    /// zero list locks held, so it is free to call `scan_add`/`scan_delete`
    /// on any record, including the one currently visited.
    ///
    /// See the module-level documentation and `DESIGN.md` for the anchor
    /// ladder this implements: on observed mutation, first try to resume
    /// from the current element, then its predecessor, then its successor;
    /// if all three anchors are gone the pass is abandoned and returns,
    /// trusting the next scheduled pass to resynchronize.
    pub fn traverse(self: &Arc<Self>, mut visit: impl FnMut(RecordId)) {
        let (mut prev, mut cur, mut next) = {
            let mut inner = lock_ok(&self.inner);
            inner.modified = false;
            let cur = inner.order.first().cloned();
            let next = cur.as_ref().and_then(|c| Self::successor_locked(&inner, c));
            (None::<Arc<ScanElementHandle>>, cur, next)
        };

        while let Some(pse) = cur {
            visit(pse.record);

            let mut inner = lock_ok(&self.inner);
            if !inner.modified {
                next = Self::successor_locked(&inner, &pse);
                prev = Some(pse.clone());
                cur = next.clone();
                next = cur.as_ref().and_then(|c| Self::successor_locked(&inner, c));
            } else if self.element_on_this(&pse) {
                cur = Self::successor_locked(&inner, &pse);
                next = cur.as_ref().and_then(|c| Self::successor_locked(&inner, c));
                prev = Some(pse.clone());
                inner.modified = false;
            } else if prev
                .as_ref()
                .map(|p| self.element_on_this(p))
                .unwrap_or(false)
            {
                let p = prev.clone().expect("checked Some above");
                cur = Self::successor_locked(&inner, &p);
                prev = cur.as_ref().and_then(|c| Self::predecessor_locked(&inner, c));
                next = cur.as_ref().and_then(|c| Self::successor_locked(&inner, c));
                inner.modified = false;
            } else if next
                .as_ref()
                .map(|n| self.element_on_this(n))
                .unwrap_or(false)
            {
                let n = next.clone().expect("checked Some above");
                prev = Self::predecessor_locked(&inner, &n);
                next = Self::successor_locked(&inner, &n);
                cur = Some(n);
                inner.modified = false;
            } else {
                debug!(list = %self.kind, "traversal anchors lost, abandoning pass");
                return;
            }
        }
    }

    /// Best-effort snapshot for operator dumps (`scanppl`/`scanpel`/
    /// `scanpiol`). Re-acquires the lock between each element, so it can
    /// tear under heavy concurrent mutation; never treat this as a
    /// consistent view.
    pub fn dump(self: &Arc<Self>) -> Vec<RecordId> {
        let mut out = Vec::new();
        let mut cur = {
            let inner = lock_ok(&self.inner);
            inner.order.first().cloned()
        };
        while let Some(pse) = cur {
            out.push(pse.record);
            cur = {
                let inner = lock_ok(&self.inner);
                Self::successor_locked(&inner, &pse)
            };
        }
        out
    }

    /// Number of elements currently on the list.
    pub fn len(self: &Arc<Self>) -> usize {
        lock_ok(&self.inner).order.len()
    }

    /// True if the list currently has no elements.
    pub fn is_empty(self: &Arc<Self>) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tracing_test::{logs_contain, traced_test};

    fn elem(table: &crate::element::ElementTable, id: RecordId) -> Arc<ScanElementHandle> {
        table.get_or_create(id)
    }

    #[test]
    fn phased_insertion_orders_by_phase_then_insertion() {
        let table = crate::element::ElementTable::new();
        let list = ScanList::new(ScanListKind::Periodic(0), Some(10));

        list.add(elem(&table, 1), 0); // A
        list.add(elem(&table, 2), 5); // B
        list.add(elem(&table, 3), 5); // C
        list.add(elem(&table, 4), 3); // D

        assert_eq!(list.dump(), vec![1, 4, 2, 3]);
    }

    #[test]
    fn self_removal_during_visit_leaves_remaining_elements_intact() {
        let table = crate::element::ElementTable::new();
        let list = ScanList::new(ScanListKind::Periodic(0), Some(10));
        list.add(elem(&table, 1), 0);
        list.add(elem(&table, 2), 0);
        list.add(elem(&table, 3), 0);

        let visited = StdMutex::new(Vec::new());
        list.traverse(|id| {
            visited.lock().unwrap().push(id);
            if id == 2 {
                list.remove(&table.get_or_create(2));
            }
        });

        assert_eq!(*visited.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(list.dump(), vec![1, 3]);
    }

    #[test]
    fn neighborhood_collapse_falls_back_without_looping() {
        let table = crate::element::ElementTable::new();
        let list = ScanList::new(ScanListKind::Periodic(0), Some(10));
        list.add(elem(&table, 1), 0);
        list.add(elem(&table, 2), 0);
        list.add(elem(&table, 3), 0);
        list.add(elem(&table, 4), 0);
        list.add(elem(&table, 5), 0);

        let visited = StdMutex::new(Vec::new());
        list.traverse(|id| {
            visited.lock().unwrap().push(id);
            if id == 3 {
                for r in [2, 3, 4, 5] {
                    list.remove(&table.get_or_create(r));
                }
            }
        });

        // Cursor, predecessor, and successor are all removed the instant the
        // neighborhood collapses, so the pass is abandoned right after
        // visiting the element that triggered it; it never loops back over
        // what's left. Record 1 (never deleted) survives the pass.
        assert_eq!(*visited.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(list.dump(), vec![1]);
    }

    #[test]
    fn remove_on_detached_element_is_a_no_op() {
        let table = crate::element::ElementTable::new();
        let list = ScanList::new(ScanListKind::Event(7), None);
        let handle = elem(&table, 1);
        list.remove(&handle);
        assert_eq!(list.dump(), Vec::<RecordId>::new());
    }

    #[test]
    #[traced_test]
    fn remove_with_mismatched_list_logs_and_leaves_state_unchanged() {
        let table = crate::element::ElementTable::new();
        let home = ScanList::new(ScanListKind::Periodic(0), Some(10));
        let other = ScanList::new(ScanListKind::Periodic(1), Some(10));
        let handle = elem(&table, 1);
        home.add(handle.clone(), 0);

        other.remove(&handle);

        assert_eq!(home.dump(), vec![1]);
        assert!(logs_contain("list mismatch on remove"));
    }

    #[test]
    fn adding_an_already_listed_element_moves_rather_than_duplicates() {
        let table = crate::element::ElementTable::new();
        let list = ScanList::new(ScanListKind::Periodic(0), Some(10));
        let a = elem(&table, 1);
        list.add(a.clone(), 10);
        list.add(a.clone(), 0);
        assert_eq!(list.dump(), vec![1]);
    }
}
