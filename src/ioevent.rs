//! I/O event scanner: registration of hardware sources into a
//! priority-indexed list array, and request-driven callback fan-out.
//!
//! The scanning core only requires that equal-priority callbacks for
//! distinct sources may run concurrently and that a callback runs outside
//! any lock held by its requester. This module satisfies that contract with
//! a small fixed pool of worker threads, one per priority level, each fed
//! by its own unbounded work queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use tracing::{debug, trace};

use crate::record::{process_record, RecordRegistry};
use crate::registries::IoEventRegistry;
use crate::scan_list::ScanList;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Priority-ordered callback dispatcher. One worker thread and one
/// unbounded queue per priority level, so a slow callback at priority 2
/// never blocks dispatch at priority 0.
pub struct CallbackPool {
    senders: Vec<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl CallbackPool {
    pub fn new(num_priorities: usize) -> Self {
        let mut senders = Vec::with_capacity(num_priorities);
        let mut workers = Vec::with_capacity(num_priorities);
        for priority in 0..num_priorities {
            let (tx, rx) = unbounded::<Job>();
            let handle = thread::Builder::new()
                .name(format!("scan-ioevent-{priority}"))
                .spawn(move || {
                    for job in rx.iter() {
                        job();
                    }
                })
                .expect("failed to spawn I/O-event callback worker thread");
            senders.push(tx);
            workers.push(handle);
        }
        Self { senders, workers }
    }

    fn enqueue(&self, priority: usize, job: Job) {
        if let Some(tx) = self.senders.get(priority) {
            trace!(priority, "enqueuing I/O-event callback");
            let _ = tx.send(job);
        }
    }

    /// Number of priority levels this pool was built for.
    pub fn num_priorities(&self) -> usize {
        self.workers.len()
    }
}

/// Register a new hardware source, allocating its `NumPriorities`-slot list
/// array. Device code attaches records to these slots via `scan_add`
/// (see `membership::scan_add`).
pub fn io_scan_init(registry: &IoEventRegistry, source: u64) -> Vec<Arc<ScanList>> {
    registry.register(source)
}

/// Invoked by device code (typically from a deferred-interrupt context)
/// when `source` has new data. For each non-empty priority slot, enqueues a
/// callback that traverses that slot's list. A no-op while the accept gate
/// is closed.
pub fn io_scan_request(
    registry: &IoEventRegistry,
    pool: &CallbackPool,
    records: Arc<RecordRegistry>,
    source: u64,
    gate: &AtomicBool,
) {
    if !gate.load(Ordering::Acquire) {
        return;
    }
    let Some(lists) = registry.lists_for(source) else {
        debug!(source, "io_scan_request for unregistered source, ignoring");
        return;
    };
    for (priority, list) in lists.into_iter().enumerate() {
        if list.is_empty() {
            continue;
        }
        let records = records.clone();
        pool.enqueue(
            priority,
            Box::new(move || {
                list.traverse(|id| process_record(&records, id));
            }),
        );
    }
}
