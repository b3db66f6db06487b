//! Event scanner: a bounded queue of posted event ids drained by a single
//! consumer thread, dispatching to the matching event list.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use crate::record::{process_record, RecordRegistry};
use crate::registries::EventRegistry;

/// Bounded multi-producer/single-consumer queue of posted event ids.
///
/// Replaces the original one-byte ring buffer with an explicit
/// mutex-guarded `VecDeque` paired with a `Condvar`, so producers don't
/// lean on word-atomicity assumptions to stay safe (see `DESIGN.md`).
pub struct EventQueue {
    capacity: usize,
    queue: Mutex<VecDeque<u8>>,
    not_empty: Condvar,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        })
    }

    /// Push `event` if the queue has room. Returns `false` on overflow
    /// (caller logs and drops).
    fn push(&self, event: u8) -> bool {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(event);
        drop(queue);
        self.not_empty.notify_one();
        true
    }

    /// Block until at least one event is queued, then drain everything
    /// currently queued.
    fn drain_blocking(&self) -> Vec<u8> {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        while queue.is_empty() {
            queue = self
                .not_empty
                .wait(queue)
                .unwrap_or_else(|e| e.into_inner());
        }
        queue.drain(..).collect()
    }
}

/// Post an event from any producer context. A no-op while the accept gate
/// is closed; drops with a log on queue overflow.
pub fn post_event(gate: &AtomicBool, queue: &EventQueue, event: u8) {
    if !gate.load(Ordering::Acquire) {
        return;
    }
    if !queue.push(event) {
        warn!(event, "event queue overflow, dropping event");
    }
}

/// Spawn the single event-scanner worker thread.
pub fn spawn_event_worker(
    queue: Arc<EventQueue>,
    events: Arc<EventRegistry>,
    records: Arc<RecordRegistry>,
    gate: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("scan-event".to_string())
        .spawn(move || event_loop(&queue, &events, &records, &gate))
        .expect("failed to spawn event worker thread")
}

fn event_loop(
    queue: &EventQueue,
    events: &EventRegistry,
    records: &RecordRegistry,
    gate: &AtomicBool,
) {
    loop {
        let drained = queue.drain_blocking();
        if !gate.load(Ordering::Acquire) {
            continue;
        }
        for event_id in drained {
            if event_id as usize >= events.max_events() {
                warn!(event_id, "illegal EVNT value drained from queue, dropping");
                continue;
            }
            let Some(list) = events.get(event_id) else {
                trace!(event_id, "no records registered for this event, skipping");
                continue;
            };
            debug!(event_id, "dispatching event list traversal");
            list.traverse(|id| process_record(records, id));
        }
    }
}
