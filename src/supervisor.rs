//! Supervisor: boots the engine's registries and workers, owns the accept
//! gate, and watches workers for unexpected death.
//!
//! Packaging the periodic/event/I/O-event registries into a `ScanEngine`
//! value (rather than process-wide singletons, as in the original system)
//! lets tests instantiate multiple engines in isolation (see `DESIGN.md`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::element::ElementTable;
use crate::error::ScanResult;
use crate::event::{self, EventQueue};
use crate::ioevent::{self, CallbackPool};
use crate::membership::{self, MembershipContext};
use crate::periodic;
use crate::record::{Record, RecordRegistry};
use crate::registries::{EventRegistry, IoEventRegistry, PeriodicRegistry};
use crate::scan_list::ScanList;

/// What a worker was spawned to do, kept so the watchdog can spawn an
/// equivalent replacement after observing the original's death.
enum WorkerKind {
    Periodic { ordinal: usize, list: Arc<ScanList> },
    Event,
}

/// A named worker the watchdog tracks. Holding the `JoinHandle` lets the
/// watchdog detect death via `is_finished`; there is no cooperative
/// cancellation, matching §5 of the concurrency model.
struct Worker {
    name: String,
    kind: WorkerKind,
    handle: JoinHandle<()>,
}

/// A fully-assembled scanning engine: registries, workers, and the accept
/// gate, all owned by one value instead of living as process-wide statics.
pub struct ScanEngine {
    config: EngineConfig,
    elements: Arc<ElementTable>,
    periodic: Arc<PeriodicRegistry>,
    events: Arc<EventRegistry>,
    io_events: Arc<IoEventRegistry>,
    event_queue: Arc<EventQueue>,
    callback_pool: Arc<CallbackPool>,
    records: Arc<RecordRegistry>,
    gate: Arc<AtomicBool>,
    workers: Mutex<Vec<Worker>>,
}

impl ScanEngine {
    /// `scan_init()`: validate configuration, build the periodic and event
    /// registries, and prepare (but do not yet start) the engine. The
    /// legacy I/O init step from the original boot sequence has no
    /// counterpart here (see `membership`) and is skipped.
    pub fn scan_init(config: EngineConfig) -> ScanResult<Self> {
        config.validate()?;
        let ticks = config.periods_in_ticks()?;
        info!(periods = ticks.len(), "initializing periodic registry");

        Ok(Self {
            periodic: Arc::new(PeriodicRegistry::new(ticks)),
            events: Arc::new(EventRegistry::new(config.max_events)),
            io_events: Arc::new(IoEventRegistry::new(config.num_priorities)),
            event_queue: EventQueue::new(config.event_queue_capacity),
            callback_pool: Arc::new(CallbackPool::new(config.num_priorities)),
            elements: Arc::new(ElementTable::new()),
            records: Arc::new(RecordRegistry::new()),
            gate: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            config,
        })
    }

    /// Register a record with the database stand-in and attach it to its
    /// scan list. Used both at boot (`build_scan_lists`) and by the
    /// embedder afterward, on every record create.
    pub fn scan_add(&self, record: Arc<dyn Record>) {
        membership::scan_add(&self.membership_context(), record.as_ref());
        self.records.insert(record);
    }

    /// Detach a record from its current scan list and drop it from the
    /// engine's internal record database. The embedder still owns the
    /// record's own storage; this only undoes what `scan_add` did.
    pub fn scan_delete(&self, record: &dyn Record) {
        membership::scan_delete(&self.membership_context(), record);
        self.records.remove(record.id());
    }

    fn membership_context(&self) -> MembershipContext<'_> {
        MembershipContext {
            elements: &self.elements,
            periodic: &self.periodic,
            events: &self.events,
            io_events: &self.io_events,
        }
    }

    /// Post a software event from any producer context.
    pub fn post_event(&self, event_id: u8) {
        event::post_event(&self.gate, &self.event_queue, event_id);
    }

    /// Register a hardware I/O source, returning its priority-indexed list
    /// array so device code can attach records via `scan_add`.
    pub fn io_scan_init(&self, source: u64) -> Vec<Arc<ScanList>> {
        ioevent::io_scan_init(&self.io_events, source)
    }

    /// Request I/O-event processing for `source`.
    pub fn io_scan_request(&self, source: u64) {
        ioevent::io_scan_request(
            &self.io_events,
            &self.callback_pool,
            self.records.clone(),
            source,
            &self.gate,
        );
    }

    /// Spawn every periodic worker and the single event worker, and enroll
    /// each in the watchdog registry. Does not open the accept gate.
    pub fn spawn_workers(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        for (ordinal, list) in self.periodic.iter() {
            let kind = WorkerKind::Periodic {
                ordinal,
                list: list.clone(),
            };
            let handle = self.spawn_worker(&kind);
            workers.push(Worker {
                name: format!("periodic-{ordinal}"),
                kind,
                handle,
            });
        }

        let kind = WorkerKind::Event;
        let handle = self.spawn_worker(&kind);
        workers.push(Worker {
            name: "event".to_string(),
            kind,
            handle,
        });
        info!(workers = workers.len(), "scan workers spawned");
    }

    /// Start (or restart) the OS thread for `kind`, using the engine's own
    /// shared state. Used both by `spawn_workers` at boot and by
    /// `watchdog_sweep` when respawning a dead worker.
    fn spawn_worker(&self, kind: &WorkerKind) -> JoinHandle<()> {
        match kind {
            WorkerKind::Periodic { ordinal, list } => periodic::spawn_periodic_worker(
                *ordinal,
                list.clone(),
                self.config.tick,
                self.records.clone(),
                self.gate.clone(),
            ),
            WorkerKind::Event => event::spawn_event_worker(
                self.event_queue.clone(),
                self.events.clone(),
                self.records.clone(),
                self.gate.clone(),
            ),
        }
    }

    /// Open the accept gate: from this point on, periodic and event
    /// workers traverse their lists and `post_event`/`io_scan_request`
    /// stop dropping their input. Call once the record database is known
    /// to be coherent.
    pub fn open_gate(&self) {
        self.gate.store(true, Ordering::Release);
        info!("accept gate open");
    }

    /// True if the accept gate is currently open.
    pub fn gate_open(&self) -> bool {
        self.gate.load(Ordering::Acquire)
    }

    /// Watchdog sweep: check every enrolled worker for unexpected death. A
    /// dead worker's list locks recover on their own (std's poisoned-mutex
    /// recovery, see `DESIGN.md`) rather than requiring the watchdog to
    /// force-unlock anything, so a respawned worker can safely pick the
    /// same list back up.
    ///
    /// When `restart_enabled`, a dead worker's entry is replaced in place
    /// with a freshly-spawned equivalent (same ordinal/list, or the event
    /// worker) before this call returns. When disabled, the death is only
    /// logged; the dead entry is left as-is. Returns the names of workers
    /// observed dead this sweep.
    pub fn watchdog_sweep(&self) -> Vec<String> {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        let mut dead = Vec::new();
        for worker in workers.iter_mut() {
            if !worker.handle.is_finished() {
                continue;
            }
            dead.push(worker.name.clone());
            if self.config.restart_enabled {
                warn!(worker = %worker.name, "scan worker exited unexpectedly, respawning");
                worker.handle = self.spawn_worker(&worker.kind);
            } else {
                error!(worker = %worker.name, "scan worker exited unexpectedly, restart disabled");
            }
        }
        dead
    }

    /// Enumerate all currently-known records and attach each to its scan
    /// list, matching the boot-time `build_scan_lists` step.
    pub fn build_scan_lists(&self) {
        for record in self.records.all() {
            membership::scan_add(&self.membership_context(), record.as_ref());
        }
    }

    /// `scanppl`: dump every periodic list.
    pub fn scanppl(&self) -> Vec<(usize, Vec<crate::record::RecordId>)> {
        self.periodic
            .iter()
            .map(|(i, list)| (i, list.dump()))
            .collect()
    }

    /// `scanpel`: dump every allocated event list.
    pub fn scanpel(&self) -> Vec<(u8, Vec<crate::record::RecordId>)> {
        self.events
            .snapshot()
            .into_iter()
            .map(|(id, list)| (id, list.dump()))
            .collect()
    }

    /// `scanpiol`: dump every registered I/O-event source's priority array.
    pub fn scanpiol(&self) -> Vec<(u64, Vec<Vec<crate::record::RecordId>>)> {
        self.io_events
            .snapshot()
            .into_iter()
            .map(|(source, lists)| (source, lists.iter().map(|l| l.dump()).collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{IoCmd, IoInfo, RecordId, ScanPolicy};
    use std::sync::atomic::AtomicUsize;

    struct TestRecord {
        id: RecordId,
        scan: ScanPolicy,
        processed: AtomicUsize,
    }

    impl Record for TestRecord {
        fn id(&self) -> RecordId {
            self.id
        }
        fn scan(&self) -> ScanPolicy {
            self.scan
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
        fn process(&self) {
            self.processed.fetch_add(1, Ordering::SeqCst);
        }
        fn io_info(&self, _cmd: IoCmd) -> Option<IoInfo> {
            None
        }
    }

    #[test]
    fn scan_init_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.periods.clear();
        assert!(ScanEngine::scan_init(config).is_err());
    }

    #[test]
    fn gate_starts_closed_and_opens_on_request() {
        let engine = ScanEngine::scan_init(EngineConfig::default()).unwrap();
        assert!(!engine.gate_open());
        engine.open_gate();
        assert!(engine.gate_open());
    }

    #[test]
    fn scan_add_attaches_a_periodic_record_to_its_list() {
        let engine = ScanEngine::scan_init(EngineConfig::default()).unwrap();
        let record = Arc::new(TestRecord {
            id: 1,
            scan: ScanPolicy::Periodic(0),
            processed: AtomicUsize::new(0),
        });
        engine.scan_add(record);
        let dump = engine.scanppl();
        assert_eq!(dump[0].1, vec![1]);
    }

    #[test]
    fn watchdog_sweep_reports_no_deaths_for_never_spawned_engine() {
        let engine = ScanEngine::scan_init(EngineConfig::default()).unwrap();
        assert!(engine.watchdog_sweep().is_empty());
    }

    #[test]
    fn scan_delete_removes_the_record_from_the_engine_database() {
        let engine = ScanEngine::scan_init(EngineConfig::default()).unwrap();
        let record = Arc::new(TestRecord {
            id: 1,
            scan: ScanPolicy::Periodic(0),
            processed: AtomicUsize::new(0),
        });
        engine.scan_add(record.clone());
        assert!(engine.records.get(1).is_some());

        engine.scan_delete(record.as_ref());
        assert!(engine.records.get(1).is_none());
        assert_eq!(engine.scanppl()[0].1, Vec::<RecordId>::new());
    }

    struct FlakyRecord {
        id: RecordId,
        processed: AtomicUsize,
        panicked_once: std::sync::atomic::AtomicBool,
    }

    impl Record for FlakyRecord {
        fn id(&self) -> RecordId {
            self.id
        }
        fn scan(&self) -> ScanPolicy {
            ScanPolicy::Periodic(0)
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
        fn process(&self) {
            self.processed.fetch_add(1, Ordering::SeqCst);
            if !self.panicked_once.swap(true, Ordering::SeqCst) {
                panic!("simulated worker crash");
            }
        }
        fn io_info(&self, _cmd: IoCmd) -> Option<IoInfo> {
            None
        }
    }

    #[test]
    fn watchdog_sweep_respawns_a_dead_periodic_worker_when_restart_enabled() {
        let mut config = EngineConfig::default();
        config.periods = vec!["0.02 second".to_string()];
        config.tick = std::time::Duration::from_millis(2);
        config.restart_enabled = true;
        let engine = Arc::new(ScanEngine::scan_init(config).unwrap());

        let record = Arc::new(FlakyRecord {
            id: 1,
            processed: AtomicUsize::new(0),
            panicked_once: std::sync::atomic::AtomicBool::new(false),
        });
        engine.scan_add(record.clone());
        engine.spawn_workers();
        engine.open_gate();

        std::thread::sleep(std::time::Duration::from_millis(100));
        let dead = engine.watchdog_sweep();
        assert_eq!(dead, vec!["periodic-0".to_string()]);

        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(engine.watchdog_sweep().is_empty());
        assert!(record.processed.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn io_scan_init_then_request_processes_registered_records() {
        let engine = ScanEngine::scan_init(EngineConfig::default()).unwrap();
        let lists = engine.io_scan_init(7);
        let record = Arc::new(TestRecord {
            id: 1,
            scan: ScanPolicy::IoEvent,
            processed: AtomicUsize::new(0),
        });
        lists[0].add(engine.elements.get_or_create(record.id()), 0);
        engine.records.insert(record.clone());
        engine.open_gate();
        engine.io_scan_request(7);
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(record.processed.load(Ordering::SeqCst), 1);
    }
}
