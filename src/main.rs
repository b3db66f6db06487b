//! CLI harness for the scanning engine.
//!
//! This binary is a thin embedder, not a new subsystem: it holds no
//! scanning logic of its own. It loads `EngineConfig`, builds a
//! `ScanEngine` over a small in-process mock record set, opens the accept
//! gate, and runs for a configurable duration — useful for manual
//! smoke-testing and for demonstrating the scenario suite described in the
//! engine's test tooling interactively.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use scanengine::config::EngineConfig;
use scanengine::record::{IoCmd, IoInfo, Record, RecordId, ScanPolicy};
use scanengine::supervisor::ScanEngine;
use scanengine::tracing as scan_tracing;

#[derive(Parser, Debug)]
#[command(name = "scanengine", about = "Record scanning engine smoke-test harness")]
struct Cli {
    /// How long to run before dumping list state and exiting.
    #[arg(long, default_value = "3")]
    run_secs: u64,

    /// How many mock periodic/event/io-event records to register.
    #[arg(long, default_value = "12")]
    mock_records: usize,
}

/// A mock record for smoke-testing: no real device behind it, just a
/// counter of how many times it has been processed.
struct MockRecord {
    id: RecordId,
    scan: ScanPolicy,
    event_id: u8,
    priority: usize,
    phase: i16,
    processed: AtomicUsize,
}

impl Record for MockRecord {
    fn id(&self) -> RecordId {
        self.id
    }
    fn scan(&self) -> ScanPolicy {
        self.scan
    }
    fn event_id(&self) -> u8 {
        self.event_id
    }
    fn priority(&self) -> usize {
        self.priority
    }
    fn phase(&self) -> i16 {
        self.phase
    }
    fn lock(&self) {}
    fn unlock(&self) {}
    fn process(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }
    fn io_info(&self, _cmd: IoCmd) -> Option<IoInfo> {
        Some(IoInfo::Source { source: 0 })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::load()?;
    scan_tracing::init_from_config(&config).map_err(|e| anyhow::anyhow!(e))?;

    info!(?cli, "starting scanengine harness");
    let engine = Arc::new(ScanEngine::scan_init(config)?);

    engine.io_scan_init(0);

    for i in 0..cli.mock_records {
        let scan = match i % 3 {
            0 => ScanPolicy::Periodic(0),
            1 => ScanPolicy::Event,
            _ => ScanPolicy::IoEvent,
        };
        let record = Arc::new(MockRecord {
            id: i as RecordId,
            scan,
            event_id: (i % 8) as u8,
            priority: i % 3,
            phase: (i % 5) as i16,
            processed: AtomicUsize::new(0),
        });
        engine.scan_add(record);
    }

    engine.spawn_workers();
    engine.open_gate();
    info!("accept gate open, engine running");

    let deadline = Duration::from_secs(cli.run_secs);
    let step = Duration::from_millis(200);
    let mut elapsed = Duration::ZERO;
    while elapsed < deadline {
        thread::sleep(step);
        elapsed += step;
        engine.post_event(3);
        for dead in engine.watchdog_sweep() {
            info!(worker = %dead, "watchdog observed dead worker");
        }
    }
    engine.io_scan_request(0);
    thread::sleep(Duration::from_millis(100));

    println!("scanppl:");
    for (ordinal, records) in engine.scanppl() {
        println!("  periodic[{ordinal}]: {records:?}");
    }
    println!("scanpel:");
    for (event_id, records) in engine.scanpel() {
        println!("  event[{event_id}]: {records:?}");
    }
    println!("scanpiol:");
    for (source, slots) in engine.scanpiol() {
        println!("  source {source}: {slots:?}");
    }

    Ok(())
}
