//! A record scanning engine for a soft real-time control system.
//!
//! Thousands of records must be re-evaluated on fixed periods, in response
//! to named software events, or when hardware I/O signals arrive. This
//! crate decides *when* each record is processed and dispatches that
//! processing onto worker threads, while tolerating arbitrary list
//! mutation during iteration (a record's own processing may move it
//! between lists) and honoring a secondary phase ordering within each list.
//!
//! ## Crate Structure
//!
//! - **`record`**: the `Record` trait and the record database stand-in.
//! - **`element`**: the per-record membership node and its owning table.
//! - **`scan_list`**: the phase-ordered, mutation-safe list data structure.
//! - **`registries`**: the periodic/event/I/O-event list registries.
//! - **`membership`**: `scan_add`/`scan_delete` dispatch.
//! - **`periodic`**: the periodic scanner.
//! - **`event`**: the event scanner and its posted-event queue.
//! - **`ioevent`**: the I/O-event scanner and callback dispatcher.
//! - **`supervisor`**: `ScanEngine`, boot sequence, accept gate, watchdog.
//! - **`config`**: typed, validated engine configuration.
//! - **`error`**: the engine's error taxonomy.
//! - **`tracing`**: structured logging setup.
//! - **`validation`**: small config-validation helpers.
//!
//! # Example
//! ```no_run
//! use scanengine::config::EngineConfig;
//! use scanengine::supervisor::ScanEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load()?;
//! let engine = ScanEngine::scan_init(config)?;
//! engine.spawn_workers();
//! engine.open_gate();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod element;
pub mod error;
pub mod event;
pub mod ioevent;
pub mod membership;
pub mod periodic;
pub mod record;
pub mod registries;
pub mod scan_list;
pub mod supervisor;
pub mod tracing;
pub mod validation;
