//! Configuration management for the scanning engine.
//!
//! This module defines `EngineConfig`, loaded from a layered source (built-in
//! defaults, an optional `scanengine.toml`, then `SCANENGINE_`-prefixed
//! environment variables) using `figment`, the same layering approach the
//! surrounding application uses for its own settings.
//!
//! ## Schema
//!
//! - **`log_level`**: logging verbosity passed through to `tracing` init.
//! - **`periods`**: ordered list of period strings (e.g. `"1 second"`,
//!   `"10 second"`), mirroring the enumerated SCAN field choices the original
//!   system reads out of a live record. The first `SCAN_1ST_PERIODIC` slots
//!   of that enum are non-periodic policies; here the list holds periodic
//!   periods only, so no reserved-slot skipping is needed.
//! - **`max_events`**: size of the event identifier space, `[0, max_events)`.
//! - **`num_priorities`**: number of I/O-event callback priority levels.
//! - **`restart_enabled`**: whether the watchdog respawns a dead worker.
//! - **`tick`**: the duration of one scheduling tick, used to convert period
//!   strings into a tick count for drift-compensated sleeping.
//!
//! ## Validation
//!
//! `EngineConfig::load` deserializes the layered configuration and then calls
//! `validate`, which rejects an empty period list, any non-positive period,
//! and zero priority levels. A misconfigured engine fails `scan_init` instead
//! of surfacing the defect later as a runtime panic.

use crate::error::{ScanError, ScanResult};
use crate::validation::{is_in_range, is_not_empty};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Provider,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

impl Provider for EngineConfig {
    fn metadata(&self) -> figment::Metadata {
        figment::Metadata::named("Engine Defaults")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(EngineConfig::default()).data()
    }
}

/// Top-level, validated configuration for a `ScanEngine`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub log_level: String,

    /// Human-readable period choices, e.g. `["1 second", "10 second"]`.
    /// Ordinal `i` in this list becomes `ScanPolicy::Periodic(i)`.
    pub periods: Vec<String>,

    /// Size of the event identifier space; valid ids are `[0, max_events)`.
    pub max_events: u16,

    /// Number of I/O-event callback priority levels.
    pub num_priorities: usize,

    /// Whether the watchdog respawns a worker after it dies.
    pub restart_enabled: bool,

    /// Duration of one scheduling tick.
    #[serde(with = "humantime_serde")]
    pub tick: Duration,

    /// Capacity of the bounded event queue (ring of posted event ids).
    pub event_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            periods: vec!["1 second".to_string(), "10 second".to_string()],
            max_events: 256,
            num_priorities: 3,
            restart_enabled: true,
            tick: Duration::from_millis(1),
            event_queue_capacity: 1000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from built-in defaults, an optional
    /// `scanengine.toml` in the current directory, then `SCANENGINE_`
    /// environment variables, and validate the result.
    pub fn load() -> ScanResult<Self> {
        let figment = Figment::from(EngineConfig::default())
            .merge(Toml::file("scanengine.toml"))
            .merge(Env::prefixed("SCANENGINE_"));
        let config: EngineConfig = figment
            .extract()
            .map_err(|err| ScanError::Configuration(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants the engine relies on at `scan_init` time.
    pub fn validate(&self) -> ScanResult<()> {
        is_not_empty(&self.log_level)
            .map_err(|e| ScanError::Configuration(e.to_string()))?;
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ScanError::Configuration(format!(
                "invalid log level: {}",
                self.log_level
            )));
        }

        if self.periods.is_empty() {
            return Err(ScanError::Configuration(
                "periods list must not be empty".into(),
            ));
        }
        for period in &self.periods {
            let seconds = parse_period_seconds(period)?;
            if seconds <= 0.0 {
                return Err(ScanError::Configuration(format!(
                    "period '{period}' must be a positive number of seconds"
                )));
            }
        }

        is_in_range(self.num_priorities, 1..=64)
            .map_err(|e| ScanError::Configuration(format!("num_priorities: {e}")))?;
        is_in_range(self.max_events as u32, 1..=256)
            .map_err(|e| ScanError::Configuration(format!("max_events: {e}")))?;
        is_in_range(self.event_queue_capacity, 1..=1_000_000)
            .map_err(|e| ScanError::Configuration(format!("event_queue_capacity: {e}")))?;

        Ok(())
    }

    /// Convert each configured period string into a tick count for
    /// `ScanList::ticks_per_period`, using `self.tick` as the tick duration.
    pub fn periods_in_ticks(&self) -> ScanResult<Vec<u64>> {
        self.periods
            .iter()
            .map(|p| {
                let seconds = parse_period_seconds(p)?;
                let ticks = (seconds * 1000.0) as u64 / self.tick.as_millis().max(1) as u64;
                Ok(ticks.max(1))
            })
            .collect()
    }
}

/// Extract the floating seconds field out of a human-readable period choice
/// such as `"1 second"` or `"10.5 second"`, matching the original system's
/// `sscanf(..., "%f", ...)` over the enumerated SCAN field choice.
fn parse_period_seconds(period: &str) -> ScanResult<f64> {
    period
        .split_whitespace()
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| {
            ScanError::Configuration(format!("cannot parse period string '{period}'"))
        })
}
