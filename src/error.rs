//! Custom error types for the scanning engine.
//!
//! This module defines `ScanError`, the single error type for every fallible
//! internal helper in the engine (configuration loading, `scan_init`). Using
//! the `thiserror` crate gives each failure kind in the error taxonomy a
//! distinct, displayable variant.
//!
//! Most of these variants never escape the public API: per the engine's
//! real-time constraint, `scan_add`/`scan_delete`/`post_event` log and
//! continue rather than propagate (the illegal-value/mismatch/overflow
//! policies in `membership` and `scan_list` are enforced by logging
//! directly, without constructing one of these variants). Only
//! `Configuration` is ever returned, from `scan_init`.

use thiserror::Error;

/// Convenience alias for results using the engine's error type.
pub type ScanResult<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("configuration validation error: {0}")]
    Configuration(String),

    #[error("record {record}: illegal SCAN value {value}")]
    IllegalScanValue { record: u64, value: i32 },

    #[error("record {record}: illegal EVNT value {value}")]
    IllegalEventId { record: u64, value: i32 },

    #[error("record {record}: illegal PRIO value {value}")]
    IllegalPriority { record: u64, value: i32 },

    #[error("allocation failure while creating {what}")]
    Allocation { what: String },

    #[error("event queue overflow, dropping event {event}")]
    QueueOverflow { event: u8 },

    #[error("list mismatch: record {record} is not on the list it was asked to leave")]
    ListMismatch { record: u64 },

    #[error("scan worker '{worker}' exited unexpectedly")]
    WorkerDeath { worker: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_record_context_for_illegal_scan_value() {
        let err = ScanError::IllegalScanValue {
            record: 42,
            value: 99,
        };
        assert!(err.to_string().contains("42"));
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn configuration_error_wraps_message() {
        let err = ScanError::Configuration("period list is empty".into());
        assert_eq!(err.to_string(), "configuration validation error: period list is empty");
    }

    #[test]
    fn list_mismatch_names_the_offending_record() {
        let err = ScanError::ListMismatch { record: 7 };
        assert!(err.to_string().contains('7'));
    }
}
