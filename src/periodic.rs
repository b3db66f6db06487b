//! Periodic scanner: one dedicated worker per configured period, sleeping
//! between passes with drift compensation anchored to intended wake time
//! rather than actual wake time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::record::{process_record, RecordRegistry};
use crate::scan_list::ScanList;

/// Given how long the last pass took (in ticks) and the configured
/// period length, compute how many ticks to sleep before the next pass.
/// Always sleeps at least one tick, so a pass that overran its period
/// still yields forward progress rather than busy-looping.
pub fn next_delay_ticks(ticks_per_period: u64, elapsed_ticks: u64) -> u64 {
    ticks_per_period.saturating_sub(elapsed_ticks).max(1)
}

/// Spawn one periodic worker for `list`. Priority ordinal `i` is recorded
/// only as an advisory tracing field (see `DESIGN.md`): OS thread priority
/// isn't portable across every target this engine might run on, so it is
/// not programmed as a scheduler directive here.
pub fn spawn_periodic_worker(
    ordinal: usize,
    list: Arc<ScanList>,
    tick: Duration,
    records: Arc<RecordRegistry>,
    gate: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("scan-periodic-{ordinal}"))
        .spawn(move || periodic_loop(ordinal, &list, tick, &records, &gate))
        .expect("failed to spawn periodic worker thread")
}

fn periodic_loop(
    ordinal: usize,
    list: &Arc<ScanList>,
    tick: Duration,
    records: &RecordRegistry,
    gate: &AtomicBool,
) {
    let ticks_per_period = list.ticks_per_period.unwrap_or(1).max(1);
    let tick_nanos = tick.as_nanos().max(1);
    let mut start = Instant::now();

    loop {
        if gate.load(Ordering::Acquire) {
            trace!(ordinal, "periodic pass starting");
            list.traverse(|id| process_record(records, id));
        }

        let end = Instant::now();
        let elapsed_ticks = (end.saturating_duration_since(start).as_nanos() / tick_nanos) as u64;
        let delay_ticks = next_delay_ticks(ticks_per_period, elapsed_ticks);
        let delay = tick.saturating_mul(delay_ticks as u32);

        debug!(ordinal, delay_ticks, "sleeping until next periodic pass");
        thread::sleep(delay);
        start = end + delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_pass_sleeps_remaining_ticks() {
        assert_eq!(next_delay_ticks(10, 3), 7);
    }

    #[test]
    fn overrun_pass_still_sleeps_at_least_one_tick() {
        assert_eq!(next_delay_ticks(10, 10), 1);
        assert_eq!(next_delay_ticks(10, 50), 1);
    }

    #[test]
    fn zero_elapsed_sleeps_the_full_period() {
        assert_eq!(next_delay_ticks(10, 0), 10);
    }
}
