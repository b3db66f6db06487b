//! Membership manager: dispatches `scan_add`/`scan_delete` onto the correct
//! list based on a record's current scan policy.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::element::ElementTable;
use crate::record::{IoCmd, IoInfo, Record, RecordId, ScanPolicy};
use crate::registries::{EventRegistry, IoEventRegistry, PeriodicRegistry};

/// Everything the membership manager needs in order to route a record.
pub struct MembershipContext<'a> {
    pub elements: &'a ElementTable,
    pub periodic: &'a PeriodicRegistry,
    pub events: &'a EventRegistry,
    pub io_events: &'a IoEventRegistry,
}

/// Attach `record` to the list matching its current scan policy.
///
/// Invalid scan/event/priority values are logged against the record and
/// ignored; this function never returns an error to the caller, matching
/// the real-time constraint that routing failures cannot block the record
/// database's hot path.
pub fn scan_add(ctx: &MembershipContext<'_>, record: &dyn Record) {
    route(ctx, record, IoCmd::Add)
}

/// Detach `record` from the list matching its current scan policy.
pub fn scan_delete(ctx: &MembershipContext<'_>, record: &dyn Record) {
    route(ctx, record, IoCmd::Remove)
}

fn route(ctx: &MembershipContext<'_>, record: &dyn Record, cmd: IoCmd) {
    let id: RecordId = record.id();
    match record.scan() {
        ScanPolicy::Passive => {}
        ScanPolicy::Event => route_event(ctx, record, id, cmd),
        ScanPolicy::IoEvent => route_io_event(ctx, record, id, cmd),
        ScanPolicy::Periodic(i) => route_periodic(ctx, record, id, i, cmd),
    }
}

fn route_event(ctx: &MembershipContext<'_>, record: &dyn Record, id: RecordId, cmd: IoCmd) {
    let event_id = record.event_id();
    if event_id as usize >= ctx.events.max_events() {
        warn!(record = id, event_id, "illegal EVNT value, dropping");
        return;
    }
    let list = ctx.events.get_or_create(event_id);
    let element = ctx.elements.get_or_create(id);
    match cmd {
        IoCmd::Add => list.add(element, record.phase()),
        IoCmd::Remove => list.remove(&element),
    }
}

fn route_periodic(
    ctx: &MembershipContext<'_>,
    record: &dyn Record,
    id: RecordId,
    ordinal: usize,
    cmd: IoCmd,
) {
    let Some(list) = ctx.periodic.get(ordinal) else {
        warn!(record = id, ordinal, "illegal SCAN value, dropping");
        return;
    };
    let element = ctx.elements.get_or_create(id);
    match cmd {
        IoCmd::Add => list.add(element, record.phase()),
        IoCmd::Remove => list.remove(&element),
    }
}

fn route_io_event(ctx: &MembershipContext<'_>, record: &dyn Record, id: RecordId, cmd: IoCmd) {
    let Some(info) = record.io_info(cmd) else {
        warn!(record = id, "record has no device support for IoEvent scan, dropping");
        return;
    };
    let source = match info {
        IoInfo::Legacy => {
            debug!(
                record = id,
                "device reported legacy I/O routing, which this engine does not implement"
            );
            return;
        }
        IoInfo::Source { source } => source,
    };

    let priority = record.priority();
    if priority >= ctx.io_events.num_priorities() {
        warn!(record = id, priority, "illegal PRIO value, dropping");
        return;
    }

    let Some(list) = ctx.io_events.slot(source, priority) else {
        warn!(
            record = id,
            source, "I/O source not registered, dropping"
        );
        return;
    };
    let element = ctx.elements.get_or_create(id);
    match cmd {
        IoCmd::Add => list.add(element, record.phase()),
        IoCmd::Remove => list.remove(&element),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ScanPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRecord {
        id: RecordId,
        scan: ScanPolicy,
        event_id: u8,
        priority: usize,
        phase: i16,
        processed: AtomicUsize,
    }

    impl Record for FakeRecord {
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
    }

    #[test]
    fn event_scan_add_then_delete_round_trips() {
        let elements = ElementTable::new();
        let periodic = PeriodicRegistry::new(vec![]);
        let events = EventRegistry::new(256);
        let io_events = IoEventRegistry::new(3);
        let ctx = MembershipContext {
            elements: &elements,
            periodic: &periodic,
            events: &events,
            io_events: &io_events,
        };

        let record = FakeRecord {
            id: 1,
            scan: ScanPolicy::Event,
            event_id: 7,
            priority: 0,
            phase: 0,
            processed: AtomicUsize::new(0),
        };

        scan_add(&ctx, &record);
        let list = events.get_or_create(7);
        assert_eq!(list.dump(), vec![1]);

        scan_delete(&ctx, &record);
        assert_eq!(list.dump(), Vec::<RecordId>::new());
    }

    #[test]
    fn illegal_event_id_is_dropped_not_panicked() {
        let elements = ElementTable::new();
        let periodic = PeriodicRegistry::new(vec![]);
        let events = EventRegistry::new(4);
        let io_events = IoEventRegistry::new(3);
        let ctx = MembershipContext {
            elements: &elements,
            periodic: &periodic,
            events: &events,
            io_events: &io_events,
        };
        let record = FakeRecord {
            id: 1,
            scan: ScanPolicy::Event,
            event_id: 99,
            priority: 0,
            phase: 0,
            processed: AtomicUsize::new(0),
        };
        scan_add(&ctx, &record);
    }

    #[test]
    fn passive_scan_is_a_no_op() {
        let elements = ElementTable::new();
        let periodic = PeriodicRegistry::new(vec![]);
        let events = EventRegistry::new(256);
        let io_events = IoEventRegistry::new(3);
        let ctx = MembershipContext {
            elements: &elements,
            periodic: &periodic,
            events: &events,
            io_events: &io_events,
        };
        let record = FakeRecord {
            id: 1,
            scan: ScanPolicy::Passive,
            event_id: 0,
            priority: 0,
            phase: 0,
            processed: AtomicUsize::new(0),
        };
        scan_add(&ctx, &record);
        assert!(elements.get(1).is_none());
    }
}
