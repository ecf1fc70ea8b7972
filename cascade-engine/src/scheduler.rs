use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use cascade_protocol::Event;
use parking_lot::Mutex;

/// Heap entry ordering: lower priority values are more urgent, earlier
/// publication wins within a priority, and the enqueue sequence breaks
/// same-timestamp ties so ordering stays first-in-first-out.
struct QueuedEvent {
    seq: u64,
    event: Event,
}

impl QueuedEvent {
    fn urgency(&self) -> (u32, chrono::DateTime<chrono::Utc>, u64) {
        (self.event.priority as u32, self.event.created_at, self.seq)
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops its greatest entry, so the most urgent event must
        // compare greatest: invert the natural tuple order.
        other.urgency().cmp(&self.urgency())
    }
}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.urgency() == other.urgency()
    }
}

impl Eq for QueuedEvent {}

#[derive(Default)]
struct SchedulerInner {
    backlog: HashMap<String, BinaryHeap<QueuedEvent>>,
    /// Tenants with pending work, in first-seen order.
    cursor: Vec<String>,
    /// Index into `cursor` of the tenant served next.
    next: usize,
    seq: u64,
}

/// Multi-tenant event queue feeding the worker pool.
///
/// Each tenant keeps its own urgency-ordered backlog and workers take one
/// event per tenant in rotation, so a chatty tenant cannot starve the others
/// and a critical event never waits behind bulk traffic of its own tenant.
#[derive(Default, Clone)]
pub struct EventScheduler {
    inner: Arc<Mutex<SchedulerInner>>,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, event: Event) {
        let mut inner = self.inner.lock();
        inner.seq += 1;
        let queued = QueuedEvent {
            seq: inner.seq,
            event,
        };

        let tenant = queued.event.tenant_id.clone();
        if !inner.backlog.contains_key(&tenant) {
            inner.cursor.push(tenant.clone());
        }
        inner.backlog.entry(tenant).or_default().push(queued);
    }

    /// Pops the most urgent event of the tenant whose turn it is, advancing
    /// the rotation. Returns `None` when every backlog is drained.
    pub fn next_event(&self) -> Option<Event> {
        let mut inner = self.inner.lock();

        while !inner.cursor.is_empty() {
            let position = inner.next % inner.cursor.len();
            let tenant = inner.cursor[position].clone();

            let popped = inner
                .backlog
                .get_mut(&tenant)
                .and_then(BinaryHeap::pop)
                .map(|queued| queued.event);

            let drained = inner
                .backlog
                .get(&tenant)
                .map_or(true, BinaryHeap::is_empty);
            if drained {
                inner.backlog.remove(&tenant);
                inner.cursor.remove(position);
                // removal shifts the successor into `position`
                inner.next = position;
            } else {
                inner.next = position + 1;
            }
            if !inner.cursor.is_empty() {
                inner.next %= inner.cursor.len();
            } else {
                inner.next = 0;
            }

            if popped.is_some() {
                return popped;
            }
        }

        None
    }

    pub fn pending(&self) -> usize {
        self.inner
            .lock()
            .backlog
            .values()
            .map(BinaryHeap::len)
            .sum()
    }

    pub fn pending_for_tenant(&self, tenant: &str) -> usize {
        self.inner
            .lock()
            .backlog
            .get(tenant)
            .map_or(0, BinaryHeap::len)
    }

    pub fn tenants(&self) -> Vec<String> {
        self.inner.lock().cursor.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_protocol::{EventInput, EventPriority};

    fn build_event(tenant: &str, priority: EventPriority) -> Event {
        EventInput::builder(tenant, "alert_fired", "security")
            .priority(priority)
            .build()
            .into_event()
    }

    #[test]
    fn drains_tenants_in_rotation() {
        let scheduler = EventScheduler::new();
        scheduler.enqueue(build_event("a", EventPriority::Medium));
        scheduler.enqueue(build_event("b", EventPriority::Medium));
        scheduler.enqueue(build_event("a", EventPriority::Medium));

        let order: Vec<String> = (0..3)
            .filter_map(|_| scheduler.next_event())
            .map(|event| event.tenant_id)
            .collect();

        assert_eq!(order, vec!["a", "b", "a"]);
        assert_eq!(scheduler.pending(), 0);
        assert!(scheduler.next_event().is_none());
    }

    #[test]
    fn urgent_events_jump_their_tenant_backlog() {
        let scheduler = EventScheduler::new();
        scheduler.enqueue(build_event("tenant", EventPriority::Low));
        let critical = build_event("tenant", EventPriority::Critical);
        scheduler.enqueue(critical.clone());

        let first = scheduler.next_event().expect("event queued");
        assert_eq!(first.id, critical.id);
        assert_eq!(scheduler.pending_for_tenant("tenant"), 1);
    }

    #[test]
    fn equal_priority_pops_in_publish_order() {
        let scheduler = EventScheduler::new();
        let first = build_event("tenant", EventPriority::Medium);
        let second = build_event("tenant", EventPriority::Medium);
        let third = build_event("tenant", EventPriority::Medium);
        for event in [&first, &second, &third] {
            scheduler.enqueue(event.clone());
        }

        let order: Vec<_> = (0..3)
            .filter_map(|_| scheduler.next_event())
            .map(|event| event.id)
            .collect();
        assert_eq!(order, vec![first.id, second.id, third.id]);
    }

    #[test]
    fn rotation_recovers_after_a_tenant_drains() {
        let scheduler = EventScheduler::new();
        scheduler.enqueue(build_event("a", EventPriority::Medium));
        scheduler.enqueue(build_event("b", EventPriority::Medium));
        scheduler.enqueue(build_event("b", EventPriority::Medium));

        assert_eq!(scheduler.next_event().map(|e| e.tenant_id).as_deref(), Some("a"));
        assert_eq!(scheduler.next_event().map(|e| e.tenant_id).as_deref(), Some("b"));

        // "a" is drained and out of rotation; a fresh event re-enters it
        scheduler.enqueue(build_event("a", EventPriority::Medium));
        assert_eq!(scheduler.tenants(), vec!["b", "a"]);
        assert_eq!(scheduler.next_event().map(|e| e.tenant_id).as_deref(), Some("b"));
        assert_eq!(scheduler.next_event().map(|e| e.tenant_id).as_deref(), Some("a"));
    }
}
