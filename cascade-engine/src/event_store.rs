use std::collections::HashMap;
use std::sync::Arc;

use cascade_protocol::{Event, EventInput};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::EngineError;

/// Append-only log of published events; the single source of truth for what
/// happened. Implementations must surface write failures synchronously so a
/// producer always knows whether its event was durably recorded.
pub trait EventStore: Send + Sync + 'static {
    /// Validates the producer fields, assigns `id` and `created_at` when
    /// absent, and appends the event. Business-level oddities in the payload
    /// are stored as-is; only structural problems are rejected.
    fn append(&self, input: EventInput) -> Result<Event, EngineError>;

    fn get(&self, id: Uuid) -> Result<Option<Event>, EngineError>;

    /// Most recent events for a tenant, newest first.
    fn list(&self, tenant: &str, limit: usize) -> Result<Vec<Event>, EngineError>;
}

fn validate(input: &EventInput) -> Result<(), EngineError> {
    if input.tenant_id.trim().is_empty() {
        return Err(EngineError::InvalidEvent("tenant_id is required".into()));
    }
    if input.event_type.trim().is_empty() {
        return Err(EngineError::InvalidEvent("event_type is required".into()));
    }
    if input.source_module.trim().is_empty() {
        return Err(EngineError::InvalidEvent("source_module is required".into()));
    }
    Ok(())
}

#[derive(Default)]
struct StoreInner {
    events: HashMap<Uuid, Event>,
    // append order per tenant, for list()
    order: HashMap<String, Vec<Uuid>>,
}

/// In-memory reference implementation of the event store.
#[derive(Default, Clone)]
pub struct InMemoryEventStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().events.is_empty()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, input: EventInput) -> Result<Event, EngineError> {
        validate(&input)?;
        let event = input.into_event();

        let mut inner = self.inner.write();
        inner
            .order
            .entry(event.tenant_id.clone())
            .or_default()
            .push(event.id);
        inner.events.insert(event.id, event.clone());
        Ok(event)
    }

    fn get(&self, id: Uuid) -> Result<Option<Event>, EngineError> {
        Ok(self.inner.read().events.get(&id).cloned())
    }

    fn list(&self, tenant: &str, limit: usize) -> Result<Vec<Event>, EngineError> {
        let inner = self.inner.read();
        let ids = match inner.order.get(tenant) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };

        Ok(ids
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| inner.events.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_protocol::EventPriority;
    use serde_json::json;

    #[test]
    fn appends_and_assigns_identity() {
        let store = InMemoryEventStore::new();
        let event = store
            .append(
                EventInput::builder("tenant-a", "document_expired", "policies")
                    .payload(json!({"document_id": "d1"}))
                    .priority(EventPriority::High)
                    .build(),
            )
            .expect("append event");

        let fetched = store.get(event.id).expect("get event");
        assert_eq!(fetched, Some(event));
    }

    #[test]
    fn rejects_structurally_invalid_events() {
        let store = InMemoryEventStore::new();
        let err = store
            .append(EventInput::builder("", "document_expired", "policies").build())
            .expect_err("missing tenant should be rejected");
        assert!(matches!(err, EngineError::InvalidEvent(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn stores_odd_business_values_as_is() {
        let store = InMemoryEventStore::new();
        // unknown entity types and odd payload values are the producer's concern
        let event = store
            .append(
                EventInput::builder("tenant-a", "alert_fired", "security")
                    .entity("galaxy", "??")
                    .payload(json!({"severity": "very bad indeed"}))
                    .build(),
            )
            .expect("append event");
        assert_eq!(event.payload["severity"], json!("very bad indeed"));
    }

    #[test]
    fn lists_newest_first_per_tenant() {
        let store = InMemoryEventStore::new();
        for n in 0..3 {
            store
                .append(
                    EventInput::builder("tenant-a", "survey_completed", "surveys")
                        .payload(json!({"n": n}))
                        .build(),
                )
                .expect("append event");
        }
        store
            .append(EventInput::builder("tenant-b", "survey_completed", "surveys").build())
            .expect("append event");

        let listed = store.list("tenant-a", 2).expect("list events");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].payload["n"], json!(2));
        assert_eq!(listed[1].payload["n"], json!(1));
    }
}
