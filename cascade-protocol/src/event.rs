use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Urgency attached to an event by its producer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    Critical = 0,
    High = 10,
    Medium = 50,
    Low = 100,
}

impl Default for EventPriority {
    fn default() -> Self {
        EventPriority::Medium
    }
}

/// Immutable record of something that happened in the platform.
///
/// Events are append-only: once stored they are never mutated or deleted,
/// they are the audit trail every rule firing is traced back to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub tenant_id: String,
    pub event_type: String,
    #[serde(default)]
    pub event_category: String,
    pub source_module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub priority: EventPriority,
    #[serde(default)]
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Producer-facing event document.
///
/// `id` and `created_at` are optional: the store assigns them when absent.
/// Everything else is stored as-is; the store never rejects a structurally
/// valid event for business reasons.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub tenant_id: String,
    pub event_type: String,
    #[serde(default)]
    pub event_category: String,
    pub source_module: String,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub priority: EventPriority,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl EventInput {
    pub fn builder(
        tenant_id: impl Into<String>,
        event_type: impl Into<String>,
        source_module: impl Into<String>,
    ) -> EventBuilder {
        EventBuilder {
            input: EventInput {
                tenant_id: tenant_id.into(),
                event_type: event_type.into(),
                source_module: source_module.into(),
                payload: Value::Null,
                ..EventInput::default()
            },
        }
    }

    /// Finalizes the input into a stored event, assigning id and timestamp
    /// when the producer did not provide them.
    pub fn into_event(self) -> Event {
        Event {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            tenant_id: self.tenant_id,
            event_type: self.event_type,
            event_category: self.event_category,
            source_module: self.source_module,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            priority: self.priority,
            payload: self.payload,
            metadata: self.metadata,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Builder helper to assemble event inputs with many optional fields.
pub struct EventBuilder {
    input: EventInput,
}

impl EventBuilder {
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.input.event_category = category.into();
        self
    }

    pub fn entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.input.entity_type = Some(entity_type.into());
        self.input.entity_id = Some(entity_id.into());
        self
    }

    pub fn priority(mut self, priority: EventPriority) -> Self {
        self.input.priority = priority;
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.input.payload = payload;
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.input.metadata = Some(metadata);
        self
    }

    pub fn build(self) -> EventInput {
        self.input
    }
}
