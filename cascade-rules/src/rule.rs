use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::RuleAction;
use crate::condition::RuleConditions;
use crate::error::RuleError;
use crate::template::MissingTokenPolicy;

/// Tenant-owned reactive policy: trigger event types, a condition tree and an
/// ordered action list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Event types this rule listens to. Must not be empty.
    pub trigger_event_types: BTreeSet<String>,
    /// Matching conditions. An empty tree matches every triggering event.
    #[serde(default)]
    pub conditions: RuleConditions,
    /// Actions executed in declared order when the rule matches. Must not be empty.
    pub actions: Vec<RuleAction>,
    #[serde(default = "Rule::default_active")]
    pub is_active: bool,
    /// Behavior for `{{path}}` tokens that do not resolve at dispatch time.
    #[serde(default)]
    pub template_policy: MissingTokenPolicy,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    pub fn default_active() -> bool {
        true
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn listens_to(&self, event_type: &str) -> bool {
        self.trigger_event_types.contains(event_type)
    }

    /// Save-time validation: a rule with nothing to listen to or nothing to
    /// do is rejected before it ever reaches the registry.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.name.trim().is_empty() {
            return Err(RuleError::Invalid("rule name must not be empty".into()));
        }
        if self.trigger_event_types.is_empty() {
            return Err(RuleError::Invalid(
                "rule must declare at least one trigger event type".into(),
            ));
        }
        if self.actions.is_empty() {
            return Err(RuleError::Invalid(
                "rule must declare at least one action".into(),
            ));
        }
        Ok(())
    }
}
