//! Declarative rule system for the Cascade automation engine.
//!
//! Rules are tenant-owned documents pairing trigger event types with a flat
//! AND/OR condition tree and an ordered list of typed actions. This crate
//! owns the condition language, the template token resolver, the versioned
//! rule registry and the rule-management HTTP API; actually dispatching
//! actions belongs to `cascade-engine`.

mod action;
mod condition;
mod error;
mod loader;
mod matcher;
mod rule;
mod service;
mod store;
mod template;

pub use action::{
    ActionKind, ActionPlanConfig, AuditEntryConfig, CampaignConfig, EnrollmentConfig, KpiConfig,
    NotificationConfig, RuleAction, TaskConfig, WebhookConfig,
};
pub use condition::{ConditionLogic, FieldPath, Operator, RuleCondition, RuleConditions};
pub use error::RuleError;
pub use loader::load_rules;
pub use matcher::{evaluate_candidates, event_context, matching_rules, rule_matches};
pub use rule::Rule;
pub use service::{RuleApiBuilder, RuleDocument, RuleResponse, RuleServiceConfig};
pub use store::{RuleHistoryEntry, RuleStore};
pub use template::{resolve_str, resolve_value, MissingTokenPolicy, TemplateError};
