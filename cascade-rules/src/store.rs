use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RuleError;
use crate::rule::Rule;

/// Versioned history entry for a stored rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleHistoryEntry {
    pub version: u32,
    pub rule: Rule,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl RuleHistoryEntry {
    fn new(version: u32, rule: Rule, updated_by: Option<String>) -> Self {
        Self {
            version,
            rule,
            created_at: Utc::now(),
            updated_by,
        }
    }
}

#[derive(Default)]
struct TenantRules {
    rules: HashMap<Uuid, Vec<RuleHistoryEntry>>,
    // creation order, so matching processes rules deterministically
    order: Vec<Uuid>,
}

/// In-memory multi-tenant rule registry with version tracking.
///
/// Every update appends a new version; deactivation is a soft flag written as
/// a new version, never a hard delete, so execution history keeps resolving.
#[derive(Default, Clone)]
pub struct RuleStore {
    inner: Arc<RwLock<HashMap<String, TenantRules>>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the list of tenants currently tracked.
    pub fn tenants(&self) -> Vec<String> {
        let inner = self.inner.read();
        inner.keys().cloned().collect()
    }

    /// Returns the latest rule versions for the provided tenant in creation order.
    pub fn list_rules(&self, tenant: &str) -> Vec<RuleHistoryEntry> {
        let inner = self.inner.read();
        inner
            .get(tenant)
            .map(|rules| {
                rules
                    .order
                    .iter()
                    .filter_map(|id| rules.rules.get(id))
                    .filter_map(|versions| versions.last().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the full history for a specific rule.
    pub fn rule_history(&self, tenant: &str, rule_id: Uuid) -> Vec<RuleHistoryEntry> {
        let inner = self.inner.read();
        inner
            .get(tenant)
            .and_then(|rules| rules.rules.get(&rule_id).cloned())
            .unwrap_or_default()
    }

    /// Returns the latest version of a rule, if available.
    pub fn latest_rule(&self, tenant: &str, rule_id: Uuid) -> Option<RuleHistoryEntry> {
        let inner = self.inner.read();
        inner
            .get(tenant)
            .and_then(|rules| rules.rules.get(&rule_id))
            .and_then(|versions| versions.last().cloned())
    }

    /// Validates and inserts or updates a rule, returning the new history entry.
    pub fn put_rule(
        &self,
        tenant: &str,
        mut rule: Rule,
        updated_by: Option<String>,
    ) -> Result<RuleHistoryEntry, RuleError> {
        rule.validate()?;
        rule.tenant_id = tenant.to_string();
        rule.updated_at = Utc::now();

        let mut inner = self.inner.write();
        let tenant_rules = inner.entry(tenant.to_string()).or_default();

        let entry = tenant_rules.rules.entry(rule.id).or_default();
        if entry.is_empty() {
            tenant_rules.order.push(rule.id);
        }

        let version = entry.last().map(|last| last.version + 1).unwrap_or(1);
        let history_entry = RuleHistoryEntry::new(version, rule, updated_by);
        entry.push(history_entry.clone());
        Ok(history_entry)
    }

    /// Deactivates a rule by appending a new version with `is_active = false`.
    pub fn deactivate_rule(
        &self,
        tenant: &str,
        rule_id: Uuid,
        updated_by: Option<String>,
    ) -> Result<RuleHistoryEntry, RuleError> {
        let mut inner = self.inner.write();
        let tenant_rules = inner
            .get_mut(tenant)
            .ok_or_else(|| RuleError::NotFound(rule_id.to_string()))?;

        let history = tenant_rules
            .rules
            .get_mut(&rule_id)
            .ok_or_else(|| RuleError::NotFound(rule_id.to_string()))?;

        let latest = history
            .last()
            .cloned()
            .ok_or_else(|| RuleError::NotFound(rule_id.to_string()))?;

        if !latest.rule.is_active {
            return Ok(latest);
        }

        let mut deactivated = latest.rule.clone();
        deactivated.is_active = false;
        deactivated.updated_at = Utc::now();
        let entry = RuleHistoryEntry::new(latest.version + 1, deactivated, updated_by);
        history.push(entry.clone());
        Ok(entry)
    }

    /// Latest active rules for a tenant whose trigger set contains the given
    /// event type, in creation order. This is the matcher's candidate set.
    pub fn active_rules(&self, tenant: &str, event_type: &str) -> Vec<Rule> {
        self.list_rules(tenant)
            .into_iter()
            .map(|entry| entry.rule)
            .filter(|rule| rule.is_active() && rule.listens_to(event_type))
            .collect()
    }
}
