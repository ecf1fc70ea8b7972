use std::sync::Arc;

use cascade_protocol::{ExecutionQuery, RuleExecution};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::EngineError;

/// Durable record of rule firings and action outcomes, for audit and the
/// rule tester. Append-only; retention is an external concern.
pub trait ExecutionLog: Send + Sync + 'static {
    fn record(&self, execution: RuleExecution) -> Result<(), EngineError>;

    /// Most recent execution for a `(rule_id, event_id)` pair, used by the
    /// dispatcher's idempotent re-dispatch check.
    fn latest_for(
        &self,
        rule_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<RuleExecution>, EngineError>;

    fn list(&self, query: &ExecutionQuery) -> Result<Vec<RuleExecution>, EngineError>;
}

/// In-memory reference implementation of the execution log.
#[derive(Default, Clone)]
pub struct InMemoryExecutionLog {
    entries: Arc<RwLock<Vec<RuleExecution>>>,
}

impl InMemoryExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ExecutionLog for InMemoryExecutionLog {
    fn record(&self, execution: RuleExecution) -> Result<(), EngineError> {
        self.entries.write().push(execution);
        Ok(())
    }

    fn latest_for(
        &self,
        rule_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<RuleExecution>, EngineError> {
        Ok(self
            .entries
            .read()
            .iter()
            .rev()
            .find(|entry| entry.rule_id == rule_id && entry.event_id == event_id)
            .cloned())
    }

    fn list(&self, query: &ExecutionQuery) -> Result<Vec<RuleExecution>, EngineError> {
        let entries = self.entries.read();
        let filtered = entries
            .iter()
            .filter(|entry| {
                query
                    .tenant_id
                    .as_ref()
                    .map_or(true, |tenant| &entry.tenant_id == tenant)
            })
            .filter(|entry| query.rule_id.map_or(true, |id| entry.rule_id == id))
            .filter(|entry| query.event_id.map_or(true, |id| entry.event_id == id))
            .filter(|entry| !query.matched_only || entry.matched)
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(filtered)
    }
}
