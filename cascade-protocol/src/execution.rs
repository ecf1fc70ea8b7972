use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Outcome of a single action within one rule firing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Failed,
    Skipped,
}

/// Lifecycle of a rule execution record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    /// Every action succeeded (or the rule did not match and nothing ran).
    Completed,
    /// At least one action succeeded and at least one failed or was skipped.
    PartiallyFailed,
    /// Every action failed or was skipped.
    Failed,
}

/// Per-action outcome recorded by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub action_type: String,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl ActionResult {
    pub fn success(action_type: impl Into<String>, output: Option<Value>) -> Self {
        Self {
            action_type: action_type.into(),
            status: ActionStatus::Success,
            error: None,
            duration_ms: 0,
            attempts: 1,
            output,
        }
    }

    pub fn failure(action_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            status: ActionStatus::Failed,
            error: Some(error.into()),
            duration_ms: 0,
            attempts: 1,
            output: None,
        }
    }

    pub fn skipped(action_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            status: ActionStatus::Skipped,
            error: Some(error.into()),
            duration_ms: 0,
            attempts: 0,
            output: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Audit record of one rule's evaluation and dispatch attempt against one event.
///
/// One record is written per rule evaluated, including non-matches, so the
/// rule tester can explain why a rule did or did not fire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleExecution {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub event_id: Uuid,
    pub tenant_id: String,
    pub matched: bool,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub action_results: Vec<ActionResult>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RuleExecution {
    /// Creates a fresh record in the pending state.
    pub fn begin(rule_id: Uuid, event_id: Uuid, tenant_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id,
            event_id,
            tenant_id: tenant_id.into(),
            matched: false,
            status: ExecutionStatus::Pending,
            action_results: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Record for a rule that was evaluated but did not match the event.
    pub fn not_matched(rule_id: Uuid, event_id: Uuid, tenant_id: impl Into<String>) -> Self {
        let mut execution = Self::begin(rule_id, event_id, tenant_id);
        execution.status = ExecutionStatus::Completed;
        execution.finished_at = Some(Utc::now());
        execution
    }

    /// Derives the final status from the per-action results and stamps the
    /// finish time.
    pub fn finish(&mut self) {
        let succeeded = self
            .action_results
            .iter()
            .filter(|result| result.status == ActionStatus::Success)
            .count();
        let total = self.action_results.len();

        self.status = if total == 0 || succeeded == total {
            ExecutionStatus::Completed
        } else if succeeded > 0 {
            ExecutionStatus::PartiallyFailed
        } else {
            ExecutionStatus::Failed
        };
        self.finished_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Filters accepted by the audit query interface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionQuery {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub rule_id: Option<Uuid>,
    #[serde(default)]
    pub event_id: Option<Uuid>,
    #[serde(default)]
    pub matched_only: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}
