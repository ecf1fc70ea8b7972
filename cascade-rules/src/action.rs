use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminant for an action, used to key the handler registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendNotification,
    EnrollInCourse,
    CreateActionPlan,
    UpdateKpi,
    TriggerCampaign,
    CreateTask,
    CallWebhook,
    RecordAuditEntry,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SendNotification => "send_notification",
            ActionKind::EnrollInCourse => "enroll_in_course",
            ActionKind::CreateActionPlan => "create_action_plan",
            ActionKind::UpdateKpi => "update_kpi",
            ActionKind::TriggerCampaign => "trigger_campaign",
            ActionKind::CreateTask => "create_task",
            ActionKind::CallWebhook => "call_webhook",
            ActionKind::RecordAuditEntry => "record_audit_entry",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action attached to a rule, with a strongly-typed configuration per kind.
///
/// Unknown action types fail deserialization, so malformed rules are rejected
/// when saved instead of surfacing at dispatch time. String config fields may
/// carry `{{path}}` template tokens resolved from the firing event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action_type", content = "config", rename_all = "snake_case")]
pub enum RuleAction {
    SendNotification(NotificationConfig),
    EnrollInCourse(EnrollmentConfig),
    CreateActionPlan(ActionPlanConfig),
    UpdateKpi(KpiConfig),
    TriggerCampaign(CampaignConfig),
    CreateTask(TaskConfig),
    CallWebhook(WebhookConfig),
    RecordAuditEntry(AuditEntryConfig),
}

impl RuleAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            RuleAction::SendNotification(_) => ActionKind::SendNotification,
            RuleAction::EnrollInCourse(_) => ActionKind::EnrollInCourse,
            RuleAction::CreateActionPlan(_) => ActionKind::CreateActionPlan,
            RuleAction::UpdateKpi(_) => ActionKind::UpdateKpi,
            RuleAction::TriggerCampaign(_) => ActionKind::TriggerCampaign,
            RuleAction::CreateTask(_) => ActionKind::CreateTask,
            RuleAction::CallWebhook(_) => ActionKind::CallWebhook,
            RuleAction::RecordAuditEntry(_) => ActionKind::RecordAuditEntry,
        }
    }

    /// Serializes only the configuration object, the shape handed to the
    /// template resolver and then to the action handler.
    pub fn config_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            RuleAction::SendNotification(config) => serde_json::to_value(config),
            RuleAction::EnrollInCourse(config) => serde_json::to_value(config),
            RuleAction::CreateActionPlan(config) => serde_json::to_value(config),
            RuleAction::UpdateKpi(config) => serde_json::to_value(config),
            RuleAction::TriggerCampaign(config) => serde_json::to_value(config),
            RuleAction::CreateTask(config) => serde_json::to_value(config),
            RuleAction::CallWebhook(config) => serde_json::to_value(config),
            RuleAction::RecordAuditEntry(config) => serde_json::to_value(config),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NotificationConfig {
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrollmentConfig {
    pub course_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionPlanConfig {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KpiConfig {
    pub kpi_id: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignConfig {
    pub campaign_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_days: Option<u32>,
}

fn default_method() -> String {
    "POST".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntryConfig {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_tagged_action_document() {
        let action: RuleAction = serde_json::from_value(json!({
            "action_type": "send_notification",
            "config": {
                "title": "Overdue",
                "message": "User {{payload.assignee_user_id}} has an overdue action",
            },
        }))
        .expect("parse action");

        assert_eq!(action.kind(), ActionKind::SendNotification);
        let config = action.config_value().expect("serialize config");
        assert_eq!(config["title"], json!("Overdue"));
    }

    #[test]
    fn rejects_unknown_action_type_at_parse_time() {
        let result: Result<RuleAction, _> = serde_json::from_value(json!({
            "action_type": "launch_rocket",
            "config": {},
        }));
        assert!(result.is_err());
    }

    #[test]
    fn webhook_method_defaults_to_post() {
        let action: RuleAction = serde_json::from_value(json!({
            "action_type": "call_webhook",
            "config": {"url": "https://example.test/hook"},
        }))
        .expect("parse webhook action");

        match action {
            RuleAction::CallWebhook(config) => assert_eq!(config.method, "POST"),
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
