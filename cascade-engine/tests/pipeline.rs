//! End-to-end pipeline tests: publish -> match -> dispatch -> audit.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cascade_engine::{
    ActionHandler, ActionInvocation, Dispatcher, EngineRuntime, EventStore, ExecutionLog,
    HandlerRegistry, InMemoryEventStore, InMemoryExecutionLog,
};
use cascade_protocol::{
    ActionStatus, EventInput, ExecutionQuery, ExecutionStatus,
};
use cascade_rules::{ActionKind, Rule, RuleStore};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Records every resolved notification message it receives.
struct CapturingNotifier {
    calls: AtomicU32,
    messages: Mutex<Vec<String>>,
}

impl CapturingNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            messages: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ActionHandler for CapturingNotifier {
    async fn execute(&self, invocation: ActionInvocation) -> Result<Value, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let message = invocation.config["message"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        self.messages.lock().push(message);
        Ok(json!({"delivered": true}))
    }
}

fn overdue_rule() -> Rule {
    serde_json::from_value(json!({
        "name": "notify assignee when overdue",
        "trigger_event_types": ["action_overdue"],
        "conditions": {"logic": "and", "rules": [
            {"field": "payload.days_overdue", "operator": "gte", "value": 3},
        ]},
        "actions": [{
            "action_type": "send_notification",
            "config": {
                "title": "Overdue",
                "message": "User {{payload.assignee_user_id}} has an overdue action",
            },
        }],
    }))
    .expect("parse rule")
}

fn overdue_event(days: u32) -> EventInput {
    EventInput::builder("tenant-a", "action_overdue", "actions")
        .payload(json!({"days_overdue": days, "assignee_user_id": "u1"}))
        .build()
}

#[tokio::test]
async fn overdue_action_scenario_end_to_end() {
    let store = Arc::new(InMemoryEventStore::new());
    let log = InMemoryExecutionLog::new();
    let rules = RuleStore::new();
    let rule = rules
        .put_rule("tenant-a", overdue_rule(), None)
        .expect("store rule")
        .rule;

    let notifier = CapturingNotifier::new();
    let registry = HandlerRegistry::new();
    registry.register(ActionKind::SendNotification, notifier.clone());
    let dispatcher = Arc::new(Dispatcher::new(registry, Arc::new(log.clone())));

    let mut runtime = EngineRuntime::new(store.clone(), rules, dispatcher, Arc::new(log.clone()));
    runtime.start(2);
    let handle = runtime.handle();

    let event_id = handle.publish(overdue_event(5)).expect("publish event");
    // the publish acknowledgement covers durability only
    assert!(store.get(event_id).expect("query store").is_some());

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    runtime.shutdown().await;

    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        notifier.messages.lock().as_slice(),
        ["User u1 has an overdue action"]
    );

    let executions = log
        .list(&ExecutionQuery {
            rule_id: Some(rule.id),
            event_id: Some(event_id),
            ..ExecutionQuery::default()
        })
        .expect("list executions");
    assert_eq!(executions.len(), 1);
    assert!(executions[0].matched);
    assert_eq!(executions[0].status, ExecutionStatus::Completed);
    assert_eq!(
        executions[0].action_results[0].status,
        ActionStatus::Success
    );
}

#[tokio::test]
async fn non_matching_events_are_audited_but_fire_nothing() {
    let store = Arc::new(InMemoryEventStore::new());
    let log = InMemoryExecutionLog::new();
    let rules = RuleStore::new();
    rules
        .put_rule("tenant-a", overdue_rule(), None)
        .expect("store rule");

    let notifier = CapturingNotifier::new();
    let registry = HandlerRegistry::new();
    registry.register(ActionKind::SendNotification, notifier.clone());
    let dispatcher = Arc::new(Dispatcher::new(registry, Arc::new(log.clone())));

    let mut runtime = EngineRuntime::new(store, rules, dispatcher, Arc::new(log.clone()));
    runtime.start(1);
    let handle = runtime.handle();

    // below the days_overdue threshold: evaluated, recorded, not fired
    handle.publish(overdue_event(1)).expect("publish event");

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    runtime.shutdown().await;

    assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);

    let executions = log
        .list(&ExecutionQuery::default())
        .expect("list executions");
    assert_eq!(executions.len(), 1);
    assert!(!executions[0].matched);
    assert!(executions[0].action_results.is_empty());
}

#[tokio::test]
async fn re_dispatching_a_completed_execution_is_idempotent() {
    let log = InMemoryExecutionLog::new();
    let rules = RuleStore::new();
    let rule = rules
        .put_rule("tenant-a", overdue_rule(), None)
        .expect("store rule")
        .rule;

    let notifier = CapturingNotifier::new();
    let registry = HandlerRegistry::new();
    registry.register(ActionKind::SendNotification, notifier.clone());
    let dispatcher = Dispatcher::new(registry, Arc::new(log.clone()));

    let event = overdue_event(5).into_event();

    let first = dispatcher.dispatch(&rule, &event).await.expect("dispatch");
    assert_eq!(first.status, ExecutionStatus::Completed);

    // simulating a worker crash-and-retry after the record was written
    let second = dispatcher.dispatch(&rule, &event).await.expect("dispatch");
    assert_eq!(second.id, first.id);
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(log.len(), 1);
}
