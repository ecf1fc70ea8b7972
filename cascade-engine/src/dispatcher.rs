use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cascade_protocol::{ActionResult, ActionStatus, Event, ExecutionStatus, RuleExecution};
use cascade_rules::{event_context, resolve_value, ActionKind, Rule, RuleAction};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::audit::ExecutionLog;
use crate::error::EngineError;

/// Resolved action handed to a handler: the action kind plus its config with
/// all `{{path}}` tokens already substituted from the firing event.
#[derive(Debug, Clone)]
pub struct ActionInvocation {
    pub kind: ActionKind,
    pub config: Value,
    pub tenant_id: String,
    pub rule_id: Uuid,
    pub event_id: Uuid,
}

/// Bounded exponential backoff applied between attempts of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// No retries. The default for handlers whose failures are not transient.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Default policy for inherently transient operations such as webhooks.
    pub fn transient() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Pluggable side-effecting implementation for one action type.
///
/// Handlers are expected to be idempotent with respect to repeated identical
/// invocations; the dispatcher additionally consults the execution log to
/// avoid re-invoking actions that already succeeded.
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    async fn execute(&self, invocation: ActionInvocation) -> Result<Value, String>;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }
}

/// Registry mapping action kinds to their handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<ActionKind, Arc<dyn ActionHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: ActionKind, handler: Arc<dyn ActionHandler>) {
        self.handlers.write().insert(kind, handler);
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.read().get(&kind).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound for one handler invocation, distinct from retry backoff.
    pub action_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(10),
        }
    }
}

/// Executes a matched rule's actions in declared order, isolating failures
/// per action and recording the outcome in the execution log.
#[derive(Clone)]
pub struct Dispatcher {
    registry: HandlerRegistry,
    log: Arc<dyn ExecutionLog>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry, log: Arc<dyn ExecutionLog>) -> Self {
        Self::with_config(registry, log, DispatcherConfig::default())
    }

    pub fn with_config(
        registry: HandlerRegistry,
        log: Arc<dyn ExecutionLog>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry,
            log,
            config,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Dispatches a matched rule against an event and records the execution.
    ///
    /// Safe to re-invoke for the same `(rule_id, event_id)` pair: a prior
    /// completed execution is returned as-is, and actions that already
    /// succeeded in a prior partial execution are reused instead of re-run.
    pub async fn dispatch(&self, rule: &Rule, event: &Event) -> Result<RuleExecution, EngineError> {
        let prior = self.log.latest_for(rule.id, event.id)?;
        if let Some(prior) = &prior {
            if prior.matched && prior.status == ExecutionStatus::Completed {
                debug!(rule_id = %rule.id, event_id = %event.id, "execution already completed");
                return Ok(prior.clone());
            }
        }

        let context = event_context(event);
        let mut execution = RuleExecution::begin(rule.id, event.id, &event.tenant_id);
        execution.matched = true;
        execution.status = ExecutionStatus::Running;

        for (index, action) in rule.actions.iter().enumerate() {
            if let Some(done) = prior_success(prior.as_ref(), index, action) {
                execution.action_results.push(done);
                continue;
            }

            let result = self.run_action(rule, event, action, &context).await;
            if result.status != ActionStatus::Success {
                warn!(
                    rule_id = %rule.id,
                    event_id = %event.id,
                    action = %action.kind(),
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "action did not succeed",
                );
            }
            execution.action_results.push(result);
        }

        execution.finish();
        self.log.record(execution.clone())?;
        Ok(execution)
    }

    /// Dry-runs a rule against a sample event without side effects: matching
    /// and template resolution run for real, but every action is executed
    /// against a stub and nothing is written to the execution log.
    pub async fn dispatch_dry_run(&self, rule: &Rule, event: &Event) -> RuleExecution {
        let context = event_context(event);
        if !cascade_rules::rule_matches(rule, event, &context) {
            return RuleExecution::not_matched(rule.id, event.id, &event.tenant_id);
        }

        let mut execution = RuleExecution::begin(rule.id, event.id, &event.tenant_id);
        execution.matched = true;
        execution.status = ExecutionStatus::Running;

        for action in &rule.actions {
            let kind = action.kind();
            let result = match self.resolve_config(rule, action, &context) {
                Ok(resolved) => ActionResult::success(kind.as_str(), Some(resolved)),
                Err(result) => result,
            };
            execution.action_results.push(result);
        }

        execution.finish();
        execution
    }

    fn resolve_config(
        &self,
        rule: &Rule,
        action: &RuleAction,
        context: &Value,
    ) -> Result<Value, ActionResult> {
        let kind = action.kind();
        let config = action
            .config_value()
            .map_err(|err| ActionResult::failure(kind.as_str(), err.to_string()))?;
        resolve_value(&config, context, rule.template_policy)
            .map_err(|err| ActionResult::failure(kind.as_str(), err.to_string()))
    }

    async fn run_action(
        &self,
        rule: &Rule,
        event: &Event,
        action: &RuleAction,
        context: &Value,
    ) -> ActionResult {
        let start = Instant::now();
        let kind = action.kind();

        let resolved = match self.resolve_config(rule, action, context) {
            Ok(resolved) => resolved,
            Err(result) => return result.with_duration(start.elapsed().as_millis() as i64),
        };

        let handler = match self.registry.get(kind) {
            Some(handler) => handler,
            None => {
                return ActionResult::skipped(
                    kind.as_str(),
                    format!("no handler registered for action type {kind}"),
                )
            }
        };

        let invocation = ActionInvocation {
            kind,
            config: resolved,
            tenant_id: event.tenant_id.clone(),
            rule_id: rule.id,
            event_id: event.id,
        };

        let policy = handler.retry_policy();
        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;
            let outcome =
                tokio::time::timeout(self.config.action_timeout, handler.execute(invocation.clone()))
                    .await;

            let error = match outcome {
                Ok(Ok(output)) => {
                    return ActionResult::success(kind.as_str(), Some(output))
                        .with_attempts(attempt)
                        .with_duration(start.elapsed().as_millis() as i64)
                }
                Ok(Err(error)) => error,
                Err(_) => format!(
                    "action timed out after {}ms",
                    self.config.action_timeout.as_millis()
                ),
            };

            if attempt >= policy.max_attempts.max(1) {
                break error;
            }

            debug!(action = %kind, attempt, error = %error, "retrying action");
            tokio::time::sleep(policy.delay_after(attempt)).await;
        };

        ActionResult::failure(kind.as_str(), last_error)
            .with_attempts(attempt)
            .with_duration(start.elapsed().as_millis() as i64)
    }
}

/// A previously succeeded action at the same position is reused verbatim so
/// re-dispatch after a partial failure never duplicates its side effects.
fn prior_success(
    prior: Option<&RuleExecution>,
    index: usize,
    action: &RuleAction,
) -> Option<ActionResult> {
    let result = prior?.action_results.get(index)?;
    if result.status == ActionStatus::Success && result.action_type == action.kind().as_str() {
        Some(result.clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryExecutionLog;
    use cascade_protocol::EventInput;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        calls: Arc<AtomicU32>,
        fail_first: u32,
        policy: RetryPolicy,
    }

    impl CountingHandler {
        fn succeeding(calls: Arc<AtomicU32>) -> Self {
            Self {
                calls,
                fail_first: 0,
                policy: RetryPolicy::none(),
            }
        }

        fn failing(calls: Arc<AtomicU32>) -> Self {
            Self {
                calls,
                fail_first: u32::MAX,
                policy: RetryPolicy::none(),
            }
        }
    }

    #[async_trait]
    impl ActionHandler for CountingHandler {
        async fn execute(&self, invocation: ActionInvocation) -> Result<Value, String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                Err(format!("induced failure on call {call}"))
            } else {
                Ok(json!({"handled": invocation.kind.as_str()}))
            }
        }

        fn retry_policy(&self) -> RetryPolicy {
            self.policy
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl ActionHandler for SlowHandler {
        async fn execute(&self, _invocation: ActionInvocation) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Value::Null)
        }
    }

    fn overdue_event() -> Event {
        EventInput::builder("tenant-a", "action_overdue", "actions")
            .payload(json!({"days_overdue": 5, "assignee_user_id": "u1"}))
            .build()
            .into_event()
    }

    fn rule_with_actions(actions: Value) -> Rule {
        serde_json::from_value(json!({
            "name": "test rule",
            "trigger_event_types": ["action_overdue"],
            "actions": actions,
        }))
        .expect("parse rule")
    }

    fn webhook_then_notification() -> Rule {
        rule_with_actions(json!([
            {"action_type": "call_webhook", "config": {"url": "https://example.test/hook"}},
            {"action_type": "send_notification", "config": {"title": "t", "message": "m"}},
        ]))
    }

    fn dispatcher(registry: HandlerRegistry) -> (Dispatcher, InMemoryExecutionLog) {
        let log = InMemoryExecutionLog::new();
        let dispatcher = Dispatcher::new(registry, Arc::new(log.clone()));
        (dispatcher, log)
    }

    #[tokio::test]
    async fn one_failing_action_does_not_block_siblings() {
        let registry = HandlerRegistry::new();
        let webhook_calls = Arc::new(AtomicU32::new(0));
        let notify_calls = Arc::new(AtomicU32::new(0));
        registry.register(
            ActionKind::CallWebhook,
            Arc::new(CountingHandler::failing(webhook_calls.clone())),
        );
        registry.register(
            ActionKind::SendNotification,
            Arc::new(CountingHandler::succeeding(notify_calls.clone())),
        );

        let (dispatcher, log) = dispatcher(registry);
        let execution = dispatcher
            .dispatch(&webhook_then_notification(), &overdue_event())
            .await
            .expect("dispatch");

        assert_eq!(execution.status, ExecutionStatus::PartiallyFailed);
        assert_eq!(execution.action_results[0].status, ActionStatus::Failed);
        assert_eq!(execution.action_results[1].status, ActionStatus::Success);
        assert_eq!(notify_calls.load(Ordering::SeqCst), 1);
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn unregistered_action_type_is_skipped_not_fatal() {
        let registry = HandlerRegistry::new();
        let notify_calls = Arc::new(AtomicU32::new(0));
        registry.register(
            ActionKind::SendNotification,
            Arc::new(CountingHandler::succeeding(notify_calls)),
        );

        let (dispatcher, _log) = dispatcher(registry);
        let execution = dispatcher
            .dispatch(&webhook_then_notification(), &overdue_event())
            .await
            .expect("dispatch");

        assert_eq!(execution.action_results[0].status, ActionStatus::Skipped);
        assert!(execution.action_results[0]
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("no handler registered"));
        assert_eq!(execution.action_results[1].status, ActionStatus::Success);
        assert_eq!(execution.status, ExecutionStatus::PartiallyFailed);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_with_backoff() {
        let registry = HandlerRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        registry.register(
            ActionKind::CallWebhook,
            Arc::new(CountingHandler {
                calls: calls.clone(),
                fail_first: 2,
                policy: RetryPolicy {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(4),
                },
            }),
        );

        let rule = rule_with_actions(json!([
            {"action_type": "call_webhook", "config": {"url": "https://example.test/hook"}},
        ]));
        let (dispatcher, _log) = dispatcher(registry);
        let execution = dispatcher
            .dispatch(&rule, &overdue_event())
            .await
            .expect("dispatch");

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.action_results[0].attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_mark_the_action_failed() {
        let registry = HandlerRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        registry.register(
            ActionKind::CallWebhook,
            Arc::new(CountingHandler {
                calls: calls.clone(),
                fail_first: u32::MAX,
                policy: RetryPolicy {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(4),
                },
            }),
        );

        let rule = rule_with_actions(json!([
            {"action_type": "call_webhook", "config": {"url": "https://example.test/hook"}},
        ]));
        let (dispatcher, _log) = dispatcher(registry);
        let execution = dispatcher
            .dispatch(&rule, &overdue_event())
            .await
            .expect("dispatch");

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stuck_handler_is_abandoned_at_the_timeout() {
        let registry = HandlerRegistry::new();
        registry.register(ActionKind::SendNotification, Arc::new(SlowHandler));

        let rule = rule_with_actions(json!([
            {"action_type": "send_notification", "config": {"title": "t", "message": "m"}},
        ]));
        let log = InMemoryExecutionLog::new();
        let dispatcher = Dispatcher::with_config(
            registry,
            Arc::new(log),
            DispatcherConfig {
                action_timeout: Duration::from_millis(20),
            },
        );

        let execution = dispatcher
            .dispatch(&rule, &overdue_event())
            .await
            .expect("dispatch");
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.action_results[0]
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn completed_execution_is_not_re_dispatched() {
        let registry = HandlerRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        registry.register(
            ActionKind::SendNotification,
            Arc::new(CountingHandler::succeeding(calls.clone())),
        );

        let rule = rule_with_actions(json!([
            {"action_type": "send_notification", "config": {"title": "t", "message": "m"}},
        ]));
        let event = overdue_event();
        let (dispatcher, log) = dispatcher(registry);

        let first = dispatcher.dispatch(&rule, &event).await.expect("dispatch");
        let second = dispatcher.dispatch(&rule, &event).await.expect("dispatch");

        assert_eq!(first.id, second.id);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn re_dispatch_after_partial_failure_reuses_succeeded_actions() {
        let registry = HandlerRegistry::new();
        let notify_calls = Arc::new(AtomicU32::new(0));
        let webhook_calls = Arc::new(AtomicU32::new(0));
        registry.register(
            ActionKind::SendNotification,
            Arc::new(CountingHandler::succeeding(notify_calls.clone())),
        );
        registry.register(
            ActionKind::CallWebhook,
            Arc::new(CountingHandler {
                calls: webhook_calls.clone(),
                fail_first: 1,
                policy: RetryPolicy::none(),
            }),
        );

        let rule = rule_with_actions(json!([
            {"action_type": "send_notification", "config": {"title": "t", "message": "m"}},
            {"action_type": "call_webhook", "config": {"url": "https://example.test/hook"}},
        ]));
        let event = overdue_event();
        let (dispatcher, _log) = dispatcher(registry);

        let first = dispatcher.dispatch(&rule, &event).await.expect("dispatch");
        assert_eq!(first.status, ExecutionStatus::PartiallyFailed);

        let second = dispatcher.dispatch(&rule, &event).await.expect("dispatch");
        assert_eq!(second.status, ExecutionStatus::Completed);
        // the notification succeeded the first time and is never re-invoked
        assert_eq!(notify_calls.load(Ordering::SeqCst), 1);
        assert_eq!(webhook_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fail_policy_blocks_the_action_before_the_handler_runs() {
        let registry = HandlerRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        registry.register(
            ActionKind::SendNotification,
            Arc::new(CountingHandler::succeeding(calls.clone())),
        );

        let mut rule = rule_with_actions(json!([
            {"action_type": "send_notification",
             "config": {"title": "t", "message": "{{payload.not_a_field}}"}},
        ]));
        rule.template_policy = cascade_rules::MissingTokenPolicy::Fail;

        let (dispatcher, _log) = dispatcher(registry);
        let execution = dispatcher
            .dispatch(&rule, &overdue_event())
            .await
            .expect("dispatch");

        assert_eq!(execution.action_results[0].status, ActionStatus::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dry_run_resolves_templates_without_side_effects() {
        let registry = HandlerRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        registry.register(
            ActionKind::SendNotification,
            Arc::new(CountingHandler::succeeding(calls.clone())),
        );

        let rule = rule_with_actions(json!([
            {"action_type": "send_notification",
             "config": {"title": "Overdue",
                        "message": "User {{payload.assignee_user_id}} has an overdue action"}},
        ]));
        let (dispatcher, log) = dispatcher(registry);

        let execution = dispatcher.dispatch_dry_run(&rule, &overdue_event()).await;
        assert_eq!(execution.status, ExecutionStatus::Completed);
        let output = execution.action_results[0]
            .output
            .as_ref()
            .expect("resolved config");
        assert_eq!(output["message"], json!("User u1 has an overdue action"));
        // stubbed: the real handler never ran and nothing was recorded
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn dry_run_reports_non_matching_rules() {
        let mut rule = webhook_then_notification();
        rule.trigger_event_types = ["survey_completed".to_string()].into_iter().collect();

        let (dispatcher, _log) = dispatcher(HandlerRegistry::new());
        let execution = dispatcher.dispatch_dry_run(&rule, &overdue_event()).await;
        assert!(!execution.matched);
        assert!(execution.action_results.is_empty());
    }
}
