use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use cascade_protocol::{Event, EventInput, RuleExecution};
use cascade_rules::{evaluate_candidates, RuleStore};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::audit::ExecutionLog;
use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use crate::event_store::EventStore;
use crate::scheduler::EventScheduler;

/// Handle returned when the runtime is running, used to publish events.
#[derive(Clone)]
pub struct EngineHandle {
    scheduler: EventScheduler,
    store: Arc<dyn EventStore>,
    notify: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
}

impl EngineHandle {
    /// Durably appends the event and enqueues it for matching. Returns as
    /// soon as the append succeeds: the acknowledgement covers durability
    /// only, never downstream matching or dispatch outcome.
    pub fn publish(&self, input: EventInput) -> Result<Uuid, EngineError> {
        if self.shutting_down.load(Ordering::Relaxed) {
            return Err(EngineError::ShuttingDown);
        }

        let event = self.store.append(input)?;
        let event_id = event.id;
        self.scheduler.enqueue(event);
        self.notify.notify_one();
        Ok(event_id)
    }

    pub fn pending_events(&self) -> usize {
        self.scheduler.pending()
    }
}

/// Background consumer of the event store: a pool of workers that matches
/// queued events against the rule registry and dispatches matched rules.
pub struct EngineRuntime {
    scheduler: EventScheduler,
    store: Arc<dyn EventStore>,
    rules: RuleStore,
    dispatcher: Arc<Dispatcher>,
    log: Arc<dyn ExecutionLog>,
    notify: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl EngineRuntime {
    pub fn new(
        store: Arc<dyn EventStore>,
        rules: RuleStore,
        dispatcher: Arc<Dispatcher>,
        log: Arc<dyn ExecutionLog>,
    ) -> Self {
        Self {
            scheduler: EventScheduler::new(),
            store,
            rules,
            dispatcher,
            log,
            notify: Arc::new(Notify::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            scheduler: self.scheduler.clone(),
            store: self.store.clone(),
            notify: self.notify.clone(),
            shutting_down: self.shutting_down.clone(),
        }
    }

    pub fn start(&mut self, worker_count: usize) {
        let worker_count = worker_count.max(1);
        for worker_index in 0..worker_count {
            let scheduler = self.scheduler.clone();
            let rules = self.rules.clone();
            let dispatcher = self.dispatcher.clone();
            let log = self.log.clone();
            let notify = self.notify.clone();
            let shutting_down = self.shutting_down.clone();

            let handle = tokio::spawn(async move {
                worker_loop(
                    worker_index,
                    scheduler,
                    rules,
                    dispatcher,
                    log,
                    notify,
                    shutting_down,
                )
                .await;
            });

            self.workers.push(handle);
        }
    }

    pub async fn shutdown(self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        self.notify.notify_waiters();
        for handle in self.workers {
            if let Err(err) = handle.await {
                error!("worker crashed: {:?}", err);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_index: usize,
    scheduler: EventScheduler,
    rules: RuleStore,
    dispatcher: Arc<Dispatcher>,
    log: Arc<dyn ExecutionLog>,
    notify: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
) {
    loop {
        if shutting_down.load(Ordering::Relaxed) {
            break;
        }

        let event = loop {
            if let Some(event) = scheduler.next_event() {
                break event;
            }

            if shutting_down.load(Ordering::Relaxed) {
                return;
            }

            notify.notified().await;
        };

        info!(worker = worker_index, event_id = %event.id, tenant = %event.tenant_id, event_type = %event.event_type, "matching event");
        process_event(&event, &rules, &dispatcher, &log).await;
    }
}

/// Matches one event against the registry snapshot taken at this moment and
/// dispatches each matched rule. Every evaluated rule is recorded, matched or
/// not; per-rule failures are contained so one rule cannot abort the batch.
async fn process_event(
    event: &Event,
    rules: &RuleStore,
    dispatcher: &Dispatcher,
    log: &Arc<dyn ExecutionLog>,
) {
    for (rule, matched) in evaluate_candidates(rules, event) {
        if !matched {
            let record = RuleExecution::not_matched(rule.id, event.id, &event.tenant_id);
            if let Err(err) = log.record(record) {
                error!(rule_id = %rule.id, event_id = %event.id, %err, "failed to record non-match");
            }
            continue;
        }

        match dispatcher.dispatch(&rule, event).await {
            Ok(execution) => {
                info!(
                    rule_id = %rule.id,
                    event_id = %event.id,
                    status = ?execution.status,
                    actions = execution.action_results.len(),
                    "rule dispatched",
                );
            }
            Err(err) => {
                // the event is already durable; a log failure here is loud,
                // never silent
                error!(rule_id = %rule.id, event_id = %event.id, %err, "dispatch failed");
            }
        }
    }
}
