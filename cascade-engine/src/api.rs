use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use cascade_protocol::{Event, EventInput, ExecutionQuery, RuleExecution};
use cascade_rules::{Rule, RuleStore};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::info;
use uuid::Uuid;

use crate::audit::ExecutionLog;
use crate::dispatcher::{Dispatcher, DispatcherConfig, HandlerRegistry};
use crate::error::EngineError;
use crate::event_store::EventStore;
use crate::runtime::{EngineHandle, EngineRuntime};

/// Configuration for the engine ingestion/audit API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineServiceConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_worker_count")]
    pub workers: usize,
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0:8090".to_string()
}

fn default_worker_count() -> usize {
    2
}

fn default_action_timeout_secs() -> u64 {
    10
}

impl Default for EngineServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            workers: default_worker_count(),
            action_timeout_secs: default_action_timeout_secs(),
        }
    }
}

#[derive(Clone)]
struct EngineApiState {
    handle: EngineHandle,
    store: Arc<dyn EventStore>,
    log: Arc<dyn ExecutionLog>,
    dispatcher: Arc<Dispatcher>,
}

/// Builder to bootstrap the engine service: worker runtime plus HTTP API.
pub struct EngineApiBuilder {
    store: Arc<dyn EventStore>,
    rules: RuleStore,
    registry: HandlerRegistry,
    log: Arc<dyn ExecutionLog>,
}

impl EngineApiBuilder {
    pub fn new(
        store: Arc<dyn EventStore>,
        rules: RuleStore,
        registry: HandlerRegistry,
        log: Arc<dyn ExecutionLog>,
    ) -> Self {
        Self {
            store,
            rules,
            registry,
            log,
        }
    }

    fn build_router(state: EngineApiState) -> Router {
        Router::new()
            .route("/health", get(health))
            .route(
                "/tenants/:tenant/events",
                get(list_events).post(publish_event),
            )
            .route("/events/:event_id", get(get_event))
            .route("/tenants/:tenant/executions", get(list_executions))
            .route("/tenants/:tenant/rules/test", post(test_rule))
            .with_state(state)
    }

    pub async fn serve(self, config: EngineServiceConfig) -> anyhow::Result<oneshot::Sender<()>> {
        let dispatcher = Arc::new(Dispatcher::with_config(
            self.registry,
            self.log.clone(),
            DispatcherConfig {
                action_timeout: Duration::from_secs(config.action_timeout_secs),
            },
        ));

        let mut runtime = EngineRuntime::new(
            self.store.clone(),
            self.rules,
            dispatcher.clone(),
            self.log.clone(),
        );
        runtime.start(config.workers);

        let state = EngineApiState {
            handle: runtime.handle(),
            store: self.store,
            log: self.log,
            dispatcher,
        };

        let router = Self::build_router(state);
        let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            info!(address = %config.bind_address, "starting engine service");
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
                .ok();
            runtime.shutdown().await;
        });

        Ok(tx)
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn engine_error(err: EngineError) -> ApiError {
    let (status, code) = match &err {
        EngineError::InvalidEvent(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_event"),
        EngineError::EventNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        EngineError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
        EngineError::StoreFailure(_) | EngineError::LogFailure(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "storage_failure")
        }
    };
    (
        status,
        Json(ErrorResponse {
            code: code.into(),
            message: err.to_string(),
        }),
    )
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct PublishResponse {
    event_id: Uuid,
}

async fn publish_event(
    State(state): State<EngineApiState>,
    Path(tenant): Path<String>,
    Json(mut input): Json<EventInput>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    if !input.tenant_id.is_empty() && input.tenant_id != tenant {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                code: "tenant_mismatch".into(),
                message: "tenant identifier mismatch".into(),
            }),
        ));
    }
    input.tenant_id = tenant;

    let event_id = state.handle.publish(input).map_err(engine_error)?;
    Ok((StatusCode::CREATED, Json(PublishResponse { event_id })))
}

#[derive(Debug, Deserialize)]
struct ListEventsParams {
    #[serde(default = "default_event_limit")]
    limit: usize,
}

fn default_event_limit() -> usize {
    50
}

async fn list_events(
    State(state): State<EngineApiState>,
    Path(tenant): Path<String>,
    Query(params): Query<ListEventsParams>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let events = state
        .store
        .list(&tenant, params.limit)
        .map_err(engine_error)?;
    Ok(Json(events))
}

async fn get_event(
    State(state): State<EngineApiState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Event>, ApiError> {
    state
        .store
        .get(event_id)
        .map_err(engine_error)?
        .map(Json)
        .ok_or_else(|| engine_error(EngineError::EventNotFound(event_id.to_string())))
}

#[derive(Debug, Deserialize)]
struct ExecutionQueryParams {
    #[serde(default)]
    rule_id: Option<Uuid>,
    #[serde(default)]
    event_id: Option<Uuid>,
    #[serde(default)]
    matched_only: bool,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

async fn list_executions(
    State(state): State<EngineApiState>,
    Path(tenant): Path<String>,
    Query(params): Query<ExecutionQueryParams>,
) -> Result<Json<Vec<RuleExecution>>, ApiError> {
    let query = ExecutionQuery {
        tenant_id: Some(tenant),
        rule_id: params.rule_id,
        event_id: params.event_id,
        matched_only: params.matched_only,
        limit: params.limit,
        offset: params.offset,
    };
    let executions = state.log.list(&query).map_err(engine_error)?;
    Ok(Json(executions))
}

/// Dry-run payload for the rule tester: a rule document and a sample event.
#[derive(Debug, Deserialize)]
struct TestRuleRequest {
    rule: Rule,
    event: EventInput,
}

async fn test_rule(
    State(state): State<EngineApiState>,
    Path(tenant): Path<String>,
    Json(payload): Json<TestRuleRequest>,
) -> Result<Json<RuleExecution>, ApiError> {
    let mut rule = payload.rule;
    rule.tenant_id = tenant.clone();
    rule.validate().map_err(|err| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                code: "invalid_rule".into(),
                message: err.to_string(),
            }),
        )
    })?;

    let mut input = payload.event;
    input.tenant_id = tenant;
    // the sample event is synthesized for the dry run, never stored
    let event = input.into_event();

    let execution = state.dispatcher.dispatch_dry_run(&rule, &event).await;
    Ok(Json(execution))
}
