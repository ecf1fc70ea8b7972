use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::info;
use uuid::Uuid;

use crate::error::RuleError;
use crate::rule::Rule;
use crate::store::{RuleHistoryEntry, RuleStore};

/// Rule document accepted by the management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(default)]
    pub tenant_id: String,
    pub rule: Rule,
    #[serde(default)]
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResponse {
    pub version: u32,
    pub rule: Rule,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_by: Option<String>,
}

impl From<RuleHistoryEntry> for RuleResponse {
    fn from(value: RuleHistoryEntry) -> Self {
        Self {
            version: value.version,
            rule: value.rule,
            created_at: value.created_at,
            updated_by: value.updated_by,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
}

#[derive(Clone)]
struct RuleServiceState {
    store: RuleStore,
}

/// Configuration for the rule management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleServiceConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_bind_address() -> String {
    "0.0.0.0:8081".to_string()
}

impl Default for RuleServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Helper used by services to compose the rule management REST API router.
#[derive(Clone)]
pub struct RuleApiBuilder {
    state: RuleServiceState,
}

impl RuleApiBuilder {
    pub fn new(store: RuleStore) -> Self {
        Self {
            state: RuleServiceState { store },
        }
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/tenants", get(list_tenants))
            .route("/tenants/:tenant/rules", get(list_rules).post(upsert_rule))
            .route(
                "/tenants/:tenant/rules/:rule_id",
                get(get_rule).put(deactivate_rule),
            )
            .route("/tenants/:tenant/rules/:rule_id/history", get(rule_history))
            .with_state(self.state)
    }

    /// Spawns an HTTP server binding to the configured address.
    pub async fn serve(self, config: RuleServiceConfig) -> anyhow::Result<oneshot::Sender<()>> {
        let (tx, rx) = oneshot::channel();
        let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
        let state = self.state.clone();

        tokio::spawn(async move {
            info!(address = %config.bind_address, "starting rule management service");
            let app = RuleApiBuilder { state }.into_router();
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
                .ok();
        });

        Ok(tx)
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_tenants(State(state): State<RuleServiceState>) -> impl IntoResponse {
    Json(state.store.tenants())
}

async fn list_rules(
    State(state): State<RuleServiceState>,
    Path(tenant): Path<String>,
) -> impl IntoResponse {
    let response: Vec<RuleResponse> = state
        .store
        .list_rules(&tenant)
        .into_iter()
        .map(RuleResponse::from)
        .collect();
    Json(response)
}

async fn get_rule(
    State(state): State<RuleServiceState>,
    Path((tenant, rule_id)): Path<(String, Uuid)>,
) -> Result<Json<RuleResponse>, (StatusCode, Json<ErrorResponse>)> {
    state
        .store
        .latest_rule(&tenant, rule_id)
        .map(RuleResponse::from)
        .map(Json)
        .ok_or_else(|| rule_not_found(rule_id))
}

async fn rule_history(
    State(state): State<RuleServiceState>,
    Path((tenant, rule_id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<RuleResponse>>, (StatusCode, Json<ErrorResponse>)> {
    let history = state.store.rule_history(&tenant, rule_id);
    if history.is_empty() {
        return Err(rule_not_found(rule_id));
    }
    Ok(Json(history.into_iter().map(RuleResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
struct DeactivateRequest {
    #[serde(default)]
    updated_by: Option<String>,
}

async fn deactivate_rule(
    State(state): State<RuleServiceState>,
    Path((tenant, rule_id)): Path<(String, Uuid)>,
    Json(payload): Json<DeactivateRequest>,
) -> Result<Json<RuleResponse>, (StatusCode, Json<ErrorResponse>)> {
    let entry = state
        .store
        .deactivate_rule(&tenant, rule_id, payload.updated_by)
        .map(RuleResponse::from)
        .map(Json)
        .map_err(|_| rule_not_found(rule_id))?;
    Ok(entry)
}

async fn upsert_rule(
    State(state): State<RuleServiceState>,
    Path(tenant): Path<String>,
    Json(payload): Json<RuleDocument>,
) -> Result<Json<RuleResponse>, (StatusCode, Json<ErrorResponse>)> {
    if !payload.tenant_id.is_empty() && payload.tenant_id != tenant {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                code: "tenant_mismatch".into(),
                message: "tenant identifier mismatch".into(),
            }),
        ));
    }

    let entry = state
        .store
        .put_rule(&tenant, payload.rule, payload.updated_by)
        .map_err(invalid_rule)?;
    Ok(Json(entry.into()))
}

fn invalid_rule(err: RuleError) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            code: "invalid_rule".into(),
            message: err.to_string(),
        }),
    )
}

fn rule_not_found(id: Uuid) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            code: "not_found".into(),
            message: format!("rule {} not found", id),
        }),
    )
}
