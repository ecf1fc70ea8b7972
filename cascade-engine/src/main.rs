use std::sync::Arc;

use anyhow::Context;
use cascade_core::config::load_core_config;
use cascade_engine::{
    EngineApiBuilder, EngineServiceConfig, HandlerRegistry, InMemoryEventStore,
    InMemoryExecutionLog, WebhookHandler,
};
use cascade_rules::{load_rules, ActionKind, RuleApiBuilder, RuleServiceConfig, RuleStore};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(err) = cascade_core::logging::init_tracing(None) {
        eprintln!("failed to initialise tracing: {err}");
    }

    let config = load_core_config().context("failed to load configuration")?;
    info!(node = %config.node_name, env = ?config.environment, "starting cascade");

    let rules = RuleStore::new();
    if let Ok(path) = std::env::var("CASCADE_RULES_PATH") {
        let loaded = load_rules(&path).context("failed to load rule pack")?;
        for rule in loaded {
            let tenant = rule.tenant_id.clone();
            if tenant.is_empty() {
                warn!(rule = %rule.name, "skipping rule without tenant_id");
                continue;
            }
            rules.put_rule(&tenant, rule, None)?;
        }
        info!(%path, "loaded rule pack");
    }

    let registry = HandlerRegistry::new();
    registry.register(ActionKind::CallWebhook, Arc::new(WebhookHandler::new()));

    let rules_shutdown = RuleApiBuilder::new(rules.clone())
        .serve(RuleServiceConfig {
            bind_address: config
                .rules_http_bind
                .clone()
                .unwrap_or_else(|| "0.0.0.0:8081".to_string()),
        })
        .await
        .context("failed to start rule management service")?;

    let store = Arc::new(InMemoryEventStore::new());
    let log = Arc::new(InMemoryExecutionLog::new());
    let engine_shutdown = EngineApiBuilder::new(store, rules, registry, log)
        .serve(EngineServiceConfig {
            bind_address: config
                .engine_http_bind
                .clone()
                .unwrap_or_else(|| "0.0.0.0:8090".to_string()),
            workers: config.worker_count,
            action_timeout_secs: config.action_timeout_secs,
        })
        .await
        .context("failed to start engine service")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    let _ = rules_shutdown.send(());
    let _ = engine_shutdown.send(());

    Ok(())
}
