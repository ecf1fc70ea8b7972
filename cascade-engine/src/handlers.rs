use async_trait::async_trait;
use cascade_rules::WebhookConfig;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::dispatcher::{ActionHandler, ActionInvocation, RetryPolicy};

/// Generic HTTP action handler for `call_webhook` actions.
///
/// Issues a request to the configured `url` with the configured `method`,
/// serializing the resolved config (or its explicit `body` override) as the
/// JSON request body. Webhook deliveries are inherently transient, so the
/// handler opts into the dispatcher's backoff retries.
#[derive(Clone, Default)]
pub struct WebhookHandler {
    http: reqwest::Client,
}

impl WebhookHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActionHandler for WebhookHandler {
    async fn execute(&self, invocation: ActionInvocation) -> Result<Value, String> {
        let config: WebhookConfig = serde_json::from_value(invocation.config.clone())
            .map_err(|err| format!("invalid webhook config: {err}"))?;

        let url = Url::parse(&config.url).map_err(|err| format!("invalid webhook url: {err}"))?;
        let method = reqwest::Method::from_bytes(config.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| format!("invalid webhook method: {}", config.method))?;

        let body = config.body.clone().unwrap_or(invocation.config);

        let mut request = self.http.request(method, url).json(&body);
        for (name, value) in &config.headers {
            request = request.header(name, value);
        }

        debug!(url = %config.url, event_id = %invocation.event_id, "delivering webhook");

        let response = request
            .send()
            .await
            .map_err(|err| format!("webhook request failed: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("webhook returned status {status}"));
        }

        Ok(json!({ "status": status.as_u16() }))
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::transient()
    }
}
