//! Webhook action.
//!
//! POSTs a JSON payload describing the trigger to a configured
//! endpoint. When a shared secret is configured the payload is signed
//! with HMAC-SHA256 and the signature sent in `X-Vigil-Signature`, so
//! receivers can verify origin.

use crate::executor::{ActionContext, ActionError};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, instrument};
use vg_rules::WebhookParams;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "X-Vigil-Signature";

/// Dispatches webhook notifications for triggered rules.
pub struct WebhookAction {
    client: reqwest::Client,
    secret: Option<String>,
}

impl WebhookAction {
    /// Creates the action with its own HTTP client bounded by `timeout`.
    pub fn new(secret: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, secret }
    }

    fn sign(&self, body: &[u8]) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(body);
        Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }

    /// Sends the payload. A non-success response maps to a `Partial`
    /// outcome upstream; transport failures map to `Failed`.
    #[instrument(skip(self, params, context), fields(rule_id = %context.rule_id))]
    pub async fn execute(
        &self,
        params: &WebhookParams,
        context: &ActionContext,
    ) -> Result<String, ActionError> {
        let mut payload = serde_json::json!({
            "rule_id": context.rule_id,
            "rule_name": context.rule_name,
            "incident_id": context.incident_id,
            "event_id": context.event.id,
            "severity": context.event.severity,
            "timestamp": context.event.timestamp,
        });
        if params.include_event {
            payload["event"] = serde_json::to_value(&context.event)
                .map_err(|e| ActionError::Http(e.to_string()))?;
        }
        let body = serde_json::to_vec(&payload)
            .map_err(|e| ActionError::Http(e.to_string()))?;

        let mut request = self
            .client
            .post(&params.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.clone());
        if let Some(signature) = self.sign(&body) {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ActionError::Http(e.to_string()))?;

        let status = response.status();
        debug!(url = %params.url, status = status.as_u16(), "webhook dispatched");
        if status.is_success() {
            Ok(format!("webhook delivered to {} ({status})", params.url))
        } else {
            Err(ActionError::HttpStatus(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_hmac() {
        let action = WebhookAction::new(Some("secret".to_string()), Duration::from_secs(5));
        let sig = action.sign(b"payload").unwrap();
        assert!(sig.starts_with("sha256="));
        // Same body, same signature.
        assert_eq!(sig, action.sign(b"payload").unwrap());
        // Different body, different signature.
        assert_ne!(sig, action.sign(b"other").unwrap());
    }

    #[test]
    fn no_secret_means_no_signature() {
        let action = WebhookAction::new(None, Duration::from_secs(5));
        assert!(action.sign(b"payload").is_none());
    }
}
