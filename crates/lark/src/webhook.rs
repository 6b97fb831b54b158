//! Webhook transport: an HTTP route that acknowledges Lark immediately
//! and processes events on a detached task. Lark retries deliveries that
//! are not answered within its deadline, so the ack must never wait on
//! the reply pipeline.

use {
    async_trait::async_trait,
    http::{Method, StatusCode},
    serde_json::{Value, json},
    tracing::{debug, warn},
};

use volery_channels::http::{RouteHandler, RouteRequest, RouteResponse};

use crate::monitor::Dispatcher;

/// One registered webhook endpoint bound to an account.
pub struct LarkWebhookRoute {
    dispatcher:         Dispatcher,
    account_id:         String,
    verification_token: Option<String>,
}

impl LarkWebhookRoute {
    pub fn new(
        dispatcher: Dispatcher,
        account_id: String,
        verification_token: Option<String>,
    ) -> Self {
        LarkWebhookRoute { dispatcher, account_id, verification_token }
    }

    fn token_matches(&self, payload: &Value) -> bool {
        let Some(expected) = self.verification_token.as_deref() else {
            return true;
        };
        let supplied = payload
            .get("token")
            .or_else(|| payload.pointer("/header/token"))
            .and_then(Value::as_str);
        supplied == Some(expected)
    }
}

#[async_trait]
impl RouteHandler for LarkWebhookRoute {
    async fn handle(&self, req: RouteRequest) -> RouteResponse {
        if req.method == Method::GET {
            return RouteResponse::text(StatusCode::OK, "OK");
        }
        if req.method != Method::POST {
            return RouteResponse::json(
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "error": "Method Not Allowed" }).to_string(),
            )
                .with_header("allow", "GET, POST");
        }

        let payload: Value = match serde_json::from_slice(&req.body) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(account_id = %self.account_id, error = %err, "unreadable webhook payload");
                return RouteResponse::json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }).to_string(),
                );
            },
        };

        // URL verification handshake: echo the challenge, nothing else.
        if payload.get("challenge").is_some()
            || payload.get("type").and_then(Value::as_str) == Some("url_verification")
        {
            let body = match payload.get("challenge") {
                Some(challenge) => json!({ "challenge": challenge }),
                None => json!({}),
            };
            return RouteResponse::json(StatusCode::OK, body.to_string());
        }

        if payload.get("encrypt").is_some() {
            warn!(
                account_id = %self.account_id,
                "encrypted webhook payloads are not supported; clear encryptKey in the Lark console"
            );
            return RouteResponse::json(StatusCode::OK, json!({ "code": 0 }).to_string());
        }

        if !self.token_matches(&payload) {
            warn!(account_id = %self.account_id, "webhook verification token mismatch");
            return RouteResponse::json(StatusCode::OK, json!({ "code": 0 }).to_string());
        }

        // Ack now, process later; the task owns its own error boundary.
        let dispatcher = self.dispatcher.clone();
        let account_id = self.account_id.clone();
        tokio::spawn(async move {
            debug!(account_id = %account_id, "processing webhook event");
            dispatcher.dispatch(&account_id, payload).await;
        });
        RouteResponse::json(StatusCode::OK, json!({ "code": 0 }).to_string())
    }
}
