//! Credential probing for status output. A probe is diagnostic only: it
//! reports failure as data and never returns an error.

use std::time::Duration;

use {serde::Deserialize, serde_json::json, tracing::debug};

use crate::config::LarkDomain;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct BotInfo {
    pub app_name: String,
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub ok:    bool,
    pub bot:   Option<BotInfo>,
    pub error: Option<String>,
}

impl ProbeResult {
    fn failure(error: impl Into<String>) -> Self {
        ProbeResult { ok: false, bot: None, error: Some(error.into()) }
    }
}

#[derive(Debug, Deserialize)]
struct TokenProbeResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg:  String,
}

/// Verify a credential pair by requesting a tenant token.
pub async fn probe(
    app_id: &str,
    app_secret: &str,
    domain: LarkDomain,
    timeout: Duration,
) -> ProbeResult {
    probe_at(domain.base_url(), app_id, app_secret, timeout).await
}

pub(crate) async fn probe_at(
    base_url: &str,
    app_id: &str,
    app_secret: &str,
    timeout: Duration,
) -> ProbeResult {
    let app_id = app_id.trim();
    let app_secret = app_secret.trim();
    if app_id.is_empty() {
        return ProbeResult::failure("App ID not configured");
    }
    if app_secret.is_empty() {
        return ProbeResult::failure("App secret not configured");
    }

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(err) => return ProbeResult::failure(err.to_string()),
    };
    let url = format!(
        "{}/open-apis/auth/v3/tenant_access_token/internal",
        base_url.trim_end_matches('/')
    );
    let request = client
        .post(&url)
        .json(&json!({ "app_id": app_id, "app_secret": app_secret }))
        .send();

    let response = match tokio::time::timeout(timeout, request).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => return ProbeResult::failure(err.to_string()),
        Err(_) => return ProbeResult::failure("timeout"),
    };
    let parsed: TokenProbeResponse = match response.json().await {
        Ok(parsed) => parsed,
        Err(err) => return ProbeResult::failure(err.to_string()),
    };

    if parsed.code != 0 {
        let error = if parsed.msg.is_empty() {
            format!("API error: {}", parsed.code)
        } else {
            parsed.msg
        };
        return ProbeResult::failure(error);
    }

    debug!(app_id, "credential probe succeeded");
    // The token endpoint does not return app metadata; the App ID doubles
    // as the display name.
    ProbeResult { ok: true, bot: Some(BotInfo { app_name: app_id.to_string() }), error: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn short_circuits_on_missing_credentials() {
        let result = probe_at("http://unused.invalid", "", "s", DEFAULT_PROBE_TIMEOUT).await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("App ID not configured"));

        let result = probe_at("http://unused.invalid", "cli_x", "  ", DEFAULT_PROBE_TIMEOUT).await;
        assert_eq!(result.error.as_deref(), Some("App secret not configured"));
    }

    #[tokio::test]
    async fn reports_valid_credentials() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/open-apis/auth/v3/tenant_access_token/internal")
            .with_body(r#"{"code":0,"tenant_access_token":"t","expire":7200}"#)
            .create_async()
            .await;

        let result = probe_at(&server.url(), "cli_x", "s", DEFAULT_PROBE_TIMEOUT).await;
        assert!(result.ok);
        assert_eq!(result.bot.unwrap().app_name, "cli_x");
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn reports_api_rejection_without_erroring() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/open-apis/auth/v3/tenant_access_token/internal")
            .with_body(r#"{"code":10003,"msg":"invalid app_secret"}"#)
            .create_async()
            .await;

        let result = probe_at(&server.url(), "cli_x", "bad", DEFAULT_PROBE_TIMEOUT).await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("invalid app_secret"));
    }

    #[tokio::test]
    async fn network_failure_is_data_not_error() {
        // Nothing listens on this port; connection is refused.
        let result =
            probe_at("http://127.0.0.1:1", "cli_x", "s", Duration::from_secs(1)).await;
        assert!(!result.ok);
        assert!(result.error.is_some());
    }
}
