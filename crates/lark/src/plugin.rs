//! The `ChannelPlugin` surface the gateway drives, plus the account
//! management operations exposed to config commands.

use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    tracing::{info, warn},
};

use {
    volery_auto_reply::reply::AutoReply,
    volery_channels::{
        http::HttpRouteRegistry,
        plugin::{ChannelHealthSnapshot, ChannelOutbound, ChannelPlugin, ChannelStatus},
        routing::RouteResolver,
    },
};

use crate::{
    CHANNEL_ID,
    accounts::{self, TokenSource},
    config::{self, LarkConfig, LogoutOutcome, SetupInput},
    context::LarkContext,
    error,
    monitor::{Dispatcher, LarkMonitor},
    probe,
    send::{LarkSender, SendOptions},
    state::RuntimeState,
};

/// Lark channel plugin. One instance serves every configured account.
pub struct LarkPlugin {
    ctx:      Arc<LarkContext>,
    monitor:  Arc<LarkMonitor>,
    outbound: LarkOutbound,
}

impl LarkPlugin {
    pub fn new(
        config: LarkConfig,
        auto_reply: Arc<dyn AutoReply>,
        routes: Arc<dyn RouteResolver>,
        http: Arc<HttpRouteRegistry>,
    ) -> Self {
        Self::from_parts(LarkContext::new(config), auto_reply, routes, http)
    }

    /// Assemble a plugin around an existing context. Lets embedders (and
    /// tests) share the context's state store and client cache.
    pub fn from_parts(
        ctx: Arc<LarkContext>,
        auto_reply: Arc<dyn AutoReply>,
        routes: Arc<dyn RouteResolver>,
        http: Arc<HttpRouteRegistry>,
    ) -> Self {
        let sender = Arc::new(LarkSender::new(Arc::clone(&ctx)));
        let dispatcher =
            Dispatcher::new(Arc::clone(&ctx), Arc::clone(&sender), auto_reply, routes);
        LarkPlugin {
            ctx,
            monitor: Arc::new(LarkMonitor::new(dispatcher, http)),
            outbound: LarkOutbound { sender },
        }
    }

    pub fn config(&self) -> LarkConfig {
        self.ctx.config()
    }

    pub fn list_accounts(&self) -> Vec<String> {
        accounts::list_account_ids(&self.ctx.config())
    }

    pub fn default_account_id(&self) -> String {
        accounts::resolve_default_account_id(&self.ctx.config())
    }

    pub fn runtime_state(&self, account_id: &str) -> Option<RuntimeState> {
        self.ctx.state.get(&accounts::normalize_account_id(Some(account_id)))
    }

    /// Validate and store credentials for an account, enabling it.
    pub fn setup_account(&self, account_id: &str, input: &SetupInput) -> error::Result<()> {
        let account_id = accounts::normalize_account_id(Some(account_id));
        let mut result = Ok(());
        self.ctx.mutate_config(|cfg| {
            result = config::apply_account_credentials(cfg, &account_id, input);
        });
        if result.is_ok() {
            self.ctx.cache.clear_all();
        }
        result
    }

    pub fn set_account_enabled(&self, account_id: &str, enabled: bool) {
        let account_id = accounts::normalize_account_id(Some(account_id));
        self.ctx.mutate_config(|cfg| config::set_account_enabled(cfg, &account_id, enabled));
    }

    pub fn set_account_name(&self, account_id: &str, name: &str) {
        let account_id = accounts::normalize_account_id(Some(account_id));
        self.ctx.mutate_config(|cfg| config::set_account_name(cfg, &account_id, name));
    }

    /// Delete a named account, stopping it first if running.
    pub fn delete_account(&self, account_id: &str) -> bool {
        let account_id = accounts::normalize_account_id(Some(account_id));
        self.monitor.stop(&account_id);
        let mut deleted = false;
        self.ctx.mutate_config(|cfg| deleted = config::delete_account(cfg, &account_id));
        if deleted {
            self.ctx.cache.clear_all();
        }
        deleted
    }

    /// Clear stored credentials, stop the account, and drop its client.
    pub fn logout_account(&self, account_id: &str) -> LogoutOutcome {
        let account_id = accounts::normalize_account_id(Some(account_id));
        self.monitor.stop(&account_id);
        let mut outcome = LogoutOutcome { cleared: false, env_credentials: false };
        self.ctx.mutate_config(|cfg| {
            outcome = config::logout_account(cfg, &account_id, &|key| std::env::var(key).ok());
        });
        self.ctx.cache.clear_all();
        if outcome.env_credentials {
            warn!(
                account_id = %account_id,
                "environment credentials still present; unset LARK_APP_ID / LARK_APP_SECRET to fully log out"
            );
        }
        outcome
    }
}

#[async_trait]
impl ChannelPlugin for LarkPlugin {
    fn id(&self) -> &str {
        CHANNEL_ID
    }

    fn name(&self) -> &str {
        "Lark"
    }

    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()> {
        if !config.is_null() {
            let parsed: LarkConfig = serde_json::from_value(config)?;
            self.ctx.update_config(parsed);
        }
        let account = self.monitor.start(account_id).await?;

        // Probe in the background so startup is never blocked on the API.
        let label = account.name.clone().unwrap_or_else(|| account.app_id.clone());
        let (app_id, app_secret, domain) =
            (account.app_id, account.app_secret, account.config.domain);
        let account_id = account.account_id;
        tokio::spawn(async move {
            let result =
                probe::probe(&app_id, &app_secret, domain, probe::DEFAULT_PROBE_TIMEOUT).await;
            match result.error {
                None => info!(account_id = %account_id, label = %label, "lark account ready"),
                Some(error) => {
                    warn!(account_id = %account_id, error = %error, "lark credential probe failed");
                },
            }
        });
        Ok(())
    }

    async fn stop_account(&mut self, account_id: &str) -> Result<()> {
        self.monitor.stop(account_id);
        Ok(())
    }

    fn outbound(&self) -> Option<&dyn ChannelOutbound> {
        Some(&self.outbound)
    }

    fn status(&self) -> Option<&dyn ChannelStatus> {
        Some(self)
    }
}

#[async_trait]
impl ChannelStatus for LarkPlugin {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealthSnapshot> {
        let account_id = accounts::normalize_account_id(Some(account_id));
        let account = accounts::resolve_account(&self.ctx.config(), Some(&account_id));
        let result = probe::probe(
            &account.app_id,
            &account.app_secret,
            account.config.domain,
            probe::DEFAULT_PROBE_TIMEOUT,
        )
        .await;

        let running = self.monitor.is_running(&account_id);
        let details = match (&result.error, &result.bot) {
            (Some(error), _) => Some(error.clone()),
            (None, Some(bot)) => Some(format!(
                "app {} (credentials from {})",
                bot.app_name,
                match account.token_source {
                    TokenSource::Config => "config",
                    TokenSource::File => "file",
                    TokenSource::Env => "env",
                    TokenSource::None => "nowhere",
                }
            )),
            (None, None) => None,
        };
        Ok(ChannelHealthSnapshot { connected: result.ok && running, account_id, details })
    }
}

/// Outbound adapter handed to the gateway's send paths.
pub struct LarkOutbound {
    sender: Arc<LarkSender>,
}

#[async_trait]
impl ChannelOutbound for LarkOutbound {
    async fn send_text(&self, account_id: &str, to: &str, text: &str) -> Result<()> {
        self.sender.send_text(to, text, &SendOptions::account(account_id)).await?;
        Ok(())
    }

    async fn send_media(
        &self,
        account_id: &str,
        to: &str,
        text: &str,
        media_url: Option<&str>,
    ) -> Result<()> {
        // No native URL attachment on Lark without an upload pass; append
        // the link to the text instead.
        let body = match media_url {
            Some(url) if !url.is_empty() => {
                if text.is_empty() {
                    url.to_string()
                } else {
                    format!("{text}\n\n{url}")
                }
            },
            _ => text.to_string(),
        };
        self.sender.send_text(to, &body, &SendOptions::account(account_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use volery_auto_reply::reply::EchoReply;
    use volery_channels::routing::StaticRouteResolver;

    use super::*;

    fn plugin(cfg: &str) -> LarkPlugin {
        let config: LarkConfig = serde_json::from_str(cfg).unwrap();
        LarkPlugin::new(
            config,
            Arc::new(EchoReply),
            Arc::new(StaticRouteResolver::default()),
            Arc::new(HttpRouteRegistry::new()),
        )
    }

    #[test]
    fn identity() {
        let plugin = plugin("{}");
        assert_eq!(plugin.id(), "lark");
        assert_eq!(plugin.name(), "Lark");
        assert!(plugin.outbound().is_some());
        assert!(plugin.status().is_some());
    }

    #[tokio::test]
    async fn start_without_credentials_fails() {
        let mut plugin = plugin("{}");
        let err = plugin.start_account("default", serde_json::Value::Null).await.unwrap_err();
        assert!(err.to_string().contains("App ID"), "{err}");
    }

    #[tokio::test]
    async fn start_accepts_inline_config() {
        let mut plugin = plugin("{}");
        // Webhook mode avoids touching the network on start.
        let cfg = serde_json::json!({
            "appId": "cli_x", "appSecret": "s", "mode": "webhook"
        });
        plugin.start_account("default", cfg).await.unwrap();
        assert!(plugin.runtime_state("default").unwrap().running);
        plugin.stop_account("default").await.unwrap();
        assert!(!plugin.runtime_state("default").unwrap().running);
    }

    #[test]
    fn setup_then_account_management() {
        let plugin = plugin("{}");
        let input = SetupInput {
            app_id: Some("cli_work".into()),
            app_secret: Some("s".into()),
            name: Some("Work".into()),
            ..SetupInput::default()
        };
        plugin.setup_account(" Work ", &input).unwrap();
        assert_eq!(plugin.list_accounts(), vec!["work"]);
        assert_eq!(plugin.default_account_id(), "work");

        plugin.set_account_enabled("work", false);
        assert!(!accounts::resolve_account(&plugin.config(), Some("work")).enabled);

        assert!(plugin.delete_account("work"));
        assert!(plugin.list_accounts().is_empty());
    }

    #[test]
    fn setup_rejects_incomplete_credentials() {
        let plugin = plugin("{}");
        let input = SetupInput { app_id: Some("cli_x".into()), ..SetupInput::default() };
        assert!(plugin.setup_account("default", &input).is_err());
        // Nothing was stored.
        assert!(plugin.config().app_id.is_none());
    }

    #[test]
    fn logout_clears_credentials() {
        let plugin = plugin(r#"{"appId":"cli_x","appSecret":"s"}"#);
        let outcome = plugin.logout_account("default");
        assert!(outcome.cleared);
        assert!(plugin.config().app_id.is_none());
    }
}
