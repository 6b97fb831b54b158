//! Per-account inbound monitors.
//!
//! A monitor owns one account's inbound transport (socket mode or a
//! registered webhook route) and pushes every message event through the
//! same pipeline: parse, gate, route, auto-reply, chunked threaded
//! delivery.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    serde_json::Value,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use {
    volery_auto_reply::{chunk::chunk_text, reply::AutoReply},
    volery_channels::{
        http::{self, HttpRouteRegistry},
        routing::{PeerKind, RouteResolver},
    },
    volery_common::types::{ChatType, MsgContext},
};

use crate::{
    CHANNEL_ID, MESSAGE_RECEIVE_EVENT, TEXT_CHUNK_LIMIT, access,
    accounts::{self, ResolvedAccount},
    config::Mode,
    context::LarkContext,
    error::{Credential, Error, Result},
    events::{self, ChatKind},
    send::{LarkSender, SendOptions},
    socket,
    webhook::LarkWebhookRoute,
};

const DEFAULT_WEBHOOK_PATH: &str = "/lark/webhook";
const APOLOGY_TEXT: &str = "Sorry, I encountered an error processing your message.";

/// Event-to-reply pipeline, shared by the socket loop and webhook routes.
#[derive(Clone)]
pub struct Dispatcher {
    ctx:        Arc<LarkContext>,
    sender:     Arc<LarkSender>,
    auto_reply: Arc<dyn AutoReply>,
    routes:     Arc<dyn RouteResolver>,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<LarkContext>,
        sender: Arc<LarkSender>,
        auto_reply: Arc<dyn AutoReply>,
        routes: Arc<dyn RouteResolver>,
    ) -> Self {
        Dispatcher { ctx, sender, auto_reply, routes }
    }

    pub(crate) fn context(&self) -> &Arc<LarkContext> {
        &self.ctx
    }

    /// Handle one raw event for an account. Never returns an error; every
    /// failure is logged and, where a chat is known, answered with an
    /// apology so the sender is not left hanging.
    pub async fn dispatch(&self, account_id: &str, event: Value) {
        let event = match events::parse_event(&event) {
            Ok(event) => event,
            Err(err) => {
                debug!(account_id, error = %err, "dropping unparseable event");
                return;
            },
        };
        if let Some(event_type) = event.event_type.as_deref() {
            if event_type != MESSAGE_RECEIVE_EVENT {
                debug!(account_id, event_type, "ignoring event type");
                return;
            }
        }
        let Some(inbound) = events::build_inbound_context(&event) else {
            return;
        };

        self.ctx.state.record_inbound(account_id);

        let cfg = self.ctx.config();
        let account = accounts::resolve_account(&cfg, Some(account_id));
        if let Err(denied) = access::check_access(&account.config, &inbound) {
            debug!(
                account_id,
                chat_id = %inbound.chat_id,
                sender = %inbound.sender_id,
                reason = %denied,
                "message blocked"
            );
            return;
        }

        let body = events::extract_text(&inbound.message_type, &inbound.raw_content);
        let peer_kind = match inbound.chat_kind {
            ChatKind::P2p => PeerKind::Dm,
            ChatKind::Group => PeerKind::Group,
        };
        let route = self
            .routes
            .resolve(CHANNEL_ID, account_id, peer_kind, &inbound.chat_id)
            .await;

        let msg = MsgContext {
            channel: CHANNEL_ID.to_string(),
            account_id: account_id.to_string(),
            from: inbound.chat_id.clone(),
            sender_name: None,
            body,
            chat_type: match inbound.chat_kind {
                ChatKind::P2p => ChatType::Dm,
                ChatKind::Group => ChatType::Group,
            },
            message_id: inbound.message_id.clone(),
            reply_to_id: Some(inbound.message_id.clone()),
            session_key: route.session_key,
        };

        let opts = SendOptions::account(account_id);
        let reply = match self.auto_reply.get_reply(&msg).await {
            Ok(reply) => reply,
            Err(err) => {
                error!(account_id, error = %err, "auto-reply failed");
                self.ctx.state.mark_error(account_id, &err.to_string());
                self.apologize(&inbound.chat_id, &opts).await;
                return;
            },
        };

        for chunk in chunk_text(&reply.text, TEXT_CHUNK_LIMIT) {
            let result = match reply.reply_to_id.as_deref() {
                Some(reply_to) => self.sender.reply_text(reply_to, &chunk, &opts).await,
                None => self.sender.send_text(&inbound.chat_id, &chunk, &opts).await,
            };
            if let Err(err) = result {
                error!(account_id, chat_id = %inbound.chat_id, error = %err, "reply delivery failed");
                self.ctx.state.mark_error(account_id, &err.to_string());
                self.apologize(&inbound.chat_id, &opts).await;
                return;
            }
        }
    }

    async fn apologize(&self, chat_id: &str, opts: &SendOptions) {
        if let Err(err) = self.sender.send_text(chat_id, APOLOGY_TEXT, opts).await {
            warn!(chat_id, error = %err, "failed to deliver apology");
        }
    }
}

struct MonitorHandle {
    cancel:       CancellationToken,
    webhook_path: Option<String>,
}

/// Starts and stops inbound transports per account.
pub struct LarkMonitor {
    dispatcher: Dispatcher,
    http:       Arc<HttpRouteRegistry>,
    handles:    RwLock<HashMap<String, MonitorHandle>>,
}

impl LarkMonitor {
    pub fn new(dispatcher: Dispatcher, http: Arc<HttpRouteRegistry>) -> Self {
        LarkMonitor { dispatcher, http, handles: RwLock::new(HashMap::new()) }
    }

    pub fn is_running(&self, account_id: &str) -> bool {
        let handles = self.handles.read().unwrap_or_else(|e| e.into_inner());
        handles.contains_key(account_id)
    }

    pub fn running_accounts(&self) -> Vec<String> {
        let handles = self.handles.read().unwrap_or_else(|e| e.into_inner());
        handles.keys().cloned().collect()
    }

    /// Start the inbound transport for one account.
    pub async fn start(&self, account_id: &str) -> Result<ResolvedAccount> {
        let account_id = accounts::normalize_account_id(Some(account_id));
        if self.is_running(&account_id) {
            return Err(Error::AlreadyRunning(account_id));
        }

        let ctx = self.dispatcher.context();
        let account = accounts::resolve_account(&ctx.config(), Some(&account_id));
        if account.app_id.is_empty() {
            return Err(Error::missing(&account_id, Credential::AppId));
        }
        if account.app_secret.is_empty() {
            return Err(Error::missing(&account_id, Credential::AppSecret));
        }

        let cancel = CancellationToken::new();
        let webhook_path = match account.config.mode {
            Mode::Websocket => {
                socket::spawn(self.dispatcher.clone(), account.clone(), cancel.clone());
                info!(account_id = %account_id, "socket monitor started");
                None
            },
            Mode::Webhook => {
                let path = http::normalize_path(
                    account.config.webhook_path.as_deref(),
                    DEFAULT_WEBHOOK_PATH,
                );
                let route = Arc::new(LarkWebhookRoute::new(
                    self.dispatcher.clone(),
                    account_id.clone(),
                    account.config.verification_token.clone(),
                ));
                self.http.register(&path, route)?;
                info!(account_id = %account_id, path = %path, "webhook route registered");
                Some(path)
            },
        };

        ctx.state.mark_started(&account_id);
        let mut handles = self.handles.write().unwrap_or_else(|e| e.into_inner());
        handles.insert(account_id, MonitorHandle { cancel, webhook_path });
        Ok(account)
    }

    /// Stop an account's transport. Returns whether it was running.
    pub fn stop(&self, account_id: &str) -> bool {
        let account_id = accounts::normalize_account_id(Some(account_id));
        let handle = {
            let mut handles = self.handles.write().unwrap_or_else(|e| e.into_inner());
            handles.remove(&account_id)
        };
        let Some(handle) = handle else {
            return false;
        };

        handle.cancel.cancel();
        if let Some(path) = &handle.webhook_path {
            self.http.unregister(path);
        }
        self.dispatcher.context().state.mark_stopped(&account_id);
        info!(account_id = %account_id, "monitor stopped");
        true
    }

    pub fn stop_all(&self) {
        for account_id in self.running_accounts() {
            self.stop(&account_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use volery_auto_reply::reply::EchoReply;
    use volery_channels::routing::StaticRouteResolver;

    use super::*;
    use crate::config::LarkConfig;

    fn dispatcher_for(cfg: LarkConfig, base_url: &str) -> Dispatcher {
        let ctx = LarkContext::with_base_url(cfg, base_url);
        let sender = Arc::new(LarkSender::new(Arc::clone(&ctx)));
        Dispatcher::new(
            ctx,
            sender,
            Arc::new(EchoReply),
            Arc::new(StaticRouteResolver::default()),
        )
    }

    fn open_config(app: bool) -> LarkConfig {
        let json = if app {
            r#"{"appId":"cli_x","appSecret":"s","dmPolicy":"open","groupPolicy":"open"}"#
        } else {
            r#"{"dmPolicy":"open","groupPolicy":"open"}"#
        };
        serde_json::from_str(json).unwrap()
    }

    fn message_event(chat_type: &str, text: &str) -> Value {
        json!({
            "event_type": "im.message.receive_v1",
            "message": {
                "message_id": "om_src",
                "chat_id": "oc_1",
                "chat_type": chat_type,
                "message_type": "text",
                "content": format!("{{\"text\":{}}}", serde_json::to_string(text).unwrap())
            },
            "sender": {
                "sender_type": "user",
                "sender_id": { "open_id": "ou_alice", "user_id": "alice" }
            }
        })
    }

    #[tokio::test]
    async fn dispatch_replies_in_thread() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/open-apis/auth/v3/tenant_access_token/internal")
            .with_body(r#"{"code":0,"tenant_access_token":"t","expire":7200}"#)
            .create_async()
            .await;
        let reply_mock = server
            .mock("POST", "/open-apis/im/v1/messages/om_src/reply")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"msg_type":"text"}"#.to_string(),
            ))
            .with_body(r#"{"code":0,"data":{"message_id":"om_reply"}}"#)
            .create_async()
            .await;

        let dispatcher = dispatcher_for(open_config(true), &server.url());
        dispatcher.dispatch("default", message_event("p2p", "hello")).await;
        reply_mock.assert_async().await;

        let state = dispatcher.context().state.get("default").unwrap();
        assert!(state.last_inbound_at.is_some());
        assert!(state.last_outbound_at.is_some());
    }

    #[tokio::test]
    async fn gated_messages_never_reach_the_network() {
        let server = mockito::Server::new_async().await;
        // Default policies: pairing DMs with an empty allowlist deny all.
        let cfg: LarkConfig =
            serde_json::from_str(r#"{"appId":"cli_x","appSecret":"s"}"#).unwrap();
        let dispatcher = dispatcher_for(cfg, &server.url());
        dispatcher.dispatch("default", message_event("p2p", "hi")).await;
        // No mocks were registered; any request would have failed loudly.
        assert!(dispatcher.context().state.get("default").unwrap().last_outbound_at.is_none());
    }

    #[tokio::test]
    async fn non_message_events_are_ignored() {
        let server = mockito::Server::new_async().await;
        let dispatcher = dispatcher_for(open_config(true), &server.url());
        dispatcher
            .dispatch("default", json!({ "event_type": "im.chat.updated_v1" }))
            .await;
        assert!(dispatcher.context().state.get("default").is_none());
    }

    #[tokio::test]
    async fn start_requires_credentials() {
        let server = mockito::Server::new_async().await;
        let dispatcher = dispatcher_for(open_config(false), &server.url());
        let monitor = LarkMonitor::new(dispatcher, Arc::new(HttpRouteRegistry::new()));
        let err = monitor.start("default").await.unwrap_err();
        assert!(matches!(err, Error::MissingCredential { .. }), "{err}");
        assert!(!monitor.is_running("default"));
    }

    #[tokio::test]
    async fn webhook_mode_registers_and_unregisters_route() {
        let server = mockito::Server::new_async().await;
        let mut cfg = open_config(true);
        cfg.mode = Some(Mode::Webhook);
        cfg.webhook_path = Some("hooks/lark/".into());
        let dispatcher = dispatcher_for(cfg, &server.url());
        let registry = Arc::new(HttpRouteRegistry::new());
        let monitor = LarkMonitor::new(dispatcher, Arc::clone(&registry));

        monitor.start("default").await.unwrap();
        assert!(monitor.is_running("default"));
        assert!(registry.get("/hooks/lark").is_some());

        // Second start of the same account is refused.
        assert!(matches!(
            monitor.start("default").await.unwrap_err(),
            Error::AlreadyRunning(_)
        ));

        assert!(monitor.stop("default"));
        assert!(registry.get("/hooks/lark").is_none());
        assert!(!monitor.stop("default"));
    }
}
