//! Outbound message delivery.

use std::sync::Arc;

use {serde_json::json, tracing::debug};

use crate::{
    accounts,
    client::{ImageType, LarkClient, ReceiveIdType, SentMessage},
    context::LarkContext,
    error::{Credential, Error, Result},
};

/// Prefixes accepted on recipient IDs; exactly one is stripped.
const TARGET_PREFIXES: [&str; 3] = ["lark:chat:", "lark:user:", "lark:"];

/// Overrides for a single send. Explicit credentials win over the
/// resolved account's.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub account_id: Option<String>,
    pub app_id:     Option<String>,
    pub app_secret: Option<String>,
}

impl SendOptions {
    pub fn account(account_id: &str) -> Self {
        SendOptions { account_id: Some(account_id.to_string()), ..SendOptions::default() }
    }
}

#[derive(Debug, Clone)]
pub struct SendResult {
    pub message_id: String,
    pub chat_id:    String,
}

fn strip_prefix_ci<'a>(target: &'a str, prefix: &str) -> Option<&'a str> {
    match target.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&target[prefix.len()..]),
        _ => None,
    }
}

/// Strip one channel-address prefix (`lark:chat:`, `lark:user:`, or
/// `lark:`, case-insensitive) and reject empty recipients.
pub fn normalize_target(to: &str) -> Result<String> {
    let trimmed = to.trim();
    let stripped = TARGET_PREFIXES
        .iter()
        .find_map(|prefix| strip_prefix_ci(trimmed, prefix))
        .unwrap_or(trimmed)
        .trim();
    if stripped.is_empty() {
        return Err(Error::InvalidRecipient);
    }
    Ok(stripped.to_string())
}

/// Sends messages on behalf of resolved accounts, recording outbound
/// activity on success.
pub struct LarkSender {
    ctx: Arc<LarkContext>,
}

impl LarkSender {
    pub fn new(ctx: Arc<LarkContext>) -> Self {
        LarkSender { ctx }
    }

    fn resolve_client(&self, opts: &SendOptions) -> Result<(String, Arc<LarkClient>)> {
        let cfg = self.ctx.config();
        let account = accounts::resolve_account(&cfg, opts.account_id.as_deref());

        let explicit = |value: &Option<String>| {
            value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
        };
        let app_id = explicit(&opts.app_id).unwrap_or_else(|| account.app_id.clone());
        let app_secret = explicit(&opts.app_secret).unwrap_or_else(|| account.app_secret.clone());

        if app_id.is_empty() {
            return Err(Error::missing(&account.account_id, Credential::AppId));
        }
        if app_secret.is_empty() {
            return Err(Error::missing(&account.account_id, Credential::AppSecret));
        }

        let client = self.ctx.cache.get(&app_id, &app_secret, account.config.domain, false)?;
        Ok((account.account_id, client))
    }

    async fn create(
        &self,
        to: &str,
        msg_type: &str,
        content: String,
        opts: &SendOptions,
    ) -> Result<SendResult> {
        let (account_id, client) = self.resolve_client(opts)?;
        let target = normalize_target(to)?;
        let receive_id_type = ReceiveIdType::classify(&target);

        debug!(account_id = %account_id, target = %target, msg_type, "sending message");
        let sent = client.create_message(receive_id_type, &target, msg_type, &content).await?;
        self.ctx.state.record_outbound(&account_id);
        Ok(finish(sent, &target))
    }

    pub async fn send_text(&self, to: &str, text: &str, opts: &SendOptions) -> Result<SendResult> {
        self.create(to, "text", json!({ "text": text.trim() }).to_string(), opts).await
    }

    /// Send an already-uploaded image by its key.
    pub async fn send_image(
        &self,
        to: &str,
        image_key: &str,
        opts: &SendOptions,
    ) -> Result<SendResult> {
        self.create(to, "image", json!({ "image_key": image_key }).to_string(), opts).await
    }

    /// Send an interactive card payload as-is.
    pub async fn send_card(
        &self,
        to: &str,
        card: &serde_json::Value,
        opts: &SendOptions,
    ) -> Result<SendResult> {
        self.create(to, "interactive", card.to_string(), opts).await
    }

    /// Send rich text. The payload is wrapped under the `zh_cn` locale
    /// the way the message API expects.
    pub async fn send_post(
        &self,
        to: &str,
        post: &serde_json::Value,
        opts: &SendOptions,
    ) -> Result<SendResult> {
        self.create(to, "post", json!({ "zh_cn": post }).to_string(), opts).await
    }

    /// Reply in-thread to an existing message.
    pub async fn reply_text(
        &self,
        message_id: &str,
        text: &str,
        opts: &SendOptions,
    ) -> Result<SendResult> {
        let (account_id, client) = self.resolve_client(opts)?;
        let content = json!({ "text": text }).to_string();
        let sent = client.reply_message(message_id, "text", &content).await?;
        self.ctx.state.record_outbound(&account_id);
        Ok(finish(sent, message_id))
    }

    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        image_type: ImageType,
        opts: &SendOptions,
    ) -> Result<String> {
        let (_, client) = self.resolve_client(opts)?;
        client.upload_image(bytes, image_type).await
    }
}

fn finish(sent: SentMessage, fallback_id: &str) -> SendResult {
    SendResult {
        message_id: sent.message_id.unwrap_or_default(),
        chat_id:    sent.chat_id.unwrap_or_else(|| fallback_id.to_string()),
    }
}
