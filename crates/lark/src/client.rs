//! Thin Lark open-API client with tenant token caching.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    serde::Deserialize,
    serde_json::json,
    tokio::sync::RwLock as AsyncRwLock,
    tracing::debug,
};

use crate::{
    config::LarkDomain,
    error::{Error, Result},
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Refresh the tenant token this many seconds before Lark expires it.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// How Lark should interpret the `receive_id` of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveIdType {
    ChatId,
    OpenId,
    UnionId,
}

impl ReceiveIdType {
    /// Classify a normalized target by its ID prefix. Unknown prefixes are
    /// treated as open IDs, matching how Lark hands sender IDs to bots.
    pub fn classify(target: &str) -> Self {
        if target.starts_with("oc_") {
            ReceiveIdType::ChatId
        } else if target.starts_with("on_") {
            ReceiveIdType::UnionId
        } else {
            ReceiveIdType::OpenId
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReceiveIdType::ChatId => "chat_id",
            ReceiveIdType::OpenId => "open_id",
            ReceiveIdType::UnionId => "union_id",
        }
    }
}

/// Image upload kind for the `im/v1/images` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Message,
    Avatar,
}

impl ImageType {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageType::Message => "message",
            ImageType::Avatar => "avatar",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg:  String,
    data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<Option<T>> {
        if self.code != 0 {
            return Err(Error::remote(self.code, self.msg));
        }
        Ok(self.data)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    code:                i64,
    #[serde(default)]
    msg:                 String,
    tenant_access_token: Option<String>,
    #[serde(default)]
    expire:              i64,
}

/// Identifiers of a message the API created on our behalf.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SentMessage {
    pub message_id: Option<String>,
    pub chat_id:    Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    image_key: String,
}

#[derive(Debug, Deserialize)]
struct WsEndpointData {
    #[serde(rename = "URL")]
    url: String,
}

struct CachedToken {
    value:      String,
    expires_at: i64,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// One Lark app credential pair bound to an API host.
pub struct LarkClient {
    http:       reqwest::Client,
    base_url:   String,
    app_id:     String,
    app_secret: String,
    token:      AsyncRwLock<Option<CachedToken>>,
}

impl LarkClient {
    pub fn new(app_id: &str, app_secret: &str, domain: LarkDomain) -> Result<Self> {
        Self::with_base_url(app_id, app_secret, domain.base_url())
    }

    pub fn with_base_url(app_id: &str, app_secret: &str, base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(LarkClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
            app_secret: app_secret.to_string(),
            token: AsyncRwLock::new(None),
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current tenant access token, refreshed when absent or close to
    /// expiry.
    pub async fn tenant_access_token(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at - TOKEN_REFRESH_MARGIN_SECS > now_secs() {
                    return Ok(token.value.clone());
                }
            }
        }
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> Result<String> {
        let mut slot = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = slot.as_ref() {
            if token.expires_at - TOKEN_REFRESH_MARGIN_SECS > now_secs() {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/open-apis/auth/v3/tenant_access_token/internal", self.base_url);
        let response: TokenResponse = self
            .http
            .post(&url)
            .json(&json!({ "app_id": self.app_id, "app_secret": self.app_secret }))
            .send()
            .await?
            .json()
            .await?;

        if response.code != 0 {
            return Err(Error::remote(response.code, response.msg));
        }
        let value = response
            .tenant_access_token
            .ok_or_else(|| Error::remote(response.code, "token missing from response"))?;

        debug!(app_id = %self.app_id, expire = response.expire, "refreshed tenant access token");
        *slot = Some(CachedToken { value: value.clone(), expires_at: now_secs() + response.expire });
        Ok(value)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Option<T>> {
        let token = self.tenant_access_token().await?;
        let envelope: ApiEnvelope<T> = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        envelope.into_data()
    }

    /// Create a message addressed by `receive_id`. `content` is the
    /// JSON-encoded payload Lark expects for the message type.
    pub async fn create_message(
        &self,
        receive_id_type: ReceiveIdType,
        receive_id: &str,
        msg_type: &str,
        content: &str,
    ) -> Result<SentMessage> {
        let path = format!(
            "/open-apis/im/v1/messages?receive_id_type={}",
            receive_id_type.as_str()
        );
        let body = json!({
            "receive_id": receive_id,
            "msg_type": msg_type,
            "content": content,
        });
        Ok(self.post_json(&path, &body).await?.unwrap_or_default())
    }

    /// Reply in the thread of an existing message.
    pub async fn reply_message(
        &self,
        message_id: &str,
        msg_type: &str,
        content: &str,
    ) -> Result<SentMessage> {
        let path = format!("/open-apis/im/v1/messages/{message_id}/reply");
        let body = json!({ "msg_type": msg_type, "content": content });
        Ok(self.post_json(&path, &body).await?.unwrap_or_default())
    }

    /// Upload an image, returning its `image_key`.
    pub async fn upload_image(&self, bytes: Vec<u8>, image_type: ImageType) -> Result<String> {
        let token = self.tenant_access_token().await?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name("image");
        let form = reqwest::multipart::Form::new()
            .text("image_type", image_type.as_str())
            .part("image", part);
        let envelope: ApiEnvelope<ImageData> = self
            .http
            .post(format!("{}/open-apis/im/v1/images", self.base_url))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;
        let data = envelope
            .into_data()?
            .ok_or_else(|| Error::remote(0, "image upload returned no data"))?;
        Ok(data.image_key)
    }

    /// Discover the websocket endpoint for socket mode.
    pub async fn ws_endpoint(&self) -> Result<String> {
        let envelope: ApiEnvelope<WsEndpointData> = self
            .http
            .post(format!("{}/callback/ws/endpoint", self.base_url))
            .json(&json!({ "AppID": self.app_id, "AppSecret": self.app_secret }))
            .send()
            .await?
            .json()
            .await?;
        let data = envelope
            .into_data()?
            .ok_or_else(|| Error::remote(0, "ws endpoint missing from response"))?;
        Ok(data.url)
    }
}

/// Clients keyed by App ID so token caches are shared across senders.
///
/// The App ID alone is the key: a config that swaps the secret under the
/// same App ID keeps the stale client until `clear` is called, which the
/// config-update path does.
#[derive(Default)]
pub struct ClientCache {
    clients:       std::sync::RwLock<HashMap<String, Arc<LarkClient>>>,
    base_override: Option<String>,
}

impl ClientCache {
    pub fn new() -> Self {
        ClientCache::default()
    }

    /// Route every cached client at a fixed base URL. Test hook.
    pub fn with_base_url(base_url: &str) -> Self {
        ClientCache {
            clients:       std::sync::RwLock::new(HashMap::new()),
            base_override: Some(base_url.to_string()),
        }
    }

    pub fn get(
        &self,
        app_id: &str,
        app_secret: &str,
        domain: LarkDomain,
        disable_cache: bool,
    ) -> Result<Arc<LarkClient>> {
        if !disable_cache {
            let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());
            if let Some(client) = clients.get(app_id) {
                return Ok(Arc::clone(client));
            }
        }

        let client = Arc::new(match &self.base_override {
            Some(base) => LarkClient::with_base_url(app_id, app_secret, base)?,
            None => LarkClient::new(app_id, app_secret, domain)?,
        });
        if !disable_cache {
            let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
            clients.insert(app_id.to_string(), Arc::clone(&client));
        }
        Ok(client)
    }

    pub fn clear(&self, app_id: &str) {
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        clients.remove(app_id);
    }

    pub fn clear_all(&self) {
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        clients.clear();
    }
}
