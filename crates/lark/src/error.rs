use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Credential slot a Lark account may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    AppId,
    AppSecret,
}

impl Credential {
    pub fn config_key(self) -> &'static str {
        match self {
            Credential::AppId => "appId",
            Credential::AppSecret => "appSecret",
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            Credential::AppId => "LARK_APP_ID",
            Credential::AppSecret => "LARK_APP_SECRET",
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::AppId => write!(f, "App ID"),
            Credential::AppSecret => write!(f, "App Secret"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "Lark {field} missing for account \"{account}\" (set channels.lark.{} or {})",
        .field.config_key(),
        .field.env_var()
    )]
    MissingCredential { account: String, field: Credential },

    #[error("recipient is required for Lark sends")]
    InvalidRecipient,

    #[error("Lark API error: {msg} (code {code})")]
    RemoteApi { code: i64, msg: String },

    #[error("{0}")]
    ConfigValidation(String),

    #[error("malformed Lark event: {0}")]
    MalformedEvent(String),

    #[error("account \"{0}\" is already running")]
    AlreadyRunning(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Channel(#[from] volery_channels::Error),
}

impl Error {
    pub fn missing(account: impl Into<String>, field: Credential) -> Self {
        Error::MissingCredential { account: account.into(), field }
    }

    pub fn remote(code: i64, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let msg = if msg.is_empty() { code.to_string() } else { msg };
        Error::RemoteApi { code, msg }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_field_and_account() {
        let err = Error::missing("work", Credential::AppId);
        let text = err.to_string();
        assert!(text.contains("App ID"), "{text}");
        assert!(text.contains("\"work\""), "{text}");
        assert!(text.contains("LARK_APP_ID"), "{text}");
    }

    #[test]
    fn remote_error_falls_back_to_code() {
        assert_eq!(
            Error::remote(99991663, "").to_string(),
            "Lark API error: 99991663 (code 99991663)"
        );
        assert_eq!(
            Error::remote(10002, "app not found").to_string(),
            "Lark API error: app not found (code 10002)"
        );
    }
}
