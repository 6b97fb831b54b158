use serde::{Deserialize, Serialize};

/// Kind of chat a message arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// One-on-one conversation with the bot.
    Dm,
    /// Multi-member group conversation.
    Group,
}

/// Canonical inbound message handed to the auto-reply system.
///
/// Constructed once per inbound platform event by a channel plugin and
/// consumed synchronously by the reply path; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgContext {
    /// Channel identifier (e.g. "lark").
    pub channel: String,
    /// Account the message arrived on.
    pub account_id: String,
    /// Chat/peer ID used for routing the reply back.
    pub from: String,
    /// Display name or ID of the sender, when known.
    pub sender_name: Option<String>,
    /// Extracted plain-text body.
    pub body: String,
    pub chat_type: ChatType,
    /// Platform message ID of the inbound message.
    pub message_id: String,
    /// Message ID a reply should thread onto, when the platform supports it.
    pub reply_to_id: Option<String>,
    /// Stable session key: `{channel}:{account_id}:{chat_id}`.
    pub session_key: String,
}

/// Reply produced by the auto-reply system, to be delivered by the channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub text: String,
    /// Message ID to thread the reply onto, when set.
    pub reply_to_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_type_serde_lowercase() {
        assert_eq!(serde_json::to_string(&ChatType::Dm).unwrap(), "\"dm\"");
        let back: ChatType = serde_json::from_str("\"group\"").unwrap();
        assert_eq!(back, ChatType::Group);
    }
}
