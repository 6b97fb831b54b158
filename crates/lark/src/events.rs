//! Inbound event parsing.
//!
//! Lark delivers message events in two envelope shapes: socket-mode
//! frames carry `event_type`, `message`, and `sender` at the top level,
//! while webhook payloads (schema 2.0) nest them under `header` and
//! `event`. Both collapse into one canonical structure here.

use std::fmt;

use {serde::Deserialize, serde_json::Value, tracing::debug};

use crate::error::{Error, Result};

/// Sender ID triple as Lark reports it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SenderId {
    pub open_id:  Option<String>,
    pub user_id:  Option<String>,
    pub union_id: Option<String>,
}

/// An `@` mention inside a message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Mention {
    pub key:  Option<String>,
    #[serde(default)]
    pub id:   SenderId,
    pub name: Option<String>,
}

impl Mention {
    /// Bot mentions carry no `user_id`; human mentions always do.
    pub fn is_bot(&self) -> bool {
        self.id.user_id.as_deref().unwrap_or("").is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireMessage {
    pub message_id:   Option<String>,
    pub root_id:      Option<String>,
    pub parent_id:    Option<String>,
    pub chat_id:      Option<String>,
    pub chat_type:    Option<String>,
    pub message_type: Option<String>,
    pub content:      Option<String>,
    #[serde(default)]
    pub mentions:     Vec<Mention>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireSender {
    pub sender_id:   Option<SenderId>,
    pub sender_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FlatShape {
    event_type: Option<String>,
    token:      Option<String>,
    message:    Option<WireMessage>,
    sender:     Option<WireSender>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct NestedHeader {
    event_type: Option<String>,
    token:      Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct NestedBody {
    message: Option<WireMessage>,
    sender:  Option<WireSender>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct NestedShape {
    header: Option<NestedHeader>,
    event:  Option<NestedBody>,
}

/// An event with the envelope shape stripped away.
#[derive(Debug, Clone, Default)]
pub struct CanonicalEvent {
    pub event_type: Option<String>,
    pub token:      Option<String>,
    pub message:    Option<WireMessage>,
    pub sender:     Option<WireSender>,
}

/// Collapse either envelope shape. Flat fields win when both are present.
pub fn parse_event(value: &Value) -> Result<CanonicalEvent> {
    if value.get("message").is_some() || value.get("event_type").is_some() {
        let flat: FlatShape = serde_json::from_value(value.clone())
            .map_err(|e| Error::MalformedEvent(e.to_string()))?;
        return Ok(CanonicalEvent {
            event_type: flat.event_type,
            token:      flat.token,
            message:    flat.message,
            sender:     flat.sender,
        });
    }

    let nested: NestedShape = serde_json::from_value(value.clone())
        .map_err(|e| Error::MalformedEvent(e.to_string()))?;
    let header = nested.header.unwrap_or_default();
    let body = nested.event.unwrap_or_default();
    Ok(CanonicalEvent {
        event_type: header.event_type,
        token:      header.token,
        message:    body.message,
        sender:     body.sender,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    P2p,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderKind {
    User,
    Bot,
}

/// Lark message types the channel understands; everything else is
/// summarized with a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Post,
    Image,
    File,
    Audio,
    Video,
    Interactive,
    Other(String),
}

impl MessageType {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "text" => MessageType::Text,
            "post" => MessageType::Post,
            "image" => MessageType::Image,
            "file" => MessageType::File,
            "audio" => MessageType::Audio,
            // Lark labels video messages "media" on the wire.
            "media" | "video" => MessageType::Video,
            "interactive" => MessageType::Interactive,
            other => MessageType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Text => write!(f, "text"),
            MessageType::Post => write!(f, "post"),
            MessageType::Image => write!(f, "image"),
            MessageType::File => write!(f, "file"),
            MessageType::Audio => write!(f, "audio"),
            MessageType::Video => write!(f, "video"),
            MessageType::Interactive => write!(f, "interactive"),
            MessageType::Other(name) => write!(f, "{name}"),
        }
    }
}

/// A message event ready for gating and dispatch.
#[derive(Debug, Clone)]
pub struct InboundContext {
    pub message_id:   String,
    pub chat_id:      String,
    pub chat_kind:    ChatKind,
    pub sender_id:    String,
    pub sender_kind:  SenderKind,
    pub message_type: MessageType,
    pub raw_content:  String,
    pub mentions:     Vec<Mention>,
    pub root_id:      Option<String>,
    pub parent_id:    Option<String>,
}

/// Extract the message context, or `None` when the event carries no
/// usable message or was sent by another app (bots must not answer bots).
pub fn build_inbound_context(event: &CanonicalEvent) -> Option<InboundContext> {
    let message = event.message.as_ref()?;
    let message_id = message.message_id.clone()?;
    let chat_id = message.chat_id.clone()?;

    let sender = event.sender.clone().unwrap_or_default();
    if sender.sender_type.as_deref() == Some("app") {
        debug!(message_id = %message_id, "ignoring message from another app");
        return None;
    }
    let sender_id = sender
        .sender_id
        .as_ref()
        .and_then(|id| id.open_id.clone().or_else(|| id.user_id.clone()))
        .unwrap_or_else(|| "unknown".to_string());

    let chat_kind = if message.chat_type.as_deref() == Some("group") {
        ChatKind::Group
    } else {
        ChatKind::P2p
    };

    Some(InboundContext {
        message_id,
        chat_id,
        chat_kind,
        sender_id,
        sender_kind: SenderKind::User,
        message_type: MessageType::from_wire(message.message_type.as_deref().unwrap_or("text")),
        raw_content: message.content.clone().unwrap_or_default(),
        mentions: message.mentions.clone(),
        root_id: message.root_id.clone(),
        parent_id: message.parent_id.clone(),
    })
}

fn rich_text_to_string(content: &Value) -> String {
    let mut out = String::new();
    let Some(lines) = content.as_array() else {
        return out;
    };
    for line in lines {
        let Some(elements) = line.as_array() else {
            continue;
        };
        let mut rendered = String::new();
        for element in elements {
            match element.get("tag").and_then(Value::as_str) {
                Some("text") | Some("a") => {
                    if let Some(text) = element.get("text").and_then(Value::as_str) {
                        rendered.push_str(text);
                    }
                },
                Some("at") => {
                    let name = element
                        .get("user_name")
                        .and_then(Value::as_str)
                        .or_else(|| element.get("user_id").and_then(Value::as_str))
                        .unwrap_or("");
                    rendered.push('@');
                    rendered.push_str(name);
                },
                _ => {},
            }
        }
        if !rendered.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&rendered);
        }
    }
    out
}

/// Render the JSON-encoded message content as plain text. Non-text
/// messages reduce to a bracketed placeholder; malformed content is
/// passed through raw rather than dropped.
pub fn extract_text(message_type: &MessageType, raw_content: &str) -> String {
    let parsed: Value = match serde_json::from_str(raw_content) {
        Ok(value) => value,
        Err(_) => return raw_content.to_string(),
    };

    match message_type {
        MessageType::Text => parsed
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        MessageType::Post => {
            // Post payloads either carry `content` directly or nest it
            // under a locale key; prefer zh_cn, then en_us.
            let content = parsed
                .get("content")
                .or_else(|| parsed.pointer("/zh_cn/content"))
                .or_else(|| parsed.pointer("/en_us/content"))
                .unwrap_or(&Value::Null);
            rich_text_to_string(content)
        },
        MessageType::Image => "[Image]".to_string(),
        MessageType::File => {
            let name = parsed
                .get("file_name")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            format!("[File: {name}]")
        },
        MessageType::Audio => "[Audio]".to_string(),
        MessageType::Video => "[Video]".to_string(),
        MessageType::Interactive => "[Interactive Card]".to_string(),
        MessageType::Other(name) => format!("[{name}]"),
    }
}
