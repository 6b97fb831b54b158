//! Lark / Feishu channel plugin.
//!
//! Bridges Lark bot accounts into the channel runtime: inbound messages
//! arrive over socket mode (long-lived websocket) or an HTTP webhook,
//! pass the access gates, and are answered through the Lark open API.
//! Multi-account aware; credentials resolve from config, credential
//! files, or `LARK_APP_ID` / `LARK_APP_SECRET`.

pub mod access;
pub mod accounts;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod monitor;
pub mod plugin;
pub mod probe;
pub mod send;
pub mod socket;
pub mod state;
pub mod webhook;

pub use accounts::{DEFAULT_ACCOUNT_ID, ResolvedAccount, resolve_account};
pub use config::LarkConfig;
pub use context::LarkContext;
pub use error::{Error, Result};
pub use plugin::LarkPlugin;

/// Channel identifier used in routing keys and runtime state keys.
pub const CHANNEL_ID: &str = "lark";

/// Lark rejects text messages past this many characters; longer replies
/// are chunked before delivery.
pub const TEXT_CHUNK_LIMIT: usize = 4000;

/// Event type emitted by Lark when a message is sent to the bot.
pub const MESSAGE_RECEIVE_EVENT: &str = "im.message.receive_v1";
