//! Shared message types passed between channels and the reply pipeline.

pub mod types;

pub use types::{ChatType, MsgContext, ReplyPayload};
