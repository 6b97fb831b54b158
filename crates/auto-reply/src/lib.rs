//! Auto-reply pipeline: takes a canonical inbound message, produces a reply.
//!
//! Channels dispatch into [`AutoReply`] and own delivery of the resulting
//! payload (chunking to the platform's text limit via [`chunk::chunk_text`]).

pub mod chunk;
pub mod reply;

pub use reply::{AutoReply, EchoReply};
