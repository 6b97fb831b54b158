//! Channel plugin system.
//!
//! Each messaging platform implements the ChannelPlugin trait with sub-traits
//! for outbound messaging and status probing. The host side provides the
//! shared HTTP surface ([`http::HttpRouteRegistry`]) webhook-style channels
//! register into, plus the agent [`routing::RouteResolver`] seam.

pub mod error;
pub mod gating;
pub mod http;
pub mod plugin;
pub mod registry;
pub mod routing;

pub use {
    error::{Error, Result},
    plugin::{ChannelHealthSnapshot, ChannelOutbound, ChannelPlugin, ChannelStatus},
    routing::{AgentRoute, PeerKind, RouteResolver},
};
