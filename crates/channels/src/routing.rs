use async_trait::async_trait;

/// What kind of peer a message came from, for routing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
    Dm,
    Group,
}

/// Resolved agent route for an inbound message.
#[derive(Debug, Clone)]
pub struct AgentRoute {
    pub agent_id: String,
    /// Session key the reply pipeline should use.
    pub session_key: String,
}

/// Resolve which agent handles a (channel, account, peer) triple.
///
/// The gateway provides the concrete implementation; channels only consume it.
#[async_trait]
pub trait RouteResolver: Send + Sync {
    async fn resolve(
        &self,
        channel: &str,
        account_id: &str,
        peer_kind: PeerKind,
        peer_id: &str,
    ) -> AgentRoute;
}

/// Default resolver: a single agent, session keyed by channel/account/peer.
pub struct StaticRouteResolver {
    pub agent_id: String,
}

impl Default for StaticRouteResolver {
    fn default() -> Self {
        Self {
            agent_id: "default".into(),
        }
    }
}

#[async_trait]
impl RouteResolver for StaticRouteResolver {
    async fn resolve(
        &self,
        channel: &str,
        account_id: &str,
        _peer_kind: PeerKind,
        peer_id: &str,
    ) -> AgentRoute {
        AgentRoute {
            agent_id: self.agent_id.clone(),
            session_key: format!("{channel}:{account_id}:{peer_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_resolver_builds_session_key() {
        let resolver = StaticRouteResolver::default();
        let route = resolver
            .resolve("lark", "default", PeerKind::Group, "oc_123")
            .await;
        assert_eq!(route.agent_id, "default");
        assert_eq!(route.session_key, "lark:default:oc_123");
    }
}
