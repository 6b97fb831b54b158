use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::plugin::ChannelPlugin;

/// Registry of all loaded channel plugins, keyed by channel ID.
#[derive(Default)]
pub struct ChannelRegistry {
    plugins: HashMap<String, Box<dyn ChannelPlugin>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn ChannelPlugin>) {
        self.plugins.insert(plugin.id().to_string(), plugin);
    }

    pub fn get(&self, id: &str) -> Option<&dyn ChannelPlugin> {
        self.plugins.get(id).map(|p| p.as_ref())
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Box<dyn ChannelPlugin>> {
        self.plugins.get_mut(id)
    }

    pub fn list(&self) -> Vec<&str> {
        self.plugins.keys().map(|s| s.as_str()).collect()
    }

    /// Start an account on a registered channel.
    pub async fn start_account(
        &mut self,
        channel: &str,
        account_id: &str,
        config: serde_json::Value,
    ) -> Result<()> {
        let plugin = self
            .plugins
            .get_mut(channel)
            .ok_or_else(|| Error::unknown_account(format!("{channel}:{account_id}")))?;
        plugin
            .start_account(account_id, config)
            .await
            .map_err(Error::invalid_input)
    }

    /// Stop an account on a registered channel.
    pub async fn stop_account(&mut self, channel: &str, account_id: &str) -> Result<()> {
        let plugin = self
            .plugins
            .get_mut(channel)
            .ok_or_else(|| Error::unknown_account(format!("{channel}:{account_id}")))?;
        plugin
            .stop_account(account_id)
            .await
            .map_err(Error::invalid_input)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::plugin::{ChannelOutbound, ChannelStatus};

    struct StubPlugin {
        started: Vec<String>,
    }

    #[async_trait]
    impl ChannelPlugin for StubPlugin {
        fn id(&self) -> &str {
            "stub"
        }

        fn name(&self) -> &str {
            "Stub"
        }

        async fn start_account(
            &mut self,
            account_id: &str,
            _config: serde_json::Value,
        ) -> anyhow::Result<()> {
            self.started.push(account_id.to_string());
            Ok(())
        }

        async fn stop_account(&mut self, account_id: &str) -> anyhow::Result<()> {
            self.started.retain(|id| id != account_id);
            Ok(())
        }

        fn outbound(&self) -> Option<&dyn ChannelOutbound> {
            None
        }

        fn status(&self) -> Option<&dyn ChannelStatus> {
            None
        }
    }

    #[tokio::test]
    async fn registers_and_drives_plugins() {
        let mut registry = ChannelRegistry::new();
        registry.register(Box::new(StubPlugin { started: Vec::new() }));
        assert_eq!(registry.list(), vec!["stub"]);
        assert!(registry.get("stub").is_some());

        registry
            .start_account("stub", "default", serde_json::Value::Null)
            .await
            .unwrap();
        registry.stop_account("stub", "default").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_channel_is_an_error() {
        let mut registry = ChannelRegistry::new();
        let err = registry
            .start_account("ghost", "default", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAccount { .. }), "{err}");
    }
}
