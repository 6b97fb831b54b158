//! Shared channel context: config snapshot, runtime state, client cache.

use std::sync::{Arc, RwLock};

use crate::{client::ClientCache, config::LarkConfig, state::RuntimeStateStore};

/// Everything the monitor, sender, and plugin share. The config lock is
/// never held across an await point.
pub struct LarkContext {
    config:    RwLock<LarkConfig>,
    pub state: RuntimeStateStore,
    pub cache: ClientCache,
}

impl LarkContext {
    pub fn new(config: LarkConfig) -> Arc<Self> {
        Arc::new(LarkContext {
            config: RwLock::new(config),
            state:  RuntimeStateStore::new(),
            cache:  ClientCache::new(),
        })
    }

    /// Context whose clients all talk to a fixed base URL. Test hook.
    pub fn with_base_url(config: LarkConfig, base_url: &str) -> Arc<Self> {
        Arc::new(LarkContext {
            config: RwLock::new(config),
            state:  RuntimeStateStore::new(),
            cache:  ClientCache::with_base_url(base_url),
        })
    }

    pub fn config(&self) -> LarkConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Swap in a new config and drop cached clients so credential changes
    /// take effect on the next send.
    pub fn update_config(&self, config: LarkConfig) {
        {
            let mut slot = self.config.write().unwrap_or_else(|e| e.into_inner());
            *slot = config;
        }
        self.cache.clear_all();
    }

    /// Edit the config in place under the lock.
    pub fn mutate_config(&self, apply: impl FnOnce(&mut LarkConfig)) {
        let mut slot = self.config.write().unwrap_or_else(|e| e.into_inner());
        apply(&mut slot);
    }
}
