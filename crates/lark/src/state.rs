//! Per-account runtime state, surfaced through status commands.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;

use crate::CHANNEL_ID;

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn state_key(account_id: &str) -> String {
    format!("{CHANNEL_ID}:{account_id}")
}

/// Lifecycle and activity timestamps for one account. All times are unix
/// epoch milliseconds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeState {
    pub running:          bool,
    pub last_start_at:    Option<i64>,
    pub last_stop_at:     Option<i64>,
    pub last_error:       Option<String>,
    pub last_inbound_at:  Option<i64>,
    pub last_outbound_at: Option<i64>,
}

/// Shared store of runtime state, keyed by `channel:accountId`.
#[derive(Debug, Default)]
pub struct RuntimeStateStore {
    states: RwLock<HashMap<String, RuntimeState>>,
}

impl RuntimeStateStore {
    pub fn new() -> Self {
        RuntimeStateStore::default()
    }

    fn update(&self, account_id: &str, apply: impl FnOnce(&mut RuntimeState)) {
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        apply(states.entry(state_key(account_id)).or_default());
    }

    pub fn mark_started(&self, account_id: &str) {
        self.update(account_id, |state| {
            state.running = true;
            state.last_start_at = Some(now_millis());
            state.last_error = None;
        });
    }

    pub fn mark_stopped(&self, account_id: &str) {
        self.update(account_id, |state| {
            state.running = false;
            state.last_stop_at = Some(now_millis());
        });
    }

    pub fn mark_error(&self, account_id: &str, error: &str) {
        self.update(account_id, |state| {
            state.last_error = Some(error.to_string());
        });
    }

    pub fn record_inbound(&self, account_id: &str) {
        self.update(account_id, |state| {
            state.last_inbound_at = Some(now_millis());
        });
    }

    pub fn record_outbound(&self, account_id: &str) {
        self.update(account_id, |state| {
            state.last_outbound_at = Some(now_millis());
        });
    }

    pub fn get(&self, account_id: &str) -> Option<RuntimeState> {
        let states = self.states.read().unwrap_or_else(|e| e.into_inner());
        states.get(&state_key(account_id)).cloned()
    }

    pub fn is_running(&self, account_id: &str) -> bool {
        self.get(account_id).map(|state| state.running).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_marks() {
        let store = RuntimeStateStore::new();
        assert!(store.get("default").is_none());
        assert!(!store.is_running("default"));

        store.mark_started("default");
        let state = store.get("default").unwrap();
        assert!(state.running);
        assert!(state.last_start_at.is_some());
        assert_eq!(state.last_error, None);

        store.mark_error("default", "socket closed");
        store.mark_stopped("default");
        let state = store.get("default").unwrap();
        assert!(!state.running);
        assert_eq!(state.last_error.as_deref(), Some("socket closed"));

        // A restart clears the previous error.
        store.mark_started("default");
        assert_eq!(store.get("default").unwrap().last_error, None);
    }

    #[test]
    fn accounts_are_isolated() {
        let store = RuntimeStateStore::new();
        store.mark_started("work");
        store.record_inbound("work");
        assert!(store.is_running("work"));
        assert!(!store.is_running("default"));
        assert!(store.get("default").is_none());
    }

    #[test]
    fn activity_timestamps() {
        let store = RuntimeStateStore::new();
        store.record_inbound("default");
        store.record_outbound("default");
        let state = store.get("default").unwrap();
        assert!(state.last_inbound_at.is_some());
        assert!(state.last_outbound_at.is_some());
        assert!(!state.running);
    }
}
