//! Account resolution: turn the layered config into concrete per-account
//! credentials and effective settings.
//!
//! Credential precedence for a field: account literal, then account file,
//! then (default account only) base literal, base file, environment.
//! File reads are best effort; unreadable or empty files count as unset.

use std::fs;

use {
    secrecy::ExposeSecret,
    serde::{Deserialize, Serialize},
};

use crate::config::{EffectiveConfig, LarkAccountConfig, LarkConfig};

pub const DEFAULT_ACCOUNT_ID: &str = "default";
pub const ENV_APP_ID: &str = "LARK_APP_ID";
pub const ENV_APP_SECRET: &str = "LARK_APP_SECRET";

/// Where the resolved credential pair came from. Tracked for the App ID
/// as representative of the pair; surfaced in status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Config,
    File,
    Env,
    None,
}

/// One account with credentials and settings fully resolved.
#[derive(Debug, Clone)]
pub struct ResolvedAccount {
    pub account_id:   String,
    pub name:         Option<String>,
    pub enabled:      bool,
    pub app_id:       String,
    pub app_secret:   String,
    pub token_source: TokenSource,
    pub config:       EffectiveConfig,
}

impl ResolvedAccount {
    /// Both halves of the credential pair are present.
    pub fn is_configured(&self) -> bool {
        !self.app_id.is_empty() && !self.app_secret.is_empty()
    }
}

fn read_credential_file(path: Option<&str>) -> Option<String> {
    let path = path?.trim();
    if path.is_empty() {
        return None;
    }
    let contents = fs::read_to_string(path).ok()?;
    let trimmed = contents.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn trimmed(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Collapse user-supplied account IDs: trim, lowercase, and map empty or
/// `default` to the default sentinel.
pub fn normalize_account_id(raw: Option<&str>) -> String {
    let id = raw.unwrap_or("").trim().to_lowercase();
    if id.is_empty() { DEFAULT_ACCOUNT_ID.to_string() } else { id }
}

/// Resolve one account against the process environment.
pub fn resolve_account(cfg: &LarkConfig, account_id: Option<&str>) -> ResolvedAccount {
    resolve_account_with_env(cfg, account_id, &|key| std::env::var(key).ok())
}

/// Resolve one account with an injected environment lookup.
pub fn resolve_account_with_env(
    cfg: &LarkConfig,
    account_id: Option<&str>,
    env: &dyn Fn(&str) -> Option<String>,
) -> ResolvedAccount {
    let account_id = normalize_account_id(account_id);
    let is_default = account_id == DEFAULT_ACCOUNT_ID;
    let account = cfg.account(&account_id);

    let (app_id, token_source) = resolve_app_id(cfg, account, is_default, env);
    let app_secret = resolve_app_secret(cfg, account, is_default, env);

    let name = account
        .and_then(|a| a.name.clone())
        .or_else(|| is_default.then(|| cfg.name.clone()).flatten());

    // Default account is on unless switched off; named accounts must
    // exist and opt in with an explicit `enabled: true`.
    let enabled = match account {
        Some(a) => a.enabled.unwrap_or(false),
        None => is_default && cfg.enabled.unwrap_or(true),
    };

    ResolvedAccount {
        config: EffectiveConfig::resolve(cfg, account),
        account_id,
        name,
        enabled,
        app_id,
        app_secret,
        token_source,
    }
}

fn resolve_app_id(
    cfg: &LarkConfig,
    account: Option<&LarkAccountConfig>,
    is_default: bool,
    env: &dyn Fn(&str) -> Option<String>,
) -> (String, TokenSource) {
    if let Some(id) = account.and_then(|a| trimmed(a.app_id.as_deref())) {
        return (id, TokenSource::Config);
    }
    if let Some(id) = account.and_then(|a| read_credential_file(a.app_id_file.as_deref())) {
        return (id, TokenSource::File);
    }
    if is_default {
        if let Some(id) = trimmed(cfg.app_id.as_deref()) {
            return (id, TokenSource::Config);
        }
        if let Some(id) = read_credential_file(cfg.app_id_file.as_deref()) {
            return (id, TokenSource::File);
        }
        if let Some(id) = trimmed(env(ENV_APP_ID).as_deref()) {
            return (id, TokenSource::Env);
        }
    }
    (String::new(), TokenSource::None)
}

fn resolve_app_secret(
    cfg: &LarkConfig,
    account: Option<&LarkAccountConfig>,
    is_default: bool,
    env: &dyn Fn(&str) -> Option<String>,
) -> String {
    if let Some(secret) =
        account.and_then(|a| trimmed(a.app_secret.as_ref().map(|s| s.expose_secret().as_str())))
    {
        return secret;
    }
    if let Some(secret) = account.and_then(|a| read_credential_file(a.app_secret_file.as_deref())) {
        return secret;
    }
    if is_default {
        if let Some(secret) = trimmed(cfg.app_secret.as_ref().map(|s| s.expose_secret().as_str()))
        {
            return secret;
        }
        if let Some(secret) = read_credential_file(cfg.app_secret_file.as_deref()) {
            return secret;
        }
        if let Some(secret) = trimmed(env(ENV_APP_SECRET).as_deref()) {
            return secret;
        }
    }
    String::new()
}

/// All account IDs worth listing: `default` when the base block (or the
/// environment) carries an App ID, then named accounts in the order the
/// config file defines them.
pub fn list_account_ids(cfg: &LarkConfig) -> Vec<String> {
    list_account_ids_with_env(cfg, &|key| std::env::var(key).ok())
}

pub fn list_account_ids_with_env(
    cfg: &LarkConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Vec<String> {
    let mut ids = Vec::new();
    let default_configured = trimmed(cfg.app_id.as_deref()).is_some()
        || trimmed(cfg.app_id_file.as_deref()).is_some()
        || trimmed(env(ENV_APP_ID).as_deref()).is_some();
    if default_configured {
        ids.push(DEFAULT_ACCOUNT_ID.to_string());
    }
    for id in cfg.accounts.keys() {
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.clone());
        }
    }
    ids
}

/// The account ID to use when the caller names none: `default` when it is
/// configured, otherwise the first listed account, otherwise `default`.
pub fn resolve_default_account_id(cfg: &LarkConfig) -> String {
    resolve_default_account_id_with_env(cfg, &|key| std::env::var(key).ok())
}

pub fn resolve_default_account_id_with_env(
    cfg: &LarkConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> String {
    let ids = list_account_ids_with_env(cfg, env);
    if ids.iter().any(|id| id == DEFAULT_ACCOUNT_ID) {
        return DEFAULT_ACCOUNT_ID.to_string();
    }
    ids.into_iter().next().unwrap_or_else(|| DEFAULT_ACCOUNT_ID.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn no_env(_key: &str) -> Option<String> {
        None
    }

    fn cfg(json: &str) -> LarkConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn normalizes_account_ids() {
        assert_eq!(normalize_account_id(None), "default");
        assert_eq!(normalize_account_id(Some("")), "default");
        assert_eq!(normalize_account_id(Some("  Default ")), "default");
        assert_eq!(normalize_account_id(Some("Work")), "work");
    }

    #[test]
    fn literal_credentials_win() {
        let cfg = cfg(r#"{"appId": " cli_base ", "appSecret": "s"}"#);
        let account = resolve_account_with_env(&cfg, None, &no_env);
        assert_eq!(account.app_id, "cli_base");
        assert_eq!(account.app_secret, "s");
        assert_eq!(account.token_source, TokenSource::Config);
        assert!(account.is_configured());
    }

    #[test]
    fn env_fills_default_account_only() {
        let cfg = cfg("{}");
        let env = |key: &str| match key {
            ENV_APP_ID => Some("cli_env".to_string()),
            ENV_APP_SECRET => Some("env_secret".to_string()),
            _ => None,
        };
        let account = resolve_account_with_env(&cfg, None, &env);
        assert_eq!(account.app_id, "cli_env");
        assert_eq!(account.token_source, TokenSource::Env);

        let named = resolve_account_with_env(&cfg, Some("work"), &env);
        assert_eq!(named.app_id, "");
        assert_eq!(named.token_source, TokenSource::None);
        assert!(!named.is_configured());
    }

    #[test]
    fn credential_file_trumps_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  cli_from_file  ").unwrap();
        let cfg = cfg(&format!(
            r#"{{"appIdFile": {:?}, "appSecret": "s"}}"#,
            file.path()
        ));
        let env = |key: &str| (key == ENV_APP_ID).then(|| "cli_env".to_string());
        let account = resolve_account_with_env(&cfg, None, &env);
        assert_eq!(account.app_id, "cli_from_file");
        assert_eq!(account.token_source, TokenSource::File);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let cfg = cfg(r#"{"appIdFile": "/nonexistent/lark-app-id"}"#);
        let account = resolve_account_with_env(&cfg, None, &no_env);
        assert_eq!(account.app_id, "");
        assert_eq!(account.token_source, TokenSource::None);
    }

    #[test]
    fn named_account_does_not_inherit_base_credentials() {
        let cfg = cfg(
            r#"{"appId": "cli_base", "appSecret": "s",
                "accounts": {"work": {"appSecret": "ws"}}}"#,
        );
        let account = resolve_account_with_env(&cfg, Some("work"), &no_env);
        assert_eq!(account.app_id, "");
        assert_eq!(account.app_secret, "ws");
        assert!(!account.is_configured());
    }

    #[test]
    fn enabled_resolution() {
        let cfg = cfg(
            r#"{"enabled": false, "appId": "x", "appSecret": "y",
                "accounts": {"work": {}, "on": {"enabled": true}}}"#,
        );
        assert!(!resolve_account_with_env(&cfg, None, &no_env).enabled);
        // A named account is off until it explicitly opts in.
        assert!(!resolve_account_with_env(&cfg, Some("work"), &no_env).enabled);
        assert!(resolve_account_with_env(&cfg, Some("on"), &no_env).enabled);
        // Unknown named accounts are never enabled.
        assert!(!resolve_account_with_env(&cfg, Some("ghost"), &no_env).enabled);
    }

    #[test]
    fn named_account_without_explicit_enabled_stays_off() {
        let cfg = cfg(r#"{"accounts": {"work": {"appId": "cli_w", "appSecret": "s"}}}"#);
        let account = resolve_account_with_env(&cfg, Some("work"), &no_env);
        assert!(account.is_configured());
        assert!(!account.enabled);
    }

    #[test]
    fn name_falls_back_to_base_for_default_only() {
        let cfg = cfg(r#"{"name": "Main bot", "accounts": {"work": {}}}"#);
        assert_eq!(
            resolve_account_with_env(&cfg, None, &no_env).name.as_deref(),
            Some("Main bot")
        );
        assert_eq!(resolve_account_with_env(&cfg, Some("work"), &no_env).name, None);
    }

    #[test]
    fn lists_default_then_named_accounts_in_config_order() {
        let cfg = cfg(
            r#"{"appId": "cli_base", "accounts": {"zeta": {}, "alpha": {}}}"#,
        );
        assert_eq!(
            list_account_ids_with_env(&cfg, &no_env),
            vec!["default", "zeta", "alpha"]
        );
    }

    #[test]
    fn list_omits_unconfigured_default() {
        let cfg = cfg(r#"{"accounts": {"work": {}}}"#);
        assert_eq!(list_account_ids_with_env(&cfg, &no_env), vec!["work"]);
        assert_eq!(resolve_default_account_id_with_env(&cfg, &no_env), "work");
    }

    #[test]
    fn default_id_picks_first_configured_account() {
        let cfg = cfg(r#"{"accounts": {"zeta": {}, "alpha": {}}}"#);
        assert_eq!(resolve_default_account_id_with_env(&cfg, &no_env), "zeta");
    }

    #[test]
    fn default_id_when_nothing_configured() {
        let cfg = cfg("{}");
        assert_eq!(resolve_default_account_id_with_env(&cfg, &no_env), "default");
    }
}
