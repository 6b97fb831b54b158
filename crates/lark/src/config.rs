//! Lark channel configuration.
//!
//! Mirrors the `channels.lark` block of the host config file. The base
//! block doubles as the `default` account; named accounts live under
//! `accounts` and override base fields per account.

use std::{collections::BTreeMap, fmt};

use {
    indexmap::IndexMap,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, Serializer},
};

use volery_channels::gating::{DmPolicy, GroupPolicy};

use crate::{
    accounts::{self, TokenSource},
    error::{Error, Result},
};

/// Lark API domain. Feishu is the mainland deployment, Lark the
/// international one; they share the API surface but not the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LarkDomain {
    #[default]
    Feishu,
    Lark,
}

impl LarkDomain {
    pub fn base_url(self) -> &'static str {
        match self {
            LarkDomain::Feishu => "https://open.feishu.cn",
            LarkDomain::Lark => "https://open.larksuite.com",
        }
    }
}

/// Inbound transport for an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Websocket,
    Webhook,
}

/// Allowlist entry. Host configs sometimes carry numeric IDs; both forms
/// normalize to a string for matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowEntry {
    Text(String),
    Number(i64),
}

impl AllowEntry {
    pub fn as_string(&self) -> String {
        match self {
            AllowEntry::Text(s) => s.clone(),
            AllowEntry::Number(n) => n.to_string(),
        }
    }
}

fn serialize_opt_secret<S: Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match secret {
        Some(secret) => serializer.serialize_some(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Per-group overrides, keyed by chat ID (or `"*"` for all groups).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LarkGroupConfig {
    pub enabled:         Option<bool>,
    pub allow_from:      Vec<AllowEntry>,
    pub require_mention: Option<bool>,
    pub system_prompt:   Option<String>,
    pub skills:          Vec<String>,
}

/// A named account block. Fields left unset fall back to the base block.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LarkAccountConfig {
    pub enabled: Option<bool>,
    pub name:    Option<String>,
    pub app_id:  Option<String>,
    #[serde(serialize_with = "serialize_opt_secret")]
    pub app_secret:         Option<Secret<String>>,
    pub app_id_file:        Option<String>,
    pub app_secret_file:    Option<String>,
    pub encrypt_key:        Option<String>,
    pub verification_token: Option<String>,
    pub allow_from:         Vec<AllowEntry>,
    pub group_allow_from:   Vec<AllowEntry>,
    pub dm_policy:          Option<DmPolicy>,
    pub group_policy:       Option<GroupPolicy>,
    pub mode:               Option<Mode>,
    pub webhook_path:       Option<String>,
    pub domain:             Option<LarkDomain>,
    pub groups:             BTreeMap<String, LarkGroupConfig>,
}

impl fmt::Debug for LarkAccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LarkAccountConfig")
            .field("enabled", &self.enabled)
            .field("name", &self.name)
            .field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret.as_ref().map(|_| "***"))
            .field("mode", &self.mode)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// The full `channels.lark` block.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LarkConfig {
    pub enabled: Option<bool>,
    pub name:    Option<String>,
    pub app_id:  Option<String>,
    #[serde(serialize_with = "serialize_opt_secret")]
    pub app_secret:         Option<Secret<String>>,
    pub app_id_file:        Option<String>,
    pub app_secret_file:    Option<String>,
    pub encrypt_key:        Option<String>,
    pub verification_token: Option<String>,
    pub allow_from:         Vec<AllowEntry>,
    pub group_allow_from:   Vec<AllowEntry>,
    pub dm_policy:          Option<DmPolicy>,
    pub group_policy:       Option<GroupPolicy>,
    pub mode:               Option<Mode>,
    pub webhook_path:       Option<String>,
    pub domain:             Option<LarkDomain>,
    pub groups:             BTreeMap<String, LarkGroupConfig>,
    /// Named accounts, kept in the order the config file defines them.
    pub accounts:           IndexMap<String, LarkAccountConfig>,
}

impl fmt::Debug for LarkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LarkConfig")
            .field("enabled", &self.enabled)
            .field("name", &self.name)
            .field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret.as_ref().map(|_| "***"))
            .field("mode", &self.mode)
            .field("domain", &self.domain)
            .field("accounts", &self.accounts.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl LarkConfig {
    /// Account block for a non-default account ID, if one exists.
    pub fn account(&self, account_id: &str) -> Option<&LarkAccountConfig> {
        if account_id == accounts::DEFAULT_ACCOUNT_ID {
            None
        } else {
            self.accounts.get(account_id)
        }
    }

    fn account_entry(&mut self, account_id: &str) -> Option<&mut LarkAccountConfig> {
        if account_id == accounts::DEFAULT_ACCOUNT_ID {
            None
        } else {
            Some(self.accounts.entry(account_id.to_string()).or_default())
        }
    }
}

/// Behavioral settings for one account after base/account layering.
#[derive(Debug, Clone, Default)]
pub struct EffectiveConfig {
    pub encrypt_key:        Option<String>,
    pub verification_token: Option<String>,
    pub allow_from:         Vec<String>,
    pub group_allow_from:   Vec<String>,
    pub dm_policy:          DmPolicy,
    pub group_policy:       GroupPolicy,
    pub mode:               Mode,
    pub webhook_path:       Option<String>,
    pub domain:             LarkDomain,
    pub groups:             BTreeMap<String, LarkGroupConfig>,
}

impl EffectiveConfig {
    /// Layer an account block over the base block, field by field. An
    /// account never inherits a sibling account's settings.
    pub fn resolve(base: &LarkConfig, account: Option<&LarkAccountConfig>) -> Self {
        fn field<T: Clone>(acct: Option<&T>, base: Option<&T>) -> Option<T> {
            acct.or(base).cloned()
        }
        fn list(acct: &[AllowEntry], base: &[AllowEntry]) -> Vec<String> {
            let source = if acct.is_empty() { base } else { acct };
            source.iter().map(AllowEntry::as_string).collect()
        }

        let empty = Vec::new();
        let no_groups = BTreeMap::new();
        let (a_allow, a_group_allow, a_groups) = match account {
            Some(a) => (&a.allow_from, &a.group_allow_from, &a.groups),
            None => (&empty, &empty, &no_groups),
        };

        let mut groups = base.groups.clone();
        for (chat_id, group) in a_groups {
            groups.insert(chat_id.clone(), group.clone());
        }

        EffectiveConfig {
            encrypt_key: field(
                account.and_then(|a| a.encrypt_key.as_ref()),
                base.encrypt_key.as_ref(),
            ),
            verification_token: field(
                account.and_then(|a| a.verification_token.as_ref()),
                base.verification_token.as_ref(),
            ),
            allow_from: list(a_allow, &base.allow_from),
            group_allow_from: list(a_group_allow, &base.group_allow_from),
            dm_policy: account
                .and_then(|a| a.dm_policy)
                .or(base.dm_policy)
                .unwrap_or_default(),
            group_policy: account
                .and_then(|a| a.group_policy)
                .or(base.group_policy)
                .unwrap_or_default(),
            mode: account.and_then(|a| a.mode).or(base.mode).unwrap_or_default(),
            webhook_path: field(
                account.and_then(|a| a.webhook_path.as_ref()),
                base.webhook_path.as_ref(),
            ),
            domain: account.and_then(|a| a.domain).or(base.domain).unwrap_or_default(),
            groups,
        }
    }

    /// Group overrides for a chat, falling back to the `"*"` wildcard entry.
    pub fn group(&self, chat_id: &str) -> Option<&LarkGroupConfig> {
        self.groups.get(chat_id).or_else(|| self.groups.get("*"))
    }
}

/// Credentials supplied through the interactive setup flow.
#[derive(Debug, Clone, Default)]
pub struct SetupInput {
    pub name:            Option<String>,
    pub use_env:         bool,
    pub app_id:          Option<String>,
    pub app_secret:      Option<String>,
    pub app_id_file:     Option<String>,
    pub app_secret_file: Option<String>,
    pub mode:            Option<Mode>,
    pub domain:          Option<LarkDomain>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Reject setup input that would leave the account without a usable
/// credential pair, or that mixes env-based and literal credentials.
pub fn validate_setup_input(account_id: &str, input: &SetupInput) -> Result<()> {
    let has_literal = non_empty(input.app_id.as_deref()).is_some()
        || non_empty(input.app_secret.as_deref()).is_some();
    let has_file = non_empty(input.app_id_file.as_deref()).is_some()
        || non_empty(input.app_secret_file.as_deref()).is_some();

    if input.use_env {
        if account_id != accounts::DEFAULT_ACCOUNT_ID {
            return Err(Error::ConfigValidation(format!(
                "environment credentials only apply to the default account, not \"{account_id}\""
            )));
        }
        if has_literal || has_file {
            return Err(Error::ConfigValidation(
                "choose either environment credentials or explicit ones, not both".to_string(),
            ));
        }
        return Ok(());
    }

    let id_ok = non_empty(input.app_id.as_deref()).is_some()
        || non_empty(input.app_id_file.as_deref()).is_some();
    let secret_ok = non_empty(input.app_secret.as_deref()).is_some()
        || non_empty(input.app_secret_file.as_deref()).is_some();
    if !id_ok {
        return Err(Error::ConfigValidation(
            "an App ID (or App ID file) is required".to_string(),
        ));
    }
    if !secret_ok {
        return Err(Error::ConfigValidation(
            "an App Secret (or App Secret file) is required".to_string(),
        ));
    }
    Ok(())
}

/// Write validated setup input into the config, clearing whichever
/// credential fields the chosen source replaces.
pub fn apply_account_credentials(
    cfg: &mut LarkConfig,
    account_id: &str,
    input: &SetupInput,
) -> Result<()> {
    validate_setup_input(account_id, input)?;

    let name = input.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let app_id = non_empty(input.app_id.as_deref()).map(str::to_string);
    let app_secret = non_empty(input.app_secret.as_deref()).map(str::to_string);
    let app_id_file = non_empty(input.app_id_file.as_deref()).map(str::to_string);
    let app_secret_file = non_empty(input.app_secret_file.as_deref()).map(str::to_string);

    if let Some(account) = cfg.account_entry(account_id) {
        account.enabled = Some(true);
        if let Some(name) = name {
            account.name = Some(name.to_string());
        }
        account.app_id = app_id;
        account.app_secret = app_secret.map(Secret::new);
        account.app_id_file = app_id_file;
        account.app_secret_file = app_secret_file;
        if input.mode.is_some() {
            account.mode = input.mode;
        }
        if input.domain.is_some() {
            account.domain = input.domain;
        }
    } else {
        cfg.enabled = Some(true);
        if let Some(name) = name {
            cfg.name = Some(name.to_string());
        }
        if input.use_env {
            cfg.app_id = None;
            cfg.app_secret = None;
            cfg.app_id_file = None;
            cfg.app_secret_file = None;
        } else {
            cfg.app_id = app_id;
            cfg.app_secret = app_secret.map(Secret::new);
            cfg.app_id_file = app_id_file;
            cfg.app_secret_file = app_secret_file;
        }
        if input.mode.is_some() {
            cfg.mode = input.mode;
        }
        if input.domain.is_some() {
            cfg.domain = input.domain;
        }
    }
    Ok(())
}

pub fn set_account_enabled(cfg: &mut LarkConfig, account_id: &str, enabled: bool) {
    match cfg.account_entry(account_id) {
        Some(account) => account.enabled = Some(enabled),
        None => cfg.enabled = Some(enabled),
    }
}

pub fn set_account_name(cfg: &mut LarkConfig, account_id: &str, name: &str) {
    let name = name.trim();
    let name = (!name.is_empty()).then(|| name.to_string());
    match cfg.account_entry(account_id) {
        Some(account) => account.name = name,
        None => cfg.name = name,
    }
}

/// Remove a named account block. The default account cannot be deleted,
/// only logged out.
pub fn delete_account(cfg: &mut LarkConfig, account_id: &str) -> bool {
    if account_id == accounts::DEFAULT_ACCOUNT_ID {
        return false;
    }
    cfg.accounts.shift_remove(account_id).is_some()
}

/// Outcome of a logout: whether stored credentials were cleared, and
/// whether environment credentials still keep the account usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub cleared:         bool,
    pub env_credentials: bool,
}

/// Clear stored credentials for an account. Environment variables are
/// outside the config and survive a logout; the outcome says so.
pub fn logout_account(
    cfg: &mut LarkConfig,
    account_id: &str,
    env: &dyn Fn(&str) -> Option<String>,
) -> LogoutOutcome {
    let cleared = match cfg.account_entry(account_id) {
        Some(account) => {
            let had = account.app_id.is_some()
                || account.app_secret.is_some()
                || account.app_id_file.is_some()
                || account.app_secret_file.is_some();
            account.app_id = None;
            account.app_secret = None;
            account.app_id_file = None;
            account.app_secret_file = None;
            had
        },
        None => {
            let had = cfg.app_id.is_some()
                || cfg.app_secret.is_some()
                || cfg.app_id_file.is_some()
                || cfg.app_secret_file.is_some();
            cfg.app_id = None;
            cfg.app_secret = None;
            cfg.app_id_file = None;
            cfg.app_secret_file = None;
            had
        },
    };

    let resolved = accounts::resolve_account_with_env(cfg, Some(account_id), env);
    LogoutOutcome {
        cleared,
        env_credentials: resolved.token_source == TokenSource::Env,
    }
}
