//! Inbound access gating: DM and group policies, per-group overrides,
//! mention requirements.

use std::fmt;

use volery_channels::gating::{self, DmPolicy, GroupPolicy};

use crate::{
    config::EffectiveConfig,
    events::{ChatKind, InboundContext},
};

/// Why a message was dropped before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenied {
    DmsDisabled,
    GroupsDisabled,
    GroupDisabled,
    NotOnAllowlist,
    NotOnGroupAllowlist,
    MentionRequired,
}

impl fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DmsDisabled => write!(f, "DMs are disabled"),
            Self::GroupsDisabled => write!(f, "groups are disabled"),
            Self::GroupDisabled => write!(f, "group is disabled"),
            Self::NotOnAllowlist => write!(f, "sender not on allowlist"),
            Self::NotOnGroupAllowlist => write!(f, "sender not on group allowlist"),
            Self::MentionRequired => write!(f, "bot was not mentioned"),
        }
    }
}

fn allowed(sender_id: &str, allowlist: &[String]) -> bool {
    // An empty list under an explicit allowlist policy means "deny
    // everyone", unlike the generic helper which treats empty as open.
    !allowlist.is_empty() && gating::is_allowed(sender_id, allowlist)
}

/// Gate an inbound message against the account's effective config.
pub fn check_access(cfg: &EffectiveConfig, ctx: &InboundContext) -> Result<(), AccessDenied> {
    match ctx.chat_kind {
        ChatKind::P2p => check_dm(cfg, ctx),
        ChatKind::Group => check_group(cfg, ctx),
    }
}

fn check_dm(cfg: &EffectiveConfig, ctx: &InboundContext) -> Result<(), AccessDenied> {
    match cfg.dm_policy {
        DmPolicy::Open => Ok(()),
        DmPolicy::Disabled => Err(AccessDenied::DmsDisabled),
        // Pairing approval is host-managed; approved senders land on the
        // allowlist, so both policies gate identically here.
        DmPolicy::Allowlist | DmPolicy::Pairing => {
            if allowed(&ctx.sender_id, &cfg.allow_from) {
                Ok(())
            } else {
                Err(AccessDenied::NotOnAllowlist)
            }
        },
    }
}

fn check_group(cfg: &EffectiveConfig, ctx: &InboundContext) -> Result<(), AccessDenied> {
    if cfg.group_policy == GroupPolicy::Disabled {
        return Err(AccessDenied::GroupsDisabled);
    }
    let group = cfg.group(&ctx.chat_id);
    if group.is_some_and(|g| g.enabled == Some(false)) {
        return Err(AccessDenied::GroupDisabled);
    }

    if cfg.group_policy == GroupPolicy::Allowlist {
        let group_list: Vec<String> = group
            .map(|g| g.allow_from.iter().map(|e| e.as_string()).collect())
            .unwrap_or_default();
        if !allowed(&ctx.sender_id, &cfg.group_allow_from)
            && !allowed(&ctx.sender_id, &group_list)
        {
            return Err(AccessDenied::NotOnGroupAllowlist);
        }
    }

    let require_mention = group.and_then(|g| g.require_mention).unwrap_or(false);
    if require_mention && !ctx.mentions.iter().any(|m| m.is_bot()) {
        return Err(AccessDenied::MentionRequired);
    }
    Ok(())
}
