use serde::{Deserialize, Serialize};

/// Check if a peer is allowed to interact with the bot.
///
/// An empty allowlist means everyone is allowed (open policy).
/// Entries are matched case-insensitively against the peer ID.
/// Supports exact match and glob-style `*` wildcards.
pub fn is_allowed(peer_id: &str, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let peer_lower = peer_id.to_lowercase();
    allowlist.iter().any(|pattern| {
        let pat = pattern.to_lowercase();
        if pat.contains('*') {
            glob_match(&pat, &peer_lower)
        } else {
            pat == peer_lower
        }
    })
}

/// Simple glob matching supporting `*` as a wildcard for any sequence of chars.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(idx) => {
                // First segment must match at start
                if i == 0 && idx != 0 {
                    return false;
                }
                pos += idx + part.len();
            },
            None => return false,
        }
    }
    // Last segment must match at end (unless pattern ends with *)
    if !parts.last().unwrap_or(&"").is_empty() {
        pos == text.len()
    } else {
        true
    }
}

/// DM access policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DmPolicy {
    /// Anyone can DM the bot.
    Open,
    /// Only users on the allowlist.
    Allowlist,
    /// Allowlist plus host-managed pairing approval. At gating time this
    /// behaves like `Allowlist`; approved senders land on the allowlist.
    #[default]
    Pairing,
    /// DMs disabled.
    Disabled,
}

/// Group access policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupPolicy {
    /// Bot responds in all groups.
    Open,
    /// Only senders on the group allowlist.
    #[default]
    Allowlist,
    /// Groups disabled.
    Disabled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allowlist_allows_everyone() {
        assert!(is_allowed("anyone", &[]));
    }

    #[test]
    fn exact_match() {
        let list = vec!["ou_alice".into(), "ou_bob".into()];
        assert!(is_allowed("ou_alice", &list));
        assert!(is_allowed("OU_Alice", &list));
        assert!(!is_allowed("ou_charlie", &list));
    }

    #[test]
    fn glob_wildcard() {
        let list = vec!["ou_admin*".into()];
        assert!(is_allowed("ou_admin123", &list));
        assert!(!is_allowed("ou_user123", &list));
    }

    #[test]
    fn glob_suffix() {
        let list = vec!["*_ops".into()];
        assert!(is_allowed("team_ops", &list));
        assert!(!is_allowed("team_dev", &list));
    }

    #[test]
    fn policy_defaults() {
        assert_eq!(DmPolicy::default(), DmPolicy::Pairing);
        assert_eq!(GroupPolicy::default(), GroupPolicy::Allowlist);
    }

    #[test]
    fn policy_serde_lowercase() {
        let p: DmPolicy = serde_json::from_str("\"pairing\"").unwrap();
        assert_eq!(p, DmPolicy::Pairing);
        assert_eq!(serde_json::to_string(&GroupPolicy::Open).unwrap(), "\"open\"");
    }
}
