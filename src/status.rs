//! Live moderation status of a reported subject.
//!
//! Resolved fresh for every entry and never cached across entries.

use tracing::warn;

use crate::error::{BotError, Result};
use crate::wiki::{BlockRecord, WikiBackend, WikiError};

const INDEFINITE_EXPIRIES: [&str; 4] = ["infinite", "infinity", "indefinite", "never"];

/// Snapshot of a subject's sanctions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectStatus {
    pub subject: String,
    pub is_anonymous: bool,
    pub is_blocked: bool,
    pub is_locked: bool,
    pub is_partial_block: bool,
    pub is_anon_only: bool,
    pub blocked_by: Option<String>,
    pub block_expiry: Option<String>,
    pub block_own_talk: bool,
    pub block_email: bool,
    pub block_no_create: bool,
}

impl SubjectStatus {
    /// Blocked, or (for accounts) globally locked.
    pub fn is_sanctioned(&self) -> bool {
        self.is_blocked || self.is_locked
    }

    /// Sanctioned and not merely restricted from specific pages.
    pub fn is_removable(&self) -> bool {
        self.is_sanctioned() && !self.is_partial_block
    }

    pub fn is_indefinite(&self) -> bool {
        self.block_expiry
            .as_deref()
            .is_some_and(|expiry| INDEFINITE_EXPIRIES.contains(&expiry))
    }

    /// Legend abbreviations for the block's restrictions.
    pub fn restriction_flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.block_own_talk {
            flags.push("TPD");
        }
        if self.block_email {
            flags.push("EMD");
        }
        if self.block_no_create {
            flags.push("ACB");
        }
        if self.is_anon_only {
            flags.push("AO");
        }
        flags
    }
}

fn lookup_error(subject: &str, error: WikiError) -> BotError {
    BotError::StatusLookup {
        subject: subject.to_string(),
        reason: error.to_string(),
    }
}

/// Query the wiki for everything the engine needs to know about `subject`.
pub async fn resolve_status(wiki: &dyn WikiBackend, subject: &str) -> Result<SubjectStatus> {
    let info = wiki
        .user_info(subject)
        .await
        .map_err(|e| lookup_error(subject, e))?;

    // A failed lock lookup must not stall the pass.
    let is_locked = if info.anonymous {
        false
    } else {
        match wiki.is_locked(subject).await {
            Ok(locked) => locked,
            Err(e) => {
                warn!(subject = %subject, error = %e, "Lock lookup failed, assuming not locked");
                false
            }
        }
    };

    let blocks: Vec<BlockRecord> = if info.is_blocked() || is_locked {
        wiki.list_blocks(subject)
            .await
            .map_err(|e| lookup_error(subject, e))?
    } else {
        Vec::new()
    };

    let block = info.block.clone().unwrap_or_default();
    let is_partial_block = if blocks.is_empty() {
        info.is_blocked() && block.partial
    } else {
        blocks.iter().all(|b| b.partial)
    };
    let is_anon_only =
        info.anonymous && (blocks.iter().any(|b| b.anononly) || (info.is_blocked() && block.anon_only));

    Ok(SubjectStatus {
        subject: subject.to_string(),
        is_anonymous: info.anonymous,
        is_blocked: info.is_blocked(),
        is_locked,
        is_partial_block,
        is_anon_only,
        blocked_by: Some(block.blocked_by).filter(|by| !by.is_empty()),
        block_expiry: Some(block.expiry).filter(|expiry| !expiry.is_empty()),
        block_own_talk: block.own_talk,
        block_email: block.email,
        block_no_create: block.no_create,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::{BlockInfo, MockWiki, UserInfo};

    fn blocked_user(name: &str, partial: bool) -> UserInfo {
        UserInfo {
            name: name.to_string(),
            anonymous: false,
            block: Some(BlockInfo {
                blocked_by: "AdminX".to_string(),
                expiry: "infinite".to_string(),
                partial,
                email: true,
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_fully_blocked_account() {
        let wiki = MockWiki::new()
            .with_user(blocked_user("Example", false))
            .with_blocks("Example", vec![BlockRecord::default()]);

        let status = resolve_status(&wiki, "Example").await.unwrap();

        assert!(status.is_removable());
        assert!(status.is_indefinite());
        assert_eq!(status.blocked_by.as_deref(), Some("AdminX"));
        assert_eq!(status.restriction_flags(), vec!["EMD"]);
    }

    #[tokio::test]
    async fn test_partial_block_is_not_removable() {
        let partial = BlockRecord {
            partial: true,
            ..Default::default()
        };
        let wiki = MockWiki::new()
            .with_user(blocked_user("Example", true))
            .with_blocks("Example", vec![partial]);

        let status = resolve_status(&wiki, "Example").await.unwrap();

        assert!(status.is_sanctioned());
        assert!(status.is_partial_block);
        assert!(!status.is_removable());
    }

    #[tokio::test]
    async fn test_any_sitewide_block_overrides_partial() {
        let partial = BlockRecord {
            partial: true,
            ..Default::default()
        };
        let wiki = MockWiki::new()
            .with_user(blocked_user("Example", true))
            .with_blocks("Example", vec![partial, BlockRecord::default()]);

        let status = resolve_status(&wiki, "Example").await.unwrap();
        assert!(status.is_removable());
    }

    #[tokio::test]
    async fn test_locked_account_without_blocks() {
        let wiki = MockWiki::new().with_locked("Locked");

        let status = resolve_status(&wiki, "Locked").await.unwrap();

        assert!(status.is_locked);
        assert!(!status.is_blocked);
        assert!(status.is_removable());
        assert_eq!(status.blocked_by, None);
    }

    #[tokio::test]
    async fn test_lock_lookup_failure_degrades_to_unlocked() {
        let wiki = MockWiki::new().with_lock_lookup_failure("Example");

        let status = resolve_status(&wiki, "Example").await.unwrap();

        assert!(!status.is_locked);
        assert!(!status.is_sanctioned());
    }

    #[tokio::test]
    async fn test_anon_only_ip_block() {
        let ip = "192.0.2.8";
        let wiki = MockWiki::new()
            .with_user(UserInfo {
                name: ip.to_string(),
                anonymous: true,
                block: Some(BlockInfo {
                    blocked_by: "AdminY".to_string(),
                    expiry: "2030-01-01T00:00:00Z".to_string(),
                    no_create: true,
                    ..Default::default()
                }),
            })
            .with_blocks(
                ip,
                vec![BlockRecord {
                    anononly: true,
                    nocreate: true,
                    ..Default::default()
                }],
            );

        let status = resolve_status(&wiki, ip).await.unwrap();

        assert!(status.is_anonymous);
        assert!(!status.is_indefinite());
        assert_eq!(status.restriction_flags(), vec!["ACB", "AO"]);
    }
}
