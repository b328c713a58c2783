//! Core trait for wiki backends.
//!
//! `WikiBackend` is the seam between the reconciliation engine and the
//! remote wiki: page storage on one side, account/block lookups on the other.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error types for wiki operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WikiError {
    /// Transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The API answered with an error envelope
    #[error("API error {code}: {info}")]
    Api { code: String, info: String },

    /// Response could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Login rejected or session lost
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The store refused an edit because the page changed underneath it
    #[error("Edit conflict on {0}")]
    Conflict(String),
}

/// A page as fetched from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub title: String,
    /// Current wikitext, empty for a missing page
    pub text: String,
    /// Latest revision id, `None` for a missing page
    pub revision: Option<u64>,
    pub exists: bool,
}

impl Page {
    pub fn missing(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: String::new(),
            revision: None,
            exists: false,
        }
    }
}

/// A text replacement to commit to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEdit {
    pub title: String,
    pub text: String,
    pub summary: String,
    pub minor: bool,
    /// Revision the new text was derived from
    pub base_revision: Option<u64>,
}

/// Active block on a subject, as reported by the account lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub blocked_by: String,
    pub expiry: String,
    pub partial: bool,
    /// Talk page editing disabled
    pub own_talk: bool,
    /// Email disabled
    pub email: bool,
    /// Account creation disabled
    pub no_create: bool,
    pub anon_only: bool,
}

/// Account-level view of a subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub anonymous: bool,
    pub block: Option<BlockInfo>,
}

impl UserInfo {
    pub fn is_blocked(&self) -> bool {
        self.block.is_some()
    }
}

/// One entry of the block log list for a user or IP range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub by: String,
    #[serde(default)]
    pub expiry: String,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub anononly: bool,
    #[serde(default)]
    pub nocreate: bool,
    #[serde(default)]
    pub noemail: bool,
    #[serde(default)]
    pub allowusertalk: bool,
}

/// Backend over the wiki's page store and account directory.
#[async_trait]
pub trait WikiBackend: Send + Sync {
    /// Fetch the latest revision of a page.
    async fn fetch_page(&self, title: &str) -> Result<Page, WikiError>;

    /// Commit new text. Returns the new revision id, or `None` when the
    /// store reported the edit as a no-op.
    async fn save_page(&self, edit: &PageEdit) -> Result<Option<u64>, WikiError>;

    /// Look up a user or IP and its current block.
    async fn user_info(&self, name: &str) -> Result<UserInfo, WikiError>;

    /// All active blocks affecting a user, IP or range.
    async fn list_blocks(&self, name: &str) -> Result<Vec<BlockRecord>, WikiError>;

    /// Whether a registered account is globally locked.
    async fn is_locked(&self, name: &str) -> Result<bool, WikiError>;

    /// Full category titles (`Category:...`) of the subject's user page.
    async fn user_categories(&self, name: &str) -> Result<Vec<String>, WikiError>;
}

/// True when the identifier names an IP address or range rather than an account.
pub fn is_anonymous_subject(name: &str) -> bool {
    let name = name.trim();
    name.parse::<std::net::IpAddr>().is_ok() || name.parse::<ipnet::IpNet>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_subjects() {
        assert!(is_anonymous_subject("192.0.2.7"));
        assert!(is_anonymous_subject("2001:db8::1"));
        assert!(is_anonymous_subject("198.51.100.0/24"));
        assert!(!is_anonymous_subject("Example"));
        assert!(!is_anonymous_subject("192.0.2"));
    }

    #[test]
    fn test_missing_page() {
        let page = Page::missing("Wikipedia:Nowhere");
        assert!(!page.exists);
        assert_eq!(page.revision, None);
        assert!(page.text.is_empty());
    }
}
