//! Crate-level error taxonomy.

use crate::wiki::WikiError;

/// Errors raised while reconciling a noticeboard.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BotError {
    /// Missing or malformed settings directive
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The page changed between deriving an edit and committing it
    #[error("Edit conflict on {title}: expected revision {expected:?}, found {found:?}")]
    EditConflict {
        title: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    /// Subject status could not be resolved
    #[error("Status lookup failed for {subject}: {reason}")]
    StatusLookup { subject: String, reason: String },

    /// Special subject registry could not be refreshed
    #[error("Registry error: {0}")]
    Registry(String),

    #[error(transparent)]
    Wiki(#[from] WikiError),
}

impl BotError {
    /// Conflicts are expected under contention and retried on the next pass.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BotError::EditConflict { .. } | BotError::Wiki(WikiError::Conflict(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
