//! Conflict-safe saving.
//!
//! Every mutation is derived from a fetched `Page`. Before committing, the
//! page's current revision is re-read; if it moved, the save is abandoned
//! with `EditConflict` and nothing is written. No retry happens here.

use tracing::{info, warn};

use crate::error::{BotError, Result};
use crate::wiki::{Page, PageEdit, WikiBackend, WikiError};

/// Result of a guarded save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written; carries the new revision when the store reported one
    Saved(Option<u64>),
    /// Dry run: the revision check passed but nothing was written
    Skipped,
}

/// Saves page text only if the page is still at the observed revision.
pub struct ConflictSafeSave<'a> {
    wiki: &'a dyn WikiBackend,
    dry_run: bool,
}

impl<'a> ConflictSafeSave<'a> {
    pub fn new(wiki: &'a dyn WikiBackend, dry_run: bool) -> Self {
        Self { wiki, dry_run }
    }

    pub async fn save(
        &self,
        page: &Page,
        text: &str,
        minor: bool,
        summary: &str,
    ) -> Result<SaveOutcome> {
        let current = self.wiki.fetch_page(&page.title).await?;

        if current.revision != page.revision {
            warn!(
                title = %page.title,
                expected = ?page.revision,
                found = ?current.revision,
                "Revision changed, aborting edit"
            );
            return Err(BotError::EditConflict {
                title: page.title.clone(),
                expected: page.revision,
                found: current.revision,
            });
        }

        if self.dry_run {
            info!(title = %page.title, summary = %summary, "Dry run, not saving");
            return Ok(SaveOutcome::Skipped);
        }

        let edit = PageEdit {
            title: page.title.clone(),
            text: text.to_string(),
            summary: summary.to_string(),
            minor,
            base_revision: page.revision,
        };

        match self.wiki.save_page(&edit).await {
            Ok(revision) => {
                info!(title = %page.title, summary = %summary, "Saved");
                Ok(SaveOutcome::Saved(revision))
            }
            // The store's own check caught a write that raced ours.
            Err(WikiError::Conflict(_)) => Err(BotError::EditConflict {
                title: page.title.clone(),
                expected: page.revision,
                found: None,
            }),
            Err(e) => Err(e.into()),
        }
    }
}
