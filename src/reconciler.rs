//! Reconciliation loop.
//!
//! One pass refreshes the special subject registry, then processes each
//! noticeboard in configured order. A failure on one page is logged and the
//! pass moves on; a registry failure ends the loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::backlog::toggle_backlog;
use crate::census::count_reports;
use crate::config::BotConfig;
use crate::entries::{EntryOutcome, EntryResolutionEngine};
use crate::error::Result;
use crate::instructions::sync_instructions;
use crate::registry::SpecialSubjectRegistry;
use crate::save::ConflictSafeSave;
use crate::settings::SettingsDirective;
use crate::wiki::WikiBackend;

/// Result of processing one noticeboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Unchanged,
    Mutated,
    /// The page moved under a pending edit; retried next pass
    Deferred(String),
    Fatal(String),
}

pub struct Reconciler {
    wiki: Arc<dyn WikiBackend>,
    config: BotConfig,
}

impl Reconciler {
    pub fn new(wiki: Arc<dyn WikiBackend>, config: BotConfig) -> Self {
        Self { wiki, config }
    }

    /// Run passes until a shutdown signal arrives.
    pub async fn run(&self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        info!(
            pages = self.config.pages.len(),
            interval_secs = self.config.poll_interval_secs,
            dry_run = self.config.dry_run,
            "Reconciler started"
        );

        let mut shutdown_open = true;

        'passes: loop {
            self.run_pass().await?;

            let pause = sleep(self.config.poll_interval());
            tokio::pin!(pause);

            loop {
                tokio::select! {
                    _ = &mut pause => break,
                    signal = shutdown_rx.recv(), if shutdown_open => match signal {
                        Some(()) => {
                            info!("Reconciler shutting down");
                            break 'passes;
                        }
                        None => {
                            warn!("Shutdown channel closed, running until the process is stopped");
                            shutdown_open = false;
                        }
                    },
                }
            }
        }

        Ok(())
    }

    /// Refresh the registry and process every page once.
    pub async fn run_pass(&self) -> Result<Vec<(String, PassOutcome)>> {
        let registry =
            SpecialSubjectRegistry::load(self.wiki.as_ref(), &self.config.special_ips_page).await?;

        let mut outcomes = Vec::with_capacity(self.config.pages.len());
        for title in &self.config.pages {
            let outcome = self.reconcile_document(title, &registry).await;
            outcomes.push((title.clone(), outcome));
        }

        let mutated = outcomes
            .iter()
            .filter(|(_, o)| *o == PassOutcome::Mutated)
            .count();
        let deferred = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, PassOutcome::Deferred(_)))
            .count();
        let failed = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, PassOutcome::Fatal(_)))
            .count();
        info!(pages = outcomes.len(), mutated, deferred, failed, "Pass complete");

        Ok(outcomes)
    }

    /// Process one page, containing any error to that page.
    pub async fn reconcile_document(
        &self,
        title: &str,
        registry: &SpecialSubjectRegistry,
    ) -> PassOutcome {
        match self.process_document(title, registry).await {
            Ok(true) => PassOutcome::Mutated,
            Ok(false) => PassOutcome::Unchanged,
            Err(e) if e.is_transient() => {
                warn!(title = %title, error = %e, "Page changed underneath us, retrying next pass");
                PassOutcome::Deferred(e.to_string())
            }
            Err(e) => {
                error!(title = %title, error = %e, "Failed to process page");
                PassOutcome::Fatal(e.to_string())
            }
        }
    }

    async fn process_document(
        &self,
        title: &str,
        registry: &SpecialSubjectRegistry,
    ) -> Result<bool> {
        let wiki = self.wiki.as_ref();
        let saver = ConflictSafeSave::new(wiki, self.config.dry_run);
        let mut restarted = false;

        let (page, settings, open_reports) = loop {
            let page = wiki.fetch_page(title).await?;
            if !page.exists {
                warn!(title = %title, "Page does not exist");
            }

            let open_reports = count_reports(&page.text);
            let settings = SettingsDirective::parse(&page.text)?;
            info!(title = %title, open_reports, settings = %settings, "Updated settings");

            if settings.fix_instructions && sync_instructions(wiki, &saver, &page).await? {
                if restarted {
                    debug!(title = %title, "Instructions rewritten twice, deferring page");
                    return Ok(true);
                }
                restarted = true;
                continue;
            }

            break (page, settings, open_reports);
        };

        let engine = EntryResolutionEngine::new(wiki, &saver, registry, &self.config.legend_page);
        let outcome = engine.resolve(&page, &settings, open_reports).await?;
        match &outcome {
            EntryOutcome::Removed { subject } => {
                info!(title = %title, subject = %subject, "Entry removed")
            }
            EntryOutcome::Annotated { subject } => {
                info!(title = %title, subject = %subject, "Entry annotated")
            }
            EntryOutcome::Unchanged => {}
        }

        let backlog =
            toggle_backlog(wiki, &saver, title, &settings, &self.config.identity).await?;

        Ok(restarted || outcome.is_mutation() || backlog.is_some())
    }
}
