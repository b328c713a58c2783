//! Entry resolution.
//!
//! Walks report entries in document order, resolves each subject and either
//! annotates the entry or removes it. The first action that changes the page
//! ends the document's pass: line indices and template spans are stale after
//! a save, so remaining entries wait for the next pass on a fresh fetch.

pub mod scan;
pub mod summary;

use tracing::{debug, info, warn};

use crate::census::report_templates;
use crate::error::Result;
use crate::registry::SpecialSubjectRegistry;
use crate::save::ConflictSafeSave;
use crate::settings::SettingsDirective;
use crate::status::{resolve_status, SubjectStatus};
use crate::wiki::{Page, WikiBackend};
use crate::wikitext::{line_spans, replace_spans};

use summary::MARKED;

/// One report template found on a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// Zero-based line index
    pub line: usize,
    pub subject: String,
    /// Line already carries the annotation marker
    pub marked: bool,
}

/// What a document pass did with its entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Unchanged,
    Annotated { subject: String },
    Removed { subject: String },
}

impl EntryOutcome {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, EntryOutcome::Unchanged)
    }
}

/// Report entries in document order. Templates without a subject are
/// skipped, as are templates inside comments.
pub fn report_entries(text: &str) -> Vec<ReportEntry> {
    let lines = line_spans(text);

    report_templates(text)
        .into_iter()
        .filter_map(|template| {
            let subject = template.get("1")?.trim();
            let subject = subject.strip_prefix("1=").unwrap_or(subject).trim();
            if subject.is_empty() {
                return None;
            }

            // Lines are sorted by start, so the owning line is the last one
            // starting at or before the template.
            let line = lines
                .partition_point(|span| span.start <= template.span.start)
                .saturating_sub(1);
            Some(ReportEntry {
                line,
                subject: subject.to_string(),
                marked: text[lines[line].clone()].contains(MARKED),
            })
        })
        .collect()
}

/// Resolves report entries against live subject status.
pub struct EntryResolutionEngine<'a> {
    wiki: &'a dyn WikiBackend,
    saver: &'a ConflictSafeSave<'a>,
    registry: &'a SpecialSubjectRegistry,
    legend_page: &'a str,
}

impl<'a> EntryResolutionEngine<'a> {
    pub fn new(
        wiki: &'a dyn WikiBackend,
        saver: &'a ConflictSafeSave<'a>,
        registry: &'a SpecialSubjectRegistry,
        legend_page: &'a str,
    ) -> Self {
        Self {
            wiki,
            saver,
            registry,
            legend_page,
        }
    }

    /// Process entries until one of them changes the page.
    ///
    /// `open_reports` is the census taken on `page` before any change.
    pub async fn resolve(
        &self,
        page: &Page,
        settings: &SettingsDirective,
        open_reports: usize,
    ) -> Result<EntryOutcome> {
        if !settings.auto_mark && !settings.remove_blocked {
            debug!(title = %page.title, "Marking and removal both disabled");
            return Ok(EntryOutcome::Unchanged);
        }

        for entry in report_entries(&page.text) {
            let status = resolve_status(self.wiki, &entry.subject).await?;

            if settings.auto_mark && !entry.marked {
                if let Some(outcome) = self.annotate(page, &entry, &status, open_reports).await? {
                    return Ok(outcome);
                }
            }

            if settings.remove_blocked && status.is_removable() {
                return self.remove(page, &entry, &status, open_reports).await;
            }

            if status.is_sanctioned() {
                debug!(subject = %entry.subject, "Partial block, leaving entry");
            }
        }

        Ok(EntryOutcome::Unchanged)
    }

    async fn annotate(
        &self,
        page: &Page,
        entry: &ReportEntry,
        status: &SubjectStatus,
        open_reports: usize,
    ) -> Result<Option<EntryOutcome>> {
        let ip_note = status
            .is_anonymous
            .then(|| self.registry.ip_note(&entry.subject))
            .flatten();

        let (note, edit_summary) = match ip_note {
            Some(note) => {
                info!(subject = %entry.subject, "Marking as a sensitive IP");
                (
                    summary::ip_note(note),
                    summary::ip_note_summary(open_reports, &entry.subject),
                )
            }
            None => {
                let Some(category) = self.special_category(&entry.subject).await? else {
                    return Ok(None);
                };
                info!(
                    subject = %entry.subject,
                    category = %category,
                    "Marking as belonging to a watched category"
                );
                (
                    summary::category_note(&category),
                    summary::category_note_summary(open_reports, &entry.subject, &category),
                )
            }
        };

        let span = line_spans(&page.text)[entry.line].clone();
        let annotated = format!("{}{}\n{}", &page.text[span.clone()], MARKED, note);
        let text = replace_spans(&page.text, &[(span, annotated)]);

        self.saver.save(page, &text, false, &edit_summary).await?;
        Ok(Some(EntryOutcome::Annotated {
            subject: entry.subject.clone(),
        }))
    }

    /// First category of the subject's user page that the registry watches.
    async fn special_category(&self, subject: &str) -> Result<Option<String>> {
        if self.registry.categories().is_empty() {
            return Ok(None);
        }

        // A failed lookup must not stall the pass.
        let categories = match self.wiki.user_categories(subject).await {
            Ok(categories) => categories,
            Err(e) => {
                warn!(
                    subject = %subject,
                    error = %e,
                    "Category lookup failed, assuming no watched category"
                );
                return Ok(None);
            }
        };

        Ok(categories
            .into_iter()
            .find(|category| self.registry.has_category(category)))
    }

    async fn remove(
        &self,
        page: &Page,
        entry: &ReportEntry,
        status: &SubjectStatus,
        open_reports: usize,
    ) -> Result<EntryOutcome> {
        let ranges = scan::removal_ranges(&page.text, entry.line);
        info!(
            subject = %entry.subject,
            lines = ranges.len(),
            "Removing entry for sanctioned subject"
        );

        let replacements: Vec<_> = ranges
            .into_iter()
            .map(|range| (range, String::new()))
            .collect();
        let text = replace_spans(&page.text, &replacements);

        let remaining = open_reports.saturating_sub(1);
        let edit_summary = summary::removal_summary(remaining, status, self.legend_page);

        self.saver.save(page, &text, false, &edit_summary).await?;
        Ok(EntryOutcome::Removed {
            subject: entry.subject.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::{BlockInfo, BlockRecord, MockWiki, UserInfo};

    const LEGEND: &str = "User:HBC AIV helperbot/Legend";

    fn settings(auto_mark: bool, remove_blocked: bool) -> SettingsDirective {
        SettingsDirective {
            version: "2.0.21".to_string(),
            remove_blocked,
            merge_duplicates: true,
            auto_mark,
            fix_instructions: true,
            auto_backlog: true,
            add_limit: 8,
            remove_limit: 4,
        }
    }

    fn blocked(name: &str) -> UserInfo {
        UserInfo {
            name: name.to_string(),
            anonymous: false,
            block: Some(BlockInfo {
                blocked_by: "AdminX".to_string(),
                expiry: "infinite".to_string(),
                ..Default::default()
            }),
        }
    }

    async fn run(
        wiki: &MockWiki,
        registry: &SpecialSubjectRegistry,
        settings: &SettingsDirective,
    ) -> EntryOutcome {
        let page = wiki.fetch_page("Board").await.unwrap();
        let open_reports = crate::census::count_reports(&page.text);
        let saver = ConflictSafeSave::new(wiki, false);
        EntryResolutionEngine::new(wiki, &saver, registry, LEGEND)
            .resolve(&page, settings, open_reports)
            .await
            .unwrap()
    }

    #[test]
    fn test_report_entries() {
        let text = "\
* {{vandal|A}} {{IPvandal|1= 192.0.2.1 }}
* {{userlinks|B}}
* {{user-uaa|C}}<!--marked-->
* {{vandal|}}
";
        let entries = report_entries(text);
        assert_eq!(
            entries,
            vec![
                ReportEntry { line: 0, subject: "A".into(), marked: false },
                ReportEntry { line: 0, subject: "192.0.2.1".into(), marked: false },
                ReportEntry { line: 2, subject: "C".into(), marked: true },
            ]
        );
    }

    #[test]
    fn test_commented_report_is_not_an_entry() {
        let text = "<!--\n* {{vandal|Hidden}}\n-->\n* {{vandal|Real}}";
        assert_eq!(
            report_entries(text),
            vec![ReportEntry { line: 3, subject: "Real".into(), marked: false }]
        );
    }

    #[tokio::test]
    async fn test_commented_report_is_left_alone() {
        let text = "<!--\n* {{vandal|Example}}\n-->\n* {{vandal|Real}}";
        let wiki = MockWiki::new()
            .with_page("Board", text)
            .with_user(blocked("Example"));

        let outcome = run(&wiki, &SpecialSubjectRegistry::default(), &settings(true, true)).await;

        assert_eq!(outcome, EntryOutcome::Unchanged);
        assert_eq!(wiki.text("Board").as_deref(), Some(text));
        assert_eq!(wiki.save_count(), 0);
    }

    #[tokio::test]
    async fn test_category_lookup_failure_still_removes() {
        let registry = SpecialSubjectRegistry::parse("* [[:Category:Shared IP]]\n");
        let wiki = MockWiki::new()
            .with_page("Board", "* {{vandal|A}}\n* {{vandal|B}}\n")
            .with_user(blocked("A"))
            .with_category_lookup_failure("A");

        let outcome = run(&wiki, &registry, &settings(true, true)).await;

        assert_eq!(outcome, EntryOutcome::Removed { subject: "A".into() });
        assert_eq!(wiki.text("Board").as_deref(), Some("* {{vandal|B}}\n"));
    }

    #[tokio::test]
    async fn test_removes_first_sanctioned_entry_only() {
        let wiki = MockWiki::new()
            .with_page("Board", "* {{vandal|Clean}}\n* {{vandal|A}}\n* {{vandal|B}}\n")
            .with_user(blocked("A"))
            .with_user(blocked("B"));

        let outcome = run(&wiki, &SpecialSubjectRegistry::default(), &settings(true, true)).await;

        assert_eq!(outcome, EntryOutcome::Removed { subject: "A".into() });
        assert_eq!(
            wiki.text("Board").as_deref(),
            Some("* {{vandal|Clean}}\n* {{vandal|B}}\n")
        );
        assert_eq!(wiki.save_count(), 1);
        assert!(wiki.saves()[0].summary.starts_with("2 reports remaining, rm"));
    }

    #[tokio::test]
    async fn test_removal_disabled() {
        let wiki = MockWiki::new()
            .with_page("Board", "* {{vandal|A}}\n")
            .with_user(blocked("A"));

        let outcome = run(&wiki, &SpecialSubjectRegistry::default(), &settings(true, false)).await;

        assert_eq!(outcome, EntryOutcome::Unchanged);
        assert_eq!(wiki.save_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_block_is_kept() {
        let mut user = blocked("A");
        if let Some(block) = user.block.as_mut() {
            block.partial = true;
        }
        let wiki = MockWiki::new()
            .with_page("Board", "* {{vandal|A}}\n")
            .with_user(user)
            .with_blocks(
                "A",
                vec![BlockRecord {
                    partial: true,
                    ..Default::default()
                }],
            );

        let outcome = run(&wiki, &SpecialSubjectRegistry::default(), &settings(true, true)).await;

        assert_eq!(outcome, EntryOutcome::Unchanged);
        assert_eq!(wiki.save_count(), 0);
    }

    #[tokio::test]
    async fn test_annotates_sensitive_ip() {
        let registry = SpecialSubjectRegistry::parse(";192.0.2.0/24:School district\n");
        let wiki = MockWiki::new().with_page("Board", "* {{IPvandal|192.0.2.9}} spam\n");

        let outcome = run(&wiki, &registry, &settings(true, true)).await;

        assert_eq!(
            outcome,
            EntryOutcome::Annotated {
                subject: "192.0.2.9".into()
            }
        );
        assert_eq!(
            wiki.text("Board").as_deref(),
            Some("* {{IPvandal|192.0.2.9}} spam<!--marked-->\n:*'''Note:''' School district. ~~~~\n")
        );
        assert_eq!(
            wiki.saves()[0].summary,
            "1 reports remaining. Commenting on 192.0.2.9 : Sensitive IP"
        );
    }

    #[tokio::test]
    async fn test_annotates_watched_category() {
        let registry = SpecialSubjectRegistry::parse("* [[:Category:Shared IP]]\n");
        let wiki = MockWiki::new()
            .with_page("Board", "* {{vandal|Example}}\n")
            .with_categories(
                "Example",
                vec!["Category:Other".to_string(), "Category:Shared IP".to_string()],
            );

        let outcome = run(&wiki, &registry, &settings(true, true)).await;

        assert_eq!(
            outcome,
            EntryOutcome::Annotated {
                subject: "Example".into()
            }
        );
        assert_eq!(
            wiki.text("Board").as_deref(),
            Some(
                "* {{vandal|Example}}<!--marked-->\n\
                 :*'''Note:''' User is in the category: [[:Category:Shared IP]]. ~~~~\n"
            )
        );
    }

    #[tokio::test]
    async fn test_marked_entry_goes_to_removal() {
        let registry = SpecialSubjectRegistry::parse(";192.0.2.0/24:School district\n");
        let ip = "192.0.2.9";
        let wiki = MockWiki::new()
            .with_page(
                "Board",
                "* {{IPvandal|192.0.2.9}}<!--marked-->\n:*'''Note:''' School district. ~~~~\n",
            )
            .with_user(UserInfo {
                name: ip.to_string(),
                anonymous: true,
                block: Some(BlockInfo {
                    blocked_by: "AdminY".to_string(),
                    expiry: "31 hours".to_string(),
                    ..Default::default()
                }),
            })
            .with_blocks(ip, vec![BlockRecord::default()]);

        let outcome = run(&wiki, &registry, &settings(true, true)).await;

        assert_eq!(outcome, EntryOutcome::Removed { subject: ip.into() });
        assert_eq!(wiki.text("Board").as_deref(), Some(""));
        assert_eq!(
            wiki.saves()[0].summary,
            "0 reports remaining, rm [[Special:Contributions/192.0.2.9|192.0.2.9]] (blocked by AdminY)"
        );
    }

    #[tokio::test]
    async fn test_nothing_enabled_skips_lookups() {
        let wiki = MockWiki::new()
            .with_page("Board", "* {{vandal|A}}\n")
            .with_user(blocked("A"));

        let outcome = run(&wiki, &SpecialSubjectRegistry::default(), &settings(false, false)).await;
        assert_eq!(outcome, EntryOutcome::Unchanged);
    }
}
