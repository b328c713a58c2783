//! Backlog indicator toggling.
//!
//! Noticeboards carry `{{adminbacklog}}` or `{{noadminbacklog}}`. The
//! indicator flips to backlogged once the open count reaches `AddLimit` and
//! back once it falls to `RemoveLimit`; between the two limits it is left as
//! is, whichever state it is in.

use std::fmt;
use std::ops::Range;

use tracing::{debug, info};

use crate::census::count_reports;
use crate::error::Result;
use crate::save::ConflictSafeSave;
use crate::settings::SettingsDirective;
use crate::wiki::WikiBackend;
use crate::wikitext::{parse_templates, render_template, replace_spans};

pub const BACKLOGGED: &str = "adminbacklog";
pub const NOT_BACKLOGGED: &str = "noadminbacklog";

/// Direction of an indicator flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacklogChange {
    Backlogged,
    Cleared,
}

impl BacklogChange {
    fn template(self) -> &'static str {
        match self {
            BacklogChange::Backlogged => BACKLOGGED,
            BacklogChange::Cleared => NOT_BACKLOGGED,
        }
    }

    pub fn summary(self, open_reports: usize) -> String {
        match self {
            BacklogChange::Backlogged => {
                format!("{} reports remaining. Noticeboard is backlogged.", open_reports)
            }
            BacklogChange::Cleared => format!(
                "{} reports remaining. Noticeboard is no longer backlogged",
                open_reports
            ),
        }
    }
}

impl fmt::Display for BacklogChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BacklogChange::Backlogged => write!(f, "backlogged"),
            BacklogChange::Cleared => write!(f, "not backlogged"),
        }
    }
}

/// Decide which indicators flip for `open_reports` and render the new text.
///
/// Only flips in the direction of the first indicator that needs one are
/// applied, so a single save never carries contradictory indicators.
pub fn plan_toggle(
    text: &str,
    settings: &SettingsDirective,
    open_reports: usize,
    identity: &str,
) -> Option<(BacklogChange, String)> {
    let count = open_reports as u64;
    let flips: Vec<(Range<usize>, BacklogChange)> = parse_templates(text)
        .into_iter()
        .filter_map(|template| {
            if template.name_is(NOT_BACKLOGGED) && count >= u64::from(settings.add_limit) {
                Some((template.span, BacklogChange::Backlogged))
            } else if template.name_is(BACKLOGGED) && count <= u64::from(settings.remove_limit) {
                Some((template.span, BacklogChange::Cleared))
            } else {
                None
            }
        })
        .collect();

    let direction = flips.first()?.1;
    let replacement = render_template(direction.template(), &[("bot", identity)]);
    let replacements: Vec<(Range<usize>, String)> = flips
        .into_iter()
        .filter(|(_, change)| *change == direction)
        .map(|(span, _)| (span, replacement.clone()))
        .collect();

    Some((direction, replace_spans(text, &replacements)))
}

/// Re-fetch `title` and flip its indicator if the open count calls for it.
pub async fn toggle_backlog(
    wiki: &dyn WikiBackend,
    saver: &ConflictSafeSave<'_>,
    title: &str,
    settings: &SettingsDirective,
    identity: &str,
) -> Result<Option<BacklogChange>> {
    if !settings.auto_backlog {
        return Ok(None);
    }

    let page = wiki.fetch_page(title).await?;
    let open_reports = count_reports(&page.text);

    let Some((change, text)) = plan_toggle(&page.text, settings, open_reports, identity) else {
        debug!(title = %title, open_reports, "Backlog indicator unchanged");
        return Ok(None);
    };

    info!(title = %title, open_reports, "Marking as {}", change);
    saver
        .save(&page, &text, false, &change.summary(open_reports))
        .await?;
    Ok(Some(change))
}
