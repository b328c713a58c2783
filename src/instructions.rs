//! Instruction block synchronization.
//!
//! The canonical instructions live on `<page>/instructions` between fixed
//! delimiters. The live copy sits at the top of the "User-reported"
//! section, immediately followed by the first report bullet.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::save::{ConflictSafeSave, SaveOutcome};
use crate::wiki::{Page, WikiBackend};
use crate::wikitext::{find_section, line_spans};

pub const INSTRUCTIONS_BEGIN: &str = "<!-- HBC AIV helperbot BEGIN INSTRUCTIONS -->";
pub const INSTRUCTIONS_END: &str = "<!-- HBC AIV helperbot END INSTRUCTIONS -->";
pub const INSTRUCTIONS_HEADING: &str = "User-reported";
pub const INSTRUCTIONS_SUFFIX: &str = "/instructions";
pub const INSTRUCTIONS_SUMMARY: &str = "Reinstating page instructions";

/// Text between the first begin delimiter and the last end delimiter, each
/// on its own line.
pub fn canonical_block(text: &str) -> Option<&str> {
    let open = format!("{}\n", INSTRUCTIONS_BEGIN);
    let close = format!("\n{}", INSTRUCTIONS_END);

    let start = text.find(&open)? + open.len();
    let end = text[start..].rfind(&close)? + start;
    Some(&text[start..end])
}

/// Rewrite the instruction region of the live section so it reads
/// `<block>\n\n*`. Returns `None` when the section is missing or already
/// canonical.
pub fn repair_section(text: &str, block: &str) -> Option<String> {
    let section = find_section(text, INSTRUCTIONS_HEADING)?;
    let body = &text[section.body.clone()];
    let canonical = format!("{}\n\n*", block);

    if body.starts_with(&canonical) {
        return None;
    }

    // Everything up to the first bullet is instruction region.
    let rest = line_spans(body)
        .into_iter()
        .find(|span| body[span.clone()].starts_with('*'))
        .map(|span| &body[span.start + 1..])
        .unwrap_or("\n");

    let separator = if section.body.start == section.heading.end { "\n" } else { "" };
    Some(format!(
        "{}{}{}{}{}",
        &text[..section.body.start],
        separator,
        canonical,
        rest,
        &text[section.body.end..]
    ))
}

/// Bring the live instructions in line with the canonical copy.
///
/// Returns `true` when the page was rewritten, in which case the caller must
/// re-fetch before deriving anything else from it.
pub async fn sync_instructions(
    wiki: &dyn WikiBackend,
    saver: &ConflictSafeSave<'_>,
    page: &Page,
) -> Result<bool> {
    let source_title = format!("{}{}", page.title, INSTRUCTIONS_SUFFIX);
    let source = wiki.fetch_page(&source_title).await?;
    if !source.exists {
        debug!(title = %source_title, "No instructions page");
        return Ok(false);
    }

    let Some(block) = canonical_block(&source.text) else {
        warn!(title = %source_title, "Instructions delimiters not found");
        return Ok(false);
    };

    if block.is_empty() {
        info!(title = %source_title, "Canonical instructions are empty, leaving page alone");
        return Ok(false);
    }

    if find_section(&page.text, INSTRUCTIONS_HEADING).is_none() {
        warn!(title = %page.title, "No {} section", INSTRUCTIONS_HEADING);
        return Ok(false);
    }

    let Some(repaired) = repair_section(&page.text, block) else {
        return Ok(false);
    };

    info!(title = %page.title, "Replacing instructions");
    let outcome = saver.save(page, &repaired, true, INSTRUCTIONS_SUMMARY).await?;
    Ok(matches!(outcome, SaveOutcome::Saved(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::MockWiki;

    fn source(block: &str) -> String {
        format!(
            "Edit below.\n{}\n{}\n{}\nfooter",
            INSTRUCTIONS_BEGIN, block, INSTRUCTIONS_END
        )
    }

    const BOARD: &str = "\
== Reports ==
=== User-reported ===
<!-- old instructions -->

* {{vandal|Example}} spam
=== Bot-reported ===
* {{vandal|Other}}
";

    #[test]
    fn test_canonical_block() {
        assert_eq!(canonical_block(&source("Line one\nLine two")), Some("Line one\nLine two"));
        assert_eq!(canonical_block(&source("")), Some(""));
        assert_eq!(canonical_block("nothing here"), None);
    }

    #[test]
    fn test_repair_replaces_region_before_first_bullet() {
        let repaired = repair_section(BOARD, "<!-- new -->").unwrap();
        assert_eq!(
            repaired,
            "\
== Reports ==
=== User-reported ===
<!-- new -->

* {{vandal|Example}} spam
=== Bot-reported ===
* {{vandal|Other}}
"
        );
    }

    #[test]
    fn test_repair_is_noop_when_canonical() {
        let repaired = repair_section(BOARD, "<!-- new -->").unwrap();
        assert_eq!(repair_section(&repaired, "<!-- new -->"), None);
    }

    #[test]
    fn test_repair_without_bullets_adds_placeholder() {
        let text = "=== User-reported ===\nold\n=== Bot-reported ===\n";
        let repaired = repair_section(text, "new").unwrap();
        assert_eq!(repaired, "=== User-reported ===\nnew\n\n*\n=== Bot-reported ===\n");
    }

    #[tokio::test]
    async fn test_sync_saves_once_then_reports_no_change() {
        let wiki = MockWiki::new()
            .with_page("Board", BOARD)
            .with_page("Board/instructions", source("<!-- new -->"));
        let saver = ConflictSafeSave::new(&wiki, false);

        let page = wiki.fetch_page("Board").await.unwrap();
        assert!(sync_instructions(&wiki, &saver, &page).await.unwrap());
        let saves = wiki.saves();
        let saved = &saves[0];
        assert!(saved.minor);
        assert_eq!(saved.summary, INSTRUCTIONS_SUMMARY);

        let page = wiki.fetch_page("Board").await.unwrap();
        assert!(!sync_instructions(&wiki, &saver, &page).await.unwrap());
        assert_eq!(wiki.save_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_canonical_block_is_noop() {
        let wiki = MockWiki::new()
            .with_page("Board", BOARD)
            .with_page("Board/instructions", source(""));
        let saver = ConflictSafeSave::new(&wiki, false);

        let page = wiki.fetch_page("Board").await.unwrap();
        assert!(!sync_instructions(&wiki, &saver, &page).await.unwrap());
        assert_eq!(wiki.save_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_instructions_page_is_noop() {
        let wiki = MockWiki::new().with_page("Board", BOARD);
        let saver = ConflictSafeSave::new(&wiki, false);

        let page = wiki.fetch_page("Board").await.unwrap();
        assert!(!sync_instructions(&wiki, &saver, &page).await.unwrap());
    }
}
