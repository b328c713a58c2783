//! Continuation scan for removing a resolved entry.
//!
//! Starting at the entry's line index, walk forward and collect the byte
//! ranges to delete: the entry itself, a bare `*` placeholder directly below
//! it, and any comment lines (`*:`, `**`, `:`) that follow. Blank lines are
//! stepped over but kept. The first other line ends the scan.

use std::ops::Range;

use crate::wikitext::line_spans;

const CONTINUATION_PREFIXES: [&str; 3] = ["*:", "**", ":"];

fn is_continuation(line: &str) -> bool {
    CONTINUATION_PREFIXES
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

/// Byte ranges of `text` that belong to the entry on line `entry`.
///
/// Ranges include the trailing line break except on the final line of the
/// document, which is removed without touching the line before it.
pub fn removal_ranges(text: &str, entry: usize) -> Vec<Range<usize>> {
    let lines = line_spans(text);
    let last = lines.len() - 1;
    let line_text = |at: usize| &text[lines[at].clone()];
    let with_break = |at: usize| {
        if at == last {
            lines[at].clone()
        } else {
            lines[at].start..lines[at + 1].start
        }
    };

    let mut ranges = Vec::new();
    let mut at = entry;

    while at <= last {
        if line_text(at).is_empty() {
            at += 1;
        } else if at == entry {
            if at != last && line_text(at + 1) == "*" {
                let bullet = with_break(at + 1);
                ranges.push(lines[at].start..bullet.end);
                at += 2;
            } else if at == last {
                ranges.push(lines[at].clone());
                break;
            } else {
                ranges.push(with_break(at));
                at += 1;
            }
        } else if is_continuation(line_text(at)) {
            ranges.push(with_break(at));
            if at == last {
                break;
            }
            at += 1;
        } else {
            break;
        }
    }

    ranges
}
