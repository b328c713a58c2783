//! Edit summaries and note lines written by the engine.

use crate::status::SubjectStatus;

pub const MARKED: &str = "<!--marked-->";

/// Note appended below an entry whose subject is in a sensitive range.
pub fn ip_note(note: &str) -> String {
    format!(":*'''Note:''' {}. ~~~~", note)
}

/// Note appended below an entry whose subject is in a watched category.
pub fn category_note(category: &str) -> String {
    format!(":*'''Note:''' User is in the category: [[:{}]]. ~~~~", category)
}

pub fn ip_note_summary(remaining: usize, subject: &str) -> String {
    format!(
        "{} reports remaining. Commenting on {} : Sensitive IP",
        remaining, subject
    )
}

pub fn category_note_summary(remaining: usize, subject: &str, category: &str) -> String {
    format!(
        "{} reports remaining. Commenting on {} : User is in the category {}",
        remaining, subject, category
    )
}

/// Summary for removing a sanctioned subject's entry.
pub fn removal_summary(remaining: usize, status: &SubjectStatus, legend_page: &str) -> String {
    let subject = &status.subject;
    let mut summary = format!(
        "{} reports remaining, rm [[Special:Contributions/{}|{}]]",
        remaining, subject, subject
    );

    if let Some(admin) = &status.blocked_by {
        if status.is_indefinite() {
            summary.push_str(&format!(" (blocked indef by {})", admin));
        } else {
            summary.push_str(&format!(" (blocked by {})", admin));
        }
    }

    let flags = status.restriction_flags();
    if !flags.is_empty() {
        summary.push_str(&format!(" ([[{}|{}]])", legend_page, flags.join(" ")));
    }

    summary
}
