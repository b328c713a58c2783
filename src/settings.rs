//! Per-page settings directive.
//!
//! Each noticeboard embeds one HTML comment of the form
//!
//! ```text
//! <!-- v2.0.18 RemoveBlocked=On MergeDuplicates=On AutoMark=On FixInstructions=On AutoBacklog=On AddLimit=8 RemoveLimit=4 -->
//! ```
//!
//! Flags are true iff their value upper-cases to `ON`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{BotError, Result};

const DIRECTIVE_PATTERN: &str = r"<!-- v([0-9])\.([0-9])\.([0-9]{1,3}) RemoveBlocked=([ofnOFN]{2,3}) MergeDuplicates=([ofnOFN]{2,3}) AutoMark=([ofnOFN]{2,3}) FixInstructions=([ofnOFN]{2,3}) AutoBacklog=([ofnOFN]{2,3}) AddLimit=([0-9]{1,2}) RemoveLimit=([0-9]{1,2}) -->";

fn directive_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(DIRECTIVE_PATTERN).expect("directive pattern is valid"))
}

/// Parsed settings for one noticeboard pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDirective {
    /// `major.minor.patch` of the directive
    pub version: String,
    pub remove_blocked: bool,
    /// Parsed for completeness; no behavior hangs off it
    pub merge_duplicates: bool,
    pub auto_mark: bool,
    pub fix_instructions: bool,
    pub auto_backlog: bool,
    pub add_limit: u32,
    pub remove_limit: u32,
}

impl SettingsDirective {
    /// Locate and parse the single directive in `text`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut matches = directive_regex().captures_iter(text);

        let Some(caps) = matches.next() else {
            return Err(if text.contains("RemoveBlocked=") {
                BotError::Configuration("malformed settings directive".to_string())
            } else {
                BotError::Configuration("no settings directive found".to_string())
            });
        };
        if matches.next().is_some() {
            return Err(BotError::Configuration(
                "more than one settings directive found".to_string(),
            ));
        }

        let flag = |index: usize| caps[index].eq_ignore_ascii_case("on");
        let limit = |index: usize| -> Result<u32> {
            caps[index].parse().map_err(|_| {
                BotError::Configuration(format!("invalid limit value {:?}", &caps[index]))
            })
        };

        Ok(Self {
            version: format!("{}.{}.{}", &caps[1], &caps[2], &caps[3]),
            remove_blocked: flag(4),
            merge_duplicates: flag(5),
            auto_mark: flag(6),
            fix_instructions: flag(7),
            auto_backlog: flag(8),
            add_limit: limit(9)?,
            remove_limit: limit(10)?,
        })
    }

    /// Render back to the embedded comment form.
    pub fn to_marker(&self) -> String {
        let flag = |on: bool| if on { "ON" } else { "OFF" };
        format!(
            "<!-- v{} RemoveBlocked={} MergeDuplicates={} AutoMark={} FixInstructions={} AutoBacklog={} AddLimit={} RemoveLimit={} -->",
            self.version,
            flag(self.remove_blocked),
            flag(self.merge_duplicates),
            flag(self.auto_mark),
            flag(self.fix_instructions),
            flag(self.auto_backlog),
            self.add_limit,
            self.remove_limit,
        )
    }
}

impl fmt::Display for SettingsDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{}",
            self.remove_blocked,
            self.merge_duplicates,
            self.auto_mark,
            self.fix_instructions,
            self.auto_backlog,
            self.add_limit,
            self.remove_limit
        )
    }
}
