//! Minimal wikitext scanner.
//!
//! Extracts template invocations (with nesting) and heading-delimited
//! sections from page text. Everything is reported as byte spans into the
//! source so callers can splice edits without re-matching text.

use std::ops::Range;

/// One template parameter. `name` is `None` for positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Option<String>,
    pub value: String,
}

/// A `{{name|...}}` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub params: Vec<Param>,
    /// Byte range of the whole invocation, braces included
    pub span: Range<usize>,
}

impl Template {
    /// Case-insensitive name comparison.
    pub fn name_is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Value of a named parameter, or of a positional one when `key` is its
    /// 1-based index. A later definition overrides an earlier one.
    pub fn get(&self, key: &str) -> Option<&str> {
        let mut position = 0usize;
        let mut found = None;
        for param in &self.params {
            match &param.name {
                Some(name) => {
                    if name == key {
                        found = Some(param.value.as_str());
                    }
                }
                None => {
                    position += 1;
                    if key.parse::<usize>() == Ok(position) {
                        found = Some(param.value.as_str());
                    }
                }
            }
        }
        found
    }
}

/// Render a template with only named parameters.
pub fn render_template(name: &str, params: &[(&str, &str)]) -> String {
    let mut out = format!("{{{{{}", name);
    for (key, value) in params {
        out.push('|');
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out.push_str("}}");
    out
}

/// All templates in `text`, nested ones included, ordered by start offset.
pub fn parse_templates(text: &str) -> Vec<Template> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if starts_with_at(bytes, i, b"<!--") {
            i = skip_comment(bytes, i);
        } else if starts_with_at(bytes, i, b"{{") {
            match parse_template(text, i, &mut found) {
                Some(end) => i = end,
                None => i += 2,
            }
        } else {
            i += 1;
        }
    }

    found.sort_by_key(|t| t.span.start);
    found
}

/// Parse the template opening at `start`. Returns the offset just past its
/// closing braces, or `None` when it never closes.
fn parse_template(text: &str, start: usize, out: &mut Vec<Template>) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut nested = Vec::new();
    // Each segment is the text between pipes plus the offset of its first
    // top-level '='.
    let mut segments: Vec<(Range<usize>, Option<usize>)> = Vec::new();
    let mut segment_start = start + 2;
    let mut equals: Option<usize> = None;
    let mut link_depth = 0usize;
    let mut i = start + 2;

    while i < bytes.len() {
        if starts_with_at(bytes, i, b"<!--") {
            i = skip_comment(bytes, i);
            continue;
        }
        if starts_with_at(bytes, i, b"{{") {
            match parse_template(text, i, &mut nested) {
                Some(end) => i = end,
                None => i += 2,
            }
            continue;
        }
        if starts_with_at(bytes, i, b"[[") {
            link_depth += 1;
            i += 2;
            continue;
        }
        if link_depth > 0 && starts_with_at(bytes, i, b"]]") {
            link_depth -= 1;
            i += 2;
            continue;
        }
        if starts_with_at(bytes, i, b"}}") {
            segments.push((segment_start..i, equals));
            let end = i + 2;
            out.push(build_template(text, start..end, &segments));
            out.extend(nested);
            return Some(end);
        }

        match bytes[i] {
            b'|' if link_depth == 0 => {
                segments.push((segment_start..i, equals));
                segment_start = i + 1;
                equals = None;
            }
            b'=' if link_depth == 0 && equals.is_none() && !segments.is_empty() => {
                equals = Some(i);
            }
            _ => {}
        }
        i += 1;
    }

    None
}

fn build_template(
    text: &str,
    span: Range<usize>,
    segments: &[(Range<usize>, Option<usize>)],
) -> Template {
    let mut segments = segments.iter();
    let name = segments
        .next()
        .map(|(range, _)| strip_comments(&text[range.clone()]).trim().to_string())
        .unwrap_or_default();

    let params = segments
        .map(|(range, equals)| match equals {
            Some(at) => Param {
                name: Some(text[range.start..*at].trim().to_string()),
                value: text[*at + 1..range.end].trim().to_string(),
            },
            None => Param {
                name: None,
                value: text[range.clone()].to_string(),
            },
        })
        .collect();

    Template { name, params, span }
}

fn starts_with_at(bytes: &[u8], at: usize, pattern: &[u8]) -> bool {
    bytes.len() >= at + pattern.len() && &bytes[at..at + pattern.len()] == pattern
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 4;
    while i < bytes.len() {
        if starts_with_at(bytes, i, b"-->") {
            return i + 3;
        }
        i += 1;
    }
    bytes.len()
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("<!--") {
        out.push_str(&rest[..open]);
        match rest[open + 4..].find("-->") {
            Some(close) => rest = &rest[open + 4 + close + 3..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Splice replacements into `text`. Spans must not overlap.
pub fn replace_spans(text: &str, replacements: &[(Range<usize>, String)]) -> String {
    let mut ordered: Vec<&(Range<usize>, String)> = replacements.iter().collect();
    ordered.sort_by_key(|(span, _)| span.start);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (span, replacement) in ordered {
        out.push_str(&text[cursor..span.start]);
        out.push_str(replacement);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Byte ranges of each line, newline excluded. A trailing newline yields a
/// final empty line, so the count always equals `text.split('\n').count()`.
pub fn line_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (i, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            spans.push(start..i);
            start = i + 1;
        }
    }
    spans.push(start..text.len());
    spans
}

/// A heading and the body that runs until the next heading of the same or
/// higher level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub level: usize,
    pub title: String,
    /// Heading line, newline excluded
    pub heading: Range<usize>,
    pub body: Range<usize>,
}

/// First section whose heading title contains `matches`, case-insensitively.
pub fn find_section(text: &str, matches: &str) -> Option<Section> {
    let needle = matches.to_lowercase();
    let lines = line_spans(text);

    let (index, level, title) = lines.iter().enumerate().find_map(|(index, span)| {
        let (level, title) = parse_heading(&text[span.clone()])?;
        title
            .to_lowercase()
            .contains(&needle)
            .then_some((index, level, title))
    })?;

    let heading = lines[index].clone();
    let body_start = if index + 1 < lines.len() {
        lines[index + 1].start
    } else {
        heading.end
    };
    let body_end = lines[index + 1..]
        .iter()
        .find(|span| {
            parse_heading(&text[(*span).clone()]).is_some_and(|(next, _)| next <= level)
        })
        .map(|span| span.start)
        .unwrap_or(text.len());

    Some(Section {
        level,
        title,
        heading,
        body: body_start..body_end,
    })
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let line = line.trim_end();
    let leading = line.bytes().take_while(|b| *b == b'=').count();
    let trailing = line.bytes().rev().take_while(|b| *b == b'=').count();
    if leading == 0 || trailing == 0 || leading + trailing >= line.len() {
        return None;
    }

    let level = leading.min(trailing).min(6);
    let title = line[level..line.len() - level].trim();
    if title.is_empty() {
        return None;
    }
    Some((level, title.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_template() {
        let templates = parse_templates("* {{vandal|Example}} reported");
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "vandal");
        assert_eq!(templates[0].get("1"), Some("Example"));
        assert_eq!(templates[0].span, 2..20);
    }

    #[test]
    fn test_named_positional_parameter() {
        let templates = parse_templates("{{IPvandal|1=192.0.2.4}}");
        assert!(templates[0].name_is("ipvandal"));
        assert_eq!(templates[0].get("1"), Some("192.0.2.4"));
    }

    #[test]
    fn test_nested_templates_and_links() {
        let text = "{{outer|[[Page|label]]|note={{inner|x}}}}";
        let templates = parse_templates(text);
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].name, "outer");
        assert_eq!(templates[0].get("1"), Some("[[Page|label]]"));
        assert_eq!(templates[0].get("note"), Some("{{inner|x}}"));
        assert_eq!(templates[1].name, "inner");
        assert_eq!(&text[templates[1].span.clone()], "{{inner|x}}");
    }

    #[test]
    fn test_commented_and_unclosed_templates_ignored() {
        let templates = parse_templates("<!-- {{vandal|Hidden}} --> {{vandal|Open");
        assert!(templates.is_empty());
    }

    #[test]
    fn test_replace_spans() {
        let text = "a {{noadminbacklog}} b";
        let template = &parse_templates(text)[0];
        let out = replace_spans(
            text,
            &[(template.span.clone(), render_template("adminbacklog", &[("bot", "Bot")]))],
        );
        assert_eq!(out, "a {{adminbacklog|bot=Bot}} b");
    }

    #[test]
    fn test_line_spans_match_split() {
        let text = "one\n\ntwo\n";
        let spans = line_spans(text);
        let split: Vec<&str> = text.split('\n').collect();
        assert_eq!(spans.len(), split.len());
        for (span, line) in spans.iter().zip(split) {
            assert_eq!(&text[span.clone()], line);
        }
    }

    #[test]
    fn test_find_section() {
        let text = "== Reports ==\nintro\n=== User-reported ===\nbody\n* entry\n=== Bot-reported ===\nother\n";
        let section = find_section(text, "user-reported").unwrap();
        assert_eq!(section.level, 3);
        assert_eq!(&text[section.heading.clone()], "=== User-reported ===");
        assert_eq!(&text[section.body.clone()], "body\n* entry\n");
    }

    #[test]
    fn test_find_section_missing() {
        assert!(find_section("no headings here", "User-reported").is_none());
    }
}
