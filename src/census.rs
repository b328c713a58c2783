//! Open-report counting.

use crate::wikitext::{parse_templates, Template};

/// Template names that constitute a report entry.
pub const REPORT_TEMPLATES: [&str; 3] = ["vandal", "ipvandal", "user-uaa"];

pub fn is_report_template(template: &Template) -> bool {
    REPORT_TEMPLATES.iter().any(|name| template.name_is(name))
}

/// Report templates in `text`, in document order.
pub fn report_templates(text: &str) -> Vec<Template> {
    parse_templates(text)
        .into_iter()
        .filter(is_report_template)
        .collect()
}

/// Number of open reports on a page.
pub fn count_reports(text: &str) -> usize {
    parse_templates(text)
        .iter()
        .filter(|t| is_report_template(t))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_only_report_templates() {
        let text = "\
{{noadminbacklog|bot=Bot}}
* {{vandal|Example}} spam
* {{IPvandal|192.0.2.1}} {{diff|123}}
* {{User-UAA|Bad name}}
* {{userlinks|Other}}
";
        assert_eq!(count_reports(text), 3);
    }

    #[test]
    fn test_unrelated_templates_never_count() {
        assert_eq!(count_reports("{{vandalism}} {{uaa}} {{ip vandal|x}}"), 0);
        assert_eq!(count_reports(""), 0);
    }

    #[test]
    fn test_nested_report_counts() {
        assert_eq!(count_reports("{{resolved|{{vandal|Example}}}}"), 1);
    }

    #[test]
    fn test_report_templates_in_order() {
        let templates = report_templates("{{vandal|A}}\n{{ipvandal|192.0.2.3}}");
        let subjects: Vec<_> = templates.iter().filter_map(|t| t.get("1")).collect();
        assert_eq!(subjects, vec!["A", "192.0.2.3"]);
    }
}
