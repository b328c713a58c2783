//! Special subject registry.
//!
//! Built from a reference page listing sensitive IP ranges and categories:
//!
//! ```text
//! ;192.0.2.0/24:This range belongs to a school district
//! * [[:Category:Wikipedia sockpuppets]]
//! ```
//!
//! Rebuilt wholesale at the start of every pass and read-only afterwards.

use std::net::IpAddr;

use ipnet::IpNet;
use tracing::{debug, info};

use crate::error::{BotError, Result};
use crate::wiki::WikiBackend;

const CATEGORY_LINE_PREFIX: &str = "* [[:Category:";

/// Sensitive IP ranges with their annotation text, plus special categories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecialSubjectRegistry {
    /// Registration order is kept; lookups scan newest-first.
    networks: Vec<(IpNet, String)>,
    categories: Vec<String>,
}

impl SpecialSubjectRegistry {
    /// Fetch and parse the reference page.
    pub async fn load(wiki: &dyn WikiBackend, title: &str) -> Result<Self> {
        debug!(title = %title, "Fetching special subject list");
        let page = wiki.fetch_page(title).await?;
        if !page.exists {
            return Err(BotError::Registry(format!("{} does not exist", title)));
        }

        let registry = Self::parse(&page.text);
        info!(
            networks = registry.networks.len(),
            categories = registry.categories.len(),
            "Special subject registry refreshed"
        );
        Ok(registry)
    }

    /// Best-effort parse; lines that do not fit either form are skipped.
    pub fn parse(text: &str) -> Self {
        let mut registry = Self::default();

        for line in text.split('\n') {
            if line.starts_with(';') {
                if let Some((network, note)) = parse_network_line(line) {
                    registry.networks.push((network, note));
                }
            } else if line.starts_with(CATEGORY_LINE_PREFIX) {
                let name = line.trim_end()["* [[:".len()..]
                    .strip_suffix("]]")
                    .filter(|name| name.len() > "Category:".len());
                if let Some(name) = name {
                    registry.categories.push(name.to_string());
                }
            }
        }

        registry
    }

    /// Annotation text for an IP address, if it falls inside a registered range.
    pub fn ip_note(&self, subject: &str) -> Option<&str> {
        let address: IpAddr = subject.trim().parse().ok()?;
        self.networks
            .iter()
            .rev()
            .find(|(network, _)| network.contains(&address))
            .map(|(_, note)| note.as_str())
    }

    /// Whether a full category title (`Category:...`) is registered.
    pub fn has_category(&self, title: &str) -> bool {
        self.categories.iter().any(|c| c == title)
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }
}

/// Split `;<network>:<note>`. The network is the longest prefix before a
/// colon that parses, so IPv6 addresses survive the split.
fn parse_network_line(line: &str) -> Option<(IpNet, String)> {
    let body = line.trim_matches(';');

    body.match_indices(':')
        .filter_map(|(at, _)| {
            let candidate = &body[..at];
            parse_network(candidate).map(|network| (network, body[at + 1..].to_string()))
        })
        .last()
}

fn parse_network(candidate: &str) -> Option<IpNet> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    if let Ok(network) = candidate.parse::<IpNet>() {
        return Some(network.trunc());
    }
    candidate.parse::<IpAddr>().ok().map(IpNet::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::MockWiki;

    const LIST: &str = "\
Intro text
;192.0.2.0/24:School district range
;198.51.100.7:Government office
;2001:db8::/32:Documentation network: do not block
;not-an-ip:ignored
;:empty network
;203.0.113.5
* [[:Category:Wikipedia sockpuppets]]
* [[:Category:Shared IP]]
* [[:Category:Wikipedia sockpuppets]]
* [[Category:Not a listing]]
";

    #[test]
    fn test_parse_networks() {
        let registry = SpecialSubjectRegistry::parse(LIST);
        assert_eq!(registry.network_count(), 3);
        assert_eq!(registry.ip_note("192.0.2.77"), Some("School district range"));
        assert_eq!(registry.ip_note("198.51.100.7"), Some("Government office"));
        assert_eq!(registry.ip_note("198.51.100.8"), None);
        assert_eq!(
            registry.ip_note("2001:db8::beef"),
            Some("Documentation network: do not block")
        );
        assert_eq!(registry.ip_note("Example"), None);
    }

    #[test]
    fn test_last_registration_wins() {
        let registry =
            SpecialSubjectRegistry::parse(";192.0.2.0/24:Range note\n;192.0.2.9:Host note\n");
        assert_eq!(registry.ip_note("192.0.2.9"), Some("Host note"));
        assert_eq!(registry.ip_note("192.0.2.10"), Some("Range note"));
    }

    #[test]
    fn test_host_bits_are_truncated() {
        let registry = SpecialSubjectRegistry::parse(";192.0.2.5/24:Range\n");
        assert_eq!(registry.ip_note("192.0.2.200"), Some("Range"));
    }

    #[test]
    fn test_parse_categories_keeps_order_and_duplicates() {
        let registry = SpecialSubjectRegistry::parse(LIST);
        assert_eq!(
            registry.categories(),
            &[
                "Category:Wikipedia sockpuppets".to_string(),
                "Category:Shared IP".to_string(),
                "Category:Wikipedia sockpuppets".to_string(),
            ]
        );
        assert!(registry.has_category("Category:Shared IP"));
        assert!(!registry.has_category("Category:Not a listing"));
    }

    #[tokio::test]
    async fn test_load_from_wiki() {
        let wiki = MockWiki::new().with_page("User:Bot/Special IPs", LIST);
        let registry = SpecialSubjectRegistry::load(&wiki, "User:Bot/Special IPs")
            .await
            .unwrap();
        assert_eq!(registry.network_count(), 3);
    }

    #[tokio::test]
    async fn test_load_missing_page_fails() {
        let wiki = MockWiki::new();
        let result = SpecialSubjectRegistry::load(&wiki, "User:Bot/Special IPs").await;
        assert!(matches!(result, Err(BotError::Registry(_))));
    }
}
