// Expands a page spec's link field into concrete visit targets.

use crate::config::{LinkEntry, LinkSpec};
use crate::state::{LinkRegistry, VisitTarget};

/// Reserved marker referencing a link registry group by name.
pub const GROUP_MARKER: char = '$';

/// Expand a link specification into ordered visit targets. A `$group`
/// string pulls a snapshot of that group's current contents; a group
/// nobody has filled yet expands to nothing, which is not an error.
pub fn resolve_link_spec(spec: &LinkSpec, registry: &LinkRegistry) -> Vec<VisitTarget> {
    let entries: Vec<&LinkEntry> = match spec {
        LinkSpec::One(entry) => vec![entry],
        LinkSpec::Many(entries) => entries.iter().collect(),
    };

    let mut targets = Vec::new();
    for entry in entries {
        match entry {
            LinkEntry::Url(url) => {
                if let Some(group) = url.strip_prefix(GROUP_MARKER) {
                    targets.extend(registry.get(group).cloned().unwrap_or_default());
                } else {
                    targets.push(VisitTarget::bare(url.clone()));
                }
            }
            LinkEntry::Target { url, metadata } => {
                targets.push(VisitTarget {
                    url: url.clone(),
                    metadata: metadata.clone(),
                });
            }
        }
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn plain_string_becomes_bare_target() {
        let spec = LinkSpec::One(LinkEntry::Url("https://a.com".into()));
        let targets = resolve_link_spec(&spec, &LinkRegistry::new());
        assert_eq!(targets, vec![VisitTarget::bare("https://a.com")]);
    }

    #[test]
    fn object_keeps_metadata() {
        let mut metadata = BTreeMap::new();
        metadata.insert("tag".to_string(), json!("news"));
        let spec = LinkSpec::One(LinkEntry::Target {
            url: "https://a.com".into(),
            metadata: metadata.clone(),
        });
        let targets = resolve_link_spec(&spec, &LinkRegistry::new());
        assert_eq!(targets[0].metadata, metadata);
    }

    #[test]
    fn registry_reference_returns_group_in_order() {
        let mut registry = LinkRegistry::new();
        registry.insert(
            "leads".into(),
            vec![VisitTarget::bare("a"), VisitTarget::bare("b")],
        );

        let spec = LinkSpec::One(LinkEntry::Url("$leads".into()));
        let targets = resolve_link_spec(&spec, &registry);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].url, "a");
        assert_eq!(targets[1].url, "b");
    }

    #[test]
    fn missing_group_resolves_empty() {
        let spec = LinkSpec::One(LinkEntry::Url("$missing".into()));
        assert!(resolve_link_spec(&spec, &LinkRegistry::new()).is_empty());
    }

    #[test]
    fn mixed_list_flattens_in_order() {
        let mut registry = LinkRegistry::new();
        registry.insert("grp".into(), vec![VisitTarget::bare("g1")]);

        let spec = LinkSpec::Many(vec![
            LinkEntry::Url("https://first.com".into()),
            LinkEntry::Url("$grp".into()),
            LinkEntry::Target {
                url: "https://last.com".into(),
                metadata: BTreeMap::new(),
            },
        ]);

        let urls: Vec<String> = resolve_link_spec(&spec, &registry)
            .into_iter()
            .map(|t| t.url)
            .collect();
        assert_eq!(urls, vec!["https://first.com", "g1", "https://last.com"]);
    }
}
