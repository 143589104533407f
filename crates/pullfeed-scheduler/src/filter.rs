//! Keyword filter.

use pullfeed_core::{KeywordRuleSet, Release};

/// True when any title term occurs in the title + description, or any creator
/// term occurs in the joined creator names. Matching is on normalized text.
///
/// An empty rule set matches nothing, so a feed with filtering on and no rules
/// delivers the "no comics" notice.
pub fn matches(release: &Release, rules: &KeywordRuleSet) -> bool {
    if !rules.title_terms.is_empty() {
        let header = KeywordRuleSet::normalize(&format!(
            "{} {}",
            release.title,
            release.description.as_deref().unwrap_or("")
        ));
        if rules.title_terms.iter().any(|t| header.contains(t.as_str())) {
            return true;
        }
    }

    if !rules.creator_terms.is_empty() {
        let names = KeywordRuleSet::normalize(&release.creator_names().collect::<Vec<_>>().join(" "));
        if rules.creator_terms.iter().any(|t| names.contains(t.as_str())) {
            return true;
        }
    }

    false
}

/// Keep only releases the rules match, preserving order.
pub fn apply<'a>(
    releases: impl Iterator<Item = &'a Release>,
    rules: &KeywordRuleSet,
) -> Vec<&'a Release> {
    releases.filter(|r| matches(r, rules)).collect()
}
