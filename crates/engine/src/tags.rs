use std::collections::HashSet;

/// Trim a tag name; blank names are rejected.
pub fn normalize_tag(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalize a tag list, dropping blanks and case-insensitive duplicates.
/// First spelling wins.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter_map(|t| normalize_tag(t.as_ref()))
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_rejects_blank() {
        assert_eq!(normalize_tag("  space "), Some("space".to_string()));
        assert_eq!(normalize_tag("   "), None);
    }

    #[test]
    fn dedups_case_insensitively_keeping_first() {
        let tags = normalize_tags(["Space", "epic", " space", "", "EPIC", "calm"]);
        assert_eq!(tags, vec!["Space", "epic", "calm"]);
    }
}
