//! Helpers for the delimited free-text fields (`相關概念`, `相關集團`).
//!
//! Concept lists use `;` as their canonical delimiter. Group lists keep the
//! comma-and-space form the group index produces.

/// Canonical delimiter between concept tags.
pub const CONCEPT_DELIMITER: char = ';';

/// Delimiter between group names.
pub const GROUP_DELIMITER: &str = ", ";

/// Delimiters folded into [`CONCEPT_DELIMITER`] at ingestion.
const CONCEPT_ALIASES: [char; 4] = [',', '，', '、', ';'];

/// Rewrite a concept list to the canonical `;` form.
///
/// Each tag is trimmed and empty tags are dropped. Returns `None` when nothing
/// is left. Order and duplicates are preserved.
pub fn normalize_concepts(raw: &str) -> Option<String> {
    let tags: Vec<&str> = raw
        .split(CONCEPT_ALIASES)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    if tags.is_empty() {
        None
    } else {
        Some(tags.join(&CONCEPT_DELIMITER.to_string()))
    }
}

/// Append group names to an existing group list, skipping exact duplicates.
///
/// `addition` may itself hold several comma-delimited names. Returns `None`
/// only when both sides are empty.
pub fn append_groups(existing: Option<&str>, addition: &str) -> Option<String> {
    let mut names: Vec<&str> = existing.map(split_groups).unwrap_or_default();
    for name in split_groups(addition) {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    if names.is_empty() {
        None
    } else {
        Some(names.join(GROUP_DELIMITER))
    }
}

fn split_groups(list: &str) -> Vec<&str> {
    list.split([',', '，'])
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect()
}

/// Trim and map blank strings to `None`.
pub fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_mixed_delimiters() {
        assert_eq!(
            normalize_concepts("Nvidia, Google、蘋果，AI伺服器;").as_deref(),
            Some("Nvidia;Google;蘋果;AI伺服器")
        );
    }

    #[test]
    fn normalize_keeps_duplicates_and_drops_empty() {
        assert_eq!(
            normalize_concepts("Nvidia;;Nvidia").as_deref(),
            Some("Nvidia;Nvidia")
        );
        assert_eq!(normalize_concepts(" ; , "), None);
        assert_eq!(normalize_concepts(""), None);
    }

    #[test]
    fn append_groups_dedupes_exact_names() {
        let once = append_groups(None, "台積電集團");
        assert_eq!(once.as_deref(), Some("台積電集團"));

        let twice = append_groups(once.as_deref(), "台積電集團");
        assert_eq!(twice, once);

        let more = append_groups(twice.as_deref(), "鴻海集團, 台積電集團");
        assert_eq!(more.as_deref(), Some("台積電集團, 鴻海集團"));
    }

    #[test]
    fn append_groups_does_not_dedupe_by_substring() {
        let list = append_groups(Some("聯華神通集團"), "神通集團");
        assert_eq!(list.as_deref(), Some("聯華神通集團, 神通集團"));
    }

    #[test]
    fn append_groups_empty_sides() {
        assert_eq!(append_groups(None, "  "), None);
        assert_eq!(append_groups(Some("A集團"), "").as_deref(), Some("A集團"));
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank("  x "), Some("x".into()));
        assert_eq!(non_blank(" \t"), None);
    }
}
