//! Concept tagging: keyword flags over free-text concept lists, and the
//! additive merge and response parsing for classifier output.

use std::sync::LazyLock;

use regex::Regex;

use companyinfo_shared::text::{CONCEPT_DELIMITER, normalize_concepts};
use companyinfo_shared::{ConceptCategory, SecurityId};

/// Token boundaries: `;` `,` `、` `/` `|` and whitespace runs.
static TOKEN_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[;,、/|\s]+").unwrap());

// ---------------------------------------------------------------------------
// Tagger
// ---------------------------------------------------------------------------

/// Per-category flags in catalog order. Empty until the tagger has run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConceptFlags(Vec<(String, bool)>);

impl ConceptFlags {
    pub fn get(&self, category: &str) -> Option<bool> {
        self.0.iter().find(|(c, _)| c == category).map(|(_, f)| *f)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(c, f)| (c.as_str(), *f))
    }

    /// Names of the categories that fired.
    pub fn matched(&self) -> Vec<&str> {
        self.iter().filter(|(_, f)| *f).map(|(c, _)| c).collect()
    }
}

/// Keyword matcher over a fixed concept catalog.
///
/// A category fires when any of its keywords is a substring of the whole
/// lowercased text or of any single token. Missing text fires nothing.
#[derive(Debug, Clone)]
pub struct ConceptTagger {
    /// `(category, lowercased keywords)` in catalog order.
    catalog: Vec<(String, Vec<String>)>,
}

impl ConceptTagger {
    pub fn new(catalog: &[ConceptCategory]) -> Self {
        Self {
            catalog: catalog
                .iter()
                .map(|c| {
                    let keywords = c
                        .keywords
                        .iter()
                        .map(|k| k.to_lowercase())
                        .filter(|k| !k.is_empty())
                        .collect();
                    (c.name.clone(), keywords)
                })
                .collect(),
        }
    }

    /// Category names in catalog order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.catalog.iter().map(|(name, _)| name.as_str())
    }

    pub fn tag(&self, text: Option<&str>) -> ConceptFlags {
        let lowered = text.unwrap_or_default().to_lowercase();
        let tokens: Vec<&str> = TOKEN_SPLIT
            .split(&lowered)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        let flags = self
            .catalog
            .iter()
            .map(|(name, keywords)| {
                let hit = keywords.iter().any(|kw| {
                    lowered.contains(kw.as_str()) || tokens.iter().any(|t| t.contains(kw.as_str()))
                });
                (name.clone(), hit)
            })
            .collect();

        ConceptFlags(flags)
    }
}

// ---------------------------------------------------------------------------
// Additive merge
// ---------------------------------------------------------------------------

/// Append `addition` to an existing concept list.
///
/// An empty existing value is replaced; otherwise the two are joined with
/// `;`. Duplicates are kept. A blank addition leaves `existing` as is.
pub fn merge_concepts(existing: Option<&str>, addition: &str) -> Option<String> {
    let addition = addition.trim();
    let existing = existing.map(str::trim).filter(|e| !e.is_empty());

    match (existing, addition.is_empty()) {
        (existing, true) => existing.map(String::from),
        (None, false) => Some(addition.to_string()),
        (Some(existing), false) => Some(format!("{existing}{CONCEPT_DELIMITER}{addition}")),
    }
}

// ---------------------------------------------------------------------------
// Classifier response parsing
// ---------------------------------------------------------------------------

/// Parse a `StockID, Matched_Concepts` reply into `(identifier, concepts)`.
///
/// A surrounding Markdown fence (with an optional `csv` tag) is stripped.
/// Each line splits on its first comma. Lines whose identifier is not all
/// digits (such as the header) and `None` answers are skipped. Concept lists
/// come back `;`-delimited.
pub fn parse_classification_response(reply: &str) -> Vec<(SecurityId, String)> {
    let body = strip_code_fence(reply);

    body.lines()
        .filter_map(|line| {
            let (sid, concepts) = line.split_once(',')?;
            let id = SecurityId::new(sid.trim_matches(|c: char| c.is_whitespace() || c == '"'));
            if !id.is_numeric() {
                return None;
            }
            let concepts = concepts.trim().trim_matches('"');
            if concepts.eq_ignore_ascii_case("none") {
                return None;
            }
            normalize_concepts(concepts).map(|c| (id, c))
        })
        .collect()
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let inner = trimmed.trim_matches('`');
    let inner = inner.strip_prefix("csv").unwrap_or(inner);
    inner.trim()
}
