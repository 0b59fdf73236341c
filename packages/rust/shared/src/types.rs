//! Core domain types shared by the source adapters and the reconciliation engine.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SecurityId
// ---------------------------------------------------------------------------

/// Security code used as the join key across every source.
///
/// Treated as an opaque string: surrounding whitespace is trimmed, leading
/// zeros are preserved (`"0050"` and `"50"` are different securities).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityId(String);

impl SecurityId {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` when the code is made only of ASCII digits.
    pub fn is_numeric(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl std::fmt::Display for SecurityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SecurityId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl AsRef<str> for SecurityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// identifier → weight percent, kept as the source's text.
pub type WeightMap = HashMap<SecurityId, String>;

/// identifier → comma-delimited group names.
pub type GroupMap = HashMap<SecurityId, String>;

// ---------------------------------------------------------------------------
// Source tables
// ---------------------------------------------------------------------------

/// Fields one registry-style source may know about a security.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialRecord {
    /// Name as printed by the source.
    pub official_name: Option<String>,
    pub market_class: Option<String>,
    pub industry_class: Option<String>,
    /// Listing or public-offering date.
    pub listed_on: Option<NaiveDate>,
}

/// Fields whose value is picked from several sources by a priority chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainedField {
    MarketClass,
    IndustryClass,
    OfficialName,
}

impl ChainedField {
    pub fn value_of(self, record: &PartialRecord) -> Option<&str> {
        let value = match self {
            Self::MarketClass => record.market_class.as_deref(),
            Self::IndustryClass => record.industry_class.as_deref(),
            Self::OfficialName => record.official_name.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

/// Partial records from one data source, in source order.
///
/// Not every identifier is covered. When a source lists the same identifier
/// twice the first row wins.
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    name: String,
    rows: Vec<(SecurityId, PartialRecord)>,
    index: HashMap<SecurityId, usize>,
}

impl SourceTable {
    /// An empty table for the named source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a row. Returns `false` (and keeps the earlier row) on a duplicate.
    pub fn insert(&mut self, id: SecurityId, record: PartialRecord) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id.clone(), self.rows.len());
        self.rows.push((id, record));
        true
    }

    pub fn get(&self, id: &SecurityId) -> Option<&PartialRecord> {
        self.index.get(id).map(|&i| &self.rows[i].1)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SecurityId, &PartialRecord)> {
        self.rows.iter().map(|(id, rec)| (id, rec))
    }
}

// ---------------------------------------------------------------------------
// Detail pages
// ---------------------------------------------------------------------------

/// Long-form fields scraped from one security's detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub main_business: Option<String>,
    pub related_concepts: Option<String>,
    pub market_cap: Option<String>,
}

impl DetailFields {
    /// `true` when the page yielded nothing at all.
    pub fn is_empty(&self) -> bool {
        self.main_business.is_none() && self.related_concepts.is_none() && self.market_cap.is_none()
    }
}

// ---------------------------------------------------------------------------
// Concept catalog
// ---------------------------------------------------------------------------

/// A named concept category and the keywords that trigger it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptCategory {
    /// Output column name, e.g. `nVidia概念`.
    pub name: String,
    /// Case-insensitive keyword triggers.
    pub keywords: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_id_trims_but_keeps_zeros() {
        let id = SecurityId::new("  0050 ");
        assert_eq!(id.as_str(), "0050");
        assert_ne!(id, SecurityId::new("50"));
        assert!(id.is_numeric());
        assert!(!SecurityId::new("2330A").is_numeric());
        assert!(!SecurityId::new("").is_numeric());
    }

    #[test]
    fn source_table_first_row_wins() {
        let mut table = SourceTable::new("TWSE");
        let first = PartialRecord {
            market_class: Some("上市".into()),
            ..Default::default()
        };
        let second = PartialRecord {
            market_class: Some("上櫃".into()),
            ..Default::default()
        };
        assert!(table.insert("2330".into(), first));
        assert!(!table.insert("2330".into(), second));
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get(&"2330".into()).and_then(|r| r.market_class.as_deref()),
            Some("上市")
        );
    }

    #[test]
    fn chained_field_ignores_blank_values() {
        let record = PartialRecord {
            market_class: Some("  ".into()),
            industry_class: Some("半導體業".into()),
            ..Default::default()
        };
        assert_eq!(ChainedField::MarketClass.value_of(&record), None);
        assert_eq!(ChainedField::IndustryClass.value_of(&record), Some("半導體業"));
    }

    #[test]
    fn detail_fields_emptiness() {
        assert!(DetailFields::default().is_empty());
        let fields = DetailFields {
            market_cap: Some("1,000億".into()),
            ..Default::default()
        };
        assert!(!fields.is_empty());
    }
}
