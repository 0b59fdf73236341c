//! The unified record set, per-identifier patches and the output column layout.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use tracing::debug;

use companyinfo_shared::text::append_groups;
use companyinfo_shared::{CompanyInfoError, DetailFields, Result, SecurityId};

use crate::concepts::{ConceptFlags, merge_concepts};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One row of the base input table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRecord {
    pub id: SecurityId,
    pub name: String,
    /// Every other input column, by header.
    pub extras: HashMap<String, String>,
}

impl BaseRecord {
    pub fn new(id: impl Into<SecurityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extras: HashMap::new(),
        }
    }
}

/// The unified view of one security.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityRecord {
    pub id: SecurityId,
    pub name: String,
    pub market_class: Option<String>,
    pub industry_class: Option<String>,
    /// Listing or public-offering date from the registry.
    pub listed_on: Option<NaiveDate>,
    pub market_cap: Option<String>,
    pub index_weight: Option<String>,
    /// fund id → weight percent.
    pub etf_weights: BTreeMap<String, String>,
    pub main_business: Option<String>,
    /// `;`-delimited, append-only.
    pub related_concepts: Option<String>,
    /// Comma-delimited, append-only, no repeated names.
    pub group_affiliation: Option<String>,
    pub concept_flags: ConceptFlags,
    pub extras: HashMap<String, String>,
}

impl SecurityRecord {
    fn from_base(base: BaseRecord) -> Self {
        Self {
            id: base.id,
            name: base.name,
            market_class: None,
            industry_class: None,
            listed_on: None,
            market_cap: None,
            index_weight: None,
            etf_weights: BTreeMap::new(),
            main_business: None,
            related_concepts: None,
            group_affiliation: None,
            concept_flags: ConceptFlags::default(),
            extras: base.extras,
        }
    }

    fn fold(&mut self, patch: RecordPatch) {
        if patch.main_business.is_some() {
            self.main_business = patch.main_business;
        }
        if patch.market_cap.is_some() {
            self.market_cap = patch.market_cap;
        }
        if let Some(concepts) = patch.related_concepts {
            self.related_concepts = merge_concepts(self.related_concepts.as_deref(), &concepts);
        }
        if let Some(groups) = patch.group_affiliation {
            self.group_affiliation = append_groups(self.group_affiliation.as_deref(), &groups);
        }
    }
}

/// Enrichment for one identifier, folded into the record set in one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPatch {
    pub id: SecurityId,
    pub main_business: Option<String>,
    pub market_cap: Option<String>,
    /// Appended with the additive concept merge.
    pub related_concepts: Option<String>,
    /// Appended with exact-name dedupe.
    pub group_affiliation: Option<String>,
}

impl RecordPatch {
    pub fn new(id: SecurityId) -> Self {
        Self {
            id,
            main_business: None,
            market_cap: None,
            related_concepts: None,
            group_affiliation: None,
        }
    }

    pub fn from_detail(id: SecurityId, fields: DetailFields) -> Self {
        Self {
            main_business: fields.main_business,
            market_cap: fields.market_cap,
            related_concepts: fields.related_concepts,
            ..Self::new(id)
        }
    }

    pub fn concepts(id: SecurityId, concepts: impl Into<String>) -> Self {
        Self {
            related_concepts: Some(concepts.into()),
            ..Self::new(id)
        }
    }

    pub fn groups(id: SecurityId, groups: impl Into<String>) -> Self {
        Self {
            group_affiliation: Some(groups.into()),
            ..Self::new(id)
        }
    }
}

/// Records keyed by identifier, in base-table order.
///
/// Built once from the base table. Later stages only mutate existing records,
/// so the cardinality never changes.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<SecurityRecord>,
    index: HashMap<SecurityId, usize>,
    extra_columns: Vec<String>,
}

impl RecordSet {
    /// Build from base rows. A repeated identifier is a validation error.
    pub fn from_base(rows: Vec<BaseRecord>, extra_columns: Vec<String>) -> Result<Self> {
        let mut set = Self {
            records: Vec::with_capacity(rows.len()),
            index: HashMap::with_capacity(rows.len()),
            extra_columns,
        };
        for row in rows {
            if set.index.contains_key(&row.id) {
                return Err(CompanyInfoError::validation(format!(
                    "duplicate identifier in base table: {}",
                    row.id
                )));
            }
            set.index.insert(row.id.clone(), set.records.len());
            set.records.push(SecurityRecord::from_base(row));
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &SecurityId) -> Option<&SecurityRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SecurityRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SecurityRecord> {
        self.records.iter_mut()
    }

    /// Identifiers in base order.
    pub fn ids(&self) -> impl Iterator<Item = &SecurityId> {
        self.records.iter().map(|r| &r.id)
    }

    /// Base columns beyond identifier and name, in encountered order.
    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    /// Fold a patch into its record. Returns `false` for an unknown identifier.
    pub fn apply(&mut self, patch: RecordPatch) -> bool {
        match self.index.get(&patch.id) {
            Some(&i) => {
                self.records[i].fold(patch);
                true
            }
            None => {
                debug!(id = %patch.id, "ignoring patch for identifier outside the base table");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Output layout
// ---------------------------------------------------------------------------

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Id,
    Name,
    MarketClass,
    IndustryClass,
    MarketCap,
    IndexWeight,
    EtfWeight(String),
    MainBusiness,
    RelatedConcepts,
    ConceptFlag(String),
    GroupAffiliation,
    Extra(String),
}

impl Column {
    pub fn header(&self) -> String {
        match self {
            Self::Id => "代號".into(),
            Self::Name => "名稱".into(),
            Self::MarketClass => "市場別".into(),
            Self::IndustryClass => "產業別".into(),
            Self::MarketCap => "市值".into(),
            Self::IndexWeight => "市值佔大盤比重".into(),
            Self::EtfWeight(fund) => format!("ETF_{fund}_權重"),
            Self::MainBusiness => "主要業務".into(),
            Self::RelatedConcepts => "相關概念".into(),
            Self::ConceptFlag(name) | Self::Extra(name) => name.clone(),
            Self::GroupAffiliation => "相關集團".into(),
        }
    }

    fn value(&self, record: &SecurityRecord) -> String {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        match self {
            Self::Id => record.id.to_string(),
            Self::Name => record.name.clone(),
            Self::MarketClass => opt(&record.market_class),
            Self::IndustryClass => opt(&record.industry_class),
            Self::MarketCap => opt(&record.market_cap),
            Self::IndexWeight => opt(&record.index_weight),
            Self::EtfWeight(fund) => record.etf_weights.get(fund).cloned().unwrap_or_default(),
            Self::MainBusiness => opt(&record.main_business),
            Self::RelatedConcepts => opt(&record.related_concepts),
            Self::ConceptFlag(name) => {
                if record.concept_flags.get(name).unwrap_or(false) {
                    "1".into()
                } else {
                    "0".into()
                }
            }
            Self::GroupAffiliation => opt(&record.group_affiliation),
            Self::Extra(name) => record.extras.get(name).cloned().unwrap_or_default(),
        }
    }
}

/// Fixed column order, then base extras that do not collide with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: Vec<Column>,
}

impl ColumnLayout {
    pub fn new<'a>(
        etf_funds: &[String],
        categories: impl IntoIterator<Item = &'a str>,
        extra_columns: &[String],
    ) -> Self {
        let mut columns = vec![
            Column::Id,
            Column::Name,
            Column::MarketClass,
            Column::IndustryClass,
            Column::MarketCap,
            Column::IndexWeight,
        ];
        columns.extend(etf_funds.iter().cloned().map(Column::EtfWeight));
        columns.push(Column::MainBusiness);
        columns.push(Column::RelatedConcepts);
        columns.extend(categories.into_iter().map(|c| Column::ConceptFlag(c.to_string())));
        columns.push(Column::GroupAffiliation);

        let mut taken: HashSet<String> = columns.iter().map(Column::header).collect();
        for extra in extra_columns {
            if taken.insert(extra.clone()) {
                columns.push(Column::Extra(extra.clone()));
            }
        }

        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(Column::header).collect()
    }

    /// One output row; missing values are empty cells.
    pub fn row(&self, record: &SecurityRecord) -> Vec<String> {
        self.columns.iter().map(|c| c.value(record)).collect()
    }
}
