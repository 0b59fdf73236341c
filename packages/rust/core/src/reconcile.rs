//! Multi-source reconciliation.
//!
//! Contested fields take the first non-empty value along their priority chain.
//! Single-source lookups (ETF weights, index weight) are plain key lookups.
//! Every base identifier stays in the output exactly once. A blank base name
//! falls back to the registry's official name; the listing date follows the
//! market chain.

use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use companyinfo_shared::{ChainedField, ReconcileConfig, SecurityId, SourceTable, WeightMap};

use crate::records::RecordSet;

/// Weight maps looked up by identifier, one source each.
#[derive(Debug, Clone, Default)]
pub struct WeightLookups {
    /// `(fund id, constituents)` in configured order.
    pub etf: Vec<(String, WeightMap)>,
    pub index: WeightMap,
}

/// First non-empty value for `field`, scanning `chain` in order.
///
/// Chain entries naming a source that is not present are skipped.
pub fn resolve_chain<'a>(
    id: &SecurityId,
    field: ChainedField,
    chain: &[String],
    sources: &'a [SourceTable],
) -> Option<&'a str> {
    chain.iter().find_map(|name| {
        sources
            .iter()
            .find(|s| s.name() == name)
            .and_then(|s| s.get(id))
            .and_then(|rec| field.value_of(rec))
    })
}

/// First listing date along `chain`.
pub fn resolve_listing_date(
    id: &SecurityId,
    chain: &[String],
    sources: &[SourceTable],
) -> Option<NaiveDate> {
    chain.iter().find_map(|name| {
        sources
            .iter()
            .find(|s| s.name() == name)
            .and_then(|s| s.get(id))
            .and_then(|rec| rec.listed_on)
    })
}

/// Left-join the source tables and weight lookups onto `records`.
#[instrument(skip_all, fields(records = records.len(), sources = sources.len()))]
pub fn merge(
    records: &mut RecordSet,
    sources: &[SourceTable],
    chains: &ReconcileConfig,
    weights: &WeightLookups,
) {
    for name in chains.market_class.iter().chain(&chains.industry_class) {
        if !sources.iter().any(|s| s.name() == name) {
            debug!(source = %name, "priority chain names a source with no table");
        }
    }

    let mut matched = 0usize;
    for record in records.iter_mut() {
        let id = &record.id;
        record.market_class =
            resolve_chain(id, ChainedField::MarketClass, &chains.market_class, sources)
                .map(str::to_string);
        record.industry_class =
            resolve_chain(id, ChainedField::IndustryClass, &chains.industry_class, sources)
                .map(str::to_string);
        if record.market_class.is_some() || record.industry_class.is_some() {
            matched += 1;
        }
        record.listed_on = resolve_listing_date(id, &chains.market_class, sources);
        if record.name.trim().is_empty() {
            if let Some(name) =
                resolve_chain(id, ChainedField::OfficialName, &chains.market_class, sources)
            {
                debug!(id = %id, registry_name = %name, "base name blank, using registry name");
                record.name = name.to_string();
            }
        }

        record.etf_weights = weights
            .etf
            .iter()
            .filter_map(|(fund, map)| map.get(id).map(|w| (fund.clone(), w.clone())))
            .collect();
        record.index_weight = weights.index.get(id).cloned();
    }

    info!(
        matched,
        unmatched = records.len() - matched,
        "source tables reconciled"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use companyinfo_shared::PartialRecord;

    use crate::records::BaseRecord;

    fn table(name: &str, rows: &[(&str, Option<&str>, Option<&str>)]) -> SourceTable {
        let mut t = SourceTable::new(name);
        for (id, market, industry) in rows {
            t.insert(
                SecurityId::new(id),
                PartialRecord {
                    market_class: market.map(Into::into),
                    industry_class: industry.map(Into::into),
                    ..Default::default()
                },
            );
        }
        t
    }

    fn chains(order: &[&str]) -> ReconcileConfig {
        let chain: Vec<String> = order.iter().map(|s| s.to_string()).collect();
        ReconcileConfig {
            market_class: chain.clone(),
            industry_class: chain,
        }
    }

    fn records(ids: &[&str]) -> RecordSet {
        let rows = ids.iter().map(|id| BaseRecord::new(*id, "")).collect();
        RecordSet::from_base(rows, Vec::new()).unwrap()
    }

    #[test]
    fn earlier_source_wins() {
        let a = table("A", &[("2330", Some("x"), None)]);
        let b = table("B", &[("2330", Some("y"), Some("半導體業"))]);
        let mut set = records(&["2330"]);

        merge(&mut set, &[b, a], &chains(&["A", "B"]), &WeightLookups::default());

        let rec = set.get(&"2330".into()).unwrap();
        assert_eq!(rec.market_class.as_deref(), Some("x"));
        // A has no industry, so B fills it; values are never combined.
        assert_eq!(rec.industry_class.as_deref(), Some("半導體業"));
    }

    #[test]
    fn later_source_fills_null_and_blank() {
        let a = table("A", &[("1101", Some("  "), None)]);
        let b = table("B", &[("1101", Some("y"), None)]);
        let id = SecurityId::new("1101");
        let sources = [a, b];
        let chain = ["A".to_string(), "B".to_string()];
        assert_eq!(
            resolve_chain(&id, ChainedField::MarketClass, &chain, &sources),
            Some("y")
        );
        assert_eq!(
            resolve_chain(&id, ChainedField::IndustryClass, &chain, &sources),
            None
        );
    }

    #[test]
    fn unknown_chain_entries_are_skipped() {
        let b = table("B", &[("2317", Some("上市"), None)]);
        let mut set = records(&["2317"]);
        merge(&mut set, &[b], &chains(&["Missing", "B"]), &WeightLookups::default());
        assert_eq!(
            set.get(&"2317".into()).unwrap().market_class.as_deref(),
            Some("上市")
        );
    }

    #[test]
    fn cardinality_and_order_are_preserved() {
        let a = table("A", &[("9999", Some("上櫃"), None), ("8888", Some("x"), None)]);
        let mut set = records(&["2330", "0050", "9999", "1101"]);
        merge(&mut set, &[a, SourceTable::new("B")], &chains(&["A", "B"]), &WeightLookups::default());

        let ids: Vec<&str> = set.ids().map(SecurityId::as_str).collect();
        assert_eq!(ids, vec!["2330", "0050", "9999", "1101"]);
        assert!(set.get(&"8888".into()).is_none());
    }

    #[test]
    fn weight_lookups_are_one_sided() {
        let mut etf = WeightMap::new();
        etf.insert("2330".into(), "47.5".into());
        let mut index = WeightMap::new();
        index.insert("2330".into(), "30.1234%".into());
        let weights = WeightLookups {
            etf: vec![("0050".into(), etf), ("0056".into(), WeightMap::new())],
            index,
        };
        let mut set = records(&["2330", "2317"]);

        merge(&mut set, &[], &chains(&[]), &weights);

        let tsmc = set.get(&"2330".into()).unwrap();
        assert_eq!(tsmc.etf_weights.get("0050").map(String::as_str), Some("47.5"));
        assert!(!tsmc.etf_weights.contains_key("0056"));
        assert_eq!(tsmc.index_weight.as_deref(), Some("30.1234%"));

        let hon_hai = set.get(&"2317".into()).unwrap();
        assert!(hon_hai.etf_weights.is_empty());
        assert_eq!(hon_hai.index_weight, None);
    }

    #[test]
    fn registry_name_and_listing_date_are_folded() {
        let mut a = SourceTable::new("A");
        a.insert(
            "2330".into(),
            PartialRecord {
                official_name: Some("台積電".into()),
                listed_on: NaiveDate::from_ymd_opt(1994, 9, 5),
                ..Default::default()
            },
        );
        a.insert(
            "2317".into(),
            PartialRecord {
                official_name: Some("鴻海".into()),
                ..Default::default()
            },
        );
        let rows = vec![BaseRecord::new("2330", ""), BaseRecord::new("2317", "鴻海精密")];
        let mut set = RecordSet::from_base(rows, Vec::new()).unwrap();

        merge(&mut set, &[a], &chains(&["A"]), &WeightLookups::default());

        let tsmc = set.get(&"2330".into()).unwrap();
        assert_eq!(tsmc.name, "台積電");
        assert_eq!(tsmc.listed_on, NaiveDate::from_ymd_opt(1994, 9, 5));
        // a base name is never replaced
        let hon_hai = set.get(&"2317".into()).unwrap();
        assert_eq!(hon_hai.name, "鴻海精密");
        assert_eq!(hon_hai.listed_on, None);
    }

    #[test]
    fn merge_is_idempotent() {
        let a = table("A", &[("2330", Some("上市"), Some("半導體業"))]);
        let sources = [a];
        let chain = chains(&["A"]);
        let mut set = records(&["2330", "9999"]);

        merge(&mut set, &sources, &chain, &WeightLookups::default());
        let first: Vec<_> = set.iter().cloned().collect();
        merge(&mut set, &sources, &chain, &WeightLookups::default());
        let second: Vec<_> = set.iter().cloned().collect();
        assert_eq!(first, second);
    }
}
