//! ETF constituent weights.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use companyinfo_shared::{Result, SecurityId, WeightMap, WeightsConfig};

use crate::http::fetch_text;
use crate::tables::parse_tables;

const NAME_HEADER: &str = "個股名稱";
const WEIGHT_HEADER: &str = "投資比例(%)";

/// `台積電(2330.TW)` → `2330`
static LISTED_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d+)\.TW\)").unwrap());

/// Fetch the constituent weights of one fund.
///
/// A page without the holdings table yields an empty map and a warning.
#[instrument(skip_all, fields(fund = %fund_id))]
pub async fn fetch_etf_weights(
    client: &Client,
    config: &WeightsConfig,
    fund_id: &str,
) -> Result<WeightMap> {
    let html = fetch_text(client, &config.etf_url(fund_id), "utf-8").await?;
    match parse_etf_weights(&html) {
        Some(weights) => {
            debug!(constituents = weights.len(), "parsed ETF holdings");
            Ok(weights)
        }
        None => {
            warn!(fund = %fund_id, "constituent table not found");
            Ok(WeightMap::new())
        }
    }
}

/// Parse the holdings table. `None` when no table carries both headers.
pub fn parse_etf_weights(html: &str) -> Option<WeightMap> {
    let tables = parse_tables(html);
    let (table, header) = tables.iter().find_map(|t| {
        t.header_row(&[NAME_HEADER, WEIGHT_HEADER])
            .map(|row| (t, row))
    })?;
    let name_col = table.column(header, NAME_HEADER)?;
    let weight_col = table.column(header, WEIGHT_HEADER)?;

    let weights = table.rows[header + 1..]
        .iter()
        .filter_map(|row| {
            let caps = LISTED_CODE.captures(row.cell(name_col)?)?;
            let weight = row.cell(weight_col).unwrap_or_default().trim().to_string();
            Some((SecurityId::new(&caps[1]), weight))
        })
        .collect();

    Some(weights)
}
