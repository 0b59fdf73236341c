//! Market-cap share of the broad index.
//!
//! The page lists constituents in two side-by-side halves:
//! `rank | code | name | weight | rank | code | name | weight`.

use reqwest::Client;
use tracing::{debug, instrument};

use companyinfo_shared::{CompanyInfoError, Result, SecurityId, WeightMap, WeightsConfig};

use crate::http::fetch_text;
use crate::tables::parse_tables;

/// `(code, weight)` column pairs of the two halves.
const HALVES: [(usize, usize); 2] = [(1, 3), (5, 7)];

#[instrument(skip_all, fields(url = %config.index_url))]
pub async fn fetch_index_weights(client: &Client, config: &WeightsConfig) -> Result<WeightMap> {
    let html = fetch_text(client, &config.index_url, "utf-8").await?;
    let weights = parse_index_weights(&html)?;
    debug!(constituents = weights.len(), "parsed index weights");
    Ok(weights)
}

/// Parse the first table of the page.
pub fn parse_index_weights(html: &str) -> Result<WeightMap> {
    let tables = parse_tables(html);
    let table = tables
        .first()
        .ok_or_else(|| CompanyInfoError::parse("index weight page has no table"))?;

    let mut weights = WeightMap::new();
    for row in table.rows.iter().filter(|r| !r.is_header) {
        for (code_col, weight_col) in HALVES {
            let Some(code) = row.cell(code_col).map(str::trim) else {
                continue;
            };
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
                continue;
            }
            let weight = row.cell(weight_col).unwrap_or_default().trim().to_string();
            weights.insert(SecurityId::new(code), weight);
        }
    }

    Ok(weights)
}
