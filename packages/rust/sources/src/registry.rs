//! Official securities registry tables (one table per market mode).

use chrono::NaiveDate;
use reqwest::Client;
use tracing::{debug, instrument};

use companyinfo_shared::{
    CompanyInfoError, PartialRecord, RegistryConfig, RegistrySourceConfig, Result, SecurityId,
    SourceTable,
};

use crate::http::fetch_text;
use crate::tables::parse_tables;

const CODE_NAME_HEADER: &str = "有價證券代號及名稱";
const MARKET_HEADER: &str = "市場別";
const INDUSTRY_HEADER: &str = "產業別";
const DATE_HEADERS: [&str; 3] = ["上市日", "上櫃日", "公開發行日"];

/// The registry pages are served in Big5 without a charset header.
const REGISTRY_CHARSET: &str = "big5";

/// Fetch and parse one registry table.
#[instrument(skip_all, fields(source = %source.name, mode = source.mode))]
pub async fn fetch_registry(
    client: &Client,
    config: &RegistryConfig,
    source: &RegistrySourceConfig,
) -> Result<SourceTable> {
    let url = config.url_for(source);
    let html = fetch_text(client, &url, REGISTRY_CHARSET).await?;
    parse_registry(&html, source)
}

/// Parse the first table of a registry page into a [`SourceTable`].
///
/// Only rows whose code-name cell starts with digits are kept; section rows
/// and warrants without a numeric code are skipped.
pub fn parse_registry(html: &str, source: &RegistrySourceConfig) -> Result<SourceTable> {
    let tables = parse_tables(html);
    let table = tables
        .first()
        .ok_or_else(|| CompanyInfoError::parse(format!("{}: no table on page", source.name)))?;

    let header = table.header_row(&[CODE_NAME_HEADER]).ok_or_else(|| {
        CompanyInfoError::parse(format!("{}: header row not found", source.name))
    })?;
    let code_col = table.column(header, CODE_NAME_HEADER).unwrap_or(0);
    let market_col = table.column(header, MARKET_HEADER);
    let industry_col = table.column(header, INDUSTRY_HEADER);
    let date_col = DATE_HEADERS
        .iter()
        .find_map(|label| table.column(header, label));

    let mut out = SourceTable::new(&source.name);
    let mut duplicates = 0usize;

    for row in &table.rows[header + 1..] {
        let Some((code, name)) = row.cell(code_col).and_then(split_code_name) else {
            continue;
        };
        let cell = |col: Option<usize>| {
            col.and_then(|c| row.cell(c))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        let record = PartialRecord {
            official_name: (!name.is_empty()).then(|| name.to_string()),
            market_class: source.market_label.clone().or_else(|| cell(market_col)),
            industry_class: cell(industry_col),
            listed_on: cell(date_col).and_then(|d| parse_listing_date(&d)),
        };

        if !out.insert(SecurityId::new(code), record) {
            duplicates += 1;
        }
    }

    debug!(rows = out.len(), duplicates, "parsed registry table");
    Ok(out)
}

/// Split `"2330 台積電"` into `("2330", "台積電")`.
fn split_code_name(cell: &str) -> Option<(&str, &str)> {
    let cell = cell.trim();
    let end = cell
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(cell.len());
    if end == 0 {
        return None;
    }
    Some((&cell[..end], cell[end..].trim()))
}

fn parse_listing_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y/%m/%d").ok()
}
