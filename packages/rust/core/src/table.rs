//! CSV input and output.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use tracing::{info, instrument};

use companyinfo_shared::{CompanyInfoError, Result, SecurityId};

use crate::records::{BaseRecord, ColumnLayout, RecordSet};

const BOM: &str = "\u{feff}";

/// Load the base table from a CSV file.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_base(path: &Path, id_column: &str, name_column: &str) -> Result<RecordSet> {
    let file = std::fs::File::open(path).map_err(|e| CompanyInfoError::io(path, e))?;
    let records = read_base_from(file, id_column, name_column)?;
    info!(records = records.len(), "base table loaded");
    Ok(records)
}

/// Load the base table from any reader.
///
/// The identifier and name columns are required; every other column is kept
/// as an extra column in encountered order. A leading UTF-8 BOM is ignored.
/// A row with a blank identifier is rejected, since every base row must come
/// out as exactly one output row.
pub fn read_base_from<R: Read>(
    mut reader: R,
    id_column: &str,
    name_column: &str,
) -> Result<RecordSet> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|e| CompanyInfoError::Table(format!("failed to read base table: {e}")))?;
    let text = text.strip_prefix(BOM).unwrap_or(&text);

    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = csv
        .headers()
        .map_err(table_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let position = |label: &str| {
        headers.iter().position(|h| h == label).ok_or_else(|| {
            CompanyInfoError::validation(format!("base table has no `{label}` column"))
        })
    };
    let id_at = position(id_column)?;
    let name_at = position(name_column)?;

    let extras: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| *i != id_at && *i != name_at && !h.is_empty())
        .map(|(i, h)| (i, h.clone()))
        .collect();

    let mut rows = Vec::new();
    for (i, result) in csv.records().enumerate() {
        let record = result.map_err(table_error)?;
        let id = SecurityId::new(record.get(id_at).unwrap_or_default());
        if id.as_str().is_empty() {
            let line = record.position().map_or(i as u64 + 2, |p| p.line());
            return Err(CompanyInfoError::validation(format!(
                "base table line {line} has a blank `{id_column}`"
            )));
        }
        let name = record.get(name_at).unwrap_or_default().trim().to_string();
        let extra_values: HashMap<String, String> = extras
            .iter()
            .filter_map(|(i, h)| record.get(*i).map(|v| (h.clone(), v.to_string())))
            .collect();
        rows.push(BaseRecord {
            id,
            name,
            extras: extra_values,
        });
    }

    RecordSet::from_base(rows, extras.into_iter().map(|(_, h)| h).collect())
}

/// Write the final table as CSV.
#[instrument(skip_all, fields(path = %path.display(), records = records.len()))]
pub fn write_output(
    path: &Path,
    records: &RecordSet,
    layout: &ColumnLayout,
    write_bom: bool,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CompanyInfoError::io(parent, e))?;
    }
    let file = std::fs::File::create(path).map_err(|e| CompanyInfoError::io(path, e))?;
    write_output_to(file, records, layout, write_bom)?;
    info!("output table written");
    Ok(())
}

/// Write the final table to any writer: header row, then one row per record
/// in base order.
pub fn write_output_to<W: Write>(
    mut writer: W,
    records: &RecordSet,
    layout: &ColumnLayout,
    write_bom: bool,
) -> Result<()> {
    if write_bom {
        writer
            .write_all(BOM.as_bytes())
            .map_err(|e| CompanyInfoError::Table(format!("failed to write BOM: {e}")))?;
    }

    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(layout.headers()).map_err(table_error)?;
    for record in records.iter() {
        csv.write_record(layout.row(record)).map_err(table_error)?;
    }
    csv.flush()
        .map_err(|e| CompanyInfoError::Table(format!("failed to flush output: {e}")))?;
    Ok(())
}

fn table_error(e: csv::Error) -> CompanyInfoError {
    CompanyInfoError::Table(e.to_string())
}
