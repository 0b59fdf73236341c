//! Minimal HTML table reader shared by the tabular adapters.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());

/// One `<tr>` with its direct `th`/`td` cells as collapsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub cells: Vec<String>,
    /// Every cell is a `<th>`.
    pub is_header: bool,
}

impl TableRow {
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }
}

/// Rows of one `<table>`, excluding rows of tables nested inside it.
#[derive(Debug, Clone, Default)]
pub struct HtmlTable {
    pub rows: Vec<TableRow>,
}

impl HtmlTable {
    /// Index of the first row containing every label as a whole cell.
    pub fn header_row(&self, labels: &[&str]) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| labels.iter().all(|l| row.cells.iter().any(|c| c == l)))
    }

    /// Column index of `label` within row `row`.
    pub fn column(&self, row: usize, label: &str) -> Option<usize> {
        self.rows.get(row)?.cells.iter().position(|c| c == label)
    }
}

/// Parse every table in document order.
pub fn parse_tables(html: &str) -> Vec<HtmlTable> {
    let doc = Html::parse_document(html);
    doc.select(&TABLE_SEL).map(read_table).collect()
}

fn read_table(table: ElementRef<'_>) -> HtmlTable {
    let rows = table
        .select(&ROW_SEL)
        .filter(|row| nearest_table(*row).is_some_and(|t| t.id() == table.id()))
        .filter_map(|row| {
            let cells: Vec<ElementRef<'_>> = row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .collect();
            if cells.is_empty() {
                return None;
            }
            Some(TableRow {
                is_header: cells.iter().all(|c| c.value().name() == "th"),
                cells: cells.iter().map(|c| cell_text(*c)).collect(),
            })
        })
        .collect();

    HtmlTable { rows }
}

fn nearest_table(row: ElementRef<'_>) -> Option<ElementRef<'_>> {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")
}

fn cell_text(cell: ElementRef<'_>) -> String {
    let text: String = cell.text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
