//! Rows -> [`LineItem`]s, one extractor per table path.
//!
//! Positions are 1-based and shared across every table of a document, so
//! callers thread a single counter through all extraction calls.

use super::columns::{ColumnMapping, Field};
use super::parse_number;
use super::product_code::{is_line_index, looks_like_product_code};
use crate::models::{ExtractedTable, LineItem, TableRow, line_item_id};

const DEFAULT_UNIT_OF_MEASURE: &str = "EA";

/// Hands out line item positions across tables.
#[derive(Debug, Clone, Copy)]
pub struct PositionCounter {
    next: u32,
}

impl Default for PositionCounter {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl PositionCounter {
    pub fn peek(&self) -> u32 {
        self.next
    }

    fn take(&mut self) -> u32 {
        let position = self.next;
        self.next += 1;
        position
    }
}

fn mapped<'a>(row: &'a TableRow, mapping: &ColumnMapping, field: Field) -> &'a str {
    mapping.get(field).map(|i| row.cell(i).trim()).unwrap_or("")
}

fn numbers(row: &TableRow, mapping: &ColumnMapping) -> (Option<f64>, Option<f64>, Option<f64>) {
    (
        parse_number(mapped(row, mapping, Field::Quantity)),
        parse_number(mapped(row, mapping, Field::UnitPrice)),
        parse_number(mapped(row, mapping, Field::TotalPrice)),
    )
}

fn unit_of_measure(row: &TableRow, mapping: &ColumnMapping) -> String {
    match mapped(row, mapping, Field::UnitOfMeasure) {
        "" => DEFAULT_UNIT_OF_MEASURE.to_string(),
        uom => uom.to_string(),
    }
}

/// HTML path. A row needs an identifier or a description; missing values
/// get synthetic, position-based stand-ins.
pub fn extract_html_line_items(
    table: &ExtractedTable,
    mapping: &ColumnMapping,
    positions: &mut PositionCounter,
) -> Vec<LineItem> {
    let mut items = Vec::with_capacity(table.rows.len());

    for row in &table.rows {
        let identifier = mapped(row, mapping, Field::ItemNumber);
        let description = mapped(row, mapping, Field::Description);
        if identifier.is_empty() && description.is_empty() {
            continue;
        }

        let position = positions.take();
        let (item_number, part_number) = if identifier.is_empty() {
            (format!("ITEM-{position}"), format!("PART-{position}"))
        } else {
            (identifier.to_string(), identifier.to_string())
        };
        let description = match (description, identifier) {
            ("", "") => format!("Unknown Item {position}"),
            ("", identifier) => identifier.to_string(),
            (description, _) => description.to_string(),
        };
        let (quantity, unit_price, total) = numbers(row, mapping);

        items.push(LineItem {
            id: line_item_id(position, &row.cells),
            item_number,
            part_number,
            description,
            quantity,
            unit_price,
            total,
            unit_of_measure: unit_of_measure(row, mapping),
            raw_row: row.cells.clone(),
            position,
            source_line: row.source_line.clone(),
        });
    }

    items
}

/// Which stage of the markdown fallback produced the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierSource {
    ItemColumn,
    ColumnScan { column: usize },
    PartColumn,
    Description,
    Missing,
}

/// Descriptions under these headers are product names and can stand in
/// for a missing identifier.
fn header_names_products(header: &str) -> bool {
    let header = header.to_lowercase();
    ["desc", "product", "item", "name"]
        .iter()
        .any(|k| header.contains(k))
}

/// Markdown identifier fallback:
///
/// 1. the mapped item column, unless empty or a bare 1-3 digit line index;
/// 2. the first code-like cell outside the numeric columns, preferring
///    columns no field claimed;
/// 3. the mapped part column;
/// 4. the description, when its column holds product names or there is
///    no item column at all.
pub fn resolve_identifier(
    row: &TableRow,
    headers: &[String],
    mapping: &ColumnMapping,
) -> (String, IdentifierSource) {
    let item = mapped(row, mapping, Field::ItemNumber);
    if !item.is_empty() && !is_line_index(item) {
        return (item.to_string(), IdentifierSource::ItemColumn);
    }

    let numeric = [
        Field::Quantity,
        Field::UnitPrice,
        Field::TotalPrice,
        Field::UnitOfMeasure,
    ]
    .map(|field| mapping.get(field));
    let mut fallback_scan = None;
    for (column, cell) in row.cells.iter().enumerate() {
        if numeric.contains(&Some(column)) || !looks_like_product_code(cell) {
            continue;
        }
        if !mapping.is_assigned(column) {
            return (cell.trim().to_string(), IdentifierSource::ColumnScan { column });
        }
        if fallback_scan.is_none() {
            fallback_scan = Some(column);
        }
    }
    if let Some(column) = fallback_scan {
        return (
            row.cell(column).trim().to_string(),
            IdentifierSource::ColumnScan { column },
        );
    }

    let part = mapped(row, mapping, Field::PartNumber);
    if !part.is_empty() {
        return (part.to_string(), IdentifierSource::PartColumn);
    }

    let description = mapped(row, mapping, Field::Description);
    let names_products = mapping
        .get(Field::Description)
        .and_then(|i| headers.get(i))
        .is_some_and(|h| header_names_products(h));
    if !description.is_empty() && (names_products || !mapping.contains(Field::ItemNumber)) {
        return (description.to_string(), IdentifierSource::Description);
    }

    (String::new(), IdentifierSource::Missing)
}

/// Markdown path. A row is kept when it ends up with a description or a
/// part number.
pub fn extract_markdown_line_items(
    table: &ExtractedTable,
    mapping: &ColumnMapping,
    positions: &mut PositionCounter,
) -> Vec<LineItem> {
    let mut items = Vec::with_capacity(table.rows.len());

    for row in &table.rows {
        let (identifier, source) = resolve_identifier(row, &table.headers, mapping);
        let description = mapped(row, mapping, Field::Description);
        let part_number = match mapped(row, mapping, Field::PartNumber) {
            "" => identifier.clone(),
            part => part.to_string(),
        };
        if description.is_empty() && part_number.is_empty() {
            tracing::trace!(line = %row.source_line, "Skipping row without description or part number");
            continue;
        }

        let position = positions.take();
        tracing::trace!(position, ?source, %identifier, "Resolved row identifier");

        let item_number = if identifier.is_empty() {
            format!("ITEM-{position}")
        } else {
            identifier
        };
        let description = if description.is_empty() {
            item_number.clone()
        } else {
            description.to_string()
        };
        let (quantity, unit_price, total) = numbers(row, mapping);

        items.push(LineItem {
            id: line_item_id(position, &row.cells),
            item_number,
            part_number,
            description,
            quantity,
            unit_price,
            total,
            unit_of_measure: unit_of_measure(row, mapping),
            raw_row: row.cells.clone(),
            position,
            source_line: row.source_line.clone(),
        });
    }

    items
}
