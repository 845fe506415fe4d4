//! Keyword scoring that tells line item tables from header/metadata tables.

use serde::Serialize;

use crate::models::{ExtractedTable, TableType};

/// Minimum score for a table to be typed at all.
pub const MIN_SCORE: u32 = 30;

const LINE_ITEM_GROUPS: &[&[&str]] = &[
    &["item", "sku", "part"],
    &["description", "desc", "product"],
    &["quantity", "qty"],
    &["price", "cost", "amount"],
];
const LINE_ITEM_GROUP_POINTS: u32 = 20;
const MANY_ROWS_POINTS: u32 = 10;
const WIDE_TABLE_POINTS: u32 = 10;

const METADATA_GROUPS: &[&[&str]] = &[
    &["date"],
    &["customer", "bill to", "ship to", "sold to"],
    &["payment", "terms"],
];
const METADATA_GROUP_POINTS: u32 = 25;
const SINGLE_ROW_POINTS: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TableClassification {
    pub table_type: TableType,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub line_item_score: u32,
    pub metadata_score: u32,
}

fn group_hits(headers: &str, groups: &[&[&str]]) -> u32 {
    groups
        .iter()
        .filter(|keywords| keywords.iter().any(|k| headers.contains(k)))
        .count() as u32
}

/// Score a table by its header text and shape. Ties go to line items.
pub fn classify_table(headers: &[String], row_count: usize) -> TableClassification {
    let joined = headers.join(" ").to_lowercase();

    let mut line_item_score = group_hits(&joined, LINE_ITEM_GROUPS) * LINE_ITEM_GROUP_POINTS;
    if row_count >= 3 {
        line_item_score += MANY_ROWS_POINTS;
    }
    if headers.len() >= 4 {
        line_item_score += WIDE_TABLE_POINTS;
    }

    let mut metadata_score = group_hits(&joined, METADATA_GROUPS) * METADATA_GROUP_POINTS;
    if row_count == 1 {
        metadata_score += SINGLE_ROW_POINTS;
    }

    let (table_type, winning) = if line_item_score >= metadata_score {
        (TableType::LineItems, line_item_score)
    } else {
        (TableType::Metadata, metadata_score)
    };

    if winning < MIN_SCORE {
        return TableClassification {
            table_type: TableType::Unknown,
            confidence: 0.0,
            line_item_score,
            metadata_score,
        };
    }

    TableClassification {
        table_type,
        confidence: f64::from(winning.min(100)) / 100.0,
        line_item_score,
        metadata_score,
    }
}

/// Classify `table` in place.
pub fn classify(table: &mut ExtractedTable) -> TableClassification {
    let result = classify_table(&table.headers, table.rows.len());
    table.table_type = result.table_type;
    table.confidence = result.confidence;
    result
}
