use chrono::Utc;

use super::columns::{map_adaptive_columns, map_legacy_columns};
use super::html::{contains_html_table, extract_html_tables};
use super::line_items::{PositionCounter, extract_html_line_items, extract_markdown_line_items};
use super::markdown::extract_markdown_tables;
use super::table_classifier::classify;
use crate::models::{LineItem, ParseMetadata, ParsedContent, ParsingMethod, TableType};

/// Parse the service's output into line items.
///
/// Documents containing HTML tables go through keyword classification and
/// regex column mapping; everything else is read as pipe tables. Finding
/// nothing is a valid, empty result.
pub fn parse_adaptive_table_format(text: &str) -> ParsedContent {
    let (line_items, total_tables, parsing_method) = if contains_html_table(text) {
        let (items, tables) = parse_html_tables(text);
        (items, tables, ParsingMethod::AdaptiveHtml)
    } else {
        let (items, tables) = parse_markdown_tables(text);
        (items, tables, ParsingMethod::MarkdownTable)
    };

    tracing::info!(
        method = %parsing_method,
        tables = total_tables,
        items = line_items.len(),
        "Parsed document tables"
    );

    ParsedContent {
        metadata: ParseMetadata {
            total_items: line_items.len(),
            total_tables,
            parsing_method,
            parse_time: Utc::now(),
        },
        line_items,
    }
}

/// Returns the items and the number of tables classified as line items.
fn parse_html_tables(text: &str) -> (Vec<LineItem>, usize) {
    let mut positions = PositionCounter::default();
    let mut items = Vec::new();
    let mut line_item_tables = 0;

    for (index, mut table) in extract_html_tables(text).into_iter().enumerate() {
        let classification = classify(&mut table);
        tracing::debug!(
            table = index,
            table_type = ?classification.table_type,
            confidence = classification.confidence,
            line_item_score = classification.line_item_score,
            metadata_score = classification.metadata_score,
            "Classified HTML table"
        );
        if table.table_type != TableType::LineItems {
            continue;
        }

        line_item_tables += 1;
        let mapping = map_adaptive_columns(&table.headers);
        tracing::debug!(table = index, columns = ?mapping, "Mapped HTML columns");
        items.extend(extract_html_line_items(&table, &mapping, &mut positions));
    }

    (items, line_item_tables)
}

/// Returns the items and the number of tables found.
fn parse_markdown_tables(text: &str) -> (Vec<LineItem>, usize) {
    let mut positions = PositionCounter::default();
    let tables = extract_markdown_tables(text);

    let items = tables
        .iter()
        .flat_map(|table| {
            let mapping = map_legacy_columns(&table.headers);
            tracing::debug!(headers = ?table.headers, columns = ?mapping, "Mapped markdown columns");
            extract_markdown_line_items(table, &mapping, &mut positions)
        })
        .collect();

    (items, tables.len())
}
