//! `<table>` extraction from the service's HTML-flavoured markdown.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};

use super::collapse_whitespace;
use crate::models::{ExtractedTable, TableRow};

/// Rows must have at least this many cells, whatever the header width.
const MIN_ROW_CELLS: usize = 3;
/// ...and at least this share of the header's cell count.
const MIN_ROW_FILL: f64 = 0.7;

static SUMMARY_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(sub-?\s*total|total|shipping|freight|handling|tax)\b")
        .expect("static regex must compile")
});

/// Cheap detection used to pick the parsing path.
pub fn contains_html_table(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("<table") && lower.contains("</table>")
}

/// Every `<table>` in `text`, including nested ones, in document order.
/// Tables without a usable header row are skipped.
pub fn extract_html_tables(text: &str) -> Vec<ExtractedTable> {
    let fragment = Html::parse_fragment(text);
    fragment
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "table")
        .filter_map(parse_table)
        .collect()
}

fn child_elements(el: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    el.children().filter_map(ElementRef::wrap)
}

fn named<'a>(el: ElementRef<'a>, names: &'static [&'static str]) -> impl Iterator<Item = ElementRef<'a>> {
    child_elements(el).filter(move |child| names.contains(&child.value().name()))
}

fn parse_table(table: ElementRef<'_>) -> Option<ExtractedTable> {
    let mut head_rows = Vec::new();
    let mut body_rows = Vec::new();

    for section in child_elements(table) {
        match section.value().name() {
            "thead" => head_rows.extend(named(section, &["tr"])),
            "tbody" | "tfoot" => body_rows.extend(named(section, &["tr"])),
            "tr" => body_rows.push(section),
            _ => {}
        }
    }

    let header_row = if let Some(first) = head_rows.first() {
        *first
    } else if !body_rows.is_empty() {
        body_rows.remove(0)
    } else {
        return None;
    };

    let headers: Vec<String> = named(header_row, &["th", "td"]).map(cell_text).collect();
    if headers.iter().all(String::is_empty) {
        return None;
    }

    let min_cells = (headers.len() as f64 * MIN_ROW_FILL).max(MIN_ROW_CELLS as f64);
    let rows = body_rows
        .into_iter()
        .filter_map(|tr| {
            let cells: Vec<ElementRef<'_>> = named(tr, &["td", "th"]).collect();
            if is_summary_row(&cells) {
                return None;
            }
            let texts: Vec<String> = cells.into_iter().map(cell_text).collect();
            if (texts.len() as f64) < min_cells || texts.iter().all(String::is_empty) {
                return None;
            }
            let source_line = texts.join(" | ");
            Some(TableRow::new(texts, source_line))
        })
        .collect();

    Some(ExtractedTable::new(headers, rows))
}

/// Subtotal, tax and shipping lines are usually a label cell spanning the
/// item columns followed by an amount.
fn is_summary_row(cells: &[ElementRef<'_>]) -> bool {
    let spans = cells.iter().any(|cell| {
        cell.value()
            .attr("colspan")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .is_some_and(|span| span >= 2)
    });
    spans && cells.iter().any(|cell| SUMMARY_TEXT.is_match(&cell_text(*cell)))
}

/// Text content with `<br>` and block boundaries turned into spaces.
fn cell_text(cell: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in cell.descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if matches!(el.name(), "br" | "p" | "div" | "li") => out.push(' '),
            _ => {}
        }
    }
    collapse_whitespace(&out)
}
