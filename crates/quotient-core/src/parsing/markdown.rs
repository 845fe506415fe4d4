//! Pipe-table extraction for documents without HTML tables.

use std::sync::LazyLock;

use regex::Regex;

use super::collapse_whitespace;
use crate::models::{ExtractedTable, TableRow};

/// A table opens on a pipe row with at least this many non-empty cells.
const MIN_HEADER_CELLS: usize = 3;

static SEPARATOR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\|?\s*:?-+:?\s*(\|\s*:?-+:?\s*)*\|?$").expect("static regex must compile")
});

static INLINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("static regex must compile"));

/// `|---|:---:|` style alignment rows.
pub fn is_separator_line(line: &str) -> bool {
    SEPARATOR_LINE.is_match(line.trim())
}

/// Split a pipe row into trimmed cells, ignoring the outer pipes.
pub fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner
        .split('|')
        .map(|cell| collapse_whitespace(&INLINE_BREAK.replace_all(cell, " ")))
        .collect()
}

struct OpenTable {
    headers: Vec<String>,
    rows: Vec<TableRow>,
}

impl OpenTable {
    fn close(self) -> ExtractedTable {
        ExtractedTable::new(self.headers, self.rows)
    }
}

/// All pipe tables in `text`. A blank or non-table line ends the current
/// table; separator rows are skipped without ending it.
pub fn extract_markdown_tables(text: &str) -> Vec<ExtractedTable> {
    let mut tables = Vec::new();
    let mut current: Option<OpenTable> = None;

    for line in text.lines() {
        let trimmed = line.trim();

        if !trimmed.contains('|') {
            if let Some(open) = current.take() {
                tables.push(open.close());
            }
            continue;
        }
        if is_separator_line(trimmed) {
            continue;
        }

        let cells = split_cells(trimmed);
        let filled = cells.iter().filter(|c| !c.is_empty()).count();

        match current.as_mut() {
            None => {
                if filled >= MIN_HEADER_CELLS {
                    current = Some(OpenTable {
                        headers: cells,
                        rows: Vec::new(),
                    });
                }
            }
            Some(open) if cells.len() >= MIN_HEADER_CELLS && filled > 0 => {
                open.rows.push(TableRow::new(cells, trimmed));
            }
            Some(_) if filled == 0 => {}
            Some(_) => {
                if let Some(open) = current.take() {
                    tables.push(open.close());
                }
            }
        }
    }

    if let Some(open) = current.take() {
        tables.push(open.close());
    }

    tracing::debug!(tables = tables.len(), "Extracted markdown tables");
    tables
}
