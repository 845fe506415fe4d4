//! Turning the document service's markdown/HTML output into line items.
//!
//! ```text
//! text ──┬─ contains <table>…</table> ─> html ─> table_classifier ─> columns (regex) ─> line_items (html)
//!        └─ otherwise ──────────────────> markdown ───────────────> columns (substring) ─> line_items (markdown)
//! ```
//!
//! Everything here is a pure function of the input text.

pub mod adaptive;
pub mod columns;
pub mod html;
pub mod line_items;
pub mod markdown;
pub mod product_code;
pub mod table_classifier;

pub use adaptive::parse_adaptive_table_format;
pub use columns::{ColumnMapping, Field};

/// Collapse runs of whitespace into single spaces and trim.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a money or quantity cell: currency symbols, thousands separators and
/// spaces are dropped; anything else non-numeric yields `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
