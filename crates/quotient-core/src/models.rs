use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deterministic line item ids.
const LINE_ITEM_NAMESPACE: Uuid = Uuid::from_u128(0x6a1e_0c5f_8d2b_4f0e_9b4a_3c7d_2e91_f0a7);

/// Where the document bytes come from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Bytes already in memory.
    Bytes { file_name: String, bytes: Vec<u8> },
    /// A path understood by the configured [`crate::traits::BlobStore`].
    Path(String),
}

impl DocumentSource {
    pub fn bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        DocumentSource::Bytes {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        DocumentSource::Path(path.into())
    }
}

/// What a table appears to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    LineItems,
    Metadata,
    Unknown,
}

/// A table lifted out of the service's markdown/HTML output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedTable {
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
    pub table_type: TableType,
    /// In `[0, 1]`; markdown tables are not scored and carry 0.
    pub confidence: f64,
}

impl ExtractedTable {
    pub fn new(headers: Vec<String>, rows: Vec<TableRow>) -> Self {
        Self {
            headers,
            rows,
            table_type: TableType::Unknown,
            confidence: 0.0,
        }
    }
}

/// One data row plus the text it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub cells: Vec<String>,
    pub source_line: String,
}

impl TableRow {
    pub fn new(cells: Vec<String>, source_line: impl Into<String>) -> Self {
        Self {
            cells,
            source_line: source_line.into(),
        }
    }

    /// Cell at `index`, or `""` when the row is short.
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }
}

/// One normalized product entry from a vendor document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub item_number: String,
    pub part_number: String,
    pub description: String,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total: Option<f64>,
    pub unit_of_measure: String,
    pub raw_row: Vec<String>,
    /// 1-based, increasing across all tables of a document.
    pub position: u32,
    pub source_line: String,
}

/// Deterministic id so that re-parsing the same text yields the same items.
pub fn line_item_id(position: u32, raw_row: &[String]) -> Uuid {
    let key = format!("{position}\u{1f}{}", raw_row.join("\u{1f}"));
    Uuid::new_v5(&LINE_ITEM_NAMESPACE, key.as_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingMethod {
    /// HTML tables, keyword-classified, regex column mapping.
    AdaptiveHtml,
    /// Pipe tables, substring column mapping, product-code fallback.
    MarkdownTable,
}

impl std::fmt::Display for ParsingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParsingMethod::AdaptiveHtml => write!(f, "adaptive_html"),
            ParsingMethod::MarkdownTable => write!(f, "markdown_table"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseMetadata {
    pub total_items: usize,
    pub total_tables: usize,
    pub parsing_method: ParsingMethod,
    pub parse_time: DateTime<Utc>,
}

/// Result of parsing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedContent {
    pub line_items: Vec<LineItem>,
    pub metadata: ParseMetadata,
}
