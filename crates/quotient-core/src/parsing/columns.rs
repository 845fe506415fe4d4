//! Mapping table headers to line item fields.
//!
//! Two strategies exist because the two table paths grew separately:
//! HTML tables use anchored regex groups tried in priority order, markdown
//! tables use substring lists with an exact pass before a containment pass.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Line item field a column can feed. Declaration order is priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    ItemNumber,
    PartNumber,
    Description,
    Quantity,
    UnitPrice,
    TotalPrice,
    UnitOfMeasure,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::ItemNumber,
        Field::PartNumber,
        Field::Description,
        Field::Quantity,
        Field::UnitPrice,
        Field::TotalPrice,
        Field::UnitOfMeasure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::ItemNumber => "item_number",
            Field::PartNumber => "part_number",
            Field::Description => "description",
            Field::Quantity => "quantity",
            Field::UnitPrice => "unit_price",
            Field::TotalPrice => "total_price",
            Field::UnitOfMeasure => "unit_of_measure",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field -> column index. Each field maps to at most one column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    columns: BTreeMap<Field, usize>,
}

impl ColumnMapping {
    pub fn get(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    /// True if some field already claimed column `index`.
    pub fn is_assigned(&self, index: usize) -> bool {
        self.columns.values().any(|&i| i == index)
    }

    /// Keeps the first column seen for a field.
    pub fn assign(&mut self, field: Field, index: usize) -> bool {
        if self.columns.contains_key(&field) {
            return false;
        }
        self.columns.insert(field, index);
        true
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, usize)> + '_ {
        self.columns.iter().map(|(f, i)| (*f, *i))
    }
}

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("static regex must compile")
}

/// Regex groups for the HTML path, in priority order.
static HEADER_PATTERNS: LazyLock<Vec<(Field, Regex)>> = LazyLock::new(|| {
    vec![
        (
            Field::ItemNumber,
            pattern(
                r"(?i)^\s*(item|sku|part|catalog|model|stock)\s*(#|no\.?|num(ber)?|code|id)?\s*$|^\s*(product|cat\.?|mfr\.?|mfg\.?)\s*(#|no\.?|num(ber)?|code|id)\s*$|^\s*(#|p/n|code)\s*$",
            ),
        ),
        (
            Field::Description,
            pattern(r"(?i)\b(desc(ription)?|product|details?|particulars|name)\b"),
        ),
        (
            Field::Quantity,
            pattern(r"(?i)\b(qty|quantity|qnty|ordered|quan)\b"),
        ),
        (
            Field::UnitPrice,
            pattern(
                r"(?i)unit\s*(price|cost)|price\s*(each|per)|\beach\b|^\s*(price|rate|cost|net|list)\s*(price)?\s*$",
            ),
        ),
        (
            Field::TotalPrice,
            pattern(r"(?i)\b(total|amount|amt|ext(ended)?|line\s*total|subtotal)\b"),
        ),
        (
            Field::UnitOfMeasure,
            pattern(r"(?i)^\s*(uom|u/m|um|unit|units|unit\s*of\s*measure)\s*$"),
        ),
    ]
});

/// Field whose pattern first matches `header`, if any.
pub fn classify_header(header: &str) -> Option<Field> {
    HEADER_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(header))
        .map(|(field, _)| *field)
}

/// HTML-path mapping: first column per field wins.
pub fn map_adaptive_columns(headers: &[String]) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();
    for (index, header) in headers.iter().enumerate() {
        if let Some(field) = classify_header(header) {
            mapping.assign(field, index);
        }
    }
    mapping
}

/// Substring lists for the markdown path.
const LEGACY_PATTERNS: &[(Field, &[&str])] = &[
    (
        Field::ItemNumber,
        &[
            "item",
            "item #",
            "item no",
            "item number",
            "item code",
            "sku",
            "product code",
            "product #",
            "catalog #",
            "catalog number",
            "cat #",
            "model",
            "model #",
            "#",
        ],
    ),
    (
        Field::PartNumber,
        &[
            "part",
            "part #",
            "part no",
            "part number",
            "mfr part",
            "mfr #",
            "mfg part",
            "manufacturer part",
            "p/n",
        ],
    ),
    (
        Field::Description,
        &[
            "description",
            "desc",
            "item description",
            "product description",
            "product",
            "product name",
            "details",
            "name",
        ],
    ),
    (
        Field::Quantity,
        &["qty", "quantity", "qnty", "qty ordered", "order qty", "ship qty", "ordered"],
    ),
    (
        Field::UnitPrice,
        &[
            "unit price",
            "price",
            "unit cost",
            "price each",
            "each",
            "rate",
            "net price",
            "list price",
            "your price",
            "cost",
        ],
    ),
    (
        Field::TotalPrice,
        &[
            "total",
            "amount",
            "extended",
            "ext price",
            "extended price",
            "line total",
            "total price",
            "net amount",
            "ext",
        ],
    ),
    (
        Field::UnitOfMeasure,
        &["uom", "u/m", "unit", "units", "unit of measure"],
    ),
];

/// Lowercase, drop `.`/`:`/`*`, collapse whitespace.
pub fn normalize_header(header: &str) -> String {
    let stripped: String = header
        .chars()
        .filter(|c| !matches!(c, '.' | ':' | '*'))
        .collect::<String>()
        .to_lowercase();
    super::collapse_whitespace(&stripped)
}

/// Markdown-path mapping: exact matches claim columns first, then
/// containment matches fill the remaining fields from unclaimed columns.
pub fn map_legacy_columns(headers: &[String]) -> ColumnMapping {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut mapping = ColumnMapping::default();

    for (field, patterns) in LEGACY_PATTERNS {
        if let Some(index) = normalized
            .iter()
            .enumerate()
            .find(|(i, h)| !mapping.is_assigned(*i) && patterns.contains(&h.as_str()))
            .map(|(i, _)| i)
        {
            mapping.assign(*field, index);
        }
    }

    for (field, patterns) in LEGACY_PATTERNS {
        if mapping.contains(*field) {
            continue;
        }
        if let Some(index) = normalized
            .iter()
            .enumerate()
            .find(|(i, h)| {
                !mapping.is_assigned(*i)
                    && !h.is_empty()
                    && patterns.iter().any(|p| h.contains(p))
            })
            .map(|(i, _)| i)
        {
            mapping.assign(*field, index);
        }
    }

    mapping
}
