//! "Does this cell look like a product code?"
//!
//! A value qualifies when at least one shape rule accepts it and no reject
//! rule fires. Rules are plain named predicates so each can be tested alone
//! and the matching rule can be logged.

use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy)]
pub struct CodeRule {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
}

/// Shapes a product code can take, most specific first.
pub const SHAPE_RULES: &[CodeRule] = &[
    CodeRule {
        name: "alphanumeric_mix",
        matches: is_alphanumeric_mix,
    },
    CodeRule {
        name: "all_letters",
        matches: is_all_letters,
    },
    CodeRule {
        name: "separated_digits",
        matches: is_separated_digits,
    },
    CodeRule {
        name: "general_code",
        matches: is_general_code,
    },
];

/// Values that pass a shape rule but are really something else.
pub const REJECT_RULES: &[CodeRule] = &[
    CodeRule {
        name: "line_index",
        matches: is_line_index,
    },
    CodeRule {
        name: "currency",
        matches: is_currency_like,
    },
    CodeRule {
        name: "phrase",
        matches: is_long_phrase,
    },
];

/// Name of the shape rule that accepts `value`, if it is code-like at all.
pub fn matching_rule(value: &str) -> Option<&'static str> {
    let value = value.trim();
    if value.is_empty() || REJECT_RULES.iter().any(|rule| (rule.matches)(value)) {
        return None;
    }
    SHAPE_RULES
        .iter()
        .find(|rule| (rule.matches)(value))
        .map(|rule| rule.name)
}

pub fn looks_like_product_code(value: &str) -> bool {
    matching_rule(value).is_some()
}

fn is_code_char(c: char, separators: &str) -> bool {
    c.is_ascii_alphanumeric() || separators.contains(c)
}

/// Letters and digits mixed, e.g. `A-100`, `X9`, `SKU12/B`.
pub fn is_alphanumeric_mix(value: &str) -> bool {
    let len = value.chars().count();
    (2..=30).contains(&len)
        && value.chars().all(|c| is_code_char(c, "-_/.#"))
        && value.chars().any(|c| c.is_ascii_alphabetic())
        && value.chars().any(|c| c.is_ascii_digit())
}

/// A single word of 2-20 letters, e.g. `HEXBOLT`.
pub fn is_all_letters(value: &str) -> bool {
    let len = value.chars().count();
    (2..=20).contains(&len) && value.chars().all(|c| c.is_ascii_alphabetic())
}

/// Digits broken up by separators, e.g. `123-456`, `10.20.30`.
pub fn is_separated_digits(value: &str) -> bool {
    let len = value.chars().count();
    (3..=15).contains(&len)
        && value.chars().all(|c| c.is_ascii_digit() || "-./ ".contains(c))
        && value.chars().any(|c| "-./ ".contains(c))
        && value.starts_with(|c: char| c.is_ascii_digit())
        && value.ends_with(|c: char| c.is_ascii_digit())
}

/// Anything alphanumeric with common separators, 2-25 characters.
pub fn is_general_code(value: &str) -> bool {
    let len = value.chars().count();
    (2..=25).contains(&len)
        && value.starts_with(|c: char| c.is_ascii_alphanumeric())
        && value.chars().all(|c| is_code_char(c, "-_./# "))
}

/// One to three bare digits: almost always a line number, not a SKU.
pub fn is_line_index(value: &str) -> bool {
    let len = value.len();
    (1..=3).contains(&len) && value.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_currency_like(value: &str) -> bool {
    static GROUPED: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^-?\d{1,3}(,\d{3})+(\.\d+)?$").expect("static regex must compile")
    });
    static DECIMAL: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^-?\d+\.\d+$").expect("static regex must compile"));
    static SYMBOL: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^-?[$€£¥]\s*-?[\d,]+(\.\d+)?$").expect("static regex must compile")
    });

    let value = value.trim();
    GROUPED.is_match(value) || DECIMAL.is_match(value) || SYMBOL.is_match(value)
}

/// Four or more words reads as a description, not an identifier.
pub fn is_long_phrase(value: &str) -> bool {
    value.split_whitespace().count() >= 4
}
