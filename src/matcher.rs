//! Token extraction and longest-containment resolution.

use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;

use crate::lookup::LookupTable;

/// Literal written for tokens with no usable mapping.
pub const UNRESOLVED: &str = "N/A";

static QUANTITY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\d+\s*[x*]\s*").expect("quantity prefix pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResolution {
    pub token: String,
    pub matched_key: Option<String>,
    pub value: String,
}

impl TokenResolution {
    pub fn is_unresolved(&self) -> bool {
        self.value == UNRESOLVED
    }
}

/// Resolution of one cell: every token in order, plus whether any is unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CellMatch {
    pub tokens: Vec<TokenResolution>,
}

impl CellMatch {
    pub fn has_unresolved(&self) -> bool {
        self.tokens.iter().any(TokenResolution::is_unresolved)
    }

    /// Resolved values joined with `,`.
    pub fn annotation(&self) -> String {
        self.tokens.iter().map(|t| t.value.as_str()).join(",")
    }
}

/// Removes one leading `<digits> x|X|* ` quantity marker.
pub fn strip_quantity_prefix(text: &str) -> &str {
    match QUANTITY_PREFIX.find(text) {
        Some(found) => &text[found.end()..],
        None => text,
    }
}

/// Splits cleaned cell text on ASCII and full-width commas, dropping empty pieces.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned = strip_quantity_prefix(text.trim());
    cleaned
        .split([',', '，'])
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn resolve_token(token: &str, table: &LookupTable) -> TokenResolution {
    let matched_key = table.index().find_in(token);
    let value = matched_key
        .and_then(|key| table.get(key))
        .unwrap_or(UNRESOLVED)
        .to_string();
    TokenResolution {
        token: token.to_string(),
        matched_key: matched_key.map(str::to_string),
        value,
    }
}

/// `None` for a blank cell, which callers leave untouched.
pub fn match_cell(raw: Option<&str>, table: &LookupTable) -> Option<CellMatch> {
    let text = raw.map(str::trim).filter(|t| !t.is_empty())?;
    let tokens = tokenize(text)
        .iter()
        .map(|token| resolve_token(token, table))
        .collect();
    Some(CellMatch { tokens })
}
