//! Lookup table construction: the key→value map and its longest-first match index.

use indexmap::IndexMap;
use log::{debug, info};

use crate::{
    dataset::Dataset,
    error::{MatchError, MatchResult},
};

/// Keys in first-seen order, each mapped to its last-seen value.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: IndexMap<String, String>,
    index: MatchIndex,
}

/// Keys ordered by descending character length (stable), with lowercase projections.
#[derive(Debug, Clone, Default)]
pub struct MatchIndex {
    keys: Vec<String>,
    lowered: Vec<String>,
}

impl MatchIndex {
    fn build<'a>(keys: impl Iterator<Item = &'a String>) -> Self {
        let mut keys: Vec<String> = keys.cloned().collect();
        // sort_by_key is stable: equal lengths keep table order.
        keys.sort_by_key(|key| std::cmp::Reverse(key.chars().count()));
        let lowered = keys.iter().map(|key| key.to_lowercase()).collect();
        Self { keys, lowered }
    }

    /// Longest key contained in `token`, compared case-insensitively.
    pub fn find_in(&self, token: &str) -> Option<&str> {
        let token = token.to_lowercase();
        self.lowered
            .iter()
            .position(|key| token.contains(key.as_str()))
            .map(|idx| self.keys[idx].as_str())
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl LookupTable {
    /// Builds from `(key, value)` pairs; keys are trimmed and empty keys dropped.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut entries = IndexMap::new();
        for (key, value) in pairs {
            let key = key.as_ref().trim();
            if key.is_empty() {
                continue;
            }
            entries.insert(key.to_string(), value.as_ref().trim().to_string());
        }
        let index = MatchIndex::build(entries.keys());
        Self { entries, index }
    }

    /// Picks the key and value columns by header, falling back to the first two columns.
    pub fn from_dataset(
        dataset: &Dataset,
        key_header: &str,
        value_header: &str,
    ) -> MatchResult<Self> {
        let columns = dataset.column_count();
        if columns < 2 {
            return Err(MatchError::Mapping { columns });
        }
        let find = |label: &str| {
            let label = label.trim().to_lowercase();
            dataset
                .headers
                .iter()
                .position(|h| h.trim().to_lowercase() == label)
        };
        let (key_col, value_col) = match (find(key_header), find(value_header)) {
            (Some(k), Some(v)) => (k, v),
            _ => {
                info!(
                    "Lookup headers '{key_header}'/'{value_header}' not both present; using the first two columns"
                );
                (0, 1)
            }
        };
        debug!("Lookup key column {key_col}, value column {value_col}");

        let cell = |row: &[String], idx: usize| row.get(idx).cloned().unwrap_or_default();
        let table = Self::from_pairs(
            dataset
                .rows
                .iter()
                .map(|row| (cell(row, key_col), cell(row, value_col))),
        );
        info!("Loaded {} lookup key(s)", table.len());
        Ok(table)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn index(&self) -> &MatchIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
