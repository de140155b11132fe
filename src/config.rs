//! Run configuration.
//!
//! Every field has a default, so a YAML file only needs the keys it changes:
//!
//! ```yaml
//! key_headers: [model number, sku, part no]
//! placement: insert-adjacent
//! highlight_color: FFFFC7CE
//! ```

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, anyhow, ensure};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub const DEFAULT_HIGHLIGHT: &str = "FFFF9999";
pub const DEFAULT_COLUMN_WIDTH: f64 = 15.0;

/// Where the derived column goes relative to the key column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Placement {
    /// After the sheet's last used column; nothing shifts.
    #[default]
    AppendLast,
    /// Directly right of the key column; later columns shift right.
    InsertAdjacent,
}

impl Placement {
    pub fn as_str(self) -> &'static str {
        match self {
            Placement::AppendLast => "append-last",
            Placement::InsertAdjacent => "insert-adjacent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Header labels that identify the key column, compared trimmed and case-insensitively.
    pub key_headers: Vec<String>,
    pub lookup_key_header: String,
    pub lookup_value_header: String,
    /// Header text of the derived column.
    pub derived_header: String,
    /// ARGB fill applied to rows with an unresolved token.
    pub highlight_color: String,
    pub default_column_width: f64,
    pub placement: Placement,
    pub output_suffix: String,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            key_headers: vec!["model number".to_string(), "sku".to_string()],
            lookup_key_header: "Model Number".to_string(),
            lookup_value_header: "Items".to_string(),
            derived_header: "Items".to_string(),
            highlight_color: DEFAULT_HIGHLIGHT.to_string(),
            default_column_width: DEFAULT_COLUMN_WIDTH,
            placement: Placement::default(),
            output_suffix: "_update".to_string(),
        }
    }
}

impl MatchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: MatchConfig =
            serde_yaml::from_reader(BufReader::new(file)).context("Parsing config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing config to YAML")
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.key_headers.iter().any(|h| !h.trim().is_empty()),
            "key_headers must contain at least one non-empty label"
        );
        ensure!(
            !self.derived_header.trim().is_empty(),
            "derived_header cannot be empty"
        );
        ensure!(
            self.default_column_width.is_finite() && self.default_column_width > 0.0,
            "default_column_width must be positive, got {}",
            self.default_column_width
        );
        normalize_argb(&self.highlight_color)?;
        Ok(())
    }

    /// Key labels trimmed and lowercased, empty entries dropped.
    pub fn normalized_key_headers(&self) -> Vec<String> {
        self.key_headers
            .iter()
            .map(|h| h.trim().to_lowercase())
            .filter(|h| !h.is_empty())
            .collect()
    }

    pub fn highlight_argb(&self) -> Result<String> {
        normalize_argb(&self.highlight_color)
    }
}

/// Accepts `RRGGBB`, `AARRGGBB` and an optional leading `#`; returns uppercase `AARRGGBB`.
pub fn normalize_argb(value: &str) -> Result<String> {
    let hex = value.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!("highlight color '{value}' is not hexadecimal"));
    }
    match hex.len() {
        6 => Ok(format!("FF{}", hex.to_ascii_uppercase())),
        8 => Ok(hex.to_ascii_uppercase()),
        _ => Err(anyhow!(
            "highlight color '{value}' must have 6 (RGB) or 8 (ARGB) hex digits"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: MatchConfig =
            serde_yaml::from_str("placement: insert-adjacent\nkey_headers: [' Part No ']\n")
                .expect("parse");
        assert_eq!(config.placement, Placement::InsertAdjacent);
        assert_eq!(config.normalized_key_headers(), vec!["part no"]);
        assert_eq!(config.derived_header, "Items");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn colors_normalize_to_argb() {
        assert_eq!(normalize_argb("#ff9999").expect("rgb"), "FFFF9999");
        assert_eq!(normalize_argb("80ff9999").expect("argb"), "80FF9999");
        assert!(normalize_argb("red").is_err());
        assert!(normalize_argb("FFF").is_err());
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        let mut config = MatchConfig {
            key_headers: vec!["  ".to_string()],
            ..MatchConfig::default()
        };
        assert!(config.validate().is_err());
        config = MatchConfig {
            default_column_width: 0.0,
            ..MatchConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
