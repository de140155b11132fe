use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Placement;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Match product identifiers in spreadsheets against a lookup table",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add a derived Items column to every sheet with a recognised key header
    Match(MatchArgs),
    /// Show how individual cell values resolve against the lookup table
    Resolve(ResolveArgs),
    /// Print or write the default configuration as YAML
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct LookupArgs {
    /// Lookup table (.csv, .tsv or .xlsx) holding key and value columns
    #[arg(short = 'l', long = "lookup")]
    pub lookup: PathBuf,
    /// Delimiter of a delimited lookup file (supports ',', 'tab', ';', '|')
    #[arg(long = "lookup-delimiter", value_parser = parse_delimiter)]
    pub lookup_delimiter: Option<u8>,
    /// Character encoding of a delimited lookup file (defaults to utf-8)
    #[arg(long = "lookup-encoding")]
    pub lookup_encoding: Option<String>,
    /// YAML configuration file; command-line flags take precedence
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Header label identifying the key column (repeatable; replaces the configured labels)
    #[arg(long = "key-header", action = clap::ArgAction::Append)]
    pub key_headers: Vec<String>,
}

#[derive(Debug, Args)]
pub struct MatchArgs {
    /// Workbook (.xlsx) to annotate, or '-' for stdin
    #[arg(short = 'w', long = "workbook")]
    pub workbook: PathBuf,
    #[command(flatten)]
    pub lookup: LookupArgs,
    /// Output workbook path, or '-' for stdout (defaults to <name>_update.xlsx beside the input)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Where the derived column is placed
    #[arg(long, value_enum)]
    pub placement: Option<Placement>,
    /// Fill for rows with unresolved tokens, as RRGGBB or AARRGGBB
    #[arg(long = "highlight-color")]
    pub highlight_color: Option<String>,
    /// Process the workbook without writing any output
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Print a per-sheet summary table
    #[arg(long)]
    pub report: bool,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub lookup: LookupArgs,
    /// Cell text to resolve (repeatable)
    #[arg(short = 'v', long = "value", required = true, action = clap::ArgAction::Append)]
    pub values: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Destination file (prints to stdout when omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
