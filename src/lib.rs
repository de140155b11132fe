pub mod annotator;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod io_utils;
pub mod locator;
pub mod lookup;
pub mod matcher;
pub mod mutator;
pub mod report;
pub mod rewriter;
pub mod table;
pub mod workbook;
pub mod xlsx;

use std::{env, fs, path::PathBuf, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, LookupArgs},
    config::MatchConfig,
    dataset::DatasetOptions,
    lookup::LookupTable,
    table::TextTable,
};

pub use crate::{
    config::Placement,
    error::{MatchError, StructuralAdjustmentWarning},
    report::{RunReport, SheetOutcome},
    workbook::{ProcessedWorkbook, process_workbook},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("items_matcher", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Match(args) => handle_match(&args),
        Commands::Resolve(args) => handle_resolve(&args),
        Commands::Config(args) => handle_config(&args),
    }
}

fn load_config(args: &LookupArgs, adjust: impl FnOnce(&mut MatchConfig)) -> Result<MatchConfig> {
    let mut config = match &args.config {
        Some(path) => {
            MatchConfig::load(path).with_context(|| format!("Loading config from {path:?}"))?
        }
        None => MatchConfig::default(),
    };
    if !args.key_headers.is_empty() {
        config.key_headers = args.key_headers.clone();
    }
    adjust(&mut config);
    config.validate().context("Invalid configuration")?;
    debug!("Effective configuration: {config:?}");
    Ok(config)
}

fn load_lookup(args: &LookupArgs, config: &MatchConfig) -> Result<LookupTable> {
    let options = DatasetOptions {
        delimiter: args.lookup_delimiter,
        encoding: args.lookup_encoding.as_deref(),
    };
    let dataset = dataset::load(&args.lookup, &options)?;
    let table = LookupTable::from_dataset(
        &dataset,
        &config.lookup_key_header,
        &config.lookup_value_header,
    )?;
    Ok(table)
}

fn handle_match(args: &cli::MatchArgs) -> Result<()> {
    let config = load_config(&args.lookup, |config| {
        if let Some(placement) = args.placement {
            config.placement = placement;
        }
        if let Some(color) = &args.highlight_color {
            config.highlight_color = color.clone();
        }
    })?;
    let table = load_lookup(&args.lookup, &config)?;
    info!(
        "Matching '{}' against {} lookup key(s) ({} placement)",
        args.workbook.display(),
        table.len(),
        config.placement.as_str()
    );

    let bytes = io_utils::read_input_bytes(&args.workbook)?;
    let processed = process_workbook(&bytes, &table, &config)?;
    info!(
        "{} of {} sheet(s) received a derived column; {} structural warning(s)",
        processed.report.processed_count(),
        processed.report.sheets.len(),
        processed.report.warnings.len()
    );

    let output = args.output.clone().unwrap_or_else(|| {
        if io_utils::is_dash(&args.workbook) {
            PathBuf::from("-")
        } else {
            io_utils::derive_output_path(&args.workbook, &config.output_suffix)
        }
    });
    if args.dry_run {
        info!("Dry run: not writing {output:?}");
    } else {
        io_utils::write_output_bytes(&output, &processed.bytes)?;
        if !io_utils::is_dash(&output) {
            info!("Wrote {output:?}");
        }
    }

    if args.report {
        let rendered = processed.report.render();
        if io_utils::is_dash(&output) && !args.dry_run {
            eprint!("{rendered}");
        } else {
            print!("{rendered}");
        }
    }
    Ok(())
}

fn handle_resolve(args: &cli::ResolveArgs) -> Result<()> {
    let config = load_config(&args.lookup, |_| {})?;
    let table = load_lookup(&args.lookup, &config)?;

    let mut output = TextTable::new(["value", "token", "key", "result", "flagged"]);
    for value in &args.values {
        let Some(cell) = matcher::match_cell(Some(value.as_str()), &table) else {
            output.push_row([value.as_str(), "", "", "(blank, skipped)", ""]);
            continue;
        };
        let flagged = if cell.has_unresolved() { "yes" } else { "no" };
        if cell.tokens.is_empty() {
            output.push_row([value.as_str(), "", "", "", flagged]);
        }
        for token in &cell.tokens {
            output.push_row([
                value.as_str(),
                token.token.as_str(),
                token.matched_key.as_deref().unwrap_or(""),
                token.value.as_str(),
                flagged,
            ]);
        }
        debug!("'{value}' -> '{}'", cell.annotation());
    }
    output.print();
    Ok(())
}

fn handle_config(args: &cli::ConfigArgs) -> Result<()> {
    let yaml = MatchConfig::default().to_yaml_string()?;
    match &args.output {
        Some(path) if !io_utils::is_dash(path) => {
            fs::write(path, yaml).with_context(|| format!("Writing config to {path:?}"))?;
            info!("Default configuration written to {path:?}");
        }
        _ => print!("{yaml}"),
    }
    Ok(())
}
