//! Loading the secondary (lookup) dataset as plain header + row text.

use std::path::Path;

use anyhow::{Context, Result};
use log::debug;

use crate::{
    error::{MatchError, MatchResult},
    io_utils,
    xlsx::{WorkbookCatalog, Worksheet, XlsxPackage, catalog::load_shared_strings},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatasetOptions<'a> {
    pub delimiter: Option<u8>,
    pub encoding: Option<&'a str>,
}

/// Reads `path` as a workbook (`.xlsx`/`.xlsm`, first worksheet) or as delimited text.
pub fn load(path: &Path, options: &DatasetOptions<'_>) -> MatchResult<Dataset> {
    let result = if io_utils::is_workbook_path(path) {
        io_utils::read_input_bytes(path).and_then(|bytes| from_workbook_bytes(&bytes))
    } else {
        from_delimited(path, options)
    };
    let dataset = result.map_err(|err| MatchError::Lookup(format!("{}: {err:#}", path.display())))?;
    debug!(
        "Lookup dataset {:?}: {} column(s), {} row(s)",
        path,
        dataset.column_count(),
        dataset.rows.len()
    );
    Ok(dataset)
}

fn from_delimited(path: &Path, options: &DatasetOptions<'_>) -> Result<Dataset> {
    let encoding = io_utils::resolve_encoding(options.encoding)?;
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    let mut rows = Vec::new();
    let mut record = csv::ByteRecord::new();
    while reader
        .read_byte_record(&mut record)
        .with_context(|| format!("Reading row {}", rows.len() + 2))?
    {
        rows.push(io_utils::decode_record(&record, encoding)?);
    }
    Ok(Dataset::new(headers, rows))
}

/// First worksheet of a workbook; row 1 holds the headers.
pub fn from_workbook_bytes(bytes: &[u8]) -> Result<Dataset> {
    let package = XlsxPackage::from_bytes(bytes).context("Opening lookup workbook")?;
    let catalog = WorkbookCatalog::load(&package)?;
    let Some(entry) = catalog.sheets.first() else {
        return Ok(Dataset::default());
    };
    let shared = load_shared_strings(&package, catalog.shared_strings_part.as_deref())?;
    let xml = package.read_text(&entry.part)?;
    let sheet = Worksheet::parse(&entry.name, &entry.part, &xml)?;

    let width = sheet.max_column();
    let text_row = |row: u32| -> Vec<String> {
        (1..=width)
            .map(|col| sheet.cell_text(col, row, &shared).unwrap_or_default())
            .collect()
    };
    let headers = text_row(1);
    let rows = (2..=sheet.max_row()).map(text_row).collect();
    Ok(Dataset::new(headers, rows))
}
