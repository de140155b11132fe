//! In-memory model of an Office Open XML spreadsheet package.
//!
//! The package is loaded whole, parts are parsed lazily into lossless XML
//! trees, and only parts that were actually mutated are re-serialised on save.
//! Every other part is written back with its original bytes.
//!
//! - [`package`]: zip container, part lookup, relationship resolution
//! - [`xml`]: lossless element tree over `quick-xml` events
//! - [`reference`]: A1 cell/range/column helpers
//! - [`worksheet`]: rows, cells, column spans and sheet-level metadata
//! - [`styles`]: `cellXfs` / `fills` surgery for derived cell formats
//! - [`tables`]: table parts (`xl/tables/tableN.xml`)
//! - [`formula`]: fixed-offset column shifting inside formula text
//! - [`catalog`]: workbook sheet order and defined names

pub mod catalog;
pub mod formula;
pub mod package;
pub mod reference;
pub mod styles;
pub mod tables;
pub mod worksheet;
pub mod xml;

use thiserror::Error;

pub use catalog::{SheetEntry, WorkbookCatalog};
pub use package::XlsxPackage;
pub use reference::{CellRef, ColumnSpan, RangeRef};
pub use styles::Stylesheet;
pub use tables::TablePart;
pub use worksheet::Worksheet;
pub use xml::{XmlDocument, XmlElement, XmlNode};

/// Highest column index a worksheet may address (`XFD`).
pub const MAX_COLUMN: u32 = 16_384;
/// Highest row index a worksheet may address.
pub const MAX_ROW: u32 = 1_048_576;

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("XML attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("XML escape error: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),
    #[error("part '{0}' is not valid UTF-8")]
    Utf8(String),
    #[error("missing part '{0}'")]
    MissingPart(String),
    #[error("part '{part}' exceeds the {limit} byte inflation limit")]
    PartTooLarge { part: String, limit: u64 },
    #[error("invalid reference '{0}'")]
    InvalidReference(String),
    #[error("malformed {part}: {message}")]
    Malformed { part: String, message: String },
}

impl XlsxError {
    pub(crate) fn malformed(part: &str, message: impl Into<String>) -> Self {
        XlsxError::Malformed {
            part: part.to_string(),
            message: message.into(),
        }
    }
}

pub type XlsxResult<T> = std::result::Result<T, XlsxError>;
