use thiserror::Error;

use crate::xlsx::XlsxError;

/// Failures that abort a run. Per-item structural problems are not errors; they are
/// collected as [`StructuralAdjustmentWarning`]s instead.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("lookup table needs at least two columns, found {columns}")]
    Mapping { columns: usize },
    #[error("could not load workbook: {0}")]
    DocumentLoad(#[source] XlsxError),
    #[error("could not read lookup data: {0}")]
    Lookup(String),
    #[error("could not write workbook: {0}")]
    Serialize(#[source] XlsxError),
}

pub type MatchResult<T> = std::result::Result<T, MatchError>;

/// Which kind of record a structural adjustment touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentTarget {
    AutoFilter,
    Table,
    Formula,
    MergedCells,
    ConditionalFormatting,
    DataValidation,
    Hyperlink,
    ProtectedRange,
    IgnoredError,
    Styles,
}

impl AdjustmentTarget {
    pub fn label(self) -> &'static str {
        match self {
            AdjustmentTarget::AutoFilter => "auto-filter",
            AdjustmentTarget::Table => "table",
            AdjustmentTarget::Formula => "formula",
            AdjustmentTarget::MergedCells => "merged cells",
            AdjustmentTarget::ConditionalFormatting => "conditional formatting",
            AdjustmentTarget::DataValidation => "data validation",
            AdjustmentTarget::Hyperlink => "hyperlink",
            AdjustmentTarget::ProtectedRange => "protected range",
            AdjustmentTarget::IgnoredError => "ignored-error range",
            AdjustmentTarget::Styles => "styles",
        }
    }
}

/// A structural record that could not be adjusted and was left as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralAdjustmentWarning {
    pub sheet: String,
    pub target: AdjustmentTarget,
    pub message: String,
}
