use crate::xlsx::Worksheet;

pub const HEADER_ROW: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    pub col: u32,
    pub header: String,
}

/// First header cell, left to right, whose trimmed lowercase text equals one of `labels`.
///
/// `labels` are expected already trimmed and lowercased. Matching is whole-header only,
/// so `fn sku` never matches `sku`.
pub fn locate_key_column(
    sheet: &Worksheet,
    shared_strings: &[String],
    labels: &[String],
) -> Option<KeyColumn> {
    let header_row = sheet.row(HEADER_ROW)?;
    header_row.cells().find_map(|(col, _)| {
        let text = sheet.cell_text(col, HEADER_ROW, shared_strings)?;
        let normalized = text.trim().to_lowercase();
        labels.iter().any(|l| *l == normalized).then(|| KeyColumn {
            col,
            header: text.trim().to_string(),
        })
    })
}

/// Last row at or below `max_row` whose key cell holds non-blank text; `None` when the
/// column has no data below the header.
pub fn last_data_row(sheet: &Worksheet, col: u32, shared_strings: &[String]) -> Option<u32> {
    (HEADER_ROW + 1..=sheet.max_row()).rev().find(|row| {
        sheet
            .cell_text(col, *row, shared_strings)
            .is_some_and(|text| !text.trim().is_empty())
    })
}
