use log::debug;

use crate::{
    config::Placement,
    locator::{HEADER_ROW, KeyColumn},
    xlsx::{MAX_COLUMN, Worksheet},
};

/// The column added to a sheet and the styles its cells inherit from the key column.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedColumn {
    pub key_col: u32,
    pub col: u32,
    pub header: String,
    pub header_style: Option<u32>,
    pub body_style: Option<u32>,
    pub width: f64,
}

/// Column index the derived column will occupy, or `None` when the sheet has no room.
///
/// The sheet's extent counts cells, merged ranges and `occupied_to` (the last column of
/// any table part), so an appended column never lands inside a merge or a table.
pub fn target_column(
    sheet: &Worksheet,
    key: &KeyColumn,
    placement: Placement,
    occupied_to: u32,
) -> Option<u32> {
    let last = sheet
        .max_column()
        .max(sheet.merged_max_column())
        .max(occupied_to);
    if last >= MAX_COLUMN {
        return None;
    }
    Some(match placement {
        Placement::AppendLast => last + 1,
        Placement::InsertAdjacent => key.col + 1,
    })
}

/// Writes the header and sizes the column at `col`. Any shifting for an insertion must
/// already have happened.
///
/// The header copies the key header cell's format; body cells later copy the format of the
/// key column's first data cell. The width follows the key column, else `default_width`.
pub fn install_column(
    sheet: &mut Worksheet,
    key: &KeyColumn,
    col: u32,
    header: &str,
    default_width: f64,
) -> DerivedColumn {
    let header_style = sheet.cell_style(key.col, HEADER_ROW);
    let body_style = sheet.cell_style(key.col, HEADER_ROW + 1);
    let width = sheet.column_width(key.col).unwrap_or(default_width);

    sheet.set_inline_string(col, HEADER_ROW, header);
    if let Some(style) = header_style {
        sheet.set_cell_style(col, HEADER_ROW, style);
    }
    sheet.set_column_width(col, width);
    debug!(
        "Sheet '{}': derived column {} (width {width}, header style {:?}, body style {:?})",
        sheet.name,
        crate::xlsx::reference::col_to_name(col),
        header_style,
        body_style
    );

    DerivedColumn {
        key_col: key.col,
        col,
        header: header.to_string(),
        header_style,
        body_style,
        width,
    }
}
