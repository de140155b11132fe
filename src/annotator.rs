use log::debug;

use crate::{
    error::{AdjustmentTarget, StructuralAdjustmentWarning},
    locator::{HEADER_ROW, last_data_row},
    lookup::LookupTable,
    matcher::match_cell,
    mutator::DerivedColumn,
    rewriter::record,
    xlsx::{Stylesheet, Worksheet},
};

/// Fill applied to whole rows that contain an unresolved token.
pub struct Highlighter<'a> {
    pub styles: &'a mut Stylesheet,
    pub argb: &'a str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    pub last_row: Option<u32>,
    pub rows_written: usize,
    pub rows_highlighted: usize,
}

/// Fills the derived column for every data row down to the key column's last non-blank
/// row. Blank key cells leave their row untouched, and so do `reserved_rows` (table header
/// rows whose derived cell already holds the table column name).
pub fn annotate_rows(
    sheet: &mut Worksheet,
    shared_strings: &[String],
    derived: &DerivedColumn,
    reserved_rows: &[u32],
    table: &LookupTable,
    mut highlighter: Option<&mut Highlighter<'_>>,
    warnings: &mut Vec<StructuralAdjustmentWarning>,
) -> AnnotationSummary {
    let mut summary = AnnotationSummary {
        last_row: last_data_row(sheet, derived.key_col, shared_strings),
        ..AnnotationSummary::default()
    };
    let Some(last_row) = summary.last_row else {
        debug!("Sheet '{}': key column has no data rows", sheet.name);
        return summary;
    };

    // The derived column is already installed, so this is the final width of every row.
    let last_col = sheet.max_column();

    for row in HEADER_ROW + 1..=last_row {
        if reserved_rows.contains(&row) {
            continue;
        }
        let raw = sheet.cell_text(derived.key_col, row, shared_strings);
        let Some(matched) = match_cell(raw.as_deref(), table) else {
            continue;
        };
        sheet.set_inline_string(derived.col, row, &matched.annotation());
        if let Some(style) = derived.body_style {
            sheet.set_cell_style(derived.col, row, style);
        }
        summary.rows_written += 1;

        if !matched.has_unresolved() {
            continue;
        }
        let Some(active) = highlighter.as_deref_mut() else {
            continue;
        };
        match highlight_row(sheet, row, last_col, active) {
            Ok(()) => summary.rows_highlighted += 1,
            Err(err) => {
                record(
                    warnings,
                    &sheet.name,
                    AdjustmentTarget::Styles,
                    format!("{err}; no further rows are highlighted"),
                );
                highlighter = None;
            }
        }
    }
    summary
}

/// Gives every cell in columns `1..=last_col` of `row` a copy of its format with a solid
/// fill. Missing cells are created so the fill shows.
fn highlight_row(
    sheet: &mut Worksheet,
    row: u32,
    last_col: u32,
    highlighter: &mut Highlighter<'_>,
) -> crate::xlsx::XlsxResult<()> {
    let mut planned = Vec::with_capacity(last_col as usize);
    for col in 1..=last_col {
        let base = sheet.effective_style(col, row);
        planned.push((col, highlighter.styles.with_solid_fill(base, highlighter.argb)?));
    }
    for (col, style) in planned {
        sheet.set_cell_style(col, row, style);
    }
    Ok(())
}
