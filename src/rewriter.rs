//! Keeps positional records consistent after a column insertion.
//!
//! Every adjustment is computed before it is written. An item that cannot be
//! adjusted is left as it was and reported as a [`StructuralAdjustmentWarning`];
//! nothing here aborts a run.

use std::fmt::Display;

use log::{debug, warn};

use crate::{
    error::{AdjustmentTarget, StructuralAdjustmentWarning},
    xlsx::{
        RangeRef, TablePart, Worksheet, XmlDocument, XmlElement,
        formula::ColumnShift,
        reference::{shift_column, shift_sqref},
    },
};

/// Sheet-level records that carry a range list, as (container, element, attribute).
const RANGE_RECORDS: &[(Option<&str>, &str, &str, AdjustmentTarget)] = &[
    (Some("mergeCells"), "mergeCell", "ref", AdjustmentTarget::MergedCells),
    (None, "conditionalFormatting", "sqref", AdjustmentTarget::ConditionalFormatting),
    (Some("dataValidations"), "dataValidation", "sqref", AdjustmentTarget::DataValidation),
    (Some("hyperlinks"), "hyperlink", "ref", AdjustmentTarget::Hyperlink),
    (Some("protectedRanges"), "protectedRange", "sqref", AdjustmentTarget::ProtectedRange),
    (Some("ignoredErrors"), "ignoredError", "sqref", AdjustmentTarget::IgnoredError),
];

/// Formula-bearing children of the range records above.
const RECORD_FORMULAS: &[&str] = &["formula", "formula1", "formula2"];

/// Header cell that a table column insertion needs filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHeaderCell {
    pub table: String,
    pub row: u32,
    pub name: String,
}

pub(crate) fn record(
    warnings: &mut Vec<StructuralAdjustmentWarning>,
    sheet: &str,
    target: AdjustmentTarget,
    message: impl Display,
) {
    warn!("Sheet '{sheet}': left {} unchanged: {message}", target.label());
    warnings.push(StructuralAdjustmentWarning {
        sheet: sheet.to_string(),
        target,
        message: message.to_string(),
    });
}

/// Shifts everything on the target sheet at or right of the insertion column: cells, row
/// spans, `<cols>`, range records, and the references inside its formulas.
pub fn shift_sheet(
    sheet: &mut Worksheet,
    shift: &ColumnShift<'_>,
    warnings: &mut Vec<StructuralAdjustmentWarning>,
) {
    let sheet_name = sheet.name.clone();
    sheet.shift_cells(shift.at, shift.delta);
    sheet.shift_column_spans(shift.at, shift.delta);

    let root = sheet.root_mut();
    for (container, element, attr, target) in RANGE_RECORDS {
        for_each_record(root, *container, element, &mut |el| {
            if let Err(err) = shift_range_attr(el, attr, shift) {
                record(warnings, &sheet_name, *target, err);
            }
        });
    }

    for formula in sheet.formulas_mut() {
        if let Some(reference) = formula.attr("ref").map(|r| r.into_owned()) {
            match shift_sqref(&reference, shift.at, shift.delta) {
                Ok(shifted) => formula.set_attr("ref", &shifted),
                Err(err) => record(warnings, &sheet_name, AdjustmentTarget::Formula, err),
            }
        }
    }
    let rewritten = shift_formula_texts(sheet, shift);
    debug!("Sheet '{sheet_name}': shifted references in {rewritten} formula(s)");
}

/// Rewrites references that point at the shifted sheet from formulas on `sheet`.
///
/// Returns the number of formulas changed; for sheets other than the target only
/// sheet-qualified references can change.
pub fn shift_formula_texts(sheet: &mut Worksheet, shift: &ColumnShift<'_>) -> usize {
    let host = sheet.name.clone();
    let mut changed = 0;
    for formula in sheet.formulas_mut() {
        changed += usize::from(rewrite_text(formula, shift, &host));
    }
    let root = sheet.root_mut();
    for (container, element, _, _) in RANGE_RECORDS {
        for_each_record(root, *container, element, &mut |el| {
            el.walk_mut(&mut |child| {
                if RECORD_FORMULAS.contains(&child.local_name()) {
                    changed += usize::from(rewrite_text(child, shift, &host));
                }
            });
        });
    }
    changed
}

/// Shifts sheet-qualified references in workbook-level defined names (print areas,
/// named ranges, filter databases). Returns the number of names changed.
pub fn shift_defined_names(workbook: &mut XmlDocument, shift: &ColumnShift<'_>) -> usize {
    let Some(names) = workbook.root.child_mut("definedNames") else {
        return 0;
    };
    names
        .children_named_mut("definedName")
        .map(|name| usize::from(rewrite_text(name, shift, "")))
        .sum()
}

/// Adjusts the sheet's table parts for an insertion right of `key_col`.
///
/// A table whose range starts at `header_row` and contains the key column gains a column
/// named `column_name` (made unique within the table). So does any table the insertion
/// would otherwise split. Tables wholly right of the insertion move; tables left of it
/// are untouched.
pub fn shift_tables(
    tables: &mut [TablePart],
    sheet_name: &str,
    key_col: u32,
    header_row: u32,
    shift: &ColumnShift<'_>,
    column_name: &str,
    warnings: &mut Vec<StructuralAdjustmentWarning>,
) -> Vec<TableHeaderCell> {
    let at = shift.at;
    let delta = shift.delta;
    let mut headers = Vec::new();
    for table in tables.iter_mut() {
        let label = table.display_name();
        let range = match table.range() {
            Ok(range) => range,
            Err(err) => {
                record(warnings, sheet_name, AdjustmentTarget::Table, format!("{label}: {err}"));
                continue;
            }
        };
        let splits = range.start.col < at && at <= range.end.col;
        let extends_edge = range.end.col == key_col && range.start.row == header_row;

        if range.start.col >= at {
            if let Err(err) = table.transform_ranges(|r| r.shift_columns(at, delta)) {
                record(warnings, sheet_name, AdjustmentTarget::Table, format!("{label}: {err}"));
            }
            continue;
        }
        if !splits && !extends_edge {
            continue;
        }

        let table_end = range.end.col;
        let grow = |r: RangeRef| {
            if r.end.col == table_end && at == table_end + 1 {
                r.with_end_col(r.end.col + delta)
            } else {
                r.shift_columns(at, delta)
            }
        };
        let index = (at - range.start.col) as usize;
        // Clone so a failure halfway leaves the original table intact.
        let mut updated = table.clone();
        let outcome = updated
            .transform_ranges(grow)
            .and_then(|()| updated.insert_column(index, column_name));
        match outcome {
            Ok((id, name)) => {
                debug!("Table '{label}': added column '{name}' (id {id}) at position {index}");
                if updated.has_header_row() {
                    headers.push(TableHeaderCell {
                        table: label,
                        row: range.start.row,
                        name,
                    });
                }
                *table = updated;
            }
            Err(err) => {
                record(warnings, sheet_name, AdjustmentTarget::Table, format!("{label}: {err}"))
            }
        }
    }
    headers
}

/// Widens the sheet auto-filter so it ends at the sheet's current last column.
///
/// With an insertion, a filter starting at or right of the insertion moves with it and
/// filter column ids behind the insertion point are renumbered.
pub fn widen_auto_filter(
    sheet: &mut Worksheet,
    insertion: Option<&ColumnShift<'_>>,
    warnings: &mut Vec<StructuralAdjustmentWarning>,
) -> Option<RangeRef> {
    let current = sheet.auto_filter()?;
    let sheet_name = sheet.name.clone();
    let range = match RangeRef::parse(&current) {
        Ok(range) => range,
        Err(err) => {
            record(warnings, &sheet_name, AdjustmentTarget::AutoFilter, err);
            return None;
        }
    };
    let mut start = range.start;
    let mut end_col = range.end.col;
    if let Some(shift) = insertion {
        start.col = shift_column(start.col, shift.at, shift.delta);
        end_col = shift_column(end_col, shift.at, shift.delta);
    }
    let end_col = sheet.max_column().max(end_col).max(start.col);
    let widened = RangeRef { start, end: range.end }.with_end_col(end_col);

    if let Some(shift) = insertion
        && range.start.col < shift.at
        && let Some(filter) = sheet.root_mut().child_mut("autoFilter")
    {
        let first_moved = (shift.at - range.start.col) as usize;
        for column in filter.children_named_mut("filterColumn") {
            if let Some(id) = column.attr("colId").and_then(|c| c.parse::<usize>().ok())
                && id >= first_moved
            {
                column.set_attr("colId", &(id + shift.delta as usize).to_string());
            }
        }
        if let Some(sort) = filter.child_mut("sortState")
            && let Err(err) = shift_range_attr(sort, "ref", shift)
        {
            record(warnings, &sheet_name, AdjustmentTarget::AutoFilter, err);
        }
    }

    sheet.set_auto_filter(&widened);
    debug!("Sheet '{sheet_name}': auto-filter {current} -> {widened}");
    Some(widened)
}

fn for_each_record(
    root: &mut XmlElement,
    container: Option<&str>,
    element: &str,
    visit: &mut dyn FnMut(&mut XmlElement),
) {
    let parent = match container {
        Some(name) => match root.child_mut(name) {
            Some(parent) => parent,
            None => return,
        },
        None => root,
    };
    for el in parent.children_named_mut(element) {
        visit(el);
    }
}

fn shift_range_attr(
    el: &mut XmlElement,
    attr: &str,
    shift: &ColumnShift<'_>,
) -> crate::xlsx::XlsxResult<()> {
    let Some(current) = el.attr(attr).map(|v| v.into_owned()) else {
        return Ok(());
    };
    let shifted = shift_sqref(&current, shift.at, shift.delta)?;
    if shifted != current {
        el.set_attr(attr, &shifted);
    }
    Ok(())
}

fn rewrite_text(el: &mut XmlElement, shift: &ColumnShift<'_>, host: &str) -> bool {
    let text = el.text();
    if text.is_empty() {
        return false;
    }
    let shifted = shift.apply(&text, host);
    if shifted == text {
        return false;
    }
    el.set_text(&shifted);
    true
}
