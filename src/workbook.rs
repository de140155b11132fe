//! Whole-workbook processing: every sheet in order, then one serialisation.
//!
//! Parts are parsed once up front. Only parts that end up modified are written back;
//! all other parts keep their original bytes.

use log::{debug, info, warn};

use crate::{
    annotator::{Highlighter, annotate_rows},
    config::{DEFAULT_HIGHLIGHT, MatchConfig, Placement},
    error::{AdjustmentTarget, MatchError, MatchResult},
    locator::{HEADER_ROW, locate_key_column},
    lookup::LookupTable,
    mutator::{install_column, target_column},
    report::{RunReport, SheetOutcome, SheetReport, SkipReason},
    rewriter::{self, record},
    xlsx::{
        SheetEntry, Stylesheet, TablePart, WorkbookCatalog, Worksheet, XlsxPackage, XlsxResult,
        XmlDocument, XmlNode,
        catalog::{load_shared_strings, update_filter_database_name},
        formula::ColumnShift,
        reference::col_to_name,
    },
};

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

#[derive(Debug)]
pub struct ProcessedWorkbook {
    pub bytes: Vec<u8>,
    pub report: RunReport,
}

struct SheetState {
    entry: SheetEntry,
    sheet: Worksheet,
    dirty: bool,
}

struct WorkbookSession {
    package: XlsxPackage,
    catalog: WorkbookCatalog,
    shared_strings: Vec<String>,
    styles: Option<Stylesheet>,
    workbook: XmlDocument,
    workbook_dirty: bool,
    sheets: Vec<SheetState>,
    shifted: bool,
    report: RunReport,
}

/// Adds the derived column to every sheet with a recognised key header and returns the
/// new package bytes with a per-sheet report.
pub fn process_workbook(
    bytes: &[u8],
    table: &LookupTable,
    config: &MatchConfig,
) -> MatchResult<ProcessedWorkbook> {
    let mut session = WorkbookSession::load(bytes).map_err(MatchError::DocumentLoad)?;
    let labels = config.normalized_key_headers();
    let argb = config.highlight_argb().unwrap_or_else(|err| {
        warn!("{err}; using {DEFAULT_HIGHLIGHT}");
        DEFAULT_HIGHLIGHT.to_string()
    });
    if session.styles.is_none() {
        record(
            &mut session.report.warnings,
            "",
            AdjustmentTarget::Styles,
            "workbook has no stylesheet; unresolved rows are not highlighted",
        );
    }

    for idx in 0..session.sheets.len() {
        session.process_sheet(idx, table, config, &labels, &argb);
    }
    session.finish()
}

impl WorkbookSession {
    fn load(bytes: &[u8]) -> XlsxResult<Self> {
        let package = XlsxPackage::from_bytes(bytes)?;
        let catalog = WorkbookCatalog::load(&package)?;
        let shared_strings = load_shared_strings(&package, catalog.shared_strings_part.as_deref())?;
        let styles = match &catalog.styles_part {
            Some(part) => Some(Stylesheet::parse(part, &package.read_text(part)?)?),
            None => None,
        };
        let workbook = package.read_xml(&catalog.workbook_part)?;
        let sheets = catalog
            .sheets
            .iter()
            .map(|entry| {
                let xml = package.read_text(&entry.part)?;
                Ok(SheetState {
                    sheet: Worksheet::parse(&entry.name, &entry.part, &xml)?,
                    entry: entry.clone(),
                    dirty: false,
                })
            })
            .collect::<XlsxResult<Vec<_>>>()?;
        debug!(
            "Workbook has {} worksheet(s), {} shared string(s)",
            sheets.len(),
            shared_strings.len()
        );
        Ok(Self {
            package,
            catalog,
            shared_strings,
            styles,
            workbook,
            workbook_dirty: false,
            sheets,
            shifted: false,
            report: RunReport::default(),
        })
    }

    fn skip(&mut self, sheet: String, reason: SkipReason) {
        info!("Sheet '{sheet}': skipped, {}", reason.describe());
        self.report.sheets.push(SheetReport {
            sheet,
            outcome: SheetOutcome::Skipped(reason),
        });
    }

    fn process_sheet(
        &mut self,
        idx: usize,
        table: &LookupTable,
        config: &MatchConfig,
        labels: &[String],
        argb: &str,
    ) {
        let name = self.sheets[idx].entry.name.clone();
        let Some(key) = locate_key_column(&self.sheets[idx].sheet, &self.shared_strings, labels)
        else {
            self.skip(name, SkipReason::NoKeyHeader);
            return;
        };
        let occupied_to = self.table_extent(idx);
        let Some(col) = target_column(&self.sheets[idx].sheet, &key, config.placement, occupied_to)
        else {
            self.skip(name, SkipReason::NoRoomForColumn);
            return;
        };

        let mut header = config.derived_header.clone();
        let mut reserved_rows = Vec::new();
        let shift = (config.placement == Placement::InsertAdjacent).then_some(ColumnShift {
            target_sheet: &name,
            at: col,
            delta: 1,
        });
        if let Some(shift) = &shift {
            let (table_header, table_header_rows) =
                self.shift_for_insertion(idx, key.col, shift, config);
            if let Some(table_header) = table_header {
                header = table_header;
            }
            reserved_rows = table_header_rows;
        }

        let state = &mut self.sheets[idx];
        let derived = install_column(
            &mut state.sheet,
            &key,
            col,
            &header,
            config.default_column_width,
        );
        let mut highlighter = self.styles.as_mut().map(|styles| Highlighter { styles, argb });
        let summary = annotate_rows(
            &mut state.sheet,
            &self.shared_strings,
            &derived,
            &reserved_rows,
            table,
            highlighter.as_mut(),
            &mut self.report.warnings,
        );

        if let Some(range) =
            rewriter::widen_auto_filter(&mut state.sheet, shift.as_ref(), &mut self.report.warnings)
            && update_filter_database_name(&mut self.workbook, state.entry.position, &range)
        {
            debug!("Sheet '{name}': filter database name now covers {range}");
            self.workbook_dirty = true;
        }
        state.sheet.refresh_dimension();
        state.dirty = true;

        info!(
            "Sheet '{name}': key '{}' in column {}, '{header}' written to {} row(s), {} highlighted",
            key.header, key.col, summary.rows_written, summary.rows_highlighted
        );
        self.report.sheets.push(SheetReport {
            sheet: name,
            outcome: SheetOutcome::Processed {
                key_header: key.header,
                key_col: key.col,
                derived_col: col,
                placement: config.placement,
                rows_written: summary.rows_written,
                rows_highlighted: summary.rows_highlighted,
            },
        });
    }

    /// Last column covered by any table part of sheet `idx`; 0 when there are none.
    fn table_extent(&self, idx: usize) -> u32 {
        let sheet = &self.sheets[idx].sheet;
        match load_tables(&self.package, sheet) {
            Ok(tables) => tables
                .iter()
                .filter_map(|(table, _)| table.range().ok())
                .map(|range| range.end.col)
                .max()
                .unwrap_or(0),
            Err(err) => {
                debug!("Sheet '{}': table extents unavailable: {err}", sheet.name);
                0
            }
        }
    }

    /// Runs the structural shift for an insertion on sheet `idx`. Returns the table-assigned
    /// header name when a table spanning row 1 took the new column, and the rows below row 1
    /// whose new cell now holds a table column name.
    fn shift_for_insertion(
        &mut self,
        idx: usize,
        key_col: u32,
        shift: &ColumnShift<'_>,
        config: &MatchConfig,
    ) -> (Option<String>, Vec<u32>) {
        let warnings = &mut self.report.warnings;
        rewriter::shift_sheet(&mut self.sheets[idx].sheet, shift, warnings);
        for (other_idx, other) in self.sheets.iter_mut().enumerate() {
            if other_idx != idx && rewriter::shift_formula_texts(&mut other.sheet, shift) > 0 {
                debug!("Sheet '{}': references to '{}' shifted", other.entry.name, shift.target_sheet);
                other.dirty = true;
            }
        }
        if rewriter::shift_defined_names(&mut self.workbook, shift) > 0 {
            self.workbook_dirty = true;
        }
        self.shifted = true;

        let mut tables = match load_tables(&self.package, &self.sheets[idx].sheet) {
            Ok(tables) => tables,
            Err(err) => {
                record(warnings, shift.target_sheet, AdjustmentTarget::Table, err);
                Vec::new()
            }
        };
        let mut parts: Vec<TablePart> = tables.iter().map(|(part, _)| part.clone()).collect();
        let header_cells = rewriter::shift_tables(
            &mut parts,
            shift.target_sheet,
            key_col,
            HEADER_ROW,
            shift,
            &config.derived_header,
            warnings,
        );
        for (part, (_, original)) in parts.iter().zip(tables.drain(..)) {
            let xml = part.document().to_xml_string();
            if xml != original {
                self.package.set_part(&part.part, xml.into_bytes());
            }
        }

        let sheet = &mut self.sheets[idx].sheet;
        let mut row_one_header = None;
        let mut header_rows = Vec::new();
        for cell in header_cells {
            debug!(
                "Table '{}': header cell {}{} is '{}'",
                cell.table,
                col_to_name(shift.at),
                cell.row,
                cell.name
            );
            if cell.row == HEADER_ROW {
                row_one_header = Some(cell.name);
                continue;
            }
            let style = sheet.effective_style(shift.at - 1, cell.row);
            sheet.set_inline_string(shift.at, cell.row, &cell.name);
            sheet.set_cell_style(shift.at, cell.row, style);
            header_rows.push(cell.row);
        }
        (row_one_header, header_rows)
    }

    fn finish(mut self) -> MatchResult<ProcessedWorkbook> {
        if self.shifted {
            self.drop_calc_chain().map_err(MatchError::Serialize)?;
        }
        for state in self.sheets.iter().filter(|s| s.dirty) {
            self.package
                .set_part(&state.entry.part, state.sheet.to_xml_string().into_bytes());
        }
        if let Some(styles) = self.styles.as_ref().filter(|s| s.is_dirty()) {
            self.package.write_xml(&styles.part, styles.document());
        }
        if self.workbook_dirty {
            self.package
                .write_xml(&self.catalog.workbook_part, &self.workbook);
        }
        let bytes = self.package.to_bytes().map_err(MatchError::Serialize)?;
        Ok(ProcessedWorkbook {
            bytes,
            report: self.report,
        })
    }

    /// The calculation chain lists formula cells by position; after an insertion it is
    /// stale, so it is removed and rebuilt by the spreadsheet application on next load.
    fn drop_calc_chain(&mut self) -> XlsxResult<()> {
        let workbook_part = self.catalog.workbook_part.clone();
        let Some(rel) = self
            .package
            .relationships(&workbook_part)?
            .into_iter()
            .find(|rel| rel.is_type("calcChain"))
        else {
            return Ok(());
        };

        let rels_part = crate::xlsx::package::rels_part_name(&workbook_part);
        let mut rels = self.package.read_xml(&rels_part)?;
        rels.root.children.retain(|node| {
            !matches!(node, XmlNode::Element(el) if el.attr("Id").as_deref() == Some(rel.id.as_str()))
        });
        self.package.write_xml(&rels_part, &rels);

        if self.package.has_part(CONTENT_TYPES_PART) {
            let mut types = self.package.read_xml(CONTENT_TYPES_PART)?;
            let part_name = format!("/{}", rel.target);
            types.root.children.retain(|node| {
                !matches!(node, XmlNode::Element(el)
                    if el.local_name() == "Override"
                        && el.attr("PartName").is_some_and(|p| p.eq_ignore_ascii_case(&part_name)))
            });
            self.package.write_xml(CONTENT_TYPES_PART, &types);
        }
        self.package.remove_part(&rel.target);
        debug!("Removed stale calculation chain '{}'", rel.target);
        Ok(())
    }
}

/// Table parts attached to `sheet`, each with its original XML text.
fn load_tables(package: &XlsxPackage, sheet: &Worksheet) -> XlsxResult<Vec<(TablePart, String)>> {
    let ids = sheet.table_part_ids();
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rels = package.relationships(&sheet.part)?;
    ids.iter()
        .filter_map(|id| rels.iter().find(|rel| rel.id == *id && !rel.external))
        .map(|rel| {
            let xml = package.read_text(&rel.target)?;
            Ok((TablePart::parse(&rel.target, &xml)?, xml))
        })
        .collect()
}
