use crate::{
    config::Placement,
    error::StructuralAdjustmentWarning,
    table::TextTable,
    xlsx::reference::col_to_name,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoKeyHeader,
    NoRoomForColumn,
}

impl SkipReason {
    pub fn describe(&self) -> &'static str {
        match self {
            SkipReason::NoKeyHeader => "no recognised key header",
            SkipReason::NoRoomForColumn => "sheet already uses the last column",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetOutcome {
    Processed {
        key_header: String,
        key_col: u32,
        derived_col: u32,
        placement: Placement,
        rows_written: usize,
        rows_highlighted: usize,
    },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetReport {
    pub sheet: String,
    pub outcome: SheetOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub sheets: Vec<SheetReport>,
    pub warnings: Vec<StructuralAdjustmentWarning>,
}

impl RunReport {
    pub fn processed_count(&self) -> usize {
        self.sheets
            .iter()
            .filter(|s| matches!(s.outcome, SheetOutcome::Processed { .. }))
            .count()
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetReport> {
        self.sheets.iter().find(|s| s.sheet == name)
    }

    /// One line per sheet, then one per warning.
    pub fn render(&self) -> String {
        let mut sheets = TextTable::new(["sheet", "status", "key", "items", "written", "flagged"]);
        for report in &self.sheets {
            match &report.outcome {
                SheetOutcome::Processed {
                    key_header,
                    key_col,
                    derived_col,
                    placement,
                    rows_written,
                    rows_highlighted,
                } => sheets.push_row([
                    report.sheet.clone(),
                    format!("processed ({})", placement.as_str()),
                    format!("{key_header} ({})", col_to_name(*key_col)),
                    col_to_name(*derived_col),
                    rows_written.to_string(),
                    rows_highlighted.to_string(),
                ]),
                SheetOutcome::Skipped(reason) => sheets.push_row([
                    report.sheet.clone(),
                    format!("skipped: {}", reason.describe()),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                ]),
            }
        }
        let mut out = sheets.render();
        if !self.warnings.is_empty() {
            let mut warnings = TextTable::new(["sheet", "record", "warning"]);
            for warning in &self.warnings {
                warnings.push_row([
                    warning.sheet.clone(),
                    warning.target.label().to_string(),
                    warning.message.clone(),
                ]);
            }
            out.push('\n');
            out.push_str(&warnings.render());
        }
        out
    }
}
