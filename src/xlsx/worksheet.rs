//! Worksheet part model.
//!
//! `sheetData` is lifted out of the XML tree into an ordered row/cell map so
//! cells can be addressed by coordinate; every other sheet-level record
//! (`cols`, `autoFilter`, `mergeCells`, `tableParts`, ...) stays in the tree
//! and is reached through [`Worksheet::root`] / [`Worksheet::root_mut`].

use std::collections::BTreeMap;

use super::{
    XlsxError, XlsxResult,
    reference::{CellRef, ColumnSpan, RangeRef, shift_column},
    xml::{XmlDocument, XmlElement, XmlNode},
};

#[derive(Debug, Clone)]
pub struct Row {
    element: XmlElement,
    cells: BTreeMap<u32, XmlElement>,
    extras: Vec<XmlElement>,
}

impl Row {
    fn new(name: String, row: u32) -> Self {
        Self {
            element: XmlElement::new(name).with_attr("r", &row.to_string()),
            cells: BTreeMap::new(),
            extras: Vec::new(),
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = (u32, &XmlElement)> {
        self.cells.iter().map(|(col, cell)| (*col, cell))
    }

    /// Row-level default style, honoured only when `customFormat` is set.
    pub fn style(&self) -> Option<u32> {
        let custom = self
            .element
            .attr("customFormat")
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
        if !custom {
            return None;
        }
        self.element.attr("s").and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone)]
pub struct Worksheet {
    pub name: String,
    pub part: String,
    doc: XmlDocument,
    rows: BTreeMap<u32, Row>,
}

impl Worksheet {
    pub fn parse(name: &str, part: &str, xml: &str) -> XlsxResult<Self> {
        let mut doc = XmlDocument::parse(part, xml)?;
        let sheet_data = doc
            .root
            .child_mut("sheetData")
            .ok_or_else(|| XlsxError::malformed(part, "worksheet has no <sheetData>"))?;
        let nodes = std::mem::take(&mut sheet_data.children);

        let mut rows = BTreeMap::new();
        let mut next_row = 1u32;
        for node in nodes {
            let XmlNode::Element(mut row_el) = node else {
                continue;
            };
            if row_el.local_name() != "row" {
                continue;
            }
            let row_num = row_el
                .attr("r")
                .and_then(|r| r.trim().parse::<u32>().ok())
                .unwrap_or(next_row);
            next_row = row_num + 1;

            let mut cells = BTreeMap::new();
            let mut extras = Vec::new();
            let mut next_col = 1u32;
            for child in std::mem::take(&mut row_el.children) {
                let XmlNode::Element(child) = child else {
                    continue;
                };
                if child.local_name() != "c" {
                    extras.push(child);
                    continue;
                }
                let col = child
                    .attr("r")
                    .and_then(|r| CellRef::parse(&r).ok())
                    .map(|cell| cell.col)
                    .unwrap_or(next_col);
                next_col = col + 1;
                cells.insert(col, child);
            }
            rows.insert(
                row_num,
                Row {
                    element: row_el,
                    cells,
                    extras,
                },
            );
        }

        Ok(Self {
            name: name.to_string(),
            part: part.to_string(),
            doc,
            rows,
        })
    }

    pub fn to_xml_string(&self) -> String {
        let mut doc = self.doc.clone();
        if let Some(sheet_data) = doc.root.child_mut("sheetData") {
            for (row_num, row) in &self.rows {
                let mut row_el = row.element.clone();
                row_el.set_attr("r", &row_num.to_string());
                for (col, cell) in &row.cells {
                    let mut cell_el = cell.clone();
                    cell_el.set_attr("r", &CellRef::new(*col, *row_num).to_string());
                    row_el.push_child(cell_el);
                }
                for extra in &row.extras {
                    row_el.push_child(extra.clone());
                }
                sheet_data.push_child(row_el);
            }
        }
        doc.to_xml_string()
    }

    pub fn root(&self) -> &XmlElement {
        &self.doc.root
    }

    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.doc.root
    }

    pub fn row(&self, row: u32) -> Option<&Row> {
        self.rows.get(&row)
    }

    pub fn cell(&self, col: u32, row: u32) -> Option<&XmlElement> {
        self.rows.get(&row).and_then(|r| r.cells.get(&col))
    }

    /// Returns the cell, creating the row and cell elements when absent.
    pub fn cell_mut(&mut self, col: u32, row: u32) -> &mut XmlElement {
        let row_name = self.doc.root.prefixed("row");
        let cell_name = self.doc.root.prefixed("c");
        let row_entry = self
            .rows
            .entry(row)
            .or_insert_with(|| Row::new(row_name, row));
        widen_spans(&mut row_entry.element, col);
        row_entry
            .cells
            .entry(col)
            .or_insert_with(|| {
                XmlElement::new(cell_name).with_attr("r", &CellRef::new(col, row).to_string())
            })
    }

    /// Highest row that holds at least one cell.
    pub fn max_row(&self) -> u32 {
        self.rows
            .iter()
            .rev()
            .find(|(_, row)| !row.cells.is_empty())
            .map(|(num, _)| *num)
            .unwrap_or(0)
    }

    /// Highest column that holds a cell in any row.
    pub fn max_column(&self) -> u32 {
        self.rows
            .values()
            .filter_map(|row| row.cells.keys().next_back().copied())
            .max()
            .unwrap_or(0)
    }

    /// Last column covered by a merged range; 0 when the sheet has none that parse.
    pub fn merged_max_column(&self) -> u32 {
        self.doc
            .root
            .child("mergeCells")
            .and_then(|merges| {
                merges
                    .children_named("mergeCell")
                    .filter_map(|mc| mc.attr("ref"))
                    .filter_map(|r| RangeRef::parse(&r).ok())
                    .map(|range| range.end.col)
                    .max()
            })
            .unwrap_or(0)
    }

    pub fn cell_text(&self, col: u32, row: u32, shared_strings: &[String]) -> Option<String> {
        self.cell(col, row)
            .and_then(|cell| cell_value_text(cell, shared_strings))
    }

    pub fn cell_style(&self, col: u32, row: u32) -> Option<u32> {
        self.cell(col, row)
            .and_then(|cell| cell.attr("s"))
            .and_then(|s| s.parse().ok())
    }

    /// Style a cell renders with: its own, else the row default, else the column default.
    pub fn effective_style(&self, col: u32, row: u32) -> u32 {
        self.cell_style(col, row)
            .or_else(|| self.rows.get(&row).and_then(Row::style))
            .or_else(|| self.column_style(col))
            .unwrap_or(0)
    }

    pub fn set_cell_style(&mut self, col: u32, row: u32, style: u32) {
        let cell = self.cell_mut(col, row);
        if style == 0 {
            cell.remove_attr("s");
        } else {
            cell.set_attr("s", &style.to_string());
        }
    }

    /// Writes `value` as an inline string, dropping any previous value or formula.
    pub fn set_inline_string(&mut self, col: u32, row: u32, value: &str) {
        let cell = self.cell_mut(col, row);
        cell.set_attr("t", "inlineStr");
        cell.children.retain(|node| {
            !matches!(node, XmlNode::Element(el) if matches!(el.local_name(), "v" | "f" | "is"))
        });
        let mut t = XmlElement::new(cell.prefixed("t"));
        if value.starts_with(char::is_whitespace) || value.ends_with(char::is_whitespace) {
            t.set_attr("xml:space", "preserve");
        }
        t.set_text(value);
        let mut is = XmlElement::new(cell.prefixed("is"));
        is.push_child(t);
        cell.insert_child(0, is);
    }

    /// Column spans declared under `<cols>`, in document order.
    pub fn column_spans(&self) -> Vec<(ColumnSpan, &XmlElement)> {
        self.doc
            .root
            .child("cols")
            .map(|cols| {
                cols.children_named("col")
                    .filter_map(|el| span_of(el).map(|span| (span, el)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn column_width(&self, col: u32) -> Option<f64> {
        self.column_spans()
            .into_iter()
            .find(|(span, _)| span.contains(col))
            .and_then(|(_, el)| el.attr("width").and_then(|w| w.trim().parse().ok()))
    }

    pub fn column_style(&self, col: u32) -> Option<u32> {
        self.column_spans()
            .into_iter()
            .find(|(span, _)| span.contains(col))
            .and_then(|(_, el)| el.attr("style").and_then(|s| s.parse().ok()))
    }

    /// Gives `col` its own `<col>` entry with an explicit width, splitting any span that covers it.
    pub fn set_column_width(&mut self, col: u32, width: f64) {
        let cols = self.cols_mut();
        let covering = cols
            .children
            .iter()
            .enumerate()
            .find_map(|(idx, node)| match node {
                XmlNode::Element(el) if el.local_name() == "col" => span_of(el)
                    .filter(|span| span.contains(col))
                    .map(|span| (idx, span, el.clone())),
                _ => None,
            });

        let mut replacement = Vec::with_capacity(3);
        let insert_at = match covering {
            Some((idx, span, existing)) => {
                cols.children.remove(idx);
                if span.min < col {
                    replacement.push(with_span(&existing, span.min, col - 1));
                }
                replacement.push(with_width(with_span(&existing, col, col), width));
                if col < span.max {
                    replacement.push(with_span(&existing, col + 1, span.max));
                }
                idx
            }
            None => {
                let own = XmlElement::new(cols.prefixed("col"))
                    .with_attr("min", &col.to_string())
                    .with_attr("max", &col.to_string());
                replacement.push(with_width(own, width));
                cols.children
                    .iter()
                    .position(|node| {
                        matches!(node, XmlNode::Element(el)
                            if el.local_name() == "col" && span_of(el).is_some_and(|s| s.min > col))
                    })
                    .unwrap_or(cols.children.len())
            }
        };
        for (offset, el) in replacement.into_iter().enumerate() {
            cols.insert_child(insert_at + offset, el);
        }
    }

    pub fn auto_filter(&self) -> Option<String> {
        self.doc
            .root
            .child("autoFilter")
            .and_then(|af| af.attr("ref").map(|r| r.into_owned()))
    }

    pub fn set_auto_filter(&mut self, range: &RangeRef) -> bool {
        match self.doc.root.child_mut("autoFilter") {
            Some(af) => {
                af.set_attr("ref", &range.to_string());
                true
            }
            None => false,
        }
    }

    /// Relationship ids of the sheet's `<tablePart>` entries.
    pub fn table_part_ids(&self) -> Vec<String> {
        self.doc
            .root
            .child("tableParts")
            .map(|parts| {
                parts
                    .children_named("tablePart")
                    .filter_map(|tp| {
                        tp.attrs()
                            .find(|(key, _)| key.contains(':') && key.ends_with(":id"))
                            .map(|(_, value)| value.to_string())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Recomputes `<dimension ref>` from the cells present, when the sheet declares one.
    pub fn refresh_dimension(&mut self) {
        let mut min_col = u32::MAX;
        let mut max_col = 0;
        for row in self.rows.values() {
            if let (Some(first), Some(last)) = (row.cells.keys().next(), row.cells.keys().next_back()) {
                min_col = min_col.min(*first);
                max_col = max_col.max(*last);
            }
        }
        let min_row = self
            .rows
            .iter()
            .find(|(_, row)| !row.cells.is_empty())
            .map(|(num, _)| *num);
        let max_row = self.max_row();
        let Some(min_row) = min_row else {
            return;
        };
        let range = RangeRef {
            start: CellRef::new(min_col, min_row),
            end: CellRef::new(max_col, max_row),
        };
        if let Some(dimension) = self.doc.root.child_mut("dimension") {
            dimension.set_attr("ref", &range.to_string());
        }
    }

    /// Moves every cell at or right of `at` by `delta` columns, in every row.
    pub fn shift_cells(&mut self, at: u32, delta: u32) {
        for row in self.rows.values_mut() {
            let moved = row.cells.split_off(&at);
            for (col, cell) in moved {
                row.cells
                    .insert(shift_column(col, at, delta), cell);
            }
            shift_spans_attr(&mut row.element, at, delta);
        }
    }

    /// Shifts `<col>` spans; a span straddling `at` grows to cover the inserted columns.
    pub fn shift_column_spans(&mut self, at: u32, delta: u32) {
        let Some(cols) = self.doc.root.child_mut("cols") else {
            return;
        };
        for el in cols.children_named_mut("col") {
            let Some(span) = span_of(el) else {
                continue;
            };
            let min = shift_column(span.min, at, delta);
            let max = shift_column(span.max, at, delta);
            el.set_attr("min", &min.to_string());
            el.set_attr("max", &max.to_string());
        }
    }

    /// Every `<f>` element of every cell.
    pub fn formulas_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.rows.values_mut().flat_map(|row| {
            row.cells
                .values_mut()
                .flat_map(|cell| cell.children_named_mut("f"))
        })
    }

    fn cols_mut(&mut self) -> &mut XmlElement {
        if self.doc.root.child("cols").is_none() {
            let cols = XmlElement::new(self.doc.root.prefixed("cols"));
            let at = self
                .doc
                .root
                .child_position("sheetData")
                .unwrap_or(self.doc.root.children.len());
            self.doc.root.insert_child(at, cols);
        }
        self.doc
            .root
            .child_mut("cols")
            .expect("<cols> exists after insertion")
    }
}

/// Display text of a cell: shared/inline strings, booleans, and cached values of numbers,
/// errors and formulas.
pub fn cell_value_text(cell: &XmlElement, shared_strings: &[String]) -> Option<String> {
    let kind = cell.attr("t");
    let value = cell.child("v").map(XmlElement::text);
    match kind.as_deref() {
        Some("s") => value
            .and_then(|v| v.trim().parse::<usize>().ok())
            .and_then(|idx| shared_strings.get(idx).cloned()),
        Some("inlineStr") => cell
            .child("is")
            .map(XmlElement::rich_text)
            .or(value),
        Some("b") => value.map(|v| {
            if v.trim() == "1" {
                "TRUE".to_string()
            } else {
                "FALSE".to_string()
            }
        }),
        _ => value,
    }
}

fn span_of(el: &XmlElement) -> Option<ColumnSpan> {
    let min = el.attr("min")?.trim().parse().ok()?;
    let max = el.attr("max")?.trim().parse().ok()?;
    Some(ColumnSpan { min, max })
}

fn with_span(template: &XmlElement, min: u32, max: u32) -> XmlElement {
    let mut el = template.clone();
    el.set_attr("min", &min.to_string());
    el.set_attr("max", &max.to_string());
    el
}

fn with_width(mut el: XmlElement, width: f64) -> XmlElement {
    el.set_attr("width", &width.to_string());
    el.set_attr("customWidth", "1");
    el
}

fn parse_spans(row: &XmlElement) -> Option<(u32, u32)> {
    let spans = row.attr("spans")?;
    let (a, b) = spans.split_once(':')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

fn widen_spans(row: &mut XmlElement, col: u32) {
    if let Some((min, max)) = parse_spans(row)
        && (col < min || col > max)
    {
        row.set_attr("spans", &format!("{}:{}", min.min(col), max.max(col)));
    }
}

fn shift_spans_attr(row: &mut XmlElement, at: u32, delta: u32) {
    if let Some((min, max)) = parse_spans(row) {
        let min = shift_column(min, at, delta);
        let max = shift_column(max, at, delta);
        row.set_attr("spans", &format!("{min}:{max}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = concat!(
        "<worksheet><dimension ref=\"A1:B3\"/>",
        "<cols><col min=\"1\" max=\"3\" width=\"20\" customWidth=\"1\"/></cols>",
        "<sheetData>",
        "<row r=\"1\" spans=\"1:2\"><c r=\"A1\" t=\"s\" s=\"4\"><v>0</v></c><c r=\"B1\" t=\"inlineStr\"><is><t>Qty</t></is></c></row>",
        "<row r=\"3\"><c r=\"A3\"><v>42</v></c><c r=\"B3\"><f>A3*2</f><v>84</v></c></row>",
        "</sheetData><autoFilter ref=\"A1:B3\"/></worksheet>"
    );

    fn sheet() -> Worksheet {
        Worksheet::parse("Orders", "xl/worksheets/sheet1.xml", SHEET).expect("parse sheet")
    }

    #[test]
    fn reads_values_and_bounds() {
        let ws = sheet();
        let shared = vec!["Model Number".to_string()];
        assert_eq!(ws.cell_text(1, 1, &shared).as_deref(), Some("Model Number"));
        assert_eq!(ws.cell_text(2, 1, &shared).as_deref(), Some("Qty"));
        assert_eq!(ws.cell_text(2, 3, &shared).as_deref(), Some("84"));
        assert_eq!(ws.cell_text(1, 2, &shared), None);
        assert_eq!((ws.max_row(), ws.max_column()), (3, 2));
        assert_eq!(ws.cell_style(1, 1), Some(4));
    }

    #[test]
    fn untouched_sheet_serialises_to_the_same_markup() {
        assert_eq!(sheet().to_xml_string(), SHEET);
    }

    #[test]
    fn set_column_width_splits_covering_span() {
        let mut ws = sheet();
        ws.set_column_width(2, 15.0);
        let spans: Vec<(u32, u32, String)> = ws
            .column_spans()
            .into_iter()
            .map(|(span, el)| (span.min, span.max, el.attr("width").unwrap_or_default().into_owned()))
            .collect();
        assert_eq!(
            spans,
            vec![
                (1, 1, "20".to_string()),
                (2, 2, "15".to_string()),
                (3, 3, "20".to_string())
            ]
        );
        assert_eq!(ws.column_width(4), None);
        ws.set_column_width(5, 9.5);
        assert_eq!(ws.column_width(5), Some(9.5));
    }

    #[test]
    fn inline_strings_widen_row_spans_and_dimension() {
        let mut ws = sheet();
        ws.set_inline_string(3, 1, "Items");
        ws.refresh_dimension();
        let xml = ws.to_xml_string();
        assert!(xml.contains("<row r=\"1\" spans=\"1:3\">"));
        assert!(xml.contains("<c r=\"C1\" t=\"inlineStr\"><is><t>Items</t></is></c>"));
        assert!(xml.contains("<dimension ref=\"A1:C3\"/>"));
    }

    #[test]
    fn merged_ranges_report_their_last_column() {
        assert_eq!(sheet().merged_max_column(), 0);
        let xml = SHEET.replace(
            "<autoFilter",
            "<mergeCells count=\"2\"><mergeCell ref=\"B3:E3\"/><mergeCell ref=\"bad\"/></mergeCells><autoFilter",
        );
        let ws = Worksheet::parse("Orders", "xl/worksheets/sheet1.xml", &xml).expect("parse sheet");
        assert_eq!(ws.merged_max_column(), 5);
        assert_eq!(ws.max_column(), 2);
    }

    #[test]
    fn shift_cells_moves_columns_right_of_the_insertion() {
        let mut ws = sheet();
        ws.shift_cells(2, 1);
        assert!(ws.cell(2, 1).is_none());
        assert!(ws.cell(3, 1).is_some());
        assert!(ws.cell(1, 1).is_some());
        assert!(ws.to_xml_string().contains("<c r=\"C3\"><f>A3*2</f>"));
    }
}
