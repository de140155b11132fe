#![allow(dead_code)]

use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use items_matcher::{
    lookup::LookupTable,
    xlsx::{Worksheet, XlsxPackage, catalog::load_shared_strings, WorkbookCatalog},
};
use tempfile::{TempDir, tempdir};
use zip::{ZipArchive, ZipWriter, write::SimpleFileOptions};

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const REL_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Stylesheet with two fills and four cell formats:
/// 0 default, 1 bold header with border, 2 date body, 3 bordered body.
pub const STYLES: &str = concat!(
    "<styleSheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">",
    "<fonts count=\"2\"><font><sz val=\"11\"/><name val=\"Calibri\"/></font>",
    "<font><b/><sz val=\"11\"/><name val=\"Calibri\"/></font></fonts>",
    "<fills count=\"2\"><fill><patternFill patternType=\"none\"/></fill>",
    "<fill><patternFill patternType=\"gray125\"/></fill></fills>",
    "<borders count=\"2\"><border><left/><right/><top/><bottom/><diagonal/></border>",
    "<border><left style=\"thin\"/><right style=\"thin\"/><top style=\"thin\"/><bottom style=\"thin\"/><diagonal/></border></borders>",
    "<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>",
    "<cellXfs count=\"4\">",
    "<xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/>",
    "<xf numFmtId=\"0\" fontId=\"1\" fillId=\"0\" borderId=\"1\" xfId=\"0\" applyFont=\"1\" applyBorder=\"1\"/>",
    "<xf numFmtId=\"14\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\" applyNumberFormat=\"1\"/>",
    "<xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"1\" xfId=\"0\" applyBorder=\"1\"/>",
    "</cellXfs></styleSheet>"
);

/// Escapes text for use inside fixture XML.
pub fn esc(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Inline-string cell at `reference`, optionally styled.
pub fn text_cell(reference: &str, value: &str, style: Option<u32>) -> String {
    let style = style.map(|s| format!(" s=\"{s}\"")).unwrap_or_default();
    format!(
        "<c r=\"{reference}\"{style} t=\"inlineStr\"><is><t>{}</t></is></c>",
        esc(value)
    )
}

/// `<sheetData>` with one inline-string cell per non-empty value, starting at `A1`.
pub fn sheet_data(rows: &[&[&str]]) -> String {
    let mut xml = String::from("<sheetData>");
    for (r, row) in rows.iter().enumerate() {
        let row_num = r + 1;
        xml.push_str(&format!("<row r=\"{row_num}\">"));
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let reference = format!("{}{row_num}", column_letter(c as u32 + 1));
            xml.push_str(&text_cell(&reference, value, None));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData>");
    xml
}

pub fn column_letter(col: u32) -> String {
    items_matcher::xlsx::reference::col_to_name(col)
}

#[derive(Debug, Clone)]
pub struct FixtureSheet {
    pub name: String,
    pub body: String,
    pub tables: Vec<String>,
}

/// Builds minimal but well-formed `.xlsx` packages in memory.
#[derive(Debug, Clone)]
pub struct FixtureWorkbook {
    sheets: Vec<FixtureSheet>,
    styles: Option<String>,
    shared_strings: Option<Vec<String>>,
    defined_names: Option<String>,
    calc_chain: Option<String>,
}

impl Default for FixtureWorkbook {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureWorkbook {
    pub fn new() -> Self {
        Self {
            sheets: Vec::new(),
            styles: Some(STYLES.to_string()),
            shared_strings: None,
            defined_names: None,
            calc_chain: None,
        }
    }

    /// `body` is the worksheet content between `<worksheet>` tags (at least `<sheetData>`).
    pub fn sheet(mut self, name: &str, body: impl Into<String>) -> Self {
        self.sheets.push(FixtureSheet {
            name: name.to_string(),
            body: body.into(),
            tables: Vec::new(),
        });
        self
    }

    pub fn sheet_with_tables(mut self, name: &str, body: impl Into<String>, tables: &[&str]) -> Self {
        self.sheets.push(FixtureSheet {
            name: name.to_string(),
            body: body.into(),
            tables: tables.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    pub fn without_styles(mut self) -> Self {
        self.styles = None;
        self
    }

    /// Replaces the default stylesheet.
    pub fn styles(mut self, xml: &str) -> Self {
        self.styles = Some(xml.to_string());
        self
    }

    pub fn shared_strings(mut self, strings: &[&str]) -> Self {
        self.shared_strings = Some(strings.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Raw `<definedName>` elements.
    pub fn defined_names(mut self, xml: &str) -> Self {
        self.defined_names = Some(xml.to_string());
        self
    }

    /// Raw `<c>` entries of `xl/calcChain.xml`.
    pub fn calc_chain(mut self, xml: &str) -> Self {
        self.calc_chain = Some(xml.to_string());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut parts: Vec<(String, String)> = Vec::new();
        let mut overrides = vec![(
            "/xl/workbook.xml".to_string(),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
        )];
        let mut workbook_rels = Vec::new();
        let mut sheet_entries = String::new();
        let mut table_counter = 0;

        for (idx, sheet) in self.sheets.iter().enumerate() {
            let n = idx + 1;
            let part = format!("xl/worksheets/sheet{n}.xml");
            overrides.push((
                format!("/{part}"),
                "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
            ));
            workbook_rels.push((format!("rId{n}"), "worksheet", format!("worksheets/sheet{n}.xml")));
            sheet_entries.push_str(&format!(
                "<sheet name=\"{}\" sheetId=\"{n}\" r:id=\"rId{n}\"/>",
                esc(&sheet.name)
            ));

            let mut body = sheet.body.clone();
            if !sheet.tables.is_empty() {
                let mut sheet_rels = Vec::new();
                body.push_str(&format!("<tableParts count=\"{}\">", sheet.tables.len()));
                for (t, table) in sheet.tables.iter().enumerate() {
                    table_counter += 1;
                    let table_part = format!("xl/tables/table{table_counter}.xml");
                    overrides.push((
                        format!("/{table_part}"),
                        "application/vnd.openxmlformats-officedocument.spreadsheetml.table+xml",
                    ));
                    let rel_id = format!("rIdT{}", t + 1);
                    body.push_str(&format!("<tablePart r:id=\"{rel_id}\"/>"));
                    sheet_rels.push((rel_id, "table", format!("../tables/table{table_counter}.xml")));
                    parts.push((table_part, xml_part(table)));
                }
                body.push_str("</tableParts>");
                parts.push((
                    format!("xl/worksheets/_rels/sheet{n}.xml.rels"),
                    rels_xml(&sheet_rels),
                ));
            }
            parts.push((
                part,
                xml_part(&format!(
                    "<worksheet xmlns=\"{MAIN_NS}\" xmlns:r=\"{REL_NS}\">{body}</worksheet>"
                )),
            ));
        }

        if let Some(styles) = &self.styles {
            overrides.push((
                "/xl/styles.xml".to_string(),
                "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml",
            ));
            workbook_rels.push(("rIdS".to_string(), "styles", "styles.xml".to_string()));
            parts.push(("xl/styles.xml".to_string(), xml_part(styles)));
        }
        if let Some(strings) = &self.shared_strings {
            overrides.push((
                "/xl/sharedStrings.xml".to_string(),
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml",
            ));
            workbook_rels.push(("rIdSS".to_string(), "sharedStrings", "sharedStrings.xml".to_string()));
            let items: String = strings
                .iter()
                .map(|s| format!("<si><t>{}</t></si>", esc(s)))
                .collect();
            parts.push((
                "xl/sharedStrings.xml".to_string(),
                xml_part(&format!(
                    "<sst xmlns=\"{MAIN_NS}\" count=\"{0}\" uniqueCount=\"{0}\">{items}</sst>",
                    strings.len()
                )),
            ));
        }
        if let Some(chain) = &self.calc_chain {
            overrides.push((
                "/xl/calcChain.xml".to_string(),
                "application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml",
            ));
            workbook_rels.push(("rIdC".to_string(), "calcChain", "calcChain.xml".to_string()));
            parts.push((
                "xl/calcChain.xml".to_string(),
                xml_part(&format!("<calcChain xmlns=\"{MAIN_NS}\">{chain}</calcChain>")),
            ));
        }

        let defined = self
            .defined_names
            .as_ref()
            .map(|names| format!("<definedNames>{names}</definedNames>"))
            .unwrap_or_default();
        parts.push((
            "xl/workbook.xml".to_string(),
            xml_part(&format!(
                "<workbook xmlns=\"{MAIN_NS}\" xmlns:r=\"{REL_NS}\"><sheets>{sheet_entries}</sheets>{defined}</workbook>"
            )),
        ));
        parts.push(("xl/_rels/workbook.xml.rels".to_string(), rels_xml(&workbook_rels)));
        parts.push((
            "_rels/.rels".to_string(),
            rels_xml(&[("rId1".to_string(), "officeDocument", "xl/workbook.xml".to_string())]),
        ));

        let override_xml: String = overrides
            .iter()
            .map(|(name, ct)| format!("<Override PartName=\"{name}\" ContentType=\"{ct}\"/>"))
            .collect();
        let content_types = xml_part(&format!(
            "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
             <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
             <Default Extension=\"xml\" ContentType=\"application/xml\"/>{override_xml}</Types>"
        ));

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        writer
            .start_file("[Content_Types].xml", options)
            .expect("start content types");
        writer
            .write_all(content_types.as_bytes())
            .expect("write content types");
        for (name, xml) in parts {
            writer.start_file(name.as_str(), options).expect("start part");
            writer.write_all(xml.as_bytes()).expect("write part");
        }
        writer.finish().expect("finish zip").into_inner()
    }
}

fn xml_part(body: &str) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n{body}")
}

fn rels_xml(rels: &[(String, &str, String)]) -> String {
    let items: String = rels
        .iter()
        .map(|(id, kind, target)| {
            format!("<Relationship Id=\"{id}\" Type=\"{REL_TYPE}/{kind}\" Target=\"{target}\"/>")
        })
        .collect();
    xml_part(&format!(
        "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">{items}</Relationships>"
    ))
}

/// Names of all entries in a zip package, in archive order.
pub fn part_names(bytes: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(bytes)).expect("open zip");
    archive.file_names().map(str::to_string).collect()
}

pub fn read_part(bytes: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("open zip");
    let mut file = archive.by_name(name).expect("part present");
    let mut out = String::new();
    file.read_to_string(&mut out).expect("read part");
    out
}

/// Parsed view of one output sheet with its shared strings.
pub struct SheetView {
    pub sheet: Worksheet,
    pub shared: Vec<String>,
}

impl SheetView {
    pub fn open(bytes: &[u8], sheet_name: &str) -> Self {
        let package = XlsxPackage::from_bytes(bytes).expect("package");
        let catalog = WorkbookCatalog::load(&package).expect("catalog");
        let entry = catalog
            .sheets
            .iter()
            .find(|s| s.name == sheet_name)
            .expect("sheet present");
        let shared = load_shared_strings(&package, catalog.shared_strings_part.as_deref())
            .expect("shared strings");
        let xml = package.read_text(&entry.part).expect("sheet xml");
        Self {
            sheet: Worksheet::parse(&entry.name, &entry.part, &xml).expect("parse sheet"),
            shared,
        }
    }

    /// Text at an A1 reference such as `"C2"`.
    pub fn text(&self, reference: &str) -> Option<String> {
        let cell = items_matcher::xlsx::CellRef::parse(reference).expect("reference");
        self.sheet.cell_text(cell.col, cell.row, &self.shared)
    }

    pub fn style(&self, reference: &str) -> Option<u32> {
        let cell = items_matcher::xlsx::CellRef::parse(reference).expect("reference");
        self.sheet.cell_style(cell.col, cell.row)
    }

    pub fn has_cell(&self, reference: &str) -> bool {
        let cell = items_matcher::xlsx::CellRef::parse(reference).expect("reference");
        self.sheet.cell(cell.col, cell.row).is_some()
    }

    pub fn formula(&self, reference: &str) -> Option<String> {
        let cell = items_matcher::xlsx::CellRef::parse(reference).expect("reference");
        self.sheet
            .cell(cell.col, cell.row)
            .and_then(|c| c.child("f"))
            .map(|f| f.text())
    }
}

/// The `fillId` of cell format `xf` in an output stylesheet.
pub fn fill_of_format(styles_xml: &str, xf: u32) -> Option<u32> {
    let cell_xfs = styles_xml.split("<cellXfs").nth(1)?;
    let entry = cell_xfs.split("<xf ").nth(xf as usize + 1)?;
    let attr = entry.split("fillId=\"").nth(1)?;
    attr.split('"').next()?.parse().ok()
}

pub fn lookup(pairs: &[(&str, &str)]) -> LookupTable {
    LookupTable::from_pairs(pairs.iter().copied())
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }
}
