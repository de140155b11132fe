use log::debug;

use super::{
    XlsxError, XlsxResult,
    package::XlsxPackage,
    reference::RangeRef,
    xml::XmlDocument,
};

const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
const FILTER_DATABASE: &str = "_xlnm._FilterDatabase";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub part: String,
    /// Zero-based position in the workbook, as used by `localSheetId`.
    pub position: usize,
}

/// Where the workbook's worksheets and shared parts live inside the package.
#[derive(Debug, Clone)]
pub struct WorkbookCatalog {
    pub workbook_part: String,
    pub sheets: Vec<SheetEntry>,
    pub shared_strings_part: Option<String>,
    pub styles_part: Option<String>,
}

impl WorkbookCatalog {
    pub fn load(package: &XlsxPackage) -> XlsxResult<Self> {
        let workbook_part = package
            .relationships("")?
            .into_iter()
            .find(|rel| rel.is_type("officeDocument"))
            .map(|rel| rel.target)
            .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string());
        if !package.has_part(&workbook_part) {
            return Err(XlsxError::MissingPart(workbook_part));
        }

        let workbook = package.read_xml(&workbook_part)?;
        let rels = package.relationships(&workbook_part)?;

        let mut sheets = Vec::new();
        if let Some(sheets_el) = workbook.root.child("sheets") {
            for (position, sheet) in sheets_el.children_named("sheet").enumerate() {
                let name = sheet.attr("name").unwrap_or_default().into_owned();
                let rel_id = sheet
                    .attrs()
                    .find(|(key, _)| key.rsplit(':').next() == Some("id") && key.contains(':'))
                    .map(|(_, value)| value.to_string());
                let Some(rel) = rel_id
                    .as_deref()
                    .and_then(|id| rels.iter().find(|rel| rel.id == id))
                else {
                    debug!("Sheet '{name}' has no resolvable relationship; skipping");
                    continue;
                };
                if !rel.is_type("worksheet") {
                    debug!("Sheet '{name}' is not a worksheet ({}); skipping", rel.rel_type);
                    continue;
                }
                sheets.push(SheetEntry {
                    name,
                    part: rel.target.clone(),
                    position,
                });
            }
        }

        let part_of = |kind: &str| {
            rels.iter()
                .find(|rel| rel.is_type(kind))
                .map(|rel| rel.target.clone())
                .filter(|target| package.has_part(target))
        };

        Ok(Self {
            shared_strings_part: part_of("sharedStrings"),
            styles_part: part_of("styles"),
            workbook_part,
            sheets,
        })
    }
}

pub fn load_shared_strings(package: &XlsxPackage, part: Option<&str>) -> XlsxResult<Vec<String>> {
    let Some(part) = part else {
        return Ok(Vec::new());
    };
    let doc = package.read_xml(part)?;
    Ok(doc
        .root
        .children_named("si")
        .map(|si| si.rich_text())
        .collect())
}

/// Points the sheet's hidden `_xlnm._FilterDatabase` name at `range`.
///
/// Returns `false` when the workbook defines no such name for the sheet.
pub fn update_filter_database_name(
    workbook: &mut XmlDocument,
    position: usize,
    range: &RangeRef,
) -> bool {
    let Some(defined_names) = workbook.root.child_mut("definedNames") else {
        return false;
    };
    let local_id = position.to_string();
    let Some(name) = defined_names.children_named_mut("definedName").find(|el| {
        el.attr("name").as_deref() == Some(FILTER_DATABASE)
            && el.attr("localSheetId").as_deref() == Some(local_id.as_str())
    }) else {
        return false;
    };
    let current = name.text();
    let Some((sheet_prefix, _)) = current.rsplit_once('!') else {
        return false;
    };
    let mut absolute = *range;
    for cell in [&mut absolute.start, &mut absolute.end] {
        cell.col_absolute = true;
        cell.row_absolute = true;
    }
    name.set_text(&format!("{sheet_prefix}!{absolute}"));
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_database_name_follows_widened_range() {
        let mut doc = XmlDocument::parse(
            "xl/workbook.xml",
            "<workbook><definedNames><definedName name=\"_xlnm._FilterDatabase\" localSheetId=\"1\" hidden=\"1\">'Orders 2'!$A$1:$C$9</definedName></definedNames></workbook>",
        )
        .expect("parse");
        let range = RangeRef::parse("A1:D9").expect("range");
        assert!(!update_filter_database_name(&mut doc, 0, &range));
        assert!(update_filter_database_name(&mut doc, 1, &range));
        let names = doc.root.child("definedNames").expect("names");
        let name = names.child("definedName").expect("name");
        assert_eq!(name.text(), "'Orders 2'!$A$1:$D$9");
    }
}
