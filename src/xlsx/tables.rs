use super::{
    XlsxError, XlsxResult,
    reference::RangeRef,
    xml::{XmlDocument, XmlElement, XmlNode},
};

/// One table part (`xl/tables/tableN.xml`) attached to a worksheet.
#[derive(Debug, Clone)]
pub struct TablePart {
    pub part: String,
    doc: XmlDocument,
}

impl TablePart {
    pub fn parse(part: &str, xml: &str) -> XlsxResult<Self> {
        let doc = XmlDocument::parse(part, xml)?;
        if doc.root.local_name() != "table" {
            return Err(XlsxError::malformed(part, "root element is not <table>"));
        }
        Ok(Self {
            part: part.to_string(),
            doc,
        })
    }

    pub fn document(&self) -> &XmlDocument {
        &self.doc
    }

    pub fn display_name(&self) -> String {
        self.doc
            .root
            .attr("displayName")
            .or_else(|| self.doc.root.attr("name"))
            .map(|n| n.into_owned())
            .unwrap_or_else(|| self.part.clone())
    }

    /// Tables declare `headerRowCount="0"` when they have no header row.
    pub fn has_header_row(&self) -> bool {
        self.doc
            .root
            .attr("headerRowCount")
            .is_none_or(|count| count.trim() != "0")
    }

    pub fn range(&self) -> XlsxResult<RangeRef> {
        let reference = self
            .doc
            .root
            .attr("ref")
            .ok_or_else(|| XlsxError::malformed(&self.part, "table has no ref"))?;
        RangeRef::parse(&reference)
    }

    pub fn columns(&self) -> Vec<(u32, String)> {
        self.doc
            .root
            .child("tableColumns")
            .map(|cols| {
                cols.children_named("tableColumn")
                    .map(|col| {
                        (
                            col.attr("id").and_then(|id| id.parse().ok()).unwrap_or(0),
                            col.attr("name").unwrap_or_default().into_owned(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Applies `transform` to the table range and to its `autoFilter` / `sortState` ranges.
    ///
    /// Every reference is parsed before anything is written, so a bad reference leaves the
    /// table unchanged.
    pub fn transform_ranges(&mut self, transform: impl Fn(RangeRef) -> RangeRef) -> XlsxResult<()> {
        let table_ref = transform(self.range()?).to_string();
        let filter_ref = match self.doc.root.child("autoFilter").and_then(|af| af.attr("ref")) {
            Some(r) => Some(transform(RangeRef::parse(&r)?).to_string()),
            None => None,
        };
        let sort_ref = match self
            .doc
            .root
            .child("sortState")
            .or_else(|| {
                self.doc
                    .root
                    .child("autoFilter")
                    .and_then(|af| af.child("sortState"))
            })
            .and_then(|ss| ss.attr("ref"))
        {
            Some(r) => Some(transform(RangeRef::parse(&r)?).to_string()),
            None => None,
        };

        self.doc.root.set_attr("ref", &table_ref);
        if let (Some(af), Some(r)) = (self.doc.root.child_mut("autoFilter"), filter_ref) {
            af.set_attr("ref", &r);
        }
        if let Some(r) = sort_ref {
            let root = &mut self.doc.root;
            let sort_state = if root.child("sortState").is_some() {
                root.child_mut("sortState")
            } else {
                root.child_mut("autoFilter")
                    .and_then(|af| af.child_mut("sortState"))
            };
            if let Some(ss) = sort_state {
                ss.set_attr("ref", &r);
            }
        }
        Ok(())
    }

    /// Inserts a column definition at `index` (0-based within the table) and returns the
    /// assigned id and name. The id is one greater than the current maximum; the name is
    /// made unique within the table by appending a counter.
    pub fn insert_column(&mut self, index: usize, name: &str) -> XlsxResult<(u32, String)> {
        let existing = self.columns();
        let next_id = existing.iter().map(|(id, _)| *id).max().unwrap_or(0) + 1;
        let unique_name = unique_column_name(name, existing.iter().map(|(_, n)| n.as_str()));

        let part = self.part.clone();
        let columns = self
            .doc
            .root
            .child_mut("tableColumns")
            .ok_or_else(|| XlsxError::malformed(&part, "table has no <tableColumns>"))?;
        let element_positions: Vec<usize> = columns
            .children
            .iter()
            .enumerate()
            .filter(|(_, node)| {
                matches!(node, XmlNode::Element(el) if el.local_name() == "tableColumn")
            })
            .map(|(pos, _)| pos)
            .collect();
        let at = element_positions
            .get(index)
            .copied()
            .unwrap_or(columns.children.len());

        let column = XmlElement::new(columns.prefixed("tableColumn"))
            .with_attr("id", &next_id.to_string())
            .with_attr("name", &unique_name);
        columns.insert_child(at, column);
        let count = columns.children_named("tableColumn").count();
        columns.set_attr("count", &count.to_string());

        if let Some(af) = self.doc.root.child_mut("autoFilter") {
            for fc in af.children_named_mut("filterColumn") {
                if let Some(col_id) = fc.attr("colId").and_then(|c| c.parse::<usize>().ok())
                    && col_id >= index
                {
                    fc.set_attr("colId", &(col_id + 1).to_string());
                }
            }
        }
        Ok((next_id, unique_name))
    }
}

fn unique_column_name<'a>(name: &str, existing: impl Iterator<Item = &'a str> + Clone) -> String {
    let taken = |candidate: &str| {
        existing
            .clone()
            .any(|n| n.eq_ignore_ascii_case(candidate))
    };
    if !taken(name) {
        return name.to_string();
    }
    (2..)
        .map(|n| format!("{name}{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| name.to_string())
}
