use std::collections::HashMap;

use super::{
    XlsxError, XlsxResult,
    xml::{XmlDocument, XmlElement},
};

/// The package stylesheet (`xl/styles.xml`), extended on demand with derived cell formats.
#[derive(Debug, Clone)]
pub struct Stylesheet {
    pub part: String,
    doc: XmlDocument,
    fills_by_color: HashMap<String, u32>,
    derived: HashMap<(u32, u32), u32>,
    dirty: bool,
}

impl Stylesheet {
    pub fn parse(part: &str, xml: &str) -> XlsxResult<Self> {
        Ok(Self {
            part: part.to_string(),
            doc: XmlDocument::parse(part, xml)?,
            fills_by_color: HashMap::new(),
            derived: HashMap::new(),
            dirty: false,
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn document(&self) -> &XmlDocument {
        &self.doc
    }

    pub fn cell_format_count(&self) -> usize {
        self.doc
            .root
            .child("cellXfs")
            .map(|xfs| xfs.children_named("xf").count())
            .unwrap_or(0)
    }

    /// Index of a cell format identical to `base_xf` except for a solid `argb` fill.
    ///
    /// Formats are created once per (base, color) pair and reused afterwards.
    pub fn with_solid_fill(&mut self, base_xf: u32, argb: &str) -> XlsxResult<u32> {
        let fill_id = self.solid_fill(argb)?;
        if let Some(existing) = self.derived.get(&(base_xf, fill_id)) {
            return Ok(*existing);
        }

        let part = self.part.clone();
        let xfs = self
            .doc
            .root
            .child_mut("cellXfs")
            .ok_or_else(|| XlsxError::malformed(&part, "stylesheet has no <cellXfs>"))?;
        let template = xfs
            .children_named("xf")
            .nth(base_xf as usize)
            .or_else(|| xfs.children_named("xf").next())
            .cloned()
            .unwrap_or_else(|| {
                XmlElement::new(xfs.prefixed("xf"))
                    .with_attr("numFmtId", "0")
                    .with_attr("fontId", "0")
                    .with_attr("fillId", "0")
                    .with_attr("borderId", "0")
                    .with_attr("xfId", "0")
            });
        let mut xf = template;
        xf.set_attr("fillId", &fill_id.to_string());
        xf.set_attr("applyFill", "1");
        xfs.push_child(xf);
        let index = refresh_count(xfs, "xf") - 1;

        self.derived.insert((base_xf, fill_id), index);
        self.dirty = true;
        Ok(index)
    }

    fn solid_fill(&mut self, argb: &str) -> XlsxResult<u32> {
        let key = argb.to_ascii_uppercase();
        if let Some(id) = self.fills_by_color.get(&key) {
            return Ok(*id);
        }
        let part = self.part.clone();
        let fills = self
            .doc
            .root
            .child_mut("fills")
            .ok_or_else(|| XlsxError::malformed(&part, "stylesheet has no <fills>"))?;

        let mut fg = XmlElement::new(fills.prefixed("fgColor"));
        fg.set_attr("rgb", &key);
        let mut bg = XmlElement::new(fills.prefixed("bgColor"));
        bg.set_attr("rgb", &key);
        let mut pattern = XmlElement::new(fills.prefixed("patternFill"));
        pattern.set_attr("patternType", "solid");
        pattern.push_child(fg);
        pattern.push_child(bg);
        let mut fill = XmlElement::new(fills.prefixed("fill"));
        fill.push_child(pattern);
        fills.push_child(fill);
        let id = refresh_count(fills, "fill") - 1;

        self.fills_by_color.insert(key, id);
        self.dirty = true;
        Ok(id)
    }
}

/// Rewrites the `count` attribute from the actual children and returns it.
fn refresh_count(parent: &mut XmlElement, child: &str) -> u32 {
    let count = parent.children_named(child).count() as u32;
    parent.set_attr("count", &count.to_string());
    count
}
