use std::io::{Cursor, Read, Write};

use log::debug;
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::FileOptions};

use super::{XlsxError, XlsxResult, xml::XmlDocument};

/// Maximum uncompressed size accepted for a single part.
pub const MAX_PART_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone)]
struct Part {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
    is_dir: bool,
}

/// A spreadsheet package held entirely in memory, entries kept in their original order.
#[derive(Debug, Clone)]
pub struct XlsxPackage {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    pub fn is_type(&self, suffix: &str) -> bool {
        self.rel_type.rsplit('/').next() == Some(suffix)
    }
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> XlsxResult<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());
        for idx in 0..archive.len() {
            let mut file = archive.by_index(idx)?;
            let name = file.name().to_string();
            if file.size() > MAX_PART_BYTES {
                return Err(XlsxError::PartTooLarge {
                    part: name,
                    limit: MAX_PART_BYTES,
                });
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.by_ref().take(MAX_PART_BYTES + 1).read_to_end(&mut data)?;
            if data.len() as u64 > MAX_PART_BYTES {
                return Err(XlsxError::PartTooLarge {
                    part: name,
                    limit: MAX_PART_BYTES,
                });
            }
            parts.push(Part {
                compression: file.compression(),
                is_dir: file.is_dir(),
                name,
                data,
            });
        }
        debug!("Loaded package with {} part(s)", parts.len());
        Ok(Self { parts })
    }

    pub fn to_bytes(&self) -> XlsxResult<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for part in &self.parts {
            let method = match part.compression {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let options: FileOptions<'_, ()> = FileOptions::default().compression_method(method);
            if part.is_dir {
                writer.add_directory(part.name.as_str(), options)?;
            } else {
                writer.start_file(part.name.as_str(), options)?;
                writer.write_all(&part.data)?;
            }
        }
        Ok(writer.finish()?.into_inner())
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts
            .iter()
            .filter(|p| !p.is_dir)
            .map(|p| p.name.as_str())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.find(name).map(|p| p.data.as_slice())
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn read_text(&self, name: &str) -> XlsxResult<String> {
        let bytes = self
            .part(name)
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))?;
        String::from_utf8(bytes.to_vec()).map_err(|_| XlsxError::Utf8(name.to_string()))
    }

    pub fn read_xml(&self, name: &str) -> XlsxResult<XmlDocument> {
        let text = self.read_text(name)?;
        XmlDocument::parse(name, &text)
    }

    /// Replaces the bytes of an existing part, or appends a new deflated part.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        let normalized = normalize_part_name(name);
        if let Some(existing) = self
            .parts
            .iter_mut()
            .find(|p| normalize_part_name(&p.name).eq_ignore_ascii_case(normalized))
        {
            existing.data = data;
            return;
        }
        self.parts.push(Part {
            name: normalized.to_string(),
            data,
            compression: CompressionMethod::Deflated,
            is_dir: false,
        });
    }

    pub fn remove_part(&mut self, name: &str) -> bool {
        let normalized = normalize_part_name(name);
        let before = self.parts.len();
        self.parts
            .retain(|p| !normalize_part_name(&p.name).eq_ignore_ascii_case(normalized));
        self.parts.len() != before
    }

    pub fn write_xml(&mut self, name: &str, doc: &XmlDocument) {
        self.set_part(name, doc.to_xml_string().into_bytes());
    }

    /// Relationships declared by `source_part`; empty when it has no `_rels` part.
    pub fn relationships(&self, source_part: &str) -> XlsxResult<Vec<Relationship>> {
        let rels_name = rels_part_name(source_part);
        if !self.has_part(&rels_name) {
            return Ok(Vec::new());
        }
        let doc = self.read_xml(&rels_name)?;
        let rels = doc
            .root
            .children_named("Relationship")
            .map(|rel| {
                let external = rel
                    .attr("TargetMode")
                    .is_some_and(|mode| mode.eq_ignore_ascii_case("External"));
                let raw_target = rel.attr("Target").unwrap_or_default().into_owned();
                Relationship {
                    id: rel.attr("Id").unwrap_or_default().into_owned(),
                    rel_type: rel.attr("Type").unwrap_or_default().into_owned(),
                    target: if external {
                        raw_target
                    } else {
                        resolve_target(source_part, &raw_target)
                    },
                    external,
                }
            })
            .collect();
        Ok(rels)
    }

    fn find(&self, name: &str) -> Option<&Part> {
        let normalized = normalize_part_name(name);
        self.parts
            .iter()
            .find(|p| p.name == normalized)
            .or_else(|| {
                self.parts
                    .iter()
                    .find(|p| normalize_part_name(&p.name).eq_ignore_ascii_case(normalized))
            })
    }
}

fn normalize_part_name(name: &str) -> &str {
    name.trim_start_matches('/')
}

/// `xl/worksheets/sheet1.xml` -> `xl/worksheets/_rels/sheet1.xml.rels`
pub fn rels_part_name(source_part: &str) -> String {
    let source = normalize_part_name(source_part);
    match source.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{source}.rels"),
    }
}

/// Resolves a relationship target against the directory of its source part.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let source = normalize_part_name(source_part);
    let mut segments: Vec<&str> = match source.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
