//! Shared plumbing for Office Open XML packages (docx, pptx, xlsx).
//!
//! An OOXML file is a zip archive of XML parts wired together by
//! relationship parts (`_rels/*.rels`). This module opens packages, reads
//! parts, resolves relationships, and writes new packages with a fixed
//! timestamp so identical input always yields identical bytes.

use crate::error::ConvertError;
use crate::format::Format;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::Path;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Content type of relationship parts.
pub const RELS_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.relationships+xml";

/// Relationship type of the package's main part.
pub const OFFICE_DOCUMENT_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

/// An opened OOXML package.
pub struct Package {
    format: Format,
    archive: ZipArchive<BufReader<File>>,
}

impl Package {
    /// Open `path` as a zip package.
    ///
    /// # Errors
    /// [`ConvertError::DecodeFailure`] when the file is not a readable zip.
    pub fn open(path: &Path, format: Format) -> Result<Self, ConvertError> {
        let file = File::open(path).map_err(|e| ConvertError::decode(format, e))?;
        let archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| ConvertError::decode(format, format!("not a valid {format} package: {e}")))?;
        Ok(Self { format, archive })
    }

    /// Read a part as UTF-8 text.
    pub fn read_part(&mut self, name: &str) -> Result<String, ConvertError> {
        self.read_optional_part(name)?.ok_or_else(|| {
            ConvertError::decode(self.format, format!("package has no '{name}' part"))
        })
    }

    /// Read a part as UTF-8 text, or `None` if the package lacks it.
    pub fn read_optional_part(&mut self, name: &str) -> Result<Option<String>, ConvertError> {
        let format = self.format;
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(ConvertError::decode(format, format!("'{name}': {e}"))),
        };
        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .map_err(|e| ConvertError::decode(format, format!("'{name}': {e}")))?;
        Ok(Some(text))
    }

    /// Names of all parts in the archive.
    pub fn part_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Read the relationships of `part` (e.g. `xl/workbook.xml` →
    /// `xl/_rels/workbook.xml.rels`), keyed by relationship id, with targets
    /// resolved to package-absolute part names.
    pub fn relationships(&mut self, part: &str) -> Result<HashMap<String, Relationship>, ConvertError> {
        let (dir, file) = match part.rsplit_once('/') {
            Some((dir, file)) => (dir, file),
            None => ("", part),
        };
        let rels_name = if dir.is_empty() {
            format!("_rels/{file}.rels")
        } else {
            format!("{dir}/_rels/{file}.rels")
        };
        let Some(xml) = self.read_optional_part(&rels_name)? else {
            return Ok(HashMap::new());
        };
        parse_relationships(&xml, dir, self.format)
    }
}

/// One entry of a relationship part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub rel_type: String,
    /// Package-absolute part name, without a leading slash.
    pub target: String,
}

/// Parse a `.rels` part whose source part lives in `base_dir`.
pub fn parse_relationships(
    xml: &str,
    base_dir: &str,
    format: Format,
) -> Result<HashMap<String, Relationship>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut out = HashMap::new();

    loop {
        match reader.read_event().map_err(|e| xml_error(format, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let id = attribute(&e, "Id", format)?;
                let target = attribute(&e, "Target", format)?;
                let rel_type = attribute(&e, "Type", format)?.unwrap_or_default();
                let external = attribute(&e, "TargetMode", format)?.as_deref() == Some("External");
                if let (Some(id), Some(target)) = (id, target) {
                    if !external {
                        out.insert(
                            id,
                            Relationship {
                                rel_type,
                                target: resolve_target(base_dir, &target),
                            },
                        );
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

/// Resolve a relationship target against the directory of its source part.
pub fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
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

/// Unescaped value of attribute `name` on `e`.
pub fn attribute(e: &BytesStart<'_>, name: &str, format: Format) -> Result<Option<String>, ConvertError> {
    match e.try_get_attribute(name).map_err(|err| xml_error(format, err))? {
        Some(attr) => {
            let value = attr.unescape_value().map_err(|err| xml_error(format, err))?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

/// Map an XML parsing error onto a decode failure.
pub fn xml_error(format: Format, e: impl std::fmt::Display) -> ConvertError {
    ConvertError::decode(format, format!("malformed XML: {e}"))
}

// ── Writing ──────────────────────────────────────────────────────────────

/// Builds a zip package part by part, entirely in memory.
pub struct PackageWriter {
    format: Format,
    zip: ZipWriter<Cursor<Vec<u8>>>,
}

impl PackageWriter {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            zip: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Append a part. Timestamps are pinned to the zip epoch.
    pub fn add_part(&mut self, name: &str, bytes: &[u8]) -> Result<(), ConvertError> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        self.zip
            .start_file(name, options)
            .map_err(|e| ConvertError::encode(self.format, format!("'{name}': {e}")))?;
        self.zip
            .write_all(bytes)
            .map_err(|e| ConvertError::encode(self.format, format!("'{name}': {e}")))
    }

    /// Finish the archive and return its bytes.
    pub fn finish(self) -> Result<Vec<u8>, ConvertError> {
        let format = self.format;
        self.zip
            .finish()
            .map(Cursor::into_inner)
            .map_err(|e| ConvertError::encode(format, e))
    }
}

/// Thin wrapper over a quick-xml writer that maps errors onto
/// [`ConvertError::EncodeFailure`].
pub struct XmlWriter {
    format: Format,
    inner: Writer<Vec<u8>>,
}

impl XmlWriter {
    /// Start a standalone UTF-8 document.
    pub fn new(format: Format) -> Result<Self, ConvertError> {
        let mut writer = Self {
            format,
            inner: Writer::new(Vec::new()),
        };
        writer.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        Ok(writer)
    }

    pub fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), ConvertError> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.event(Event::Start(start))
    }

    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), ConvertError> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.event(Event::Empty(start))
    }

    pub fn end(&mut self, name: &str) -> Result<(), ConvertError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    /// Write escaped character data.
    pub fn text(&mut self, text: &str) -> Result<(), ConvertError> {
        self.event(Event::Text(BytesText::new(text)))
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.inner.into_inner()
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), ConvertError> {
        let format = self.format;
        self.inner
            .write_event(event)
            .map_err(|e| ConvertError::encode(format, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_relative_and_absolute_targets() {
        assert_eq!(resolve_target("xl", "worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_target("xl", "/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
        assert_eq!(resolve_target("ppt/slides", "../media/image1.png"), "ppt/media/image1.png");
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
    }

    #[test]
    fn relationships_skip_external_targets() {
        let xml = r#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="t/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="t/hyperlink" Target="https://example.com" TargetMode="External"/>
</Relationships>"#;
        let rels = parse_relationships(xml, "xl", Format::Xlsx).unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels["rId1"].target, "xl/worksheets/sheet1.xml");
        assert_eq!(rels["rId1"].rel_type, "t/worksheet");
    }

    #[test]
    fn xml_writer_escapes_text() {
        let mut w = XmlWriter::new(Format::Docx).unwrap();
        w.start("a", &[("k", "v")]).unwrap();
        w.text("1 < 2 & 3").unwrap();
        w.end("a").unwrap();
        let xml = String::from_utf8(w.into_bytes()).unwrap();
        assert!(xml.contains(r#"<a k="v">1 &lt; 2 &amp; 3</a>"#), "got {xml}");
    }

    #[test]
    fn package_round_trip_in_memory() {
        let mut writer = PackageWriter::new(Format::Docx);
        writer.add_part("a/b.xml", b"<x/>").unwrap();
        let bytes = writer.finish().unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("p.docx");
        std::fs::write(&path, bytes).unwrap();

        let mut package = Package::open(&path, Format::Docx).unwrap();
        assert_eq!(package.read_part("a/b.xml").unwrap(), "<x/>");
        assert!(package.read_optional_part("missing.xml").unwrap().is_none());
        assert!(package.read_part("missing.xml").is_err());
    }

    #[test]
    fn non_zip_is_decode_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"this is not a zip file").unwrap();
        let err = Package::open(&path, Format::Docx).err().unwrap();
        assert!(matches!(err, ConvertError::DecodeFailure { format: Format::Docx, .. }));
    }
}
