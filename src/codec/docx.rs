//! Word documents: paragraph text extraction and a minimal writer.
//!
//! Reading walks `word/document.xml` and returns the text of each body-level
//! paragraph. Paragraphs inside tables and text boxes are skipped. Within a
//! run, `w:tab` becomes `\t` and line breaks (`w:br`, `w:cr`) become `\n`;
//! page breaks produce nothing.
//!
//! Writing produces the smallest package Word and LibreOffice open without
//! complaint: content types, the root relationship, and `word/document.xml`
//! with an A4 section.

use super::ooxml::{attribute, xml_error, Package, PackageWriter, XmlWriter, OFFICE_DOCUMENT_REL, RELS_CONTENT_TYPE};
use crate::error::ConvertError;
use crate::format::Format;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;

const DOCUMENT_PART: &str = "word/document.xml";
const WORDML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const DOCUMENT_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";

/// A unit of document body content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// One paragraph. `\t` becomes a tab, `\n` a line break.
    Paragraph(String),
    /// Start the following content on a new page.
    PageBreak,
}

/// Text of every body-level paragraph, in document order.
pub fn read_paragraphs(path: &Path) -> Result<Vec<String>, ConvertError> {
    let mut package = Package::open(path, Format::Docx)?;
    let main = main_document_part(&mut package)?;
    let xml = package.read_part(&main)?;
    paragraphs_from_xml(&xml)
}

/// The main document part, found through the root relationship. Falls back
/// to the conventional name for packages without one.
fn main_document_part(package: &mut Package) -> Result<String, ConvertError> {
    let rels = package.relationships("")?;
    let target = rels
        .values()
        .find(|rel| rel.rel_type == OFFICE_DOCUMENT_REL)
        .map(|rel| rel.target.clone());
    Ok(target.unwrap_or_else(|| DOCUMENT_PART.to_string()))
}

/// Extract paragraphs from the XML of a document part.
pub fn paragraphs_from_xml(xml: &str) -> Result<Vec<String>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    // Nesting depth of w:p. Text boxes put whole paragraphs inside a run.
    let mut para_depth = 0usize;
    let mut table_depth = 0usize;
    let mut run_depth = 0usize;
    let mut in_text = false;
    let mut saw_body = false;

    loop {
        let event = reader.read_event().map_err(|e| xml_error(Format::Docx, e))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"body" => saw_body = true,
                b"tbl" => table_depth += 1,
                b"p" if table_depth == 0 => {
                    para_depth += 1;
                    if para_depth == 1 {
                        current.clear();
                    }
                }
                b"r" => run_depth += 1,
                b"t" => in_text = para_depth == 1 && table_depth == 0 && run_depth > 0,
                _ => {}
            },
            Event::Empty(e) => {
                let top_level_run = para_depth == 1 && table_depth == 0 && run_depth > 0;
                match e.local_name().as_ref() {
                    b"p" if table_depth == 0 && para_depth == 0 => paragraphs.push(String::new()),
                    b"tab" if top_level_run => current.push('\t'),
                    b"cr" if top_level_run => current.push('\n'),
                    b"br" if top_level_run => {
                        // Page and column breaks carry no text.
                        let kind = attribute(&e, "w:type", Format::Docx)?;
                        if matches!(kind.as_deref(), None | Some("textWrapping")) {
                            current.push('\n');
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(|e| xml_error(Format::Docx, e))?;
                current.push_str(&text);
            }
            Event::CData(t) if in_text => {
                current.push_str(&String::from_utf8_lossy(&t));
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                b"p" if table_depth == 0 && para_depth > 0 => {
                    if para_depth == 1 {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    para_depth -= 1;
                }
                b"r" => run_depth = run_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_body {
        return Err(ConvertError::decode(
            Format::Docx,
            "document part has no w:body element",
        ));
    }
    Ok(paragraphs)
}

/// Encode `blocks` as a complete .docx package.
pub fn write_document(blocks: &[Block]) -> Result<Vec<u8>, ConvertError> {
    let mut package = PackageWriter::new(Format::Docx);
    package.add_part("[Content_Types].xml", &content_types()?)?;
    package.add_part("_rels/.rels", &root_relationships()?)?;
    package.add_part(DOCUMENT_PART, &document_xml(blocks)?)?;
    package.finish()
}

/// Split plain text into one paragraph per line.
pub fn blocks_from_text(text: &str) -> Vec<Block> {
    if text.is_empty() {
        return Vec::new();
    }
    text.lines().map(|line| Block::Paragraph(line.to_string())).collect()
}

fn content_types() -> Result<Vec<u8>, ConvertError> {
    let mut w = XmlWriter::new(Format::Docx)?;
    w.start(
        "Types",
        &[("xmlns", "http://schemas.openxmlformats.org/package/2006/content-types")],
    )?;
    w.empty("Default", &[("Extension", "rels"), ("ContentType", RELS_CONTENT_TYPE)])?;
    w.empty("Default", &[("Extension", "xml"), ("ContentType", "application/xml")])?;
    w.empty(
        "Override",
        &[("PartName", "/word/document.xml"), ("ContentType", DOCUMENT_CONTENT_TYPE)],
    )?;
    w.end("Types")?;
    Ok(w.into_bytes())
}

fn root_relationships() -> Result<Vec<u8>, ConvertError> {
    let mut w = XmlWriter::new(Format::Docx)?;
    w.start(
        "Relationships",
        &[("xmlns", "http://schemas.openxmlformats.org/package/2006/relationships")],
    )?;
    w.empty(
        "Relationship",
        &[("Id", "rId1"), ("Type", OFFICE_DOCUMENT_REL), ("Target", DOCUMENT_PART)],
    )?;
    w.end("Relationships")?;
    Ok(w.into_bytes())
}

fn document_xml(blocks: &[Block]) -> Result<Vec<u8>, ConvertError> {
    let mut w = XmlWriter::new(Format::Docx)?;
    w.start("w:document", &[("xmlns:w", WORDML_NS)])?;
    w.start("w:body", &[])?;

    for block in blocks {
        match block {
            Block::Paragraph(text) if text.is_empty() => w.empty("w:p", &[])?,
            Block::Paragraph(text) => {
                w.start("w:p", &[])?;
                w.start("w:r", &[])?;
                write_run_content(&mut w, text)?;
                w.end("w:r")?;
                w.end("w:p")?;
            }
            Block::PageBreak => {
                w.start("w:p", &[])?;
                w.start("w:r", &[])?;
                w.empty("w:br", &[("w:type", "page")])?;
                w.end("w:r")?;
                w.end("w:p")?;
            }
        }
    }

    // A4 portrait, 1 inch margins (twentieths of a point).
    w.start("w:sectPr", &[])?;
    w.empty("w:pgSz", &[("w:w", "11906"), ("w:h", "16838")])?;
    w.empty(
        "w:pgMar",
        &[
            ("w:top", "1440"),
            ("w:right", "1440"),
            ("w:bottom", "1440"),
            ("w:left", "1440"),
            ("w:header", "708"),
            ("w:footer", "708"),
            ("w:gutter", "0"),
        ],
    )?;
    w.end("w:sectPr")?;

    w.end("w:body")?;
    w.end("w:document")?;
    Ok(w.into_bytes())
}

fn write_run_content(w: &mut XmlWriter, text: &str) -> Result<(), ConvertError> {
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            w.empty("w:br", &[])?;
        }
        for (j, piece) in line.split('\t').enumerate() {
            if j > 0 {
                w.empty("w:tab", &[])?;
            }
            if !piece.is_empty() {
                w.start("w:t", &[("xml:space", "preserve")])?;
                w.text(piece)?;
                w.end("w:t")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn body(inner: &str) -> String {
        format!(r#"<w:document xmlns:w="{WORDML_NS}"><w:body>{inner}</w:body></w:document>"#)
    }

    #[test]
    fn simple_paragraphs() {
        let xml = body(
            "<w:p><w:r><w:t>A</w:t></w:r></w:p>\
             <w:p><w:r><w:t>B</w:t></w:r></w:p>\
             <w:p><w:r><w:t>C</w:t></w:r></w:p>",
        );
        assert_eq!(paragraphs_from_xml(&xml).unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn runs_are_concatenated_and_unescaped() {
        let xml = body(
            r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr>
               <w:r><w:t>Fish &amp; </w:t></w:r><w:r><w:tab/><w:t xml:space="preserve">chips</w:t></w:r></w:p>"#,
        );
        assert_eq!(paragraphs_from_xml(&xml).unwrap(), vec!["Fish & \tchips"]);
    }

    #[test]
    fn empty_paragraphs_are_kept() {
        let xml = body("<w:p/><w:p><w:pPr/></w:p><w:p><w:r><w:t>x</w:t></w:r></w:p>");
        assert_eq!(paragraphs_from_xml(&xml).unwrap(), vec!["", "", "x"]);
    }

    #[test]
    fn table_paragraphs_are_skipped() {
        let xml = body(
            "<w:p><w:r><w:t>before</w:t></w:r></w:p>\
             <w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>\
             <w:p><w:r><w:t>after</w:t></w:r></w:p>",
        );
        assert_eq!(paragraphs_from_xml(&xml).unwrap(), vec!["before", "after"]);
    }

    #[test]
    fn deleted_text_is_ignored() {
        let xml = body("<w:p><w:del><w:r><w:delText>gone</w:delText></w:r></w:del><w:r><w:t>kept</w:t></w:r></w:p>");
        assert_eq!(paragraphs_from_xml(&xml).unwrap(), vec!["kept"]);
    }

    #[test]
    fn missing_body_is_decode_failure() {
        let err = paragraphs_from_xml("<w:document/>").unwrap_err();
        assert!(matches!(err, ConvertError::DecodeFailure { .. }));
    }

    #[test]
    fn written_document_reads_back() {
        let blocks = vec![
            Block::Paragraph("Title".into()),
            Block::Paragraph(String::new()),
            Block::Paragraph("a\tb <c>".into()),
            Block::PageBreak,
            Block::Paragraph("Page two".into()),
        ];
        let bytes = write_document(&blocks).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.docx");
        std::fs::write(&path, &bytes).unwrap();

        let paragraphs = read_paragraphs(&path).unwrap();
        assert_eq!(paragraphs, vec!["Title", "", "a\tb <c>", "", "Page two"]);
    }

    #[test]
    fn writer_output_is_deterministic() {
        let blocks = blocks_from_text("one\ntwo\n");
        assert_eq!(write_document(&blocks).unwrap(), write_document(&blocks).unwrap());
    }

    #[test]
    fn blocks_from_text_splits_lines() {
        assert_eq!(
            blocks_from_text("x\r\n\ny"),
            vec![
                Block::Paragraph("x".into()),
                Block::Paragraph(String::new()),
                Block::Paragraph("y".into())
            ]
        );
        assert!(blocks_from_text("").is_empty());
    }
}
