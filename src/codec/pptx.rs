//! PowerPoint text extraction.
//!
//! Slides are visited in presentation order (the `p:sldIdLst` of
//! `ppt/presentation.xml`), falling back to the numeric order of
//! `ppt/slides/slideN.xml` when the presentation part is missing or its
//! slide ids do not resolve. A presentation whose slide list is empty has
//! no slides and yields no text. Every DrawingML paragraph (`a:p`) on a
//! slide becomes one line.

use super::ooxml::{attribute, xml_error, Package};
use crate::error::ConvertError;
use crate::format::Format;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::path::Path;
use tracing::debug;

const PRESENTATION_PART: &str = "ppt/presentation.xml";

static SLIDE_PART: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());

/// Text of each slide, one inner vector of paragraphs per slide.
///
/// A package with neither a presentation part nor slide parts is not a
/// presentation and fails with [`ConvertError::DecodeFailure`].
pub fn read_slides(path: &Path) -> Result<Vec<Vec<String>>, ConvertError> {
    let mut package = Package::open(path, Format::Pptx)?;
    let parts = slide_parts(&mut package)?;
    debug!("Reading {} slide(s)", parts.len());

    let mut slides = Vec::with_capacity(parts.len());
    for part in parts {
        let xml = package.read_part(&part)?;
        slides.push(paragraphs_from_slide_xml(&xml)?);
    }
    Ok(slides)
}

/// Slide part names in presentation order.
fn slide_parts(package: &mut Package) -> Result<Vec<String>, ConvertError> {
    let presentation = package.read_optional_part(PRESENTATION_PART)?;
    if let Some(ref xml) = presentation {
        let ids = slide_relationship_ids(xml)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rels = package.relationships(PRESENTATION_PART)?;
        let ordered: Vec<String> = ids
            .iter()
            .filter_map(|id| rels.get(id).map(|rel| rel.target.clone()))
            .collect();
        if !ordered.is_empty() {
            return Ok(ordered);
        }
    }

    let mut numbered: Vec<(u32, String)> = package
        .part_names()
        .into_iter()
        .filter_map(|name| {
            let number = SLIDE_PART
                .captures(&name)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())?;
            Some((number, name))
        })
        .collect();
    if numbered.is_empty() {
        let detail = if presentation.is_some() {
            "presentation lists slides that are not in the package"
        } else {
            "package has neither a presentation part nor slides"
        };
        return Err(ConvertError::decode(Format::Pptx, detail));
    }
    numbered.sort();
    Ok(numbered.into_iter().map(|(_, name)| name).collect())
}

/// Relationship ids listed in `p:sldIdLst`, in order.
fn slide_relationship_ids(xml: &str) -> Result<Vec<String>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut ids = Vec::new();
    loop {
        match reader.read_event().map_err(|e| xml_error(Format::Pptx, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sldId" => {
                if let Some(id) = attribute(&e, "r:id", Format::Pptx)? {
                    ids.push(id);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(ids)
}

/// Paragraph texts of one slide part.
pub fn paragraphs_from_slide_xml(xml: &str) -> Result<Vec<String>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(|e| xml_error(Format::Pptx, e))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => current = Some(String::new()),
                b"t" => in_text = current.is_some(),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"br" => {
                    if let Some(p) = current.as_mut() {
                        p.push('\n');
                    }
                }
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(|e| xml_error(Format::Pptx, e))?;
                if let Some(p) = current.as_mut() {
                    p.push_str(&text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"p" => {
                    if let Some(p) = current.take() {
                        paragraphs.push(p);
                    }
                }
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}

/// Flatten slides into plain text: one line per paragraph, slides in order.
pub fn slides_to_text(slides: &[Vec<String>]) -> String {
    slides
        .iter()
        .flat_map(|slide| slide.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}
