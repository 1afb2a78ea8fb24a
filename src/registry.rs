//! The static table of supported conversions.
//!
//! The registry answers one question: is `(source, target)` a conversion we
//! offer? It knows nothing about how a conversion is carried out; that lives
//! in [`crate::routine`]. [`crate::routine::verify_table`] checks at startup
//! that both tables describe the same set of edges.

use crate::format::Format;
use serde::Serialize;

/// Source format → formats it can be converted into.
const SUPPORTED: &[(Format, &[Format])] = &[
    (Format::Docx, &[Format::Pdf, Format::Txt]),
    (Format::Pdf, &[Format::Txt, Format::Docx]),
    (Format::Xlsx, &[Format::Csv, Format::Txt]),
    (Format::Csv, &[Format::Xlsx, Format::Txt]),
    (Format::Txt, &[Format::Pdf, Format::Docx]),
    (Format::Pptx, &[Format::Pdf, Format::Txt]),
    (Format::Jpg, &[Format::Png, Format::Pdf, Format::Jpeg]),
    (Format::Jpeg, &[Format::Png, Format::Pdf, Format::Jpg]),
    (Format::Png, &[Format::Jpg, Format::Pdf, Format::Jpeg]),
    (Format::Bmp, &[Format::Png, Format::Jpg, Format::Jpeg, Format::Pdf]),
];

/// One supported conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConversionEdge {
    pub source: Format,
    pub target: Format,
}

/// Whether `source` can be converted into `target`.
pub fn can_convert(source: Format, target: Format) -> bool {
    supported_targets(source).contains(&target)
}

/// Formats that `source` can be converted into, in registry order.
///
/// Empty for a format that is never a conversion source.
pub fn supported_targets(source: Format) -> &'static [Format] {
    SUPPORTED
        .iter()
        .find(|(s, _)| *s == source)
        .map(|(_, targets)| *targets)
        .unwrap_or(&[])
}

/// Every supported edge, in registry order.
pub fn edges() -> impl Iterator<Item = ConversionEdge> {
    SUPPORTED.iter().flat_map(|(source, targets)| {
        targets.iter().map(move |target| ConversionEdge {
            source: *source,
            target: *target,
        })
    })
}

/// Formats accepted as conversion sources.
pub fn input_formats() -> Vec<Format> {
    SUPPORTED.iter().map(|(s, _)| *s).collect()
}

/// Formats that at least one source can be converted into, deduplicated,
/// in first-seen registry order.
pub fn output_formats() -> Vec<Format> {
    let mut out: Vec<Format> = Vec::new();
    for edge in edges() {
        if !out.contains(&edge.target) {
            out.push(edge.target);
        }
    }
    out
}

/// Serialisable snapshot of the registry, used by the CLI's format listing.
#[derive(Debug, Clone, Serialize)]
pub struct SupportedFormats {
    pub input_formats: Vec<Format>,
    pub output_formats: Vec<Format>,
    pub conversions: Vec<ConversionEdge>,
}

/// Snapshot the registry.
pub fn supported_formats() -> SupportedFormats {
    SupportedFormats {
        input_formats: input_formats(),
        output_formats: output_formats(),
        conversions: edges().collect(),
    }
}
