//! PDF text extraction, plain-text layout, and single-image wrapping.
//!
//! Three jobs, all through `lopdf`:
//!
//! 1. [`extract_pages`] pulls the text layer out of every page.
//! 2. [`write_text`] lays plain text out on A4 (by default) pages with the
//!    built-in Helvetica font. Lines wrap at word boundaries and pages break
//!    when full. Characters outside WinAnsi are replaced with `?`.
//! 3. [`wrap_jpeg`] embeds a baseline JPEG as the only content of a page the
//!    exact size of the image (1 pixel = 1 point).
//!
//! None of the writers embed timestamps or random ids, so the same input
//! always produces the same bytes.

use crate::config::TextLayout;
use crate::error::ConvertError;
use crate::format::Format;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

const PDF_VERSION: &str = "1.5";
const FONT_NAME: &str = "F1";
const IMAGE_NAME: &str = "Im0";
const TAB_WIDTH: usize = 4;

static RE_TRAILING_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+\n").unwrap());

// ── Reading ──────────────────────────────────────────────────────────────

/// Text of each page, in page order.
///
/// A page whose text layer cannot be decoded contributes an empty string and
/// a warning. A document without pages yields an empty vector; a file that is
/// not a PDF at all is a [`ConvertError::DecodeFailure`].
pub fn extract_pages(path: &Path) -> Result<Vec<String>, ConvertError> {
    let doc = Document::load(path).map_err(|e| ConvertError::decode(Format::Pdf, e))?;
    let pages = doc.get_pages();
    debug!("Extracting text from {} page(s)", pages.len());

    let mut texts = Vec::with_capacity(pages.len());
    for &number in pages.keys() {
        match doc.extract_text(&[number]) {
            Ok(text) => texts.push(normalise_page_text(&text)),
            Err(e) => {
                warn!("Page {} has no readable text layer: {}", number, e);
                texts.push(String::new());
            }
        }
    }
    Ok(texts)
}

/// Unify line endings and strip trailing whitespace.
fn normalise_page_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let stripped = RE_TRAILING_SPACE.replace_all(&unified, "\n");
    stripped.trim_end().to_string()
}

/// Join page texts into one document.
pub fn pages_to_text(pages: &[String]) -> String {
    pages.join("\n")
}

// ── Text layout ──────────────────────────────────────────────────────────

/// Lay `text` out as a paginated PDF.
pub fn write_text(text: &str, layout: &TextLayout) -> Result<Vec<u8>, ConvertError> {
    let lines = wrap_text(text, layout.chars_per_line());
    let per_page = layout.lines_per_page();

    let mut doc = Document::with_version(PDF_VERSION);
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let chunks: Vec<&[String]> = if lines.is_empty() {
        vec![&lines[..]]
    } else {
        lines.chunks(per_page).collect()
    };

    let mut kids = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let content = page_text_content(chunk, layout);
        let encoded = content
            .encode()
            .map_err(|e| ConvertError::encode(Format::Pdf, e))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => media_box(layout.page_width, layout.page_height),
            "Resources" => dictionary! {
                "Font" => dictionary! { FONT_NAME => font_id },
            },
            "Contents" => content_id,
        });
        kids.push(page_id);
    }

    debug!("Laid out {} line(s) on {} page(s)", lines.len(), kids.len());
    finish_document(doc, pages_id, kids, true)
}

fn page_text_content(lines: &[String], layout: &TextLayout) -> Content {
    let mut operations = Vec::new();
    let top = layout.page_height - layout.margin - layout.font_size;
    for (i, line) in lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let y = top - layout.leading * i as f32;
        // One text object per line so extractors see a line break at each ET.
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec![Object::Name(FONT_NAME.as_bytes().to_vec()), Object::Real(layout.font_size)],
        ));
        operations.push(Operation::new(
            "Td",
            vec![Object::Real(layout.margin), Object::Real(y)],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(encode_win_ansi(line))],
        ));
        operations.push(Operation::new("ET", vec![]));
    }
    Content { operations }
}

/// Expand tabs and wrap every line of `text` to at most `width` characters.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let tabs = " ".repeat(TAB_WIDTH);
    text.lines()
        .flat_map(|line| wrap_line(&line.replace('\t', &tabs), width))
        .collect()
}

fn wrap_line(line: &str, width: usize) -> Vec<String> {
    if line.chars().count() <= width {
        return vec![line.trim_end().to_string()];
    }

    let mut out = Vec::new();
    let mut current = String::new();
    for word in line.split(' ').filter(|w| !w.is_empty()) {
        let word_len = word.chars().count();
        let current_len = current.chars().count();

        if word_len > width {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            let mut pieces = chars.chunks(width).map(|c| c.iter().collect::<String>());
            let mut last = pieces.next().unwrap_or_default();
            for piece in pieces {
                out.push(std::mem::replace(&mut last, piece));
            }
            current = last;
        } else if current.is_empty() {
            current.push_str(word);
        } else if current_len + 1 + word_len <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            out.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Encode `text` in WinAnsiEncoding. Unmappable characters become `?`,
/// control characters are dropped.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .filter_map(|c| match c {
            ' '..='~' => Some(c as u8),
            '\u{A0}'..='\u{FF}' => Some(c as u32 as u8),
            c if c.is_control() => None,
            c => Some(win_ansi_high(c).unwrap_or(b'?')),
        })
        .collect()
}

/// The 0x80–0x9F block of WinAnsiEncoding.
fn win_ansi_high(c: char) -> Option<u8> {
    let byte = match c {
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '•' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => return None,
    };
    Some(byte)
}

// ── Image wrapping ───────────────────────────────────────────────────────

/// Wrap a baseline RGB JPEG in a one-page PDF of `width` × `height` points.
pub fn wrap_jpeg(jpeg: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>, ConvertError> {
    if width == 0 || height == 0 {
        return Err(ConvertError::encode(Format::Pdf, "image has zero size"));
    }

    let mut doc = Document::with_version(PDF_VERSION);
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));

    let (w, h) = (width as f32, height as f32);
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(w),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(h),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| ConvertError::encode(Format::Pdf, e))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => media_box(w, h),
        "Resources" => dictionary! {
            "XObject" => dictionary! { IMAGE_NAME => image_id },
        },
        "Contents" => content_id,
    });

    // The JPEG stream is already compressed; leave it as is.
    finish_document(doc, pages_id, vec![page_id], false)
}

fn media_box(width: f32, height: f32) -> Vec<Object> {
    vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Real(width),
        Object::Real(height),
    ]
}

fn finish_document(
    mut doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    compress: bool,
) -> Result<Vec<u8>, ConvertError> {
    let count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
        "Count" => count,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if compress {
        doc.compress();
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| ConvertError::encode(Format::Pdf, e))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn save(bytes: &[u8]) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, bytes).unwrap();
        (dir, path)
    }

    #[test]
    fn short_lines_are_untouched() {
        assert_eq!(wrap_line("hello world", 20), vec!["hello world"]);
    }

    #[test]
    fn long_lines_wrap_at_spaces() {
        assert_eq!(
            wrap_line("the quick brown fox jumps", 10),
            vec!["the quick", "brown fox", "jumps"]
        );
    }

    #[test]
    fn long_words_are_split() {
        assert_eq!(wrap_line("abcdefghij xy", 4), vec!["abcd", "efgh", "ij", "xy"]);
    }

    #[test]
    fn tabs_expand_before_wrapping() {
        assert_eq!(wrap_text("a\tb", 80), vec!["a    b"]);
    }

    #[test]
    fn win_ansi_mapping() {
        assert_eq!(encode_win_ansi("Aé€\u{2014}"), vec![b'A', 0xE9, 0x80, 0x97]);
        assert_eq!(encode_win_ansi("日本"), b"??".to_vec());
        assert_eq!(encode_win_ansi("a\u{7}b"), b"ab".to_vec());
    }

    #[test]
    fn page_text_is_normalised() {
        assert_eq!(normalise_page_text("one  \r\ntwo\t\n\n"), "one\ntwo");
    }

    #[test]
    fn text_pdf_round_trip() {
        let text = "Hello PDF\nSecond line\n\nAfter blank";
        let bytes = write_text(text, &TextLayout::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let (_dir, path) = save(&bytes);
        let pages = extract_pages(&path).unwrap();
        assert_eq!(pages.len(), 1);
        let extracted = pages_to_text(&pages);
        for line in ["Hello PDF", "Second line", "After blank"] {
            assert!(extracted.contains(line), "missing {line:?} in {extracted:?}");
        }
    }

    #[test]
    fn long_text_paginates() {
        let layout = TextLayout::default();
        let text: String = (0..layout.lines_per_page() * 2 + 1)
            .map(|i| format!("line {i}\n"))
            .collect();
        let bytes = write_text(&text, &layout).unwrap();
        let (_dir, path) = save(&bytes);
        let pages = extract_pages(&path).unwrap();
        assert_eq!(pages.len(), 3);
        assert!(pages[2].contains(&format!("line {}", layout.lines_per_page() * 2)));
    }

    #[test]
    fn empty_text_gives_one_blank_page() {
        let bytes = write_text("", &TextLayout::default()).unwrap();
        let (_dir, path) = save(&bytes);
        assert_eq!(extract_pages(&path).unwrap(), vec![String::new()]);
    }

    #[test]
    fn document_without_pages_has_no_text() {
        let mut doc = Document::with_version(PDF_VERSION);
        let pages_id = doc.new_object_id();
        let bytes = finish_document(doc, pages_id, Vec::new(), false).unwrap();
        let (_dir, path) = save(&bytes);

        let pages = extract_pages(&path).unwrap();
        assert!(pages.is_empty());
        assert_eq!(pages_to_text(&pages), "");
    }

    #[test]
    fn truncated_file_is_decode_failure() {
        let bytes = write_text("cut short", &TextLayout::default()).unwrap();
        let (_dir, path) = save(&bytes[..24]);
        let err = extract_pages(&path).unwrap_err();
        assert!(matches!(err, ConvertError::DecodeFailure { format: Format::Pdf, .. }));
    }

    #[test]
    fn text_layout_is_deterministic() {
        let layout = TextLayout::default();
        assert_eq!(
            write_text("same input", &layout).unwrap(),
            write_text("same input", &layout).unwrap()
        );
    }

    #[test]
    fn jpeg_page_matches_image_size() {
        // Any bytes will do for the structure check; the stream is opaque.
        let bytes = wrap_jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9], 640, 480).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);

        let page_id = *pages.values().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(media_box[2].as_float().unwrap(), 640.0);
        assert_eq!(media_box[3].as_float().unwrap(), 480.0);
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        assert!(wrap_jpeg(vec![], 0, 10).is_err());
    }

    #[test]
    fn garbage_is_decode_failure() {
        let (_dir, path) = save(b"not a pdf at all");
        let err = extract_pages(&path).unwrap_err();
        assert!(matches!(err, ConvertError::DecodeFailure { format: Format::Pdf, .. }));
    }
}
