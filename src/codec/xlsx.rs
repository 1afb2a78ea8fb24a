//! Excel workbooks: first-sheet reader and an inline-string writer.
//!
//! The reader locates the first sheet through `xl/workbook.xml` and its
//! relationships, resolves shared strings, and places every cell by its `r`
//! reference so sparse sheets keep their shape. The result is a rectangular
//! grid of strings: rows shorter than the widest row are padded with empty
//! cells, and leading empty rows before the first populated row are dropped.
//!
//! Cell values come back as they are stored: numbers keep their stored
//! lexical form, booleans become `TRUE`/`FALSE`, errors keep their code
//! (`#DIV/0!`). Formulas contribute their cached value.
//!
//! The writer stores every value as an inline string. Nothing is inferred,
//! so `007` stays `007` after a csv → xlsx → csv round trip.

use super::ooxml::{attribute, xml_error, Package, PackageWriter, XmlWriter, OFFICE_DOCUMENT_REL, RELS_CONTENT_TYPE};
use crate::error::ConvertError;
use crate::format::Format;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const SPREADSHEETML_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const WORKSHEET_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const SHEET_NAME: &str = "Sheet1";

/// Worksheet size limits of the file format (column `XFD`, row 1,048,576).
pub const MAX_COLUMNS: usize = 16_384;
pub const MAX_ROWS: usize = 1_048_576;

/// Largest padded grid (rows × columns) the reader will materialise.
pub const MAX_GRID_CELLS: usize = 4_000_000;

/// Rows of the first worksheet as strings.
pub fn read_first_sheet(path: &Path) -> Result<Vec<Vec<String>>, ConvertError> {
    let mut package = Package::open(path, Format::Xlsx)?;

    let workbook_part = package
        .relationships("")?
        .values()
        .find(|rel| rel.rel_type == OFFICE_DOCUMENT_REL)
        .map(|rel| rel.target.clone())
        .unwrap_or_else(|| WORKBOOK_PART.to_string());
    let workbook = package.read_part(&workbook_part)?;
    let rels = package.relationships(&workbook_part)?;

    let sheet_part = match first_sheet_rel_id(&workbook)? {
        Some(id) => rels
            .get(&id)
            .map(|rel| rel.target.clone())
            .ok_or_else(|| {
                ConvertError::decode(Format::Xlsx, format!("sheet relationship '{id}' is missing"))
            })?,
        None => return Err(ConvertError::decode(Format::Xlsx, "workbook has no sheets")),
    };

    let shared = match rels.values().find(|rel| rel.rel_type.ends_with("/sharedStrings")) {
        Some(rel) => {
            let target = rel.target.clone();
            match package.read_optional_part(&target)? {
                Some(xml) => parse_shared_strings(&xml)?,
                None => Vec::new(),
            }
        }
        None => Vec::new(),
    };

    debug!("Reading worksheet {} ({} shared strings)", sheet_part, shared.len());
    let xml = package.read_part(&sheet_part)?;
    parse_sheet(&xml, &shared)
}

/// Relationship id of the first `<sheet>` in the workbook.
fn first_sheet_rel_id(xml: &str) -> Result<Option<String>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(|e| xml_error(Format::Xlsx, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                return attribute(&e, "r:id", Format::Xlsx);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Parse `sharedStrings.xml` into its string table. Rich-text runs are
/// concatenated; phonetic hints (`rPh`) are skipped.
pub fn parse_shared_strings(xml: &str) -> Result<Vec<String>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event().map_err(|e| xml_error(Format::Xlsx, e))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = true;
                    current.clear();
                }
                b"rPh" => phonetic_depth += 1,
                b"t" => in_text = in_item && phonetic_depth == 0,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_text => {
                current.push_str(&t.unescape().map_err(|e| xml_error(Format::Xlsx, e))?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => {
                    strings.push(std::mem::take(&mut current));
                    in_item = false;
                }
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

/// A cell being assembled while its element is open.
#[derive(Default)]
struct PendingCell {
    column: usize,
    cell_type: Option<String>,
    value: Option<String>,
}

/// Parse a worksheet part into a padded grid.
pub fn parse_sheet(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut cells: BTreeMap<usize, BTreeMap<usize, String>> = BTreeMap::new();
    let mut row_index = 0usize;
    let mut next_row = 0usize;
    let mut next_column = 0usize;
    let mut cell: Option<PendingCell> = None;
    // Inside <v>, or inside <t> of an inline string.
    let mut capture = false;
    let mut in_inline = false;

    loop {
        match reader.read_event().map_err(|e| xml_error(Format::Xlsx, e))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_index = within_limit(row_number(&e)?.unwrap_or(next_row), MAX_ROWS, "row")?;
                    next_row = row_index + 1;
                    next_column = 0;
                }
                b"c" => {
                    let column = within_limit(cell_column(&e)?.unwrap_or(next_column), MAX_COLUMNS, "column")?;
                    next_column = column + 1;
                    cell = Some(PendingCell {
                        column,
                        cell_type: attribute(&e, "t", Format::Xlsx)?,
                        value: None,
                    });
                }
                b"v" => capture = cell.is_some(),
                b"is" => in_inline = true,
                b"t" if in_inline => {
                    capture = cell.is_some();
                    if let Some(c) = cell.as_mut() {
                        c.value.get_or_insert_with(String::new);
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_index = within_limit(row_number(&e)?.unwrap_or(next_row), MAX_ROWS, "row")?;
                    next_row = row_index + 1;
                }
                b"c" => {
                    let column = within_limit(cell_column(&e)?.unwrap_or(next_column), MAX_COLUMNS, "column")?;
                    next_column = column + 1;
                }
                _ => {}
            },
            Event::Text(t) if capture => {
                let text = t.unescape().map_err(|e| xml_error(Format::Xlsx, e))?;
                if let Some(c) = cell.as_mut() {
                    c.value.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"is" => in_inline = false,
                b"c" => {
                    if let Some(c) = cell.take() {
                        if let Some(value) = c.value {
                            let value = cell_value(c.cell_type.as_deref(), value, shared)?;
                            cells.entry(row_index).or_default().insert(c.column, value);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    into_grid(cells)
}

fn cell_value(cell_type: Option<&str>, raw: String, shared: &[String]) -> Result<String, ConvertError> {
    match cell_type {
        Some("s") => {
            let index: usize = raw.trim().parse().map_err(|_| {
                ConvertError::decode(Format::Xlsx, format!("bad shared string index '{raw}'"))
            })?;
            shared.get(index).cloned().ok_or_else(|| {
                ConvertError::decode(
                    Format::Xlsx,
                    format!("shared string {index} out of range ({} strings)", shared.len()),
                )
            })
        }
        Some("b") => Ok(if raw.trim() == "1" { "TRUE" } else { "FALSE" }.to_string()),
        _ => Ok(raw),
    }
}

fn into_grid(cells: BTreeMap<usize, BTreeMap<usize, String>>) -> Result<Vec<Vec<String>>, ConvertError> {
    let (Some(&first), Some(&last)) = (cells.keys().next(), cells.keys().next_back()) else {
        return Ok(Vec::new());
    };
    let width = cells
        .values()
        .filter_map(|row| row.keys().next_back())
        .max()
        .map_or(0, |&col| col + 1);

    let height = last - first + 1;
    if height.checked_mul(width).is_none_or(|area| area > MAX_GRID_CELLS) {
        return Err(ConvertError::decode(
            Format::Xlsx,
            format!("sheet spans {height} rows x {width} columns, above the {MAX_GRID_CELLS} cell limit"),
        ));
    }

    Ok((first..=last)
        .map(|r| {
            let mut row = vec![String::new(); width];
            if let Some(values) = cells.get(&r) {
                for (&col, value) in values {
                    row[col] = value.clone();
                }
            }
            row
        })
        .collect())
}

fn within_limit(index: usize, limit: usize, what: &str) -> Result<usize, ConvertError> {
    if index < limit {
        Ok(index)
    } else {
        Err(ConvertError::decode(
            Format::Xlsx,
            format!("{what} {} is beyond the sheet limit of {limit}", index + 1),
        ))
    }
}

fn row_number(e: &BytesStart<'_>) -> Result<Option<usize>, ConvertError> {
    let Some(r) = attribute(e, "r", Format::Xlsx)? else {
        return Ok(None);
    };
    match r.trim().parse::<usize>() {
        Ok(n) if (1..=MAX_ROWS).contains(&n) => Ok(Some(n - 1)),
        _ => Err(ConvertError::decode(Format::Xlsx, format!("invalid row reference '{r}'"))),
    }
}

fn cell_column(e: &BytesStart<'_>) -> Result<Option<usize>, ConvertError> {
    let Some(r) = attribute(e, "r", Format::Xlsx)? else {
        return Ok(None);
    };
    parse_cell_ref(&r)
        .map(|(col, _)| Some(col))
        .ok_or_else(|| ConvertError::decode(Format::Xlsx, format!("invalid cell reference '{r}'")))
}

/// Parse an A1-style reference into zero-based `(column, row)`.
///
/// Returns `None` for malformed references and for anything past `XFD` or
/// row 1,048,576.
pub fn parse_cell_ref(reference: &str) -> Option<(usize, usize)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut column = 0usize;
    for c in letters.chars() {
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        column = column.checked_mul(26)?.checked_add(digit)?;
        if column > MAX_COLUMNS {
            return None;
        }
    }
    let row: usize = digits.parse().ok()?;
    if row == 0 || row > MAX_ROWS {
        return None;
    }
    Some((column - 1, row - 1))
}

/// Zero-based column index to its letter name (0 → `A`, 27 → `AB`).
pub fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

// ── Writing ──────────────────────────────────────────────────────────────

/// Encode `rows` as a single-sheet workbook.
pub fn write_workbook(rows: &[Vec<String>]) -> Result<Vec<u8>, ConvertError> {
    let mut package = PackageWriter::new(Format::Xlsx);
    package.add_part("[Content_Types].xml", &content_types()?)?;
    package.add_part("_rels/.rels", &root_relationships()?)?;
    package.add_part(WORKBOOK_PART, &workbook_xml()?)?;
    package.add_part("xl/_rels/workbook.xml.rels", &workbook_relationships()?)?;
    package.add_part("xl/worksheets/sheet1.xml", &sheet_xml(rows)?)?;
    package.finish()
}

fn content_types() -> Result<Vec<u8>, ConvertError> {
    let mut w = XmlWriter::new(Format::Xlsx)?;
    w.start(
        "Types",
        &[("xmlns", "http://schemas.openxmlformats.org/package/2006/content-types")],
    )?;
    w.empty("Default", &[("Extension", "rels"), ("ContentType", RELS_CONTENT_TYPE)])?;
    w.empty("Default", &[("Extension", "xml"), ("ContentType", "application/xml")])?;
    w.empty(
        "Override",
        &[
            ("PartName", "/xl/workbook.xml"),
            (
                "ContentType",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
            ),
        ],
    )?;
    w.empty(
        "Override",
        &[
            ("PartName", "/xl/worksheets/sheet1.xml"),
            (
                "ContentType",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
            ),
        ],
    )?;
    w.end("Types")?;
    Ok(w.into_bytes())
}

fn root_relationships() -> Result<Vec<u8>, ConvertError> {
    let mut w = XmlWriter::new(Format::Xlsx)?;
    w.start(
        "Relationships",
        &[("xmlns", "http://schemas.openxmlformats.org/package/2006/relationships")],
    )?;
    w.empty(
        "Relationship",
        &[("Id", "rId1"), ("Type", OFFICE_DOCUMENT_REL), ("Target", WORKBOOK_PART)],
    )?;
    w.end("Relationships")?;
    Ok(w.into_bytes())
}

fn workbook_xml() -> Result<Vec<u8>, ConvertError> {
    let mut w = XmlWriter::new(Format::Xlsx)?;
    w.start("workbook", &[("xmlns", SPREADSHEETML_NS), ("xmlns:r", REL_NS)])?;
    w.start("sheets", &[])?;
    w.empty("sheet", &[("name", SHEET_NAME), ("sheetId", "1"), ("r:id", "rId1")])?;
    w.end("sheets")?;
    w.end("workbook")?;
    Ok(w.into_bytes())
}

fn workbook_relationships() -> Result<Vec<u8>, ConvertError> {
    let mut w = XmlWriter::new(Format::Xlsx)?;
    w.start(
        "Relationships",
        &[("xmlns", "http://schemas.openxmlformats.org/package/2006/relationships")],
    )?;
    w.empty(
        "Relationship",
        &[("Id", "rId1"), ("Type", WORKSHEET_REL), ("Target", "worksheets/sheet1.xml")],
    )?;
    w.end("Relationships")?;
    Ok(w.into_bytes())
}

fn sheet_xml(rows: &[Vec<String>]) -> Result<Vec<u8>, ConvertError> {
    let mut w = XmlWriter::new(Format::Xlsx)?;
    w.start("worksheet", &[("xmlns", SPREADSHEETML_NS)])?;

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if !rows.is_empty() && width > 0 {
        let dimension = format!("A1:{}{}", column_name(width - 1), rows.len());
        w.empty("dimension", &[("ref", dimension.as_str())])?;
    }

    w.start("sheetData", &[])?;
    for (r, row) in rows.iter().enumerate() {
        let row_ref = (r + 1).to_string();
        w.start("row", &[("r", row_ref.as_str())])?;
        for (c, value) in row.iter().enumerate() {
            let cell_ref = format!("{}{}", column_name(c), r + 1);
            w.start("c", &[("r", cell_ref.as_str()), ("t", "inlineStr")])?;
            w.start("is", &[])?;
            w.start("t", &[("xml:space", "preserve")])?;
            w.text(value)?;
            w.end("t")?;
            w.end("is")?;
            w.end("c")?;
        }
        w.end("row")?;
    }
    w.end("sheetData")?;
    w.end("worksheet")?;
    Ok(w.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn cell_refs() {
        assert_eq!(parse_cell_ref("A1"), Some((0, 0)));
        assert_eq!(parse_cell_ref("Z9"), Some((25, 8)));
        assert_eq!(parse_cell_ref("AA10"), Some((26, 9)));
        assert_eq!(parse_cell_ref("ab2"), Some((27, 1)));
        assert_eq!(parse_cell_ref("A0"), None);
        assert_eq!(parse_cell_ref("12"), None);
        assert_eq!(parse_cell_ref("XFD1048576"), Some((16_383, 1_048_575)));
        assert_eq!(parse_cell_ref("XFE1"), None);
        assert_eq!(parse_cell_ref("A1048577"), None);
        assert_eq!(parse_cell_ref("AAAAAAAAAAAAAAAAAAAA1"), None);
    }

    #[test]
    fn out_of_range_references_are_decode_failures() {
        for xml in [
            r#"<worksheet><sheetData><row r="1"><c r="AAAAAAAAAAAAAAAAAAAA1"><v>1</v></c></row></sheetData></worksheet>"#,
            r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#,
            r#"<worksheet><sheetData><row r="99999999999"><c><v>1</v></c></row></sheetData></worksheet>"#,
        ] {
            let err = parse_sheet(xml, &[]).unwrap_err();
            assert!(matches!(err, ConvertError::DecodeFailure { format: Format::Xlsx, .. }), "{err}");
        }
    }

    #[test]
    fn sparse_corners_exceeding_grid_limit_are_rejected() {
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1"><v>1</v></c></row>
            <row r="1048576"><c r="XFD1048576"><v>2</v></c></row>
        </sheetData></worksheet>"#;
        let err = parse_sheet(xml, &[]).unwrap_err();
        assert!(err.to_string().contains("cell limit"), "{err}");
    }

    #[test]
    fn column_names() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
    }

    #[test]
    fn sheet_with_mixed_cell_types() {
        let shared = vec!["name".to_string(), "Alice".to_string()];
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>flag</t></is></c></row>
            <row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2" t="b"><v>1</v></c><c r="C2"><f>1+1</f><v>2</v></c></row>
        </sheetData></worksheet>"#;
        let grid = parse_sheet(xml, &shared).unwrap();
        assert_eq!(grid, rows(&[&["name", "flag", ""], &["Alice", "TRUE", "2"]]));
    }

    #[test]
    fn sparse_cells_keep_their_positions() {
        let xml = r#"<worksheet><sheetData>
            <row r="2"><c r="C2"><v>3</v></c></row>
            <row r="4"><c r="A4" s="1"/><c r="B4" t="str"><v>x</v></c></row>
        </sheetData></worksheet>"#;
        let grid = parse_sheet(xml, &[]).unwrap();
        assert_eq!(grid, rows(&[&["", "", "3"], &["", "", ""], &["", "x", ""]]));
    }

    #[test]
    fn bad_shared_index_is_decode_failure() {
        let xml = r#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>5</v></c></row></sheetData></worksheet>"#;
        assert!(matches!(
            parse_sheet(xml, &[]).unwrap_err(),
            ConvertError::DecodeFailure { .. }
        ));
    }

    #[test]
    fn shared_strings_skip_phonetics() {
        let xml = r#"<sst><si><t>plain</t></si><si><r><t>ri</t></r><r><t>ch</t></r><rPh><t>xx</t></rPh></si><si/></sst>"#;
        assert_eq!(parse_shared_strings(xml).unwrap(), vec!["plain", "rich", ""]);
    }

    #[test]
    fn written_workbook_reads_back_as_strings() {
        let data = rows(&[&["id", "name", "note"], &["007", "Bob & Co", ""], &["1.50", "  spaced  ", "x"]]);
        let bytes = write_workbook(&data).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.xlsx");
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(read_first_sheet(&path).unwrap(), data);
    }

    #[test]
    fn empty_workbook_reads_back_empty() {
        let bytes = write_workbook(&[]).unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.xlsx");
        std::fs::write(&path, bytes).unwrap();
        assert!(read_first_sheet(&path).unwrap().is_empty());
    }
}
