//! Delimited text tables (csv, and the tab-separated form used for txt
//! renderings of spreadsheets).
//!
//! Reading is lenient about shape: records may have different lengths, and
//! a leading UTF-8 byte-order mark is dropped. Every field is kept as a
//! string. Writing quotes only where needed and ends every record with `\n`.

use crate::error::ConvertError;
use crate::format::Format;
use csv::{ReaderBuilder, Terminator, WriterBuilder};
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Field separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
}

impl Delimiter {
    fn byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
        }
    }
}

/// Read every record of a csv file, header row included.
pub fn read_records(path: &Path) -> Result<Vec<Vec<String>>, ConvertError> {
    let bytes = std::fs::read(path).map_err(|e| ConvertError::decode(Format::Csv, e))?;
    parse_records(&bytes, Delimiter::Comma)
}

/// Parse delimited bytes into records.
pub fn parse_records(bytes: &[u8], delimiter: Delimiter) -> Result<Vec<Vec<String>>, ConvertError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter.byte())
        .from_reader(bytes);

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ConvertError::decode(Format::Csv, e))?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok(records)
}

/// Encode records with `delimiter`. `format` names the target in errors.
pub fn write_records(
    records: &[Vec<String>],
    delimiter: Delimiter,
    format: Format,
) -> Result<Vec<u8>, ConvertError> {
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .delimiter(delimiter.byte())
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    for record in records {
        writer
            .write_record(record)
            .map_err(|e| ConvertError::encode(format, e))?;
    }
    writer
        .into_inner()
        .map_err(|e| ConvertError::encode(format, e.error()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn header_is_an_ordinary_record() {
        let records = parse_records(b"id,name\n1,Alice\n", Delimiter::Comma).unwrap();
        assert_eq!(records, owned(&[&["id", "name"], &["1", "Alice"]]));
    }

    #[test]
    fn ragged_rows_and_bom() {
        let records = parse_records(b"\xEF\xBB\xBFa,b,c\n1\n\"x,y\",2\n", Delimiter::Comma).unwrap();
        assert_eq!(records, owned(&[&["a", "b", "c"], &["1"], &["x,y", "2"]]));
    }

    #[test]
    fn invalid_utf8_is_decode_failure() {
        let err = parse_records(b"ok\n\xFF\xFE\n", Delimiter::Comma).unwrap_err();
        assert!(matches!(err, ConvertError::DecodeFailure { format: Format::Csv, .. }));
    }

    #[test]
    fn writer_quotes_only_when_needed() {
        let records = owned(&[&["id", "note"], &["1", "has, comma"], &["2", "say \"hi\""]]);
        let bytes = write_records(&records, Delimiter::Comma, Format::Csv).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "id,note\n1,\"has, comma\"\n2,\"say \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn tab_separated_output() {
        let records = owned(&[&["a", "b"], &["1", "2"]]);
        let bytes = write_records(&records, Delimiter::Tab, Format::Txt).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "a\tb\n1\t2\n");
    }

    #[test]
    fn written_records_parse_back() {
        let records = owned(&[&["multi\nline", ""], &["007", " padded "]]);
        let bytes = write_records(&records, Delimiter::Comma, Format::Csv).unwrap();
        assert_eq!(parse_records(&bytes, Delimiter::Comma).unwrap(), records);
    }
}
