//! CSV decode/encode for flat string tables.
//!
//! The first row is the header and defines the field names of every
//! [`Record`]. Missing trailing cells read as empty strings; blank lines are
//! skipped. Quoting follows RFC 4180: fields containing commas, quotes, or
//! line breaks are wrapped in double quotes, with embedded quotes doubled.

use std::path::Path;

use tracing::warn;

use contactscrub_shared::{ContactScrubError, Record, Result};

/// Read a CSV file into records.
pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ContactScrubError::io(path, e))?;
    decode(&content)
}

/// Decode CSV text into records, using the first row as the header.
pub fn decode(input: &str) -> Result<Vec<Record>> {
    // A UTF-8 BOM would otherwise end up glued to the first header name.
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let rows = parse_rows(input)?;

    let mut iter = rows.into_iter();
    let Some(header) = iter.next() else {
        return Ok(Vec::new());
    };

    let mut records = Vec::new();
    for (row_no, row) in iter.enumerate() {
        if row.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        if row.len() > header.len() {
            warn!(
                row = row_no + 2,
                cells = row.len(),
                columns = header.len(),
                "row has more cells than the header; extras ignored"
            );
        }
        let mut record = Record::new();
        for (i, name) in header.iter().enumerate() {
            record.set(name.clone(), row.get(i).cloned().unwrap_or_default());
        }
        records.push(record);
    }
    Ok(records)
}

/// Encode records as CSV text.
///
/// The column set is the first-seen union of field names across all records,
/// so rows enriched with extra fields and rows without them share one header.
/// Absent values are written as empty cells.
pub fn encode(records: &[Record]) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for record in records {
        for name in record.field_names() {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }

    let mut out = String::new();
    push_row(&mut out, columns.iter().copied());
    for record in records {
        push_row(&mut out, columns.iter().map(|name| record.get(name)));
    }
    out
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_cell(out, cell);
    }
    out.push('\n');
}

fn push_cell(out: &mut String, cell: &str) {
    if cell.contains(['"', ',', '\n', '\r']) {
        out.push('"');
        for ch in cell.chars() {
            if ch == '"' {
                out.push('"');
            }
            out.push(ch);
        }
        out.push('"');
    } else {
        out.push_str(cell);
    }
}

/// Split CSV text into rows of cells, honoring quoted fields.
fn parse_rows(input: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;

    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        cell.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => cell.push(ch),
            }
            continue;
        }
        match ch {
            '"' if cell.is_empty() => in_quotes = true,
            ',' => {
                row.push(std::mem::take(&mut cell));
            }
            '\n' | '\r' => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
            }
            _ => cell.push(ch),
        }
    }

    if in_quotes {
        return Err(ContactScrubError::table(format!(
            "row {}: unterminated quoted field",
            rows.len() + 1
        )));
    }

    // Final row without a trailing newline.
    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_simple_table() {
        let csv = "name,email\nAda,ada@example.com\nGrace,grace@example.com\n";
        let records = decode(csv).expect("decode");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name"), "Ada");
        assert_eq!(records[1].get("email"), "grace@example.com");
    }

    #[test]
    fn decode_quoted_fields() {
        let csv = "name,note\n\"Lovelace, Ada\",\"said \"\"hi\"\"\nand left\"\n";
        let records = decode(csv).expect("decode");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("name"), "Lovelace, Ada");
        assert_eq!(records[0].get("note"), "said \"hi\"\nand left");
    }

    #[test]
    fn decode_pads_short_rows() {
        let csv = "name,email,phone\nAda\n";
        let records = decode(csv).expect("decode");
        assert_eq!(records[0].get("name"), "Ada");
        assert_eq!(records[0].get("email"), "");
        assert_eq!(records[0].get("phone"), "");
        assert!(records[0].contains("phone"));
    }

    #[test]
    fn decode_skips_blank_lines() {
        let csv = "name\nAda\n\n\nGrace\n";
        let records = decode(csv).expect("decode");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn decode_crlf_and_bom() {
        let csv = "\u{feff}name,email\r\nAda,ada@example.com\r\n";
        let records = decode(csv).expect("decode");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("name"), "Ada");
    }

    #[test]
    fn decode_header_only_yields_no_records() {
        let records = decode("name,email\n").expect("decode");
        assert!(records.is_empty());
        let records = decode("").expect("decode");
        assert!(records.is_empty());
    }

    #[test]
    fn decode_rejects_unterminated_quote() {
        let err = decode("name\n\"Ada\n").expect_err("should fail");
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn encode_quotes_when_needed() {
        let records: Vec<Record> = vec![
            [("name", "Lovelace, Ada"), ("note", "line1\nline2")]
                .into_iter()
                .collect(),
        ];
        let csv = encode(&records);
        assert_eq!(csv, "name,note\n\"Lovelace, Ada\",\"line1\nline2\"\n");
    }

    #[test]
    fn encode_unions_columns_in_first_seen_order() {
        let a: Record = [("name", "Ada"), ("email", "ada@example.com")]
            .into_iter()
            .collect();
        let b: Record = [("name", "Grace"), ("department", "Engineering")]
            .into_iter()
            .collect();
        let csv = encode(&[a, b]);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("name,email,department"));
        assert_eq!(lines.next(), Some("Ada,ada@example.com,"));
        assert_eq!(lines.next(), Some("Grace,,Engineering"));
    }

    #[test]
    fn roundtrip_preserves_values() {
        let original: Vec<Record> = vec![
            [("name", "Lovelace, Ada"), ("note", "said \"hi\"")]
                .into_iter()
                .collect(),
            [("name", "Grace"), ("note", "")].into_iter().collect(),
        ];
        let decoded = decode(&encode(&original)).expect("decode");
        assert_eq!(decoded, original);
    }
}
