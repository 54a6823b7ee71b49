//! Minimal comma-separated reader/writer (quotes + CRLF tolerant), enough for
//! the fixed-shape stage files. Every stage file carries a header row.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::mem::take;
use std::path::Path;

use crate::types::Record;

#[derive(Debug, thiserror::Error)]
pub enum CsvError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Missing header row in {0}")]
    MissingHeader(String),
}

pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next(); // double-quote escape
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    // Flush a trailing row with no final newline.
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// Reads a whole stage file: header row plus one `Record` per data row.
pub fn read_records(path: &Path) -> Result<(Vec<String>, Vec<Record>), CsvError> {
    let text = fs::read_to_string(path)?;
    let mut rows = parse_rows(&text);
    if rows.is_empty() {
        return Err(CsvError::MissingHeader(path.display().to_string()));
    }
    let header = rows.remove(0);
    let records = rows
        .iter()
        .map(|row| Record::from_row(&header, row))
        .collect();
    Ok((header, records))
}

/// Streaming stage-file writer. Each record is flushed as it is written, so a
/// crash mid-run loses at most the row in flight.
pub struct CsvWriter {
    inner: BufWriter<File>,
}

impl CsvWriter {
    pub fn create(path: &Path, header: &[String]) -> Result<CsvWriter, CsvError> {
        let mut writer = CsvWriter {
            inner: BufWriter::new(File::create(path)?),
        };
        writer.write_row(header.iter().map(String::as_str))?;
        Ok(writer)
    }

    pub fn write_record(&mut self, record: &Record) -> Result<(), CsvError> {
        self.write_row(record.values())?;
        self.inner.flush()?;
        Ok(())
    }

    fn write_row<'a>(
        &mut self,
        cells: impl Iterator<Item = &'a str>,
    ) -> Result<(), CsvError> {
        let mut first = true;
        for cell in cells {
            if !first {
                write!(self.inner, ",")?;
            }
            first = false;
            if needs_quotes(cell) {
                write!(self.inner, "\"{}\"", cell.replace('"', "\"\""))?;
            } else {
                write!(self.inner, "{cell}")?;
            }
        }
        writeln!(self.inner)?;
        Ok(())
    }
}

fn needs_quotes(cell: &str) -> bool {
    cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("homescout_csv_{}_{}", name, std::process::id()))
    }

    #[test]
    fn test_parse_plain_rows() {
        let rows = parse_rows("a,b,c\n1,2,3\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["a", "b", "c"]);
        assert_eq!(rows[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn test_parse_quoted_fields() {
        let rows = parse_rows("Address,Price\n\"123 Oak St, Metairie, LA\",\"$199,000\"\n");
        assert_eq!(rows[1][0], "123 Oak St, Metairie, LA");
        assert_eq!(rows[1][1], "$199,000");
    }

    #[test]
    fn test_parse_escaped_quotes_and_crlf() {
        let rows = parse_rows("name\r\n\"say \"\"hi\"\"\"\r\n");
        assert_eq!(rows[1][0], "say \"hi\"");
    }

    #[test]
    fn test_parse_trailing_row_without_newline() {
        let rows = parse_rows("a,b\n1,2");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["1", "2"]);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let rows = parse_rows("a,b\n\n1,2\n\n");
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_read_records_missing_file() {
        let path = temp_path("no_such_file");
        assert!(read_records(&path).is_err());
    }

    #[test]
    fn test_read_records_empty_file_is_missing_header() {
        let path = temp_path("empty");
        fs::write(&path, "").unwrap();
        assert!(matches!(
            read_records(&path),
            Err(CsvError::MissingHeader(_))
        ));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let path = temp_path("round_trip");
        let header = vec!["Street".to_string(), "Price".to_string()];
        {
            let mut writer = CsvWriter::create(&path, &header).unwrap();
            let mut record = Record::new();
            record.set("Street", "123 Oak St, Apt 2");
            record.set("Price", "$199,000");
            writer.write_record(&record).unwrap();
        }
        let (read_header, records) = read_records(&path).unwrap();
        assert_eq!(read_header, header);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("Street"), Some("123 Oak St, Apt 2"));
        assert_eq!(records[0].get("Price"), Some("$199,000"));
        let _ = fs::remove_file(&path);
    }
}
