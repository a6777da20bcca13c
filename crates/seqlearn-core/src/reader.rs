//! # Data reader for IWA-formatted training data
//!
//! One item per line, tab-separated: the first field is the label and the
//! remaining fields are attributes written as `NAME` or `NAME:WEIGHT`. A blank
//! line closes the current instance. Inside an attribute name, `\:` and `\\`
//! escape a literal colon and backslash.
//!
//! ```text
//! B-NP	w[0]=He	pos[0]=PRP
//! B-VP	w[0]=reckons	suffix:0.5
//!
//! ```

use std::io::BufRead;

use tracing::warn;

use crate::error::{Result, SeqlearnError};

/// One labeled position as it appears in the source, before encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub label: String,
    pub attributes: Vec<(String, f64)>,
}

/// One instance as it appears in the source, before encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub items: Vec<RawItem>,
    pub weight: f64,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            weight: 1.0,
        }
    }
}

/// Source of raw training records.
///
/// The parsing policy (what is malformed, whether to skip or fail) belongs to
/// the reader; the corpus only encodes what it is handed.
pub trait DataReader {
    /// Return the next record, or `None` at end of input.
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Number of malformed lines skipped so far.
    fn skipped(&self) -> usize {
        0
    }
}

/// Reader for the item-with-attributes text format.
pub struct IwaReader<R> {
    inner: R,
    source_name: String,
    line_no: usize,
    strict: bool,
    skipped: usize,
    buf: String,
}

impl<R: BufRead> IwaReader<R> {
    /// Create a reader. `source_name` is only used in diagnostics.
    pub fn new(inner: R, source_name: impl Into<String>) -> Self {
        Self {
            inner,
            source_name: source_name.into(),
            line_no: 0,
            strict: false,
            skipped: 0,
            buf: String::new(),
        }
    }

    /// Fail on malformed lines instead of skipping them.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn malformed(&mut self, reason: String) -> Result<()> {
        if self.strict {
            return Err(SeqlearnError::MalformedRecord {
                line: self.line_no,
                reason,
            });
        }
        warn!(
            source = %self.source_name,
            line = self.line_no,
            "skipping malformed line: {}",
            reason
        );
        self.skipped += 1;
        Ok(())
    }
}

impl<R: BufRead> DataReader for IwaReader<R> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let mut record = Record::default();

        loop {
            self.buf.clear();
            if self.inner.read_line(&mut self.buf)? == 0 {
                // Don't forget the last instance
                return Ok((!record.items.is_empty()).then_some(record));
            }
            self.line_no += 1;

            let line = self.buf.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if record.items.is_empty() {
                    continue;
                }
                return Ok(Some(record));
            }

            if let Some(decl) = line.strip_prefix('@') {
                match parse_declaration(decl) {
                    Ok(Some(weight)) => record.weight = weight,
                    Ok(None) => {
                        warn!(
                            source = %self.source_name,
                            line = self.line_no,
                            "ignoring unknown declaration: @{}",
                            decl
                        );
                    }
                    Err(reason) => self.malformed(reason)?,
                }
                continue;
            }

            match parse_item(line) {
                Ok(item) => record.items.push(item),
                Err(reason) => self.malformed(reason)?,
            }
        }
    }

    fn skipped(&self) -> usize {
        self.skipped
    }
}

/// `@weight:<float>` returns the weight; other declarations return `None`.
fn parse_declaration(decl: &str) -> std::result::Result<Option<f64>, String> {
    let Some(value) = decl.strip_prefix("weight:") else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|w| w.is_finite())
        .map(Some)
        .ok_or_else(|| format!("invalid instance weight {:?}", value))
}

fn parse_item(line: &str) -> std::result::Result<RawItem, String> {
    let mut fields = line.split('\t');
    let label = fields.next().unwrap_or_default();
    if label.is_empty() {
        return Err("empty label".to_string());
    }

    let mut attributes = Vec::new();
    for field in fields {
        if field.is_empty() {
            continue;
        }
        attributes.push(parse_attribute(field)?);
    }

    Ok(RawItem {
        label: label.to_string(),
        attributes,
    })
}

/// Split `NAME[:WEIGHT]` on the last unescaped colon, unescaping the name.
fn parse_attribute(field: &str) -> std::result::Result<(String, f64), String> {
    let mut name = String::with_capacity(field.len());
    // (length of `name` before the colon, byte offset of the weight in `field`)
    let mut last_colon: Option<(usize, usize)> = None;
    let mut chars = field.char_indices();

    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => name.push(escaped),
                None => name.push('\\'),
            },
            ':' => {
                last_colon = Some((name.len(), idx + 1));
                name.push(':');
            }
            _ => name.push(c),
        }
    }

    let weight = match last_colon {
        Some((name_len, value_at)) => {
            let raw = &field[value_at..];
            let weight = raw
                .parse::<f64>()
                .ok()
                .filter(|w| w.is_finite())
                .ok_or_else(|| format!("invalid attribute weight {:?} in {:?}", raw, field))?;
            name.truncate(name_len);
            weight
        }
        None => 1.0,
    };

    if name.is_empty() {
        return Err(format!("empty attribute name in {:?}", field));
    }
    Ok((name, weight))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(input: &str) -> (Vec<Record>, usize) {
        let mut reader = IwaReader::new(input.as_bytes(), "test");
        let mut records = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            records.push(record);
        }
        (records, reader.skipped())
    }

    #[test]
    fn test_reads_instances_separated_by_blank_lines() {
        let input = "B\tw=He\tpos=PRP\nI\tw=ran\n\nO\tw=.\n\n";
        let (records, skipped) = read_all(input);

        assert_eq!(skipped, 0);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].items.len(), 2);
        assert_eq!(records[0].items[0].label, "B");
        assert_eq!(
            records[0].items[0].attributes,
            vec![("w=He".to_string(), 1.0), ("pos=PRP".to_string(), 1.0)]
        );
        assert_eq!(records[1].items[0].label, "O");
    }

    #[test]
    fn test_last_instance_without_trailing_blank_line() {
        let (records, _) = read_all("A\tx\nB\ty");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].items.len(), 2);
    }

    #[test]
    fn test_repeated_blank_lines_do_not_create_empty_instances() {
        let (records, _) = read_all("\n\nA\tx\n\n\n\nB\ty\n");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_weights_and_escapes() {
        let (records, _) = read_all("L\tsuffix:0.5\ttime\\:12\\:30\tpath\\\\x:2\n");
        let attrs = &records[0].items[0].attributes;

        assert_eq!(attrs[0], ("suffix".to_string(), 0.5));
        assert_eq!(attrs[1], ("time:12:30".to_string(), 1.0));
        assert_eq!(attrs[2], ("path\\x".to_string(), 2.0));
    }

    #[test]
    fn test_item_without_attributes() {
        let (records, _) = read_all("O\n");
        assert_eq!(records[0].items[0].attributes.len(), 0);
    }

    #[test]
    fn test_weight_declaration() {
        let (records, _) = read_all("@weight:2.5\nA\tx\n\nB\ty\n");
        assert_eq!(records[0].weight, 2.5);
        assert_eq!(records[1].weight, 1.0);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let (records, skipped) = read_all("A\tx\n\ty\nB\tz:abc\nC\tw\n");
        assert_eq!(skipped, 2);
        assert_eq!(records.len(), 1);
        let labels: Vec<_> = records[0].items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "C"]);
    }

    #[test]
    fn test_strict_mode_fails_on_malformed_line() {
        let mut reader = IwaReader::new("A\tx\n\ty\n".as_bytes(), "test").strict(true);
        let err = reader.next_record().unwrap_err();
        assert!(matches!(err, SeqlearnError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn test_crlf_line_endings() {
        let (records, _) = read_all("A\tx\r\n\r\nB\ty\r\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].items[0].attributes[0].0, "x");
    }
}
