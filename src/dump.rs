//! Reader for topic dumps: a stream of records, each made of
//!
//! ```text
//! <offset>\n
//! <key>\n
//! <u32 big-endian length><length bytes of record value>
//! ```
//!
//! The record value is normally a framed payload (see [`crate::framing`]).

use std::io::{BufRead, Read};

use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRecord {
    pub offset: String,
    pub key: String,
    pub value: Vec<u8>,
}

/// Iterator over the records of a dump stream.
///
/// Stops at the first error.
#[derive(Debug)]
pub struct DumpReader<R> {
    reader: R,
    done: bool,
}

impl<R: BufRead> DumpReader<R> {
    pub fn new(reader: R) -> Self {
        DumpReader {
            reader,
            done: false,
        }
    }

    fn read_record(&mut self) -> Result<Option<DumpRecord>> {
        let mut offset = String::new();
        if self.reader.read_line(&mut offset)? == 0 {
            return Ok(None);
        }
        let mut key = String::new();
        self.reader.read_line(&mut key)?;

        let mut header = Vec::with_capacity(4);
        (&mut self.reader).take(4).read_to_end(&mut header)?;
        let length = match <[u8; 4]>::try_from(header.as_slice()) {
            Ok(bytes) => u32::from_be_bytes(bytes),
            Err(_) if header.is_empty() => return Ok(None),
            Err(_) => {
                return Err(Error::MalformedRecord {
                    reason: format!("unexpected end of stream after {} of 4 length bytes", header.len()),
                })
            }
        };

        // The declared length is untrusted; only buffer what actually arrives.
        let mut value = Vec::new();
        let read = (&mut self.reader).take(u64::from(length)).read_to_end(&mut value)?;
        if read as u64 != u64::from(length) {
            return Err(Error::MalformedRecord {
                reason: format!("record value truncated: expected {length} bytes, got {read}"),
            });
        }

        Ok(Some(DumpRecord {
            offset: strip_line_ending(offset),
            key: strip_line_ending(key),
            value,
        }))
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<DumpRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Prefix a JSON object with the record's `@offset` and `@key`.
///
/// The offset is emitted as a number when it parses as one.
pub fn annotate_record(record: &DumpRecord, json: &str) -> String {
    let offset = match record.offset.trim().parse::<i64>() {
        Ok(offset) => offset.to_string(),
        Err(_) => Value::String(record.offset.clone()).to_string(),
    };
    let key = Value::String(record.key.clone()).to_string();
    let header = format!("\"@offset\":{offset},\"@key\":{key}");

    match json.trim_start().strip_prefix('{') {
        Some(rest) if rest.trim_start().starts_with('}') => format!("{{{header}}}"),
        Some(rest) => format!("{{{header},{rest}"),
        None => format!("{{{header},\"@value\":{json}}}"),
    }
}

fn strip_line_ending(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_bytes(offset: &str, key: &str, value: &[u8]) -> Vec<u8> {
        let mut bytes = format!("{offset}\n{key}\n").into_bytes();
        bytes.extend_from_slice(&(value.len() as u32).to_be_bytes());
        bytes.extend_from_slice(value);
        bytes
    }

    #[test]
    fn reads_consecutive_records() {
        let mut stream = record_bytes("17", "user-1", &[0x00, 0x01]);
        stream.extend(record_bytes("18", "user-2", &[]));

        let records: Vec<DumpRecord> = DumpReader::new(stream.as_slice())
            .collect::<Result<_>>()
            .expect("records should parse");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, "17");
        assert_eq!(records[0].key, "user-1");
        assert_eq!(records[0].value, vec![0x00, 0x01]);
        assert_eq!(records[1].key, "user-2");
        assert!(records[1].value.is_empty());
    }

    #[test]
    fn truncated_value_is_reported() {
        let mut stream = record_bytes("1", "k", &[1, 2, 3, 4]);
        stream.truncate(stream.len() - 2);

        let mut reader = DumpReader::new(stream.as_slice());
        let err = reader.next().expect("one item").expect_err("truncated");
        assert!(err.to_string().contains("expected 4 bytes, got 2"));
        assert!(reader.next().is_none());
    }

    #[test]
    fn oversized_length_header_fails_without_the_full_body() {
        let mut stream = b"5\nk\n".to_vec();
        stream.extend_from_slice(&0xFFFF_FFF0u32.to_be_bytes());
        stream.extend_from_slice(&[1, 2, 3]);

        let err = DumpReader::new(stream.as_slice())
            .next()
            .expect("one item")
            .expect_err("body is far shorter than declared");
        assert!(matches!(err, Error::MalformedRecord { .. }));
        assert!(err.to_string().contains("expected 4294967280 bytes, got 3"));
    }

    #[test]
    fn partial_length_header_is_reported() {
        let stream = b"5\nk\n\x00\x00".to_vec();
        let err = DumpReader::new(stream.as_slice())
            .next()
            .expect("one item")
            .expect_err("header cut short");
        assert!(err.to_string().contains("after 2 of 4 length bytes"));
    }

    #[test]
    fn annotate_prefixes_offset_and_escaped_key() {
        let record = DumpRecord {
            offset: "42".to_string(),
            key: "a\"b".to_string(),
            value: Vec::new(),
        };

        let annotated = annotate_record(&record, r#"{"x":3}"#);
        assert_eq!(annotated, r#"{"@offset":42,"@key":"a\"b","x":3}"#);

        let empty = annotate_record(&record, "{}");
        let parsed: Value = serde_json::from_str(&empty).expect("valid JSON");
        assert_eq!(parsed["@offset"], 42);
        assert_eq!(parsed["@key"], "a\"b");
    }
}
