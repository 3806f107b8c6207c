//! Record model
//!
//! A deployment stores exactly one record shape for its whole lifetime. The
//! shape is a type parameter of every store rather than a runtime enum, so a
//! store opened for [`StructuredRecord`]s can never hand back an
//! [`OpaqueRecord`].
//!
//! Each shape knows three representations:
//!
//! - the wire form a client POSTs (raw bytes, or a JSON object)
//! - the wire form of a whole sequence returned by GET
//! - the single-line storage form used by the file backend

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::StorageError;

/// Which record shape a deployment stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordFormat {
    /// One opaque line of text per record
    Opaque,
    /// JSON status entries (`service`, `timestamp`, `uptime_seconds`, `free_mb`)
    #[default]
    Structured,
}

impl RecordFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordFormat::Opaque => "opaque",
            RecordFormat::Structured => "structured",
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a record format name is not recognised
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown record format `{0}` (expected `opaque` or `structured`)")]
pub struct UnknownRecordFormat(pub String);

impl FromStr for RecordFormat {
    type Err = UnknownRecordFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opaque" => Ok(RecordFormat::Opaque),
            "structured" => Ok(RecordFormat::Structured),
            other => Err(UnknownRecordFormat(other.to_string())),
        }
    }
}

/// A record shape storable in a [`LogStore`](crate::LogStore)
///
/// Records are immutable once decoded; stores only ever clone and compare
/// them.
pub trait Record: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// The shape this type implements
    const FORMAT: RecordFormat;

    /// Content type of [`Record::encode_all`] output
    const CONTENT_TYPE: &'static str;

    /// Decode one record from a request body
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::EmptyRecord`] for empty input and
    /// [`StorageError::MalformedRecord`] when the body does not describe a
    /// record of this shape.
    fn decode(body: &[u8]) -> Result<Self, StorageError>;

    /// Encode a whole sequence, oldest first, for a response body
    fn encode_all(records: &[Self]) -> Result<Bytes, StorageError>;

    /// Single-line storage form, without the line terminator
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotLineSafe`] when the record cannot be stored
    /// on one line.
    fn to_line(&self) -> Result<Bytes, StorageError>;

    /// Decode the storage form written by [`Record::to_line`]
    fn from_line(line: &[u8]) -> Result<Self, StorageError>;
}

/// Strip exactly one trailing `\n` or `\r\n`
fn trim_line_terminator(body: &[u8]) -> &[u8] {
    if let Some(rest) = body.strip_suffix(b"\r\n") {
        rest
    } else if let Some(rest) = body.strip_suffix(b"\n") {
        rest
    } else {
        body
    }
}

/// Records in the flat file are split on `\n` alone, so a bare `\r` is safe.
fn contains_line_terminator(bytes: &[u8]) -> bool {
    bytes.contains(&b'\n')
}

/// A single uninterpreted line of log text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpaqueRecord(Bytes);

impl OpaqueRecord {
    /// Create a record from raw bytes
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::EmptyRecord`] if `bytes` is empty.
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self, StorageError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(StorageError::EmptyRecord);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Whether the record can be written as one line of a flat file
    pub fn is_line_safe(&self) -> bool {
        !contains_line_terminator(&self.0)
    }
}

impl Record for OpaqueRecord {
    const FORMAT: RecordFormat = RecordFormat::Opaque;
    const CONTENT_TYPE: &'static str = "text/plain; charset=utf-8";

    fn decode(body: &[u8]) -> Result<Self, StorageError> {
        Self::new(Bytes::copy_from_slice(trim_line_terminator(body)))
    }

    fn encode_all(records: &[Self]) -> Result<Bytes, StorageError> {
        let len = records.iter().map(|r| r.0.len() + 1).sum();
        let mut out = BytesMut::with_capacity(len);
        for record in records {
            out.put_slice(&record.0);
            out.put_u8(b'\n');
        }
        Ok(out.freeze())
    }

    fn to_line(&self) -> Result<Bytes, StorageError> {
        if !self.is_line_safe() {
            return Err(StorageError::NotLineSafe);
        }
        Ok(self.0.clone())
    }

    fn from_line(line: &[u8]) -> Result<Self, StorageError> {
        Self::new(Bytes::copy_from_slice(line))
            .map_err(|_| StorageError::serialization("empty line in log file"))
    }
}

/// A service status entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructuredRecord {
    /// Reporting service name, never empty
    pub service: String,
    /// Caller-supplied ISO-8601 timestamp, stored as given
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub free_mb: i64,
}

impl StructuredRecord {
    pub fn new(
        service: impl Into<String>,
        timestamp: impl Into<String>,
        uptime_seconds: u64,
        free_mb: i64,
    ) -> Self {
        Self {
            service: service.into(),
            timestamp: timestamp.into(),
            uptime_seconds,
            free_mb,
        }
    }
}

impl Record for StructuredRecord {
    const FORMAT: RecordFormat = RecordFormat::Structured;
    const CONTENT_TYPE: &'static str = "application/json";

    fn decode(body: &[u8]) -> Result<Self, StorageError> {
        if body.trim_ascii().is_empty() {
            return Err(StorageError::EmptyRecord);
        }

        // Parse to a value first: serde would otherwise also accept a struct
        // written as a JSON array.
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| StorageError::malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(StorageError::malformed("expected a JSON object"));
        }

        let record: StructuredRecord =
            serde_json::from_value(value).map_err(|e| StorageError::malformed(e.to_string()))?;
        if record.service.is_empty() {
            return Err(StorageError::malformed("`service` must not be empty"));
        }
        Ok(record)
    }

    fn encode_all(records: &[Self]) -> Result<Bytes, StorageError> {
        serde_json::to_vec(records)
            .map(Bytes::from)
            .map_err(|e| StorageError::serialization(e.to_string()))
    }

    fn to_line(&self) -> Result<Bytes, StorageError> {
        // Compact JSON escapes control characters, so the line is always safe.
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| StorageError::serialization(e.to_string()))
    }

    fn from_line(line: &[u8]) -> Result<Self, StorageError> {
        serde_json::from_slice(line).map_err(|e| StorageError::serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_record() -> StructuredRecord {
        StructuredRecord::new("api", "2025-01-01T00:00:00Z", 10, 512)
    }

    #[test]
    fn test_record_format_parse() {
        assert_eq!("opaque".parse::<RecordFormat>().unwrap(), RecordFormat::Opaque);
        assert_eq!(" Structured ".parse::<RecordFormat>().unwrap(), RecordFormat::Structured);
        let err = "csv".parse::<RecordFormat>().unwrap_err();
        assert_eq!(err, UnknownRecordFormat("csv".into()));
    }

    #[test]
    fn test_opaque_trims_one_terminator() {
        let record = OpaqueRecord::decode(b"hello\n").unwrap();
        assert_eq!(record.as_bytes(), b"hello");

        let record = OpaqueRecord::decode(b"hello\r\n").unwrap();
        assert_eq!(record.as_bytes(), b"hello");

        // Only one terminator is removed
        let record = OpaqueRecord::decode(b"hello\n\n").unwrap();
        assert_eq!(record.as_bytes(), b"hello\n");
    }

    #[test]
    fn test_opaque_accepts_arbitrary_bytes() {
        let record = OpaqueRecord::decode(&[0xff, 0xfe, b' ']).unwrap();
        assert_eq!(record.as_bytes(), &[0xff, 0xfe, b' ']);

        let record = OpaqueRecord::decode(b"   ").unwrap();
        assert_eq!(record.as_bytes(), b"   ");
    }

    #[test]
    fn test_opaque_rejects_empty() {
        assert!(matches!(OpaqueRecord::decode(b""), Err(StorageError::EmptyRecord)));
        assert!(matches!(OpaqueRecord::decode(b"\n"), Err(StorageError::EmptyRecord)));
        assert!(matches!(OpaqueRecord::decode(b"\r\n"), Err(StorageError::EmptyRecord)));
    }

    #[test]
    fn test_opaque_line_safety() {
        let record = OpaqueRecord::decode(b"first\nsecond").unwrap();
        assert!(!record.is_line_safe());
        assert!(matches!(record.to_line(), Err(StorageError::NotLineSafe)));

        let record = OpaqueRecord::decode(b"carriage\rreturn").unwrap();
        assert!(record.is_line_safe());
        assert_eq!(&record.to_line().unwrap()[..], b"carriage\rreturn");

        let record = OpaqueRecord::decode(b"one line").unwrap();
        assert_eq!(&record.to_line().unwrap()[..], b"one line");
    }

    #[test]
    fn test_opaque_encode_all() {
        let records = vec![
            OpaqueRecord::decode(b"hello").unwrap(),
            OpaqueRecord::decode(b"world").unwrap(),
        ];
        assert_eq!(&OpaqueRecord::encode_all(&records).unwrap()[..], b"hello\nworld\n");
        assert!(OpaqueRecord::encode_all(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_opaque_empty_line_is_corruption() {
        let err = OpaqueRecord::from_line(b"").unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn test_structured_decode() {
        let body = br#"{"service":"api","timestamp":"2025-01-01T00:00:00Z","uptime_seconds":10,"free_mb":512}"#;
        assert_eq!(StructuredRecord::decode(body).unwrap(), api_record());
    }

    #[test]
    fn test_structured_ignores_unknown_fields() {
        let body = br#"{"service":"api","timestamp":"2025-01-01T00:00:00Z","uptime_seconds":10,"free_mb":512,"host":"a"}"#;
        assert_eq!(StructuredRecord::decode(body).unwrap(), api_record());
    }

    #[test]
    fn test_structured_free_mb_may_be_negative() {
        let body = br#"{"service":"api","timestamp":"t","uptime_seconds":0,"free_mb":-3}"#;
        assert_eq!(StructuredRecord::decode(body).unwrap().free_mb, -3);
    }

    #[test]
    fn test_structured_rejects_missing_fields() {
        let err = StructuredRecord::decode(br#"{"service": "x"}"#).unwrap_err();
        assert!(matches!(err, StorageError::MalformedRecord(_)));
    }

    #[test]
    fn test_structured_rejects_wrong_types() {
        let cases: &[&[u8]] = &[
            br#"{"service":"api","timestamp":"t","uptime_seconds":"10","free_mb":512}"#,
            br#"{"service":"api","timestamp":"t","uptime_seconds":-1,"free_mb":512}"#,
            br#"{"service":"api","timestamp":"t","uptime_seconds":1.5,"free_mb":512}"#,
            br#"{"service":null,"timestamp":"t","uptime_seconds":1,"free_mb":512}"#,
            br#"{"service":"","timestamp":"t","uptime_seconds":1,"free_mb":512}"#,
            br#"["api","t",10,512]"#,
            b"not json",
        ];
        for body in cases {
            let err = StructuredRecord::decode(body).unwrap_err();
            assert!(
                matches!(err, StorageError::MalformedRecord(_)),
                "expected malformed for {:?}, got {:?}",
                String::from_utf8_lossy(body),
                err
            );
        }
    }

    #[test]
    fn test_structured_rejects_empty() {
        assert!(matches!(StructuredRecord::decode(b""), Err(StorageError::EmptyRecord)));
        assert!(matches!(StructuredRecord::decode(b" \n"), Err(StorageError::EmptyRecord)));
    }

    #[test]
    fn test_structured_encode_all() {
        let body = StructuredRecord::encode_all(&[api_record()]).unwrap();
        assert_eq!(
            &body[..],
            br#"[{"service":"api","timestamp":"2025-01-01T00:00:00Z","uptime_seconds":10,"free_mb":512}]"#
        );
        assert_eq!(&StructuredRecord::encode_all(&[]).unwrap()[..], b"[]");
    }

    #[test]
    fn test_structured_line_form_is_single_line() {
        let record = StructuredRecord::new("multi\nline", "2025\r\n", 1, 2);
        let line = record.to_line().unwrap();
        assert!(!contains_line_terminator(&line));
        assert_eq!(StructuredRecord::from_line(&line).unwrap(), record);
    }
}
