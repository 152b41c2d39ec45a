//! Decompression, framing, and record extraction for delivered log objects.
//!
//! An object is expected to hold exactly one gzip-compressed JSON document
//! on its first line. Log delivery writes CloudTrail payloads this way;
//! digests and other snapshot types dropped into the same bucket parse fine
//! but carry no `Records` envelope and are reported as not applicable.

use anyhow::Result;
use async_compression::tokio::bufread::GzipDecoder;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::AsyncBufRead;
use tokio_util::codec::{FramedRead, LinesCodec};

use crate::errors::IngestError;

/// Result of looking for event records in a parsed envelope document.
#[derive(Debug)]
pub enum Extraction {
    /// The envelope wrapped an ordered sequence of event records.
    Records(Vec<Value>),
    /// A well-formed object that is simply not our data. Not an error.
    NotApplicable,
}

const RECORDS_FIELD: &str = "Records";

/// Decompresses the object body and parses the first decompressed line as
/// the envelope document.
pub async fn read_envelope<R>(reader: R) -> Result<Value>
where
    R: AsyncBufRead + Send + Unpin,
{
    let mut decoder = GzipDecoder::new(reader);
    decoder.multiple_members(true);
    let mut lines = FramedRead::new(decoder, LinesCodec::new());

    let first = lines
        .next()
        .await
        .ok_or_else(|| IngestError::Format("object decompressed to nothing".to_string()))?
        .map_err(|e| IngestError::Format(format!("gzip decode failed: {}", e)))?;

    let doc = serde_json::from_str(&first)
        .map_err(|e| IngestError::Format(format!("envelope is not valid JSON: {}", e)))?;
    Ok(doc)
}

/// Pulls the event records out of an envelope document. Presence of a usable
/// records sequence is the only validation done here; individual records are
/// checked later, one at a time.
pub fn extract_records(doc: Value) -> Extraction {
    match doc {
        Value::Object(mut envelope) => match envelope.remove(RECORDS_FIELD) {
            Some(Value::Array(records)) => Extraction::Records(records),
            _ => Extraction::NotApplicable,
        },
        _ => Extraction::NotApplicable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn reads_first_line_of_gzipped_document() {
        let body = gzip(br#"{"Records":[{"eventName":"Invoke"}]}"#);
        let doc = read_envelope(&body[..]).await.unwrap();
        assert_eq!(doc["Records"][0]["eventName"], "Invoke");
    }

    #[tokio::test]
    async fn corrupt_gzip_is_a_format_error() {
        let err = read_envelope(&b"not gzip at all"[..]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::Format(_))
        ));
    }

    #[tokio::test]
    async fn non_json_first_line_is_a_format_error() {
        let body = gzip(b"plain text, definitely not an envelope");
        let err = read_envelope(&body[..]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::Format(_))
        ));
    }

    #[tokio::test]
    async fn empty_body_is_a_format_error() {
        let body = gzip(b"");
        let err = read_envelope(&body[..]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::Format(_))
        ));
    }

    #[test]
    fn extracts_records_in_order() {
        let doc = serde_json::json!({"Records": [{"n": 1}, {"n": 2}, {"n": 3}]});
        match extract_records(doc) {
            Extraction::Records(records) => {
                let ns: Vec<i64> = records.iter().map(|r| r["n"].as_i64().unwrap()).collect();
                assert_eq!(ns, vec![1, 2, 3]);
            }
            Extraction::NotApplicable => panic!("expected records"),
        }
    }

    #[test]
    fn digest_document_is_not_applicable() {
        let doc = serde_json::json!({"digest": "abc123"});
        assert!(matches!(extract_records(doc), Extraction::NotApplicable));
    }

    #[test]
    fn non_array_records_field_is_not_applicable() {
        let doc = serde_json::json!({"Records": "oops"});
        assert!(matches!(extract_records(doc), Extraction::NotApplicable));
    }
}
