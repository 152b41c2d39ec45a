use std::fmt;

/// Failures with a defined blast radius inside one pipeline run.
///
/// `Format` ends processing of the current object; `MalformedRecord` ends
/// processing of the current record only. Anything else (S3 unavailable,
/// configuration errors) travels as a plain `anyhow::Error` and fails the
/// run loudly.
#[derive(Debug, Clone)]
pub enum IngestError {
    /// The object body could not be decompressed or parsed as an envelope
    /// document. Never retried; malformed input is not transient.
    Format(String),
    /// A record is missing a field required for normalization or routing.
    MalformedRecord(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IngestError::Format(msg) => write!(f, "format error: {}", msg),
            IngestError::MalformedRecord(msg) => write!(f, "malformed record: {}", msg),
        }
    }
}

impl std::error::Error for IngestError {}
