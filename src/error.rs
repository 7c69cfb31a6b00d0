//! Error types for pipeline construction and record processing.
//!
//! Every failure is returned at the exact call that detected it. Nothing in
//! the library retries, skips, or logs a failing record; that policy belongs
//! to the caller driving the pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::payload::PayloadKind;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipeError>;

#[derive(Debug, Error)]
pub enum PipeError {
    /// A source could not be opened or read.
    #[error("cannot read '{}': {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single record violates a stage's grammar. The pipeline stays
    /// usable; pulling again continues with the next record.
    #[error("malformed record {raw:?}: {cause}")]
    MalformedRecord { raw: String, cause: String },

    /// Two stages were composed whose payload kinds disagree.
    #[error("stage {stage} expects {expected} input but upstream produces {found}")]
    TypeMismatch {
        stage: String,
        expected: PayloadKind,
        found: PayloadKind,
    },

    /// A label lookup had no entry and no default was configured.
    #[error("no label mapping for {key:?}")]
    UnknownLabel { key: String },

    /// `next_envelope` was called on a source that has no more records.
    #[error("source exhausted")]
    Exhausted,

    /// A pipeline description could not be parsed.
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A pipeline or one of its stages is configured inconsistently.
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),
}

impl PipeError {
    pub fn malformed(raw: impl Into<String>, cause: impl Into<String>) -> Self {
        PipeError::MalformedRecord {
            raw: raw.into(),
            cause: cause.into(),
        }
    }

    pub fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipeError::Resource {
            path: path.into(),
            source,
        }
    }

    /// Is this a per-record failure that leaves the pipeline resumable?
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            PipeError::MalformedRecord { .. } | PipeError::UnknownLabel { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_message() {
        let err = PipeError::malformed("1,2,x", "column 2 is not numeric");
        assert_eq!(
            err.to_string(),
            r#"malformed record "1,2,x": column 2 is not numeric"#
        );
        assert!(err.is_record_error());
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = PipeError::TypeMismatch {
            stage: "COLUMNS".to_string(),
            expected: PayloadKind::Tokens,
            found: PayloadKind::Text,
        };
        assert_eq!(
            err.to_string(),
            "stage COLUMNS expects tokens input but upstream produces text"
        );
        assert!(!err.is_record_error());
    }

    #[test]
    fn test_resource_keeps_io_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = PipeError::resource("/nope/data.csv", io);
        assert!(err.to_string().starts_with("cannot read '/nope/data.csv'"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
