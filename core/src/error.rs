use std::path::PathBuf;

use thiserror::Error;

use crate::compression::PostingsEncoding;
use crate::query::QueryError;

/// Errors raised while building or reading an index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("postings not strictly increasing at position {position}: {previous} then {current}")]
    NotStrictlyIncreasing {
        position: usize,
        previous: u32,
        current: u32,
    },

    #[error("malformed {encoding} postings: {reason}")]
    MalformedPostings {
        encoding: PostingsEncoding,
        reason: String,
    },

    #[error("term id {term_id} appended after term id {last}")]
    TermOrder { term_id: u32, last: u32 },

    #[error("index {name} was written with {found} postings, reader expects {expected}")]
    EncodingMismatch {
        name: String,
        expected: PostingsEncoding,
        found: PostingsEncoding,
    },

    #[error("corrupt index file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("id {id} out of range for a map of {len} entries")]
    IdOutOfRange { id: u32, len: usize },

    #[error("unknown postings encoding: {0}")]
    UnknownEncoding(String),

    #[error("unknown stemmer language: {0}")]
    UnknownLanguage(String),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub(crate) fn malformed(encoding: PostingsEncoding, reason: impl Into<String>) -> Self {
        IndexError::MalformedPostings {
            encoding,
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        IndexError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Input or stored postings that break the codec contract.
    pub fn is_codec_violation(&self) -> bool {
        matches!(
            self,
            IndexError::NotStrictlyIncreasing { .. } | IndexError::MalformedPostings { .. }
        )
    }

    /// Only failures rooted in the file system may succeed on a second attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, IndexError::Io(_) | IndexError::Walk(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexError::TermOrder { term_id: 3, last: 5 };
        assert_eq!(err.to_string(), "term id 3 appended after term id 5");

        let err = IndexError::malformed(PostingsEncoding::VariableByte, "truncated");
        assert_eq!(err.to_string(), "malformed vbe postings: truncated");
    }

    #[test]
    fn test_classification() {
        let io = IndexError::Io(std::io::Error::other("disk"));
        assert!(io.is_retriable());
        assert!(!io.is_codec_violation());

        let codec = IndexError::NotStrictlyIncreasing {
            position: 1,
            previous: 4,
            current: 4,
        };
        assert!(codec.is_codec_violation());
        assert!(!codec.is_retriable());
    }
}
