//! Error taxonomy for image composition and disc writing.
//!
//! Errors fall into two groups:
//! - caller mistakes: [`WriterError::InvalidArgument`], [`WriterError::InvalidState`]
//! - I/O class: everything produced while talking to external tools or the
//!   local filesystem (see [`WriterError::is_io_class`])

use std::io;
use thiserror::Error;

use crate::units::display_bytes;

pub type Result<T> = std::result::Result<T, WriterError>;

#[derive(Debug, Error)]
pub enum WriterError {
    /// Malformed media type, SCSI address, path or drive speed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation attempted out of sequence.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// External tool output did not match the expected grammar.
    #[error("unable to parse {what} output: {detail}")]
    Parse { what: &'static str, detail: String },

    /// The image does not fit on the media. Byte counts are present when known.
    #[error("media does not contain enough capacity to store image{}", shortfall(.required, .available))]
    InsufficientCapacity {
        required: Option<u64>,
        available: Option<u64>,
    },

    /// External command exited non-zero.
    #[error("{program} exited with status {status}: {message}")]
    CommandFailed {
        program: String,
        status: i32,
        message: String,
    },

    /// External command could not be started.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl WriterError {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub(crate) fn parse(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Parse {
            what,
            detail: detail.into(),
        }
    }

    /// Whether this failure came from talking to hardware, tools or disk
    /// rather than from how the API was called.
    pub fn is_io_class(&self) -> bool {
        !matches!(self, Self::InvalidArgument(_) | Self::InvalidState(_))
    }
}

fn shortfall(required: &Option<u64>, available: &Option<u64>) -> String {
    match (required, available) {
        (Some(required), Some(available)) => format!(
            " (image {}, available {})",
            display_bytes(*required),
            display_bytes(*available)
        ),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_class() {
        assert!(!WriterError::invalid_argument("x").is_io_class());
        assert!(!WriterError::invalid_state("x").is_io_class());
        assert!(WriterError::parse("cdrecord", "x").is_io_class());
        assert!(WriterError::InsufficientCapacity {
            required: None,
            available: None
        }
        .is_io_class());
    }

    #[test]
    fn test_insufficient_capacity_message() {
        let err = WriterError::InsufficientCapacity {
            required: Some(4096),
            available: Some(2048),
        };
        assert_eq!(
            err.to_string(),
            "media does not contain enough capacity to store image (image 4.00 kB, available 2.00 kB)"
        );

        let bare = WriterError::InsufficientCapacity {
            required: None,
            available: None,
        };
        assert_eq!(
            bare.to_string(),
            "media does not contain enough capacity to store image"
        );
    }
}
