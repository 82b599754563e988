//! Log buffer error types.
//!
//! A frame that has not arrived yet is never an error: scans report it as a
//! position. Everything in here is either a malformed frame from the producer
//! or a caller handing out-of-range offsets to the log buffer.

use thiserror::Error;

use super::descriptor::FrameError;

/// Log buffer errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogBufferError {
    /// Frame layout or header error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Term length is not a power of two within the supported range.
    #[error("invalid term length: {0}")]
    InvalidTermLength(usize),

    /// Range does not fit inside the term.
    #[error("out of bounds: offset {offset} + length {length} exceeds capacity {capacity}")]
    OutOfBounds {
        /// Start of the range.
        offset: usize,
        /// Length of the range.
        length: usize,
        /// Term capacity.
        capacity: usize,
    },

    /// The frame's own term offset field disagrees with where it is being placed.
    #[error("term offset mismatch: inserting at {expected}, frame declares {actual}")]
    TermOffsetMismatch {
        /// Offset supplied by the caller.
        expected: usize,
        /// Offset declared in the frame header.
        actual: i32,
    },
}

impl LogBufferError {
    /// Check if this error was caused by the caller rather than the frame contents.
    ///
    /// Contract violations indicate a bug upstream of the log buffer, e.g. the
    /// receive path computing a bad offset. The rest are protocol errors from
    /// the producer of the frame.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            LogBufferError::InvalidTermLength(_)
                | LogBufferError::OutOfBounds { .. }
                | LogBufferError::Frame(FrameError::Unaligned { .. })
        )
    }

    /// Check if this error was caused by a malformed frame.
    pub fn is_protocol_error(&self) -> bool {
        !self.is_contract_violation()
    }
}

/// Result type for log buffer operations.
pub type LogBufferResult<T> = Result<T, LogBufferError>;
