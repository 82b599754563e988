//! # NOMAD Log Buffer
//!
//! Lock-free term buffers for reassembling datagram streams that arrive out
//! of order.
//!
//! A publication's stream is logged into fixed-size terms as a sequence of
//! length-prefixed frames. Over UDP those frames may be lost, reordered or
//! retransmitted. This crate provides:
//!
//! - **Frame descriptor**: the 32-byte frame header layout and its codec
//! - **Term rebuilder**: inserts frames at their term offset without ever
//!   exposing a partially written frame to concurrent readers
//! - **Term scanner**: finds how far a term is contiguously complete and which
//!   byte ranges are still missing, to drive retransmission requests
//! - **Term reader**: delivers complete data frames to a consumer, skipping padding
//!
//! ## Modules
//!
//! - [`core`]: Layout constants and callback traits
//! - [`logbuffer`]: Term buffer view, rebuilder, scanner and reader
//!
//! ## Example Usage
//!
//! ```rust
//! use nomad_logbuffer::prelude::*;
//!
//! let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
//! let term = storage.term();
//! let mut rebuilder = TermRebuilder::new();
//!
//! // Second frame arrives first
//! let mut late = FrameHeader::data(64, 1, 10, 0, 0).to_bytes().to_vec();
//! rebuilder.insert_frame(&term, 64, &mut late, 0, HEADER_LENGTH).unwrap();
//! assert_eq!(scan_for_completion(&term, 0).unwrap(), 0);
//! assert_eq!(rebuilder.high_water_mark(), 96);
//!
//! let mut early = FrameHeader::data(0, 1, 10, 0, 32).to_bytes().to_vec();
//! early.extend_from_slice(&[7u8; 32]);
//! rebuilder.insert_frame(&term, 0, &mut early, 0, 64).unwrap();
//! assert_eq!(scan_for_completion(&term, 0).unwrap(), 96);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;
pub mod logbuffer;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;

    pub use crate::logbuffer::{
        FrameError, FrameFlags, FrameHeader, FrameType, Gap, InsertOutcome, LogBufferError,
        LogBufferResult, PacketOutcome, ReadOutcome, RebuilderConfig, TermBuffer, TermReader,
        TermRebuilder, TermStorage, insert, scan_for_completion, scan_for_gap, scan_for_gaps,
    };
}

// Re-export commonly used items at crate root
pub use logbuffer::{
    FrameHeader, Gap, LogBufferError, LogBufferResult, TermBuffer, TermReader, TermRebuilder,
    TermStorage,
};
