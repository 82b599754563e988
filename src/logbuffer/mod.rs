//! Log buffer: out-of-order term rebuild, completion scanning and gap detection.
//!
//! A term is a fixed-size, power-of-two region holding a contiguous sequence
//! of frames. Frames arrive in any order from the receive path and are placed
//! at their term offset by the [`TermRebuilder`]. Readers and loss detection
//! use the scanner to find how far the term is complete and which ranges are
//! still missing.
//!
//! # Concurrency
//!
//! One thread (or a serialised receive path) inserts into a term; any number
//! of threads may scan or read it at the same time. The only synchronisation
//! is the release store / acquire load of each frame's length field.
//!
//! ```text
//!   receive path                        readers / loss detection
//!        │                                        │
//!        ▼                                        ▼
//! ┌───────────────┐   release   ┌──────────────────────────────┐
//! │ TermRebuilder │ ──────────► │ TermBuffer  (frames + holes) │
//! └───────────────┘   length    └──────────────────────────────┘
//!                                   ▲ acquire length  ▲
//!                     scan_for_completion      scan_for_gaps / TermReader
//! ```

mod buffer;
mod descriptor;
mod error;
mod reader;
mod rebuilder;
mod scanner;

pub use buffer::{TermBuffer, TermStorage, WORD_SIZE, check_term_length};
pub use descriptor::*;
pub use error::*;
pub use reader::{ReadOutcome, TermReader};
pub use rebuilder::{InsertOutcome, PacketOutcome, RebuilderConfig, TermRebuilder, insert};
pub use scanner::{Gap, scan_for_completion, scan_for_gap, scan_for_gaps};
