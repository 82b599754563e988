//! Log buffer constants.
//!
//! These values define the binary layout shared by every writer and reader of
//! a term buffer and MUST NOT be changed.

// =============================================================================
// FRAME LAYOUT
// =============================================================================

/// Alignment of every frame start within a term.
pub const FRAME_ALIGNMENT: usize = 32;

/// Length of the frame header in bytes.
pub const HEADER_LENGTH: usize = 32;

/// Frame length field (i32 LE). Doubles as the completion marker.
pub const FRAME_LENGTH_FIELD_OFFSET: usize = 0;

/// Version field (u8).
pub const VERSION_FIELD_OFFSET: usize = 4;

/// Flags field (u8).
pub const FLAGS_FIELD_OFFSET: usize = 5;

/// Frame type field (u16 LE).
pub const TYPE_FIELD_OFFSET: usize = 6;

/// Term offset field (i32 LE).
pub const TERM_OFFSET_FIELD_OFFSET: usize = 8;

/// Session id field (i32 LE).
pub const SESSION_ID_FIELD_OFFSET: usize = 12;

/// Stream id field (i32 LE).
pub const STREAM_ID_FIELD_OFFSET: usize = 16;

/// Term id field (i32 LE).
pub const TERM_ID_FIELD_OFFSET: usize = 20;

/// Reserved value field (i64 LE).
pub const RESERVED_VALUE_FIELD_OFFSET: usize = 24;

/// Current frame header version.
pub const CURRENT_VERSION: u8 = 0;

// =============================================================================
// FRAME TYPES
// =============================================================================

/// Padding frame, fills unusable space at the tail of a term.
pub const HDR_TYPE_PAD: u16 = 0x00;

/// Data frame carrying application payload.
pub const HDR_TYPE_DATA: u16 = 0x01;

// =============================================================================
// FRAME FLAGS
// =============================================================================

/// First fragment of a message.
pub const BEGIN_FRAG_FLAG: u8 = 0x80;

/// Last fragment of a message.
pub const END_FRAG_FLAG: u8 = 0x40;

/// Message carried in a single frame.
pub const UNFRAGMENTED: u8 = BEGIN_FRAG_FLAG | END_FRAG_FLAG;

// =============================================================================
// TERM BUFFER
// =============================================================================

/// Minimum term length (64 KiB).
pub const TERM_MIN_LENGTH: usize = 64 * 1024;

/// Maximum term length (1 GiB).
pub const TERM_MAX_LENGTH: usize = 1 << 30;
