//! Frame descriptor: the byte layout of every frame stored in a term.
//!
//! Wire format (32 bytes, all fields little-endian):
//! ```text
//! +0   Frame Length   (i32)  0 = not yet written, otherwise total frame bytes
//! +4   Version        (u8)
//! +5   Flags          (u8)   BEGIN 0x80, END 0x40
//! +6   Type           (u16)  PAD 0x00, DATA 0x01
//! +8   Term Offset    (i32)
//! +12  Session ID     (i32)
//! +16  Stream ID      (i32)
//! +20  Term ID        (i32)
//! +24  Reserved Value (i64)
//! +32  Payload ...
//! ```
//!
//! Frames start on [`FRAME_ALIGNMENT`] boundaries. The length field holds the
//! unaligned length; the next frame starts at the aligned length.

use thiserror::Error;

use crate::core::{
    BEGIN_FRAG_FLAG, CURRENT_VERSION, END_FRAG_FLAG, FLAGS_FIELD_OFFSET, FRAME_ALIGNMENT,
    FRAME_LENGTH_FIELD_OFFSET, HDR_TYPE_DATA, HDR_TYPE_PAD, HEADER_LENGTH,
    RESERVED_VALUE_FIELD_OFFSET, SESSION_ID_FIELD_OFFSET, STREAM_ID_FIELD_OFFSET,
    TERM_ID_FIELD_OFFSET, TERM_OFFSET_FIELD_OFFSET, TYPE_FIELD_OFFSET, UNFRAGMENTED,
    VERSION_FIELD_OFFSET,
};

use super::buffer::TermBuffer;
use super::error::{LogBufferError, LogBufferResult};

/// Frame types that may appear in a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FrameType {
    /// Filler with no payload semantics.
    Padding = HDR_TYPE_PAD,
    /// Application data.
    Data = HDR_TYPE_DATA,
}

impl FrameType {
    /// Parse a frame type from its wire value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            HDR_TYPE_PAD => Some(Self::Padding),
            HDR_TYPE_DATA => Some(Self::Data),
            _ => None,
        }
    }

    /// Wire value of this frame type.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Check if this is a padding frame.
    pub fn is_padding(self) -> bool {
        self == Self::Padding
    }
}

/// Fragmentation flags carried in the header.
///
/// Opaque to rebuild and scan; they pass through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// First fragment of a message.
    pub const BEGIN: Self = Self(BEGIN_FRAG_FLAG);
    /// Last fragment of a message.
    pub const END: Self = Self(END_FRAG_FLAG);
    /// Whole message in one frame.
    pub const UNFRAGMENTED: Self = Self(UNFRAGMENTED);

    /// Create flags from a raw byte.
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Get the raw byte value.
    pub fn as_byte(self) -> u8 {
        self.0
    }

    /// Check if BEGIN flag is set.
    pub fn is_begin(self) -> bool {
        self.0 & BEGIN_FRAG_FLAG != 0
    }

    /// Check if END flag is set.
    pub fn is_end(self) -> bool {
        self.0 & END_FRAG_FLAG != 0
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame length including header, unaligned.
    pub frame_length: i32,
    /// Header version.
    pub version: u8,
    /// Fragmentation flags.
    pub flags: FrameFlags,
    /// Frame type.
    pub frame_type: FrameType,
    /// Offset of the frame within its term.
    pub term_offset: i32,
    /// Publisher session.
    pub session_id: i32,
    /// Stream within the session.
    pub stream_id: i32,
    /// Term the frame belongs to.
    pub term_id: i32,
    /// Application reserved value.
    pub reserved_value: i64,
}

impl FrameHeader {
    /// Header for an unfragmented data frame carrying `payload_length` bytes.
    pub fn data(
        term_offset: i32,
        session_id: i32,
        stream_id: i32,
        term_id: i32,
        payload_length: usize,
    ) -> Self {
        Self {
            frame_length: (HEADER_LENGTH + payload_length) as i32,
            version: CURRENT_VERSION,
            flags: FrameFlags::UNFRAGMENTED,
            frame_type: FrameType::Data,
            term_offset,
            session_id,
            stream_id,
            term_id,
            reserved_value: 0,
        }
    }

    /// Header for a padding frame spanning `frame_length` bytes.
    pub fn padding(
        term_offset: i32,
        session_id: i32,
        stream_id: i32,
        term_id: i32,
        frame_length: i32,
    ) -> Self {
        Self {
            frame_length,
            version: CURRENT_VERSION,
            flags: FrameFlags::UNFRAGMENTED,
            frame_type: FrameType::Padding,
            term_offset,
            session_id,
            stream_id,
            term_id,
            reserved_value: 0,
        }
    }

    /// Serialize header to bytes (32 bytes).
    pub fn to_bytes(&self) -> [u8; HEADER_LENGTH] {
        let mut buf = [0u8; HEADER_LENGTH];
        buf[0..4].copy_from_slice(&self.frame_length.to_le_bytes());
        buf[4] = self.version;
        buf[5] = self.flags.as_byte();
        buf[6..8].copy_from_slice(&self.frame_type.as_u16().to_le_bytes());
        buf[8..12].copy_from_slice(&self.term_offset.to_le_bytes());
        buf[12..16].copy_from_slice(&self.session_id.to_le_bytes());
        buf[16..20].copy_from_slice(&self.stream_id.to_le_bytes());
        buf[20..24].copy_from_slice(&self.term_id.to_le_bytes());
        buf[24..32].copy_from_slice(&self.reserved_value.to_le_bytes());
        buf
    }

    /// Parse header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LENGTH {
            return Err(FrameError::TooShort {
                expected: HEADER_LENGTH,
                actual: bytes.len(),
            });
        }

        let raw_type = read_u16(bytes, TYPE_FIELD_OFFSET);
        let frame_type = FrameType::from_u16(raw_type).ok_or(FrameError::InvalidType(raw_type))?;

        Ok(Self {
            frame_length: read_i32(bytes, FRAME_LENGTH_FIELD_OFFSET),
            version: bytes[VERSION_FIELD_OFFSET],
            flags: FrameFlags::from_byte(bytes[FLAGS_FIELD_OFFSET]),
            frame_type,
            term_offset: read_i32(bytes, TERM_OFFSET_FIELD_OFFSET),
            session_id: read_i32(bytes, SESSION_ID_FIELD_OFFSET),
            stream_id: read_i32(bytes, STREAM_ID_FIELD_OFFSET),
            term_id: read_i32(bytes, TERM_ID_FIELD_OFFSET),
            reserved_value: i64::from_le_bytes([
                bytes[RESERVED_VALUE_FIELD_OFFSET],
                bytes[RESERVED_VALUE_FIELD_OFFSET + 1],
                bytes[RESERVED_VALUE_FIELD_OFFSET + 2],
                bytes[RESERVED_VALUE_FIELD_OFFSET + 3],
                bytes[RESERVED_VALUE_FIELD_OFFSET + 4],
                bytes[RESERVED_VALUE_FIELD_OFFSET + 5],
                bytes[RESERVED_VALUE_FIELD_OFFSET + 6],
                bytes[RESERVED_VALUE_FIELD_OFFSET + 7],
            ]),
        })
    }

    /// Payload length in bytes (zero for padding and header-only frames).
    pub fn payload_length(&self) -> usize {
        (self.frame_length.max(0) as usize).saturating_sub(HEADER_LENGTH)
    }
}

/// Errors in frame layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not enough bytes for the header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size available.
        actual: usize,
    },

    /// Frame type that does not belong in a term.
    #[error("invalid frame type: 0x{0:04x}")]
    InvalidType(u16),

    /// Declared frame length is not usable at this offset.
    #[error("invalid frame length {length} at offset {offset}")]
    InvalidLength {
        /// Offset of the frame.
        offset: usize,
        /// Declared length.
        length: i32,
    },

    /// Frame offset is not on a frame boundary.
    #[error("frame offset {offset} is not aligned to {}", FRAME_ALIGNMENT)]
    Unaligned {
        /// Offending offset.
        offset: usize,
    },
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Round `value` up to the next multiple of `alignment` (a power of two).
pub fn align(value: usize, alignment: usize) -> usize {
    (value + (alignment - 1)) & !(alignment - 1)
}

/// Space a frame of `frame_length` bytes occupies in the term.
pub fn aligned_length(frame_length: usize) -> usize {
    align(frame_length, FRAME_ALIGNMENT)
}

/// Offset of the length field for a frame starting at `frame_offset`.
pub fn length_offset(frame_offset: usize) -> usize {
    frame_offset + FRAME_LENGTH_FIELD_OFFSET
}

/// Offset of the version field.
pub fn version_offset(frame_offset: usize) -> usize {
    frame_offset + VERSION_FIELD_OFFSET
}

/// Offset of the flags field.
pub fn flags_offset(frame_offset: usize) -> usize {
    frame_offset + FLAGS_FIELD_OFFSET
}

/// Offset of the type field.
pub fn type_offset(frame_offset: usize) -> usize {
    frame_offset + TYPE_FIELD_OFFSET
}

/// Offset of the term offset field.
pub fn term_offset_offset(frame_offset: usize) -> usize {
    frame_offset + TERM_OFFSET_FIELD_OFFSET
}

/// Check that `offset` is on a frame boundary.
pub fn check_alignment(offset: usize) -> Result<(), FrameError> {
    if offset % FRAME_ALIGNMENT != 0 {
        return Err(FrameError::Unaligned { offset });
    }
    Ok(())
}

/// Validate a declared frame length at `frame_offset` in a term of `capacity` bytes.
///
/// Returns the aligned length, i.e. the distance to the next frame.
pub fn check_frame_length(
    frame_offset: usize,
    frame_length: i32,
    capacity: usize,
) -> LogBufferResult<usize> {
    if frame_length < HEADER_LENGTH as i32 {
        return Err(FrameError::InvalidLength {
            offset: frame_offset,
            length: frame_length,
        }
        .into());
    }

    let aligned = aligned_length(frame_length as usize);
    match frame_offset.checked_add(aligned) {
        Some(end) if end <= capacity => Ok(aligned),
        _ => Err(LogBufferError::OutOfBounds {
            offset: frame_offset,
            length: aligned,
            capacity,
        }),
    }
}

/// Read the length field of a frame inside a received packet.
pub fn packet_frame_length(packet: &[u8], frame_offset: usize) -> Result<i32, FrameError> {
    let lo = length_offset(frame_offset);
    match packet.get(lo..lo + 4) {
        Some(field) => Ok(read_i32(field, 0)),
        None => Err(FrameError::TooShort {
            expected: lo + 4,
            actual: packet.len(),
        }),
    }
}

/// Load a frame's length with acquire ordering.
///
/// Zero means the frame has not been completely written yet.
pub fn frame_length_volatile(term: &TermBuffer<'_>, frame_offset: usize) -> i32 {
    term.get_i32_volatile(length_offset(frame_offset))
}

/// Publish a frame's length with release ordering.
///
/// Every byte written to the frame before this call is visible to a reader
/// that observes the new length.
pub fn frame_length_ordered(term: &TermBuffer<'_>, frame_offset: usize, frame_length: i32) {
    term.put_i32_ordered(length_offset(frame_offset), frame_length);
}

/// Raw type field of the frame at `frame_offset`.
pub fn frame_type(term: &TermBuffer<'_>, frame_offset: usize) -> u16 {
    term.get_u16(type_offset(frame_offset))
}

/// Self-declared term offset of the frame at `frame_offset`.
pub fn frame_term_offset(term: &TermBuffer<'_>, frame_offset: usize) -> i32 {
    term.get_i32(term_offset_offset(frame_offset))
}

/// Check if the frame at `frame_offset` is a padding frame.
pub fn is_padding_frame(term: &TermBuffer<'_>, frame_offset: usize) -> bool {
    frame_type(term, frame_offset) == HDR_TYPE_PAD
}

/// Decode the header of the frame at `frame_offset`.
pub fn read_header(term: &TermBuffer<'_>, frame_offset: usize) -> Result<FrameHeader, FrameError> {
    let mut buf = [0u8; HEADER_LENGTH];
    term.get_bytes(frame_offset, &mut buf);
    FrameHeader::from_bytes(&buf)
}
