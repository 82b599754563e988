//! Term reader: delivers complete data frames to a consumer.

use crate::core::{FrameHandler, HEADER_LENGTH};

use super::buffer::TermBuffer;
use super::descriptor::{
    check_alignment, check_frame_length, frame_length_volatile, is_padding_frame, read_header,
};
use super::error::LogBufferResult;

/// Where a read stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Offset of the first frame not consumed.
    pub offset: usize,
    /// Data frames delivered to the handler.
    pub frames_read: usize,
}

/// Reads complete frames out of a term.
///
/// Payloads are copied into a scratch buffer owned by the reader, which grows
/// to the largest payload seen and is then reused.
#[derive(Debug, Default)]
pub struct TermReader {
    scratch: Vec<u8>,
}

impl TermReader {
    /// Create a reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver up to `frames_limit` data frames starting at `offset`.
    ///
    /// Stops at the first frame that has not arrived. Padding frames are
    /// consumed without being delivered and do not count toward the limit.
    pub fn read<H>(
        &mut self,
        term: &TermBuffer<'_>,
        offset: usize,
        frames_limit: usize,
        handler: &mut H,
    ) -> LogBufferResult<ReadOutcome>
    where
        H: FrameHandler + ?Sized,
    {
        check_alignment(offset)?;
        term.bounds_check(offset, 0)?;

        let capacity = term.capacity();
        let mut offset = offset;
        let mut frames_read = 0;

        while frames_read < frames_limit && offset < capacity {
            let frame_length = frame_length_volatile(term, offset);
            if frame_length == 0 {
                break;
            }
            let aligned = check_frame_length(offset, frame_length, capacity)?;

            if !is_padding_frame(term, offset) {
                let mut header = read_header(term, offset)?;
                // The copied length word may be mid-overwrite; trust the acquired one
                header.frame_length = frame_length;
                let payload_length = header.payload_length();
                if self.scratch.len() < payload_length {
                    self.scratch.resize(payload_length, 0);
                }

                let payload = &mut self.scratch[..payload_length];
                term.get_bytes(offset + HEADER_LENGTH, payload);
                handler.on_frame(&header, payload);
                frames_read += 1;
            }

            offset += aligned;
        }

        Ok(ReadOutcome {
            offset,
            frames_read,
        })
    }
}
