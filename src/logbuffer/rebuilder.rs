//! Term rebuilder: places frames that may arrive out of order into a term.
//!
//! Each frame is published with the same three steps:
//!
//! 1. Take the frame length from the source packet and zero it there.
//! 2. Copy the frame (with its zeroed length field) into the term.
//! 3. Store the real length with release ordering.
//!
//! A reader that loads the length with acquire ordering either sees `0` and
//! retries later, or sees the real length together with the whole frame body.
//! No reader can observe a nonzero length paired with a partially copied body.
//!
//! [`insert`] is the bare protocol. [`TermRebuilder`] validates each frame
//! first, skips frames that are already present, handles packets carrying
//! several frames, and tracks the highest offset seen for loss detection.

use tracing::{debug, trace, warn};

use crate::core::{GapHandler, HDR_TYPE_PAD, HEADER_LENGTH};

use super::buffer::TermBuffer;
use super::descriptor::{
    FrameError, FrameHeader, FrameType, aligned_length, check_alignment, check_frame_length,
    frame_length_ordered, frame_length_volatile, length_offset, packet_frame_length, type_offset,
};
use super::error::{LogBufferError, LogBufferResult};
use super::scanner::scan_for_gaps;

/// Insert one frame from `packet` into `term` at `term_offset`.
///
/// `length` bytes starting at `packet_offset` are copied. The first four of
/// them must hold the frame's length as it should appear once published.
/// That field is zeroed in `packet` as a side effect.
///
/// No validation is performed beyond the term's bounds assertions, which panic
/// on a range outside the term. Concurrent inserts into overlapping ranges are
/// not supported.
pub fn insert(
    term: &TermBuffer<'_>,
    term_offset: usize,
    packet: &mut [u8],
    packet_offset: usize,
    length: usize,
) {
    let lo = length_offset(packet_offset);
    let frame_length =
        i32::from_le_bytes([packet[lo], packet[lo + 1], packet[lo + 2], packet[lo + 3]]);
    packet[lo..lo + 4].copy_from_slice(&0i32.to_le_bytes());

    term.put_bytes(term_offset, &packet[packet_offset..packet_offset + length]);
    frame_length_ordered(term, term_offset, frame_length);
}

/// Rebuilder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuilderConfig {
    /// Skip a frame whose destination length is already nonzero.
    ///
    /// Best-effort only: a duplicate that races the original insert of the
    /// same frame is not caught.
    pub duplicate_guard: bool,
    /// Reject frames whose own term offset field differs from the insert offset.
    pub verify_term_offset: bool,
}

impl RebuilderConfig {
    /// Default configuration (both checks enabled).
    pub fn new() -> Self {
        Self {
            duplicate_guard: true,
            verify_term_offset: true,
        }
    }

    /// Enable or disable the duplicate guard.
    pub fn with_duplicate_guard(self, enabled: bool) -> Self {
        Self {
            duplicate_guard: enabled,
            ..self
        }
    }

    /// Enable or disable the term offset consistency check.
    pub fn with_term_offset_check(self, enabled: bool) -> Self {
        Self {
            verify_term_offset: enabled,
            ..self
        }
    }
}

impl Default for RebuilderConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of inserting a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Frame copied and published.
    Inserted,
    /// Destination already held a frame; nothing was written.
    Duplicate,
}

/// Result of inserting a multi-frame packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketOutcome {
    /// Frames copied and published.
    pub inserted: usize,
    /// Frames skipped by the duplicate guard.
    pub duplicates: usize,
}

/// Checked rebuilder for one term.
///
/// Owned by the receive path; all inserts for a term go through one instance.
#[derive(Debug, Default)]
pub struct TermRebuilder {
    config: RebuilderConfig,
    high_water_mark: usize,
}

impl TermRebuilder {
    /// Create a rebuilder with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RebuilderConfig::default())
    }

    /// Create a rebuilder with a custom configuration.
    pub fn with_config(config: RebuilderConfig) -> Self {
        Self {
            config,
            high_water_mark: 0,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &RebuilderConfig {
        &self.config
    }

    /// End offset of the furthest frame inserted so far.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Forget the high-water mark, e.g. when the term is recycled.
    pub fn reset(&mut self) {
        self.high_water_mark = 0;
    }

    /// Validate and insert one frame.
    ///
    /// Data frames must be copied whole (`length` equals the declared frame
    /// length). Padding frames may be copied header-only.
    pub fn insert_frame(
        &mut self,
        term: &TermBuffer<'_>,
        term_offset: usize,
        packet: &mut [u8],
        packet_offset: usize,
        length: usize,
    ) -> LogBufferResult<InsertOutcome> {
        check_alignment(term_offset)?;

        let source = packet_offset
            .checked_add(length)
            .and_then(|end| packet.get(packet_offset..end))
            .ok_or(FrameError::TooShort {
                expected: packet_offset.saturating_add(length),
                actual: packet.len(),
            })?;

        let header = FrameHeader::from_bytes(source)?;
        let aligned = check_frame_length(term_offset, header.frame_length, term.capacity())?;

        let declared = header.frame_length as usize;
        let copy_ok = match header.frame_type {
            FrameType::Data => length == declared,
            FrameType::Padding => length <= declared,
        };
        if !copy_ok {
            return Err(FrameError::InvalidLength {
                offset: term_offset,
                length: header.frame_length,
            }
            .into());
        }

        if self.config.verify_term_offset
            && usize::try_from(header.term_offset).ok() != Some(term_offset)
        {
            warn!(
                term_offset,
                declared = header.term_offset,
                "frame term offset does not match insert offset"
            );
            return Err(LogBufferError::TermOffsetMismatch {
                expected: term_offset,
                actual: header.term_offset,
            });
        }

        if self.config.duplicate_guard && frame_length_volatile(term, term_offset) != 0 {
            debug!(term_offset, "skipping duplicate frame");
            return Ok(InsertOutcome::Duplicate);
        }

        insert(term, term_offset, packet, packet_offset, length);
        self.high_water_mark = self.high_water_mark.max(term_offset + aligned);
        trace!(
            term_offset,
            frame_length = header.frame_length,
            padding = header.frame_type.is_padding(),
            "frame rebuilt"
        );

        Ok(InsertOutcome::Inserted)
    }

    /// Insert every frame of a received packet, starting at `term_offset`.
    ///
    /// Frames are laid out back to back at aligned offsets, exactly as they will
    /// sit in the term. Each frame is published independently. On error, frames
    /// before the failing one remain inserted.
    pub fn insert_packet(
        &mut self,
        term: &TermBuffer<'_>,
        term_offset: usize,
        packet: &mut [u8],
    ) -> LogBufferResult<PacketOutcome> {
        let mut outcome = PacketOutcome::default();
        let mut packet_offset = 0;

        while packet_offset < packet.len() {
            let remaining = packet.len() - packet_offset;
            if remaining < HEADER_LENGTH {
                return Err(FrameError::TooShort {
                    expected: HEADER_LENGTH,
                    actual: remaining,
                }
                .into());
            }

            let frame_length = packet_frame_length(packet, packet_offset)?;
            if frame_length < HEADER_LENGTH as i32 {
                return Err(FrameError::InvalidLength {
                    offset: term_offset + packet_offset,
                    length: frame_length,
                }
                .into());
            }
            let frame_length = frame_length as usize;

            let to = type_offset(packet_offset);
            let padding = u16::from_le_bytes([packet[to], packet[to + 1]]) == HDR_TYPE_PAD;
            let length = if padding {
                frame_length.min(remaining)
            } else {
                frame_length
            };

            let frame_offset = term_offset + packet_offset;
            match self.insert_frame(term, frame_offset, packet, packet_offset, length)? {
                InsertOutcome::Inserted => outcome.inserted += 1,
                InsertOutcome::Duplicate => outcome.duplicates += 1,
            }

            packet_offset += aligned_length(frame_length);
        }

        Ok(outcome)
    }

    /// Report gaps between `rebuild_offset` and the high-water mark.
    ///
    /// Returns the number of gaps reported.
    pub fn scan_for_gaps<H>(
        &self,
        term: &TermBuffer<'_>,
        rebuild_offset: usize,
        handler: &mut H,
    ) -> LogBufferResult<usize>
    where
        H: GapHandler + ?Sized,
    {
        scan_for_gaps(term, rebuild_offset, self.high_water_mark, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TERM_MIN_LENGTH;
    use crate::logbuffer::{Gap, TermStorage, scan_for_completion};

    fn data_frame(term_offset: usize, frame_length: usize) -> Vec<u8> {
        let header = FrameHeader::data(term_offset as i32, 1, 2, 0, frame_length - HEADER_LENGTH);
        let mut frame = header.to_bytes().to_vec();
        frame.extend((HEADER_LENGTH..frame_length).map(|i| (term_offset + i) as u8));
        frame
    }

    fn padding_frame(term_offset: usize, frame_length: usize) -> Vec<u8> {
        FrameHeader::padding(term_offset as i32, 1, 2, 0, frame_length as i32)
            .to_bytes()
            .to_vec()
    }

    fn snapshot(term: &TermBuffer<'_>, length: usize) -> Vec<u8> {
        let mut buf = vec![0u8; length];
        term.get_bytes(0, &mut buf);
        buf
    }

    #[test]
    fn test_insert_publishes_frame() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();

        let original = data_frame(64, 100);
        let mut packet = original.clone();
        insert(&term, 64, &mut packet, 0, 100);

        assert_eq!(frame_length_volatile(&term, 64), 100);
        let mut copied = vec![0u8; 100];
        term.get_bytes(64, &mut copied);
        assert_eq!(copied, original);

        // Source length field is consumed
        assert_eq!(&packet[0..4], &[0, 0, 0, 0]);
        assert_eq!(&packet[4..], &original[4..]);
    }

    #[test]
    fn test_insert_from_packet_offset() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();

        let mut packet = vec![0xEEu8; 16];
        packet.extend(data_frame(0, 64));
        insert(&term, 0, &mut packet, 16, 64);

        assert_eq!(frame_length_volatile(&term, 0), 64);
        assert_eq!(&packet[16..20], &[0, 0, 0, 0]);
        assert_eq!(&packet[..16], &[0xEE; 16]);
    }

    #[test]
    #[should_panic(expected = "term buffer access violation")]
    fn test_raw_insert_past_capacity_panics() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();

        let mut packet = data_frame(TERM_MIN_LENGTH - 32, 64);
        insert(&term, TERM_MIN_LENGTH - 32, &mut packet, 0, 64);
    }

    #[test]
    fn test_out_of_order_assembly() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();
        let mut rebuilder = TermRebuilder::new();

        let mut f1 = data_frame(0, 64);
        let mut f2 = data_frame(64, 64);
        let mut f3 = data_frame(128, 64);

        rebuilder.insert_frame(&term, 0, &mut f1, 0, 64).unwrap();
        rebuilder.insert_frame(&term, 128, &mut f3, 0, 64).unwrap();
        assert_eq!(scan_for_completion(&term, 0).unwrap(), 64);
        assert_eq!(scan_for_completion(&term, 64).unwrap(), 64);
        assert_eq!(rebuilder.high_water_mark(), 192);

        rebuilder.insert_frame(&term, 64, &mut f2, 0, 64).unwrap();
        assert_eq!(scan_for_completion(&term, 0).unwrap(), 192);
        assert_eq!(rebuilder.high_water_mark(), 192);
    }

    #[test]
    fn test_duplicate_insert_same_final_state() {
        let once = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let twice = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let mut rebuilder =
            TermRebuilder::with_config(RebuilderConfig::new().with_duplicate_guard(false));

        let mut packet = data_frame(32, 80);
        rebuilder.insert_frame(&once.term(), 32, &mut packet, 0, 80).unwrap();

        for _ in 0..2 {
            let mut packet = data_frame(32, 80);
            let outcome = rebuilder.insert_frame(&twice.term(), 32, &mut packet, 0, 80).unwrap();
            assert_eq!(outcome, InsertOutcome::Inserted);
        }

        assert_eq!(snapshot(&once.term(), 256), snapshot(&twice.term(), 256));
    }

    #[test]
    fn test_duplicate_guard() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();
        let mut rebuilder = TermRebuilder::new();

        let mut packet = data_frame(0, 64);
        assert_eq!(
            rebuilder.insert_frame(&term, 0, &mut packet, 0, 64).unwrap(),
            InsertOutcome::Inserted
        );
        let before = snapshot(&term, 128);

        let mut retransmit = data_frame(0, 64);
        assert_eq!(
            rebuilder.insert_frame(&term, 0, &mut retransmit, 0, 64).unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(snapshot(&term, 128), before);

        // Skipped frames keep their length field
        assert_eq!(packet_frame_length(&retransmit, 0), Ok(64));
    }

    #[test]
    fn test_term_offset_mismatch() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();
        let mut rebuilder = TermRebuilder::new();

        let mut packet = data_frame(128, 64);
        assert_eq!(
            rebuilder.insert_frame(&term, 64, &mut packet, 0, 64),
            Err(LogBufferError::TermOffsetMismatch {
                expected: 64,
                actual: 128,
            })
        );
        assert_eq!(frame_length_volatile(&term, 64), 0);
        assert_eq!(rebuilder.high_water_mark(), 0);

        let mut lenient =
            TermRebuilder::with_config(RebuilderConfig::new().with_term_offset_check(false));
        assert_eq!(
            lenient.insert_frame(&term, 64, &mut packet, 0, 64),
            Ok(InsertOutcome::Inserted)
        );
    }

    #[test]
    fn test_rejects_unaligned_offset() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let mut rebuilder = TermRebuilder::new();

        let mut packet = data_frame(40, 64);
        let err = rebuilder
            .insert_frame(&storage.term(), 40, &mut packet, 0, 64)
            .unwrap_err();
        assert_eq!(err, LogBufferError::Frame(FrameError::Unaligned { offset: 40 }));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_rejects_bad_lengths() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();
        let mut rebuilder = TermRebuilder::new();

        // Declared length zero
        let mut packet = data_frame(0, 64);
        packet[0..4].copy_from_slice(&0i32.to_le_bytes());
        assert_eq!(
            rebuilder.insert_frame(&term, 0, &mut packet, 0, 64),
            Err(FrameError::InvalidLength { offset: 0, length: 0 }.into())
        );

        // Data frame copied short
        let mut packet = data_frame(0, 64);
        assert_eq!(
            rebuilder.insert_frame(&term, 0, &mut packet, 0, 48),
            Err(FrameError::InvalidLength { offset: 0, length: 64 }.into())
        );

        // Packet shorter than the requested copy
        let mut packet = data_frame(0, 64);
        assert!(matches!(
            rebuilder.insert_frame(&term, 0, &mut packet, 0, 96),
            Err(LogBufferError::Frame(FrameError::TooShort { .. }))
        ));

        // Not a log frame
        let mut packet = data_frame(0, 64);
        packet[6] = 0x03;
        assert_eq!(
            rebuilder.insert_frame(&term, 0, &mut packet, 0, 64),
            Err(FrameError::InvalidType(0x03).into())
        );

        assert_eq!(scan_for_completion(&term, 0).unwrap(), 0);
    }

    #[test]
    fn test_boundary_insert() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();
        let mut rebuilder = TermRebuilder::new();

        let last = TERM_MIN_LENGTH - 64;
        let mut packet = data_frame(last, 64);
        rebuilder.insert_frame(&term, last, &mut packet, 0, 64).unwrap();
        assert_eq!(scan_for_completion(&term, last).unwrap(), TERM_MIN_LENGTH);
        assert_eq!(rebuilder.high_water_mark(), TERM_MIN_LENGTH);

        let overrun = TERM_MIN_LENGTH - 32;
        let mut packet = data_frame(overrun, 64);
        let err = rebuilder
            .insert_frame(&term, overrun, &mut packet, 0, 64)
            .unwrap_err();
        assert_eq!(
            err,
            LogBufferError::OutOfBounds {
                offset: overrun,
                length: 64,
                capacity: TERM_MIN_LENGTH,
            }
        );
        assert_eq!(frame_length_volatile(&term, overrun), 0);
        assert_eq!(packet_frame_length(&packet, 0), Ok(64));
    }

    #[test]
    fn test_padding_header_only() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();
        let mut rebuilder = TermRebuilder::new();

        let tail = TERM_MIN_LENGTH - 256;
        let mut packet = padding_frame(tail, 256);
        assert_eq!(
            rebuilder.insert_frame(&term, tail, &mut packet, 0, HEADER_LENGTH),
            Ok(InsertOutcome::Inserted)
        );
        assert_eq!(frame_length_volatile(&term, tail), 256);
        assert_eq!(scan_for_completion(&term, tail).unwrap(), TERM_MIN_LENGTH);
    }

    #[test]
    fn test_insert_packet_multiple_frames() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();
        let mut rebuilder = TermRebuilder::new();

        // 40 -> 64, 64 -> 64, 32 -> 32 aligned
        let mut packet = data_frame(256, 40);
        packet.resize(64, 0);
        packet.extend(data_frame(320, 64));
        packet.extend(data_frame(384, 32));

        let outcome = rebuilder.insert_packet(&term, 256, &mut packet).unwrap();
        assert_eq!(
            outcome,
            PacketOutcome {
                inserted: 3,
                duplicates: 0,
            }
        );
        assert_eq!(frame_length_volatile(&term, 256), 40);
        assert_eq!(frame_length_volatile(&term, 320), 64);
        assert_eq!(frame_length_volatile(&term, 384), 32);
        assert_eq!(scan_for_completion(&term, 256).unwrap(), 416);
        assert_eq!(rebuilder.high_water_mark(), 416);

        // Every length field in the source was consumed
        for offset in [0, 64, 128] {
            assert_eq!(packet_frame_length(&packet, offset), Ok(0));
        }
    }

    #[test]
    fn test_insert_packet_retransmit_counts_duplicates() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();
        let mut rebuilder = TermRebuilder::new();

        let mut first = data_frame(64, 64);
        rebuilder.insert_packet(&term, 64, &mut first).unwrap();

        let mut packet = data_frame(0, 64);
        packet.extend(data_frame(64, 64));
        let outcome = rebuilder.insert_packet(&term, 0, &mut packet).unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(scan_for_completion(&term, 0).unwrap(), 128);
    }

    #[test]
    fn test_insert_packet_trailing_padding() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();
        let mut rebuilder = TermRebuilder::new();

        let start = TERM_MIN_LENGTH - 192;
        let mut packet = data_frame(start, 64);
        packet.extend(padding_frame(start + 64, 128));

        let outcome = rebuilder.insert_packet(&term, start, &mut packet).unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(scan_for_completion(&term, start).unwrap(), TERM_MIN_LENGTH);
    }

    #[test]
    fn test_insert_packet_truncated() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();
        let mut rebuilder = TermRebuilder::new();

        let mut packet = data_frame(0, 64);
        packet.extend(data_frame(64, 96));
        packet.truncate(64 + 50);

        assert!(matches!(
            rebuilder.insert_packet(&term, 0, &mut packet),
            Err(LogBufferError::Frame(FrameError::TooShort { .. }))
        ));
        // The complete leading frame is kept
        assert_eq!(scan_for_completion(&term, 0).unwrap(), 64);
    }

    #[test]
    fn test_gaps_below_high_water_mark() {
        let storage = TermStorage::new(TERM_MIN_LENGTH).unwrap();
        let term = storage.term();
        let mut rebuilder = TermRebuilder::new();

        let mut f1 = data_frame(0, 64);
        let mut f4 = data_frame(192, 64);
        rebuilder.insert_frame(&term, 0, &mut f1, 0, 64).unwrap();
        rebuilder.insert_frame(&term, 192, &mut f4, 0, 64).unwrap();

        let mut gaps = Vec::new();
        let count = rebuilder
            .scan_for_gaps(&term, 0, &mut |gap: Gap| {
                gaps.push(gap);
                true
            })
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            gaps,
            vec![Gap {
                term_offset: 64,
                length: 128,
            }]
        );

        rebuilder.reset();
        assert_eq!(rebuilder.high_water_mark(), 0);
    }
}
