//! Bounds-checked view over a term buffer's memory.
//!
//! The term is held as a slice of `AtomicU32` words so that a single writer and
//! any number of readers can touch it concurrently without `unsafe`. Bytes are
//! laid out little-endian within each word. Body bytes move with relaxed
//! atomics; ordering between threads comes only from the release store and
//! acquire load of each frame's length field.
//!
//! Every accessor panics when handed a range outside the term. Offsets come
//! from the receive path, and an out-of-range offset there is a bug that must
//! not be papered over by truncating writes into a shared buffer.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::{TERM_MAX_LENGTH, TERM_MIN_LENGTH};

use super::error::{LogBufferError, LogBufferResult};

/// Bytes per storage word.
pub const WORD_SIZE: usize = 4;

/// Check that a term length is a power of two within the supported range.
pub fn check_term_length(term_length: usize) -> LogBufferResult<()> {
    if !term_length.is_power_of_two() || !(TERM_MIN_LENGTH..=TERM_MAX_LENGTH).contains(&term_length)
    {
        return Err(LogBufferError::InvalidTermLength(term_length));
    }
    Ok(())
}

/// Borrowed view of one term's memory.
///
/// The memory itself is owned elsewhere (a [`TermStorage`] or an externally
/// mapped region) and outlives every view handed to the rebuilder or a reader.
#[derive(Clone, Copy)]
pub struct TermBuffer<'a> {
    words: &'a [AtomicU32],
}

impl<'a> TermBuffer<'a> {
    /// Wrap a word region. Its byte length must pass [`check_term_length`].
    pub fn new(words: &'a [AtomicU32]) -> LogBufferResult<Self> {
        check_term_length(words.len() * WORD_SIZE)?;
        Ok(Self { words })
    }

    /// Capacity of the term in bytes.
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_SIZE
    }

    /// Check that `[offset, offset + length)` lies inside the term.
    pub fn bounds_check(&self, offset: usize, length: usize) -> LogBufferResult<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.capacity() => Ok(()),
            _ => Err(LogBufferError::OutOfBounds {
                offset,
                length,
                capacity: self.capacity(),
            }),
        }
    }

    fn assert_bounds(&self, offset: usize, length: usize) {
        if let Err(err) = self.bounds_check(offset, length) {
            panic!("term buffer access violation: {err}");
        }
    }

    fn word_at(&self, offset: usize) -> &AtomicU32 {
        assert!(
            offset % WORD_SIZE == 0,
            "term buffer access violation: offset {offset} is not word aligned"
        );
        self.assert_bounds(offset, WORD_SIZE);
        &self.words[offset / WORD_SIZE]
    }

    /// Load an i32 with acquire ordering. `offset` must be 4-byte aligned.
    ///
    /// Observing a value written by [`put_i32_ordered`](Self::put_i32_ordered)
    /// makes every byte written before that store visible.
    pub fn get_i32_volatile(&self, offset: usize) -> i32 {
        self.word_at(offset).load(Ordering::Acquire) as i32
    }

    /// Store an i32 with release ordering. `offset` must be 4-byte aligned.
    pub fn put_i32_ordered(&self, offset: usize, value: i32) {
        self.word_at(offset).store(value as u32, Ordering::Release);
    }

    /// Read a byte.
    pub fn get_u8(&self, offset: usize) -> u8 {
        let mut buf = [0u8; 1];
        self.get_bytes(offset, &mut buf);
        buf[0]
    }

    /// Read a little-endian u16.
    pub fn get_u16(&self, offset: usize) -> u16 {
        let mut buf = [0u8; 2];
        self.get_bytes(offset, &mut buf);
        u16::from_le_bytes(buf)
    }

    /// Read a little-endian i32 without ordering.
    pub fn get_i32(&self, offset: usize) -> i32 {
        let mut buf = [0u8; 4];
        self.get_bytes(offset, &mut buf);
        i32::from_le_bytes(buf)
    }

    /// Read a little-endian i64 without ordering.
    pub fn get_i64(&self, offset: usize) -> i64 {
        let mut buf = [0u8; 8];
        self.get_bytes(offset, &mut buf);
        i64::from_le_bytes(buf)
    }

    /// Copy `dst.len()` bytes starting at `offset` out of the term.
    pub fn get_bytes(&self, offset: usize, dst: &mut [u8]) {
        self.assert_bounds(offset, dst.len());

        let mut index = offset;
        let mut filled = 0;
        while filled < dst.len() {
            let shift = index % WORD_SIZE;
            let take = (WORD_SIZE - shift).min(dst.len() - filled);
            let bytes = self.words[index / WORD_SIZE]
                .load(Ordering::Relaxed)
                .to_le_bytes();
            dst[filled..filled + take].copy_from_slice(&bytes[shift..shift + take]);
            index += take;
            filled += take;
        }
    }

    /// Copy `src` into the term starting at `offset`.
    ///
    /// The copy is not atomic as a whole. Words only partially covered by
    /// `src` are merged with atomic and/or operations so bytes outside the
    /// range are preserved and rewriting identical bytes is never observable.
    pub fn put_bytes(&self, offset: usize, src: &[u8]) {
        self.assert_bounds(offset, src.len());

        let mut index = offset;
        let mut remaining = src;
        while !remaining.is_empty() {
            let word = &self.words[index / WORD_SIZE];
            let shift = index % WORD_SIZE;
            let take = (WORD_SIZE - shift).min(remaining.len());
            let (chunk, rest) = remaining.split_at(take);

            if take == WORD_SIZE {
                word.store(
                    u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                    Ordering::Relaxed,
                );
            } else {
                let mut value = [0u8; WORD_SIZE];
                let mut mask = [0u8; WORD_SIZE];
                value[shift..shift + take].copy_from_slice(chunk);
                mask[shift..shift + take].fill(0xFF);
                let value = u32::from_le_bytes(value);
                let mask = u32::from_le_bytes(mask);
                // Bits set in both the old and new bytes stay set throughout
                word.fetch_and(!mask | value, Ordering::Relaxed);
                word.fetch_or(value, Ordering::Relaxed);
            }

            index += take;
            remaining = rest;
        }
    }
}

impl fmt::Debug for TermBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermBuffer")
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Zero-initialised memory for one term.
///
/// For callers that do not map the term from shared memory themselves.
pub struct TermStorage {
    words: Box<[AtomicU32]>,
}

impl TermStorage {
    /// Allocate a zeroed term of `term_length` bytes.
    pub fn new(term_length: usize) -> LogBufferResult<Self> {
        check_term_length(term_length)?;
        let words = (0..term_length / WORD_SIZE)
            .map(|_| AtomicU32::new(0))
            .collect();
        Ok(Self { words })
    }

    /// Borrow a view of the term.
    pub fn term(&self) -> TermBuffer<'_> {
        TermBuffer { words: &self.words }
    }

    /// Capacity of the term in bytes.
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_SIZE
    }
}

impl fmt::Debug for TermStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermStorage")
            .field("capacity", &self.capacity())
            .finish()
    }
}
