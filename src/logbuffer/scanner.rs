//! Term scanner and gap detector.
//!
//! Scanning only ever advances over frames whose length field has been
//! published, so a position returned from here is safe to read up to. A zero
//! length is the ordinary "not arrived yet" state and simply ends the scan.
//!
//! Gap reports are exact when taken on the thread that performs inserts, or
//! while no insert is in flight. Racing a concurrent insert they are
//! best-effort: the scan may step onto body bytes of a frame that is still
//! being copied.

use tracing::{trace, warn};

use crate::core::{FRAME_ALIGNMENT, GapHandler};

use super::buffer::TermBuffer;
use super::descriptor::{check_alignment, check_frame_length, frame_length_volatile};
use super::error::LogBufferResult;

/// A missing byte range within a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gap {
    /// First missing byte.
    pub term_offset: usize,
    /// Number of missing bytes.
    pub length: usize,
}

impl Gap {
    /// One past the last missing byte.
    pub fn end(&self) -> usize {
        self.term_offset + self.length
    }
}

fn check_start(term: &TermBuffer<'_>, offset: usize) -> LogBufferResult<()> {
    check_alignment(offset)?;
    term.bounds_check(offset, 0)
}

/// Advance over complete frames from `offset`, stopping at `limit` or the
/// first unpublished frame.
fn scan_complete(term: &TermBuffer<'_>, mut offset: usize, limit: usize) -> LogBufferResult<usize> {
    let capacity = term.capacity();

    while offset < limit {
        let frame_length = frame_length_volatile(term, offset);
        if frame_length == 0 {
            break;
        }

        let aligned = check_frame_length(offset, frame_length, capacity).inspect_err(|err| {
            warn!(offset, frame_length, %err, "malformed frame length in term");
        })?;
        offset += aligned;
    }

    Ok(offset)
}

/// Highest offset up to which frames are contiguous and complete, starting
/// from `from_offset`.
///
/// Returns `from_offset` itself when the frame there has not arrived. Padding
/// frames are stepped over like any other frame.
pub fn scan_for_completion(term: &TermBuffer<'_>, from_offset: usize) -> LogBufferResult<usize> {
    check_start(term, from_offset)?;
    scan_complete(term, from_offset, term.capacity())
}

/// First gap between `rebuild_offset` and `hwm_offset`, if any.
///
/// `rebuild_offset` is where contiguous data is known to end (or any earlier
/// frame boundary); `hwm_offset` is the end of the furthest frame received.
pub fn scan_for_gap(
    term: &TermBuffer<'_>,
    rebuild_offset: usize,
    hwm_offset: usize,
) -> LogBufferResult<Option<Gap>> {
    check_start(term, rebuild_offset)?;
    term.bounds_check(hwm_offset, 0)?;

    let start = scan_complete(term, rebuild_offset, hwm_offset)?;
    if start >= hwm_offset {
        return Ok(None);
    }

    let mut end = start;
    while end < hwm_offset && frame_length_volatile(term, end) == 0 {
        end += FRAME_ALIGNMENT;
    }

    Ok(Some(Gap {
        term_offset: start,
        length: end.min(hwm_offset) - start,
    }))
}

/// Report every gap between `rebuild_offset` and `hwm_offset` in ascending order.
///
/// Stops early when the handler returns `false`. Returns the number of gaps
/// reported.
pub fn scan_for_gaps<H>(
    term: &TermBuffer<'_>,
    rebuild_offset: usize,
    hwm_offset: usize,
    handler: &mut H,
) -> LogBufferResult<usize>
where
    H: GapHandler + ?Sized,
{
    let mut offset = rebuild_offset;
    let mut count = 0;

    while offset < hwm_offset {
        let Some(gap) = scan_for_gap(term, offset, hwm_offset)? else {
            break;
        };

        trace!(term_offset = gap.term_offset, length = gap.length, "gap found");
        count += 1;
        if !handler.on_gap(gap) {
            break;
        }
        offset = gap.end();
    }

    Ok(count)
}
