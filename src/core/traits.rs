//! Callback traits for consumers of a term buffer.
//!
//! Both traits have blanket implementations for closures, so callers can pass
//! `|header, payload| { .. }` or `|gap| { .. }` directly.

use crate::logbuffer::{FrameHeader, Gap};

/// Receives complete data frames delivered by a
/// [`TermReader`](crate::logbuffer::TermReader).
///
/// Padding frames are never delivered.
pub trait FrameHandler {
    /// Called once per complete data frame, in term order.
    ///
    /// `payload` excludes the header and is only valid for the duration of the call.
    fn on_frame(&mut self, header: &FrameHeader, payload: &[u8]);
}

impl<F> FrameHandler for F
where
    F: FnMut(&FrameHeader, &[u8]),
{
    fn on_frame(&mut self, header: &FrameHeader, payload: &[u8]) {
        self(header, payload)
    }
}

/// Receives missing byte ranges found by
/// [`scan_for_gaps`](crate::logbuffer::scan_for_gaps).
pub trait GapHandler {
    /// Called once per gap in ascending offset order.
    ///
    /// Return `false` to stop the scan.
    fn on_gap(&mut self, gap: Gap) -> bool;
}

impl<F> GapHandler for F
where
    F: FnMut(Gap) -> bool,
{
    fn on_gap(&mut self, gap: Gap) -> bool {
        self(gap)
    }
}
