//! Defines the raw access contract byte sources implement.

use crate::{
    error::SourceResult,
    position::{Len, Position},
    span::Span,
};

pub use memory::MemSource;
pub use process::{ProcessOptions, ProcessSource};

mod memory;
mod process;

/// A source of raw bytes addressed by positions.
///
/// A source exposes one contiguous extent of its address space and nothing outside of
/// it. The extent never changes over the lifetime of the source, even when the content
/// does (see [`ByteSource::is_volatile`]).
pub trait ByteSource {
    /// The extent of addressable positions.
    fn span(&self) -> Span;

    /// A human-readable name for the source.
    fn name(&self) -> &str;

    /// Determines if writes to the source are rejected.
    fn is_read_only(&self) -> bool;

    /// Determines if the content may change without any action by the caller.
    ///
    /// Reading a volatile source twice may yield different bytes even though no write
    /// went through this interface.
    fn is_volatile(&self) -> bool;

    /// The preferred cache granularity in bytes: zero for no preference or a power of
    /// two.
    fn page_size(&self) -> u64 {
        0
    }

    /// Fills the buffer with the bytes at the given position, returning the filled
    /// prefix.
    ///
    /// The returned slice is shorter than `buf` when the extent (or the readable part of
    /// it) ends before the buffer is full. Fails with [`SourceError::OutOfRange`] if
    /// `position` lies outside [`ByteSource::span`].
    ///
    /// [`SourceError::OutOfRange`]: crate::error::SourceError::OutOfRange
    fn read_at<'buf>(
        &self,
        position: Position,
        buf: &'buf mut [u8],
    ) -> SourceResult<&'buf [u8]>;

    /// Writes the bytes to the given position, returning how many were written.
    ///
    /// The count is short when the extent ends before all bytes fit. Fails with
    /// [`SourceError::ReadOnly`] on a read-only source and with
    /// [`SourceError::OutOfRange`] if `position` lies outside [`ByteSource::span`].
    ///
    /// [`SourceError::ReadOnly`]: crate::error::SourceError::ReadOnly
    /// [`SourceError::OutOfRange`]: crate::error::SourceError::OutOfRange
    fn write_at(&mut self, position: Position, bytes: &[u8]) -> SourceResult<usize>;
}

/// Clamps a transfer starting at `position` to the end of `span`.
pub(crate) fn clamped_len(span: Span, position: Position, available: usize) -> usize {
    let len_left = span.end() - position;
    let output_size = std::cmp::min(
        len_left,
        Len::from(u64::try_from(available).unwrap_or(u64::MAX)),
    );

    usize::try_from(output_size.as_u64()).expect("we used min above, so this must fit")
}
