//! Models spans as regions of a source's address space.

use std::fmt;

use crate::position::{Len, Position};

/// Represents a half-open region `[start, end)` of the address space.
///
/// The end may be [`Position::MAX`], so a span can cover the whole 64-bit address space.
/// Spans never wrap: the end is always at least the start.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    /// The position of the first byte in the region.
    start: Position,
    /// The position one past the last byte in the region.
    end: Position,
}

impl Span {
    /// The span covering the entire address space.
    pub const FULL: Span = Span {
        start: Position::ZERO,
        end: Position::MAX,
    };

    /// Creates a span from a start position and a length.
    ///
    /// The end saturates at `2^64`, clamping the span to the end of the address space.
    pub fn new(start: Position, len: Len) -> Span {
        Span {
            start,
            end: start + len,
        }
    }

    /// Creates a span from its bounds.
    ///
    /// `start` must not be greater than `end`.
    pub fn from_bounds(start: Position, end: Position) -> Span {
        debug_assert!(start <= end);

        Span { start, end }
    }

    /// Creates an empty span at the given position.
    pub fn empty_at(start: Position) -> Span {
        Span { start, end: start }
    }

    /// The start of the span.
    pub fn start(self) -> Position {
        self.start
    }

    /// The end of the span, one past the last contained position.
    pub fn end(self) -> Position {
        self.end
    }

    /// The size of the span in bytes.
    pub fn len(self) -> Len {
        self.end() - self.start()
    }

    /// Determines if the span is empty.
    pub fn is_empty(self) -> bool {
        self.len().is_zero()
    }

    /// Determines if the span contains the given position.
    pub fn contains(self, position: Position) -> bool {
        self.start() <= position && position < self.end()
    }

    /// Determines if the span fully contains the other span.
    pub fn contains_span(self, other: Span) -> bool {
        self.start() <= other.start() && other.end() <= self.end()
    }

    /// Determines if the span overlaps with the other span.
    ///
    /// Empty spans overlap nothing, not even themselves.
    pub fn overlaps(self, other: Span) -> bool {
        self.intersect(other).is_some()
    }

    /// Returns the overlapping region of the two spans if it is non-empty.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use hexsource::{Len, Position, Span};
    /// let low = Span::new(Position::from_u64(0), Len::from(16));
    /// let high = Span::new(Position::from_u64(8), Len::from(16));
    ///
    /// assert_eq!(
    ///     high.intersect(low),
    ///     Some(Span::new(Position::from_u64(8), Len::from(8)))
    /// );
    /// assert_eq!(high.intersect(Span::new(Position::from_u64(0), Len::from(8))), None);
    /// ```
    pub fn intersect(self, other: Span) -> Option<Span> {
        let start = self.start().max(other.start());
        let end = self.end().min(other.end());

        if start < end { Some(Span { start, end }) } else { None }
    }

    /// Expands this span such that both the start and end are aligned to `align`.
    ///
    /// `align` must be a power of two.
    pub fn expand_to_align(self, align: u64) -> Span {
        let start = self.start().align_down(align);
        let end = self.end().align_up(align);

        Span { start, end }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span(at: {:?}, size: {})", self.start(), self.len())
    }
}
