//! Models positions and lengths in a 64-bit address space.

use std::{
    fmt,
    ops::{Add, AddAssign, Sub},
};

use size_format::SizeFormatterBinary;

/// Represents an offset into an address space of size `2^64`.
///
/// The value `2^64` itself is representable so that it can serve as the exclusive end of
/// a region covering the whole address space. Positions therefore live in `[0, 2^64]`
/// and are carried as a `u128` internally.
///
/// Addition saturates at `2^64`. Bare subtraction panics below zero; use
/// [`Position::checked_sub`] where underflow is expected.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position(u128);

impl Position {
    /// The position of the first byte in the address space.
    pub const ZERO: Position = Position(0);
    /// The position one past the last byte in the address space, `2^64`.
    pub const MAX: Position = Position(1 << 64);

    /// Creates a position from a plain address.
    pub const fn from_u64(value: u64) -> Position {
        Position(value as u128)
    }

    /// Lowers the position to a plain address.
    ///
    /// # Panics
    /// This function panics for [`Position::MAX`], which is one past the last address.
    pub fn as_u64(self) -> u64 {
        u64::try_from(self.0).expect("`2^64` is one past the last address and not addressable")
    }

    /// Adds a length to the position, failing past the end of the address space.
    pub fn checked_add(self, len: Len) -> Option<Position> {
        let sum = Position(self.0 + len.0);
        if sum <= Position::MAX { Some(sum) } else { None }
    }

    /// Adds a length to the position, saturating at the end of the address space.
    pub fn saturating_add(self, len: Len) -> Position {
        Position(std::cmp::min(self.0 + len.0, Position::MAX.0))
    }

    /// Subtracts a length from the position, failing below zero.
    pub fn checked_sub(self, len: Len) -> Option<Position> {
        self.0.checked_sub(len.0).map(Position)
    }

    /// Aligns the position downwards to the given alignment.
    ///
    /// `align` must be a power of two.
    pub fn align_down(self, align: u64) -> Position {
        debug_assert!(align.is_power_of_two());

        Position(self.0 & !(u128::from(align) - 1))
    }

    /// Aligns the position upwards to the given alignment.
    ///
    /// `align` must be a power of two.
    pub fn align_up(self, align: u64) -> Position {
        debug_assert!(align.is_power_of_two());

        Position((self.0 + (u128::from(align) - 1)) & !(u128::from(align) - 1))
    }

    /// Determines if the position is aligned to the given alignment.
    ///
    /// `align` must be a power of two.
    pub fn is_aligned(self, align: u64) -> bool {
        debug_assert!(align.is_power_of_two());

        self.0.is_multiple_of(u128::from(align))
    }
}

impl From<u64> for Position {
    fn from(value: u64) -> Position {
        Position::from_u64(value)
    }
}

impl Add<Len> for Position {
    type Output = Position;

    /// Adds a length to the position, saturating at the end of the address space.
    fn add(self, rhs: Len) -> Position {
        self.saturating_add(rhs)
    }
}

impl Sub<Len> for Position {
    type Output = Position;

    fn sub(self, rhs: Len) -> Position {
        self.checked_sub(rhs)
            .expect("position subtraction went below zero")
    }
}

impl Sub<Position> for Position {
    type Output = Len;

    fn sub(self, rhs: Position) -> Len {
        self.0
            .checked_sub(rhs.0)
            .map(Len)
            .expect("position subtraction went below zero")
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Represents a length of bytes in a 64-bit address space.
///
/// Like [`Position`], lengths live in `[0, 2^64]`: a region covering the whole address
/// space has length `2^64`. Addition saturates at `2^64`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Len(u128);

impl Len {
    /// The length of no bytes at all.
    pub const ZERO: Len = Len(0);
    /// The length of the whole address space, `2^64`.
    pub const MAX: Len = Len(1 << 64);

    /// Lowers the length to a plain byte count.
    ///
    /// # Panics
    /// This function panics for [`Len::MAX`], which does not fit into a `u64`.
    pub fn as_u64(self) -> u64 {
        u64::try_from(self.0).expect("`2^64` bytes do not fit into a `u64`")
    }

    /// Determines if the length is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Len {
    fn from(value: u64) -> Len {
        Len(u128::from(value))
    }
}

impl Add<Len> for Len {
    type Output = Len;

    /// Adds two lengths, saturating at the size of the address space.
    fn add(self, rhs: Len) -> Len {
        Len(std::cmp::min(self.0 + rhs.0, Len::MAX.0))
    }
}

impl AddAssign<Len> for Len {
    fn add_assign(&mut self, rhs: Len) {
        *self = *self + rhs;
    }
}

impl fmt::Debug for Len {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for Len {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match u64::try_from(self.0) {
            Ok(bytes) => write!(f, "{}B", SizeFormatterBinary::new(bytes)),
            // The whole address space is the one length `SizeFormatterBinary` cannot take.
            Err(_) => f.write_str("16.0EiB"),
        }
    }
}
