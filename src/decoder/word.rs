//! Fixed-width 80-bit GBT word
//!
//! One serialized unit of the readout link. Modeled as an explicit
//! fixed-capacity bit vector (backed by a masked `u128`) with shift and
//! mask operations, so chunk extraction stays bit-exact without an
//! arbitrary-precision integer.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Shl, Shr};

use crate::common::constants::{BCID_BITS, NGBT};

/// An 80-bit word; only the low [`GbtWord::WIDTH`] bits are ever set.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct GbtWord(u128);

impl GbtWord {
    /// Bit width of one word
    pub const WIDTH: u32 = NGBT;
    const MASK: u128 = (1u128 << Self::WIDTH) - 1;

    /// All-zero word
    pub const ZERO: Self = GbtWord(0);

    /// Build a word from raw bits; anything above bit 79 is discarded.
    pub fn new(raw: u128) -> Self {
        Self(raw & Self::MASK)
    }

    /// Mask with the lowest `n` bits set (`n <= 80`).
    pub fn low_mask(n: u32) -> Self {
        debug_assert!(n <= Self::WIDTH);
        if n == 0 {
            Self::ZERO
        } else {
            Self(((1u128 << n) - 1) & Self::MASK)
        }
    }

    /// Raw bit content.
    pub fn bits(self) -> u128 {
        self.0
    }

    /// Low 64 bits; exact for values previously masked to 64 bits or fewer.
    pub fn as_u64(self) -> u64 {
        self.0 as u64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn count_ones(self) -> u32 {
        self.0.count_ones()
    }

    pub fn bit(self, index: u32) -> bool {
        debug_assert!(index < Self::WIDTH);
        (self.0 >> index) & 1 == 1
    }

    pub fn set_bit(&mut self, index: u32) {
        debug_assert!(index < Self::WIDTH);
        self.0 |= 1u128 << index;
    }

    /// OR one payload byte into byte lane `lane` (0..=9).
    pub fn or_byte(&mut self, lane: usize, byte: u8) {
        debug_assert!(lane < (Self::WIDTH as usize) / 8);
        self.0 |= (byte as u128) << (lane * 8);
    }

    /// Byte lane `lane` of the word (0..=9).
    pub fn byte(self, lane: usize) -> u8 {
        debug_assert!(lane < (Self::WIDTH as usize) / 8);
        (self.0 >> (lane * 8)) as u8
    }

    /// Bunch-crossing id field: the low 12 bits of a payload chunk.
    pub fn bcid(self) -> u16 {
        (self.0 & ((1u128 << BCID_BITS) - 1)) as u16
    }
}

impl BitAnd for GbtWord {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for GbtWord {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for GbtWord {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Shl<u32> for GbtWord {
    type Output = Self;
    fn shl(self, shift: u32) -> Self {
        if shift >= Self::WIDTH {
            Self::ZERO
        } else {
            Self((self.0 << shift) & Self::MASK)
        }
    }
}

impl Shr<u32> for GbtWord {
    type Output = Self;
    fn shr(self, shift: u32) -> Self {
        if shift >= Self::WIDTH {
            Self::ZERO
        } else {
            Self(self.0 >> shift)
        }
    }
}

impl fmt::Debug for GbtWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 80 bits print as 20 hex digits
        write!(f, "GbtWord(0x{:020x})", self.0)
    }
}

impl fmt::Display for GbtWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:020x}", self.0)
    }
}
