//! Fixed-width hardware words.
//!
//! Every stub field and tracklet parameter is carried as a [`FixedWord`]: an
//! integer together with its declared bit width and signedness. A value that
//! does not fit is an error, never a silent wrap or widening.

use serde::{Deserialize, Serialize};

use crate::error::TrackletError;

/// An integer constrained to a declared bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedWord {
    value: i32,
    nbits: u32,
    signed: bool,
}

impl FixedWord {
    /// Largest supported width. Wider values would not fit the `i32` payload.
    pub const MAX_BITS: u32 = 31;

    /// Creates an unsigned word; `value` must lie in `[0, 2^nbits)`.
    pub fn unsigned(value: i64, nbits: u32) -> Result<Self, TrackletError> {
        Self::new(value, nbits, false)
    }

    /// Creates a two's-complement word; `value` must lie in
    /// `[-2^(nbits-1), 2^(nbits-1))`.
    pub fn signed(value: i64, nbits: u32) -> Result<Self, TrackletError> {
        Self::new(value, nbits, true)
    }

    fn new(value: i64, nbits: u32, signed: bool) -> Result<Self, TrackletError> {
        let overflow = TrackletError::WordOverflow {
            value,
            nbits,
            kind: if signed { "signed" } else { "unsigned" },
        };
        if nbits == 0 || nbits > Self::MAX_BITS {
            return Err(overflow);
        }
        let (min, max) = Self::range(nbits, signed);
        if value < min || value > max {
            return Err(overflow);
        }
        Ok(Self {
            value: value as i32,
            nbits,
            signed,
        })
    }

    /// Inclusive value range of a word with the given shape.
    pub fn range(nbits: u32, signed: bool) -> (i64, i64) {
        if signed {
            (-(1i64 << (nbits - 1)), (1i64 << (nbits - 1)) - 1)
        } else {
            (0, (1i64 << nbits) - 1)
        }
    }

    #[inline]
    pub fn value(&self) -> i32 {
        self.value
    }

    #[inline]
    pub fn nbits(&self) -> u32 {
        self.nbits
    }

    #[inline]
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Raw bit pattern, two's complement truncated to `nbits`.
    #[inline]
    pub fn raw(&self) -> u32 {
        (self.value as u32) & Self::mask(self.nbits)
    }

    /// Extracts `n` bits starting at `lsb` from the raw bit pattern.
    pub fn bits(&self, lsb: u32, n: u32) -> u32 {
        debug_assert!(lsb + n <= self.nbits);
        (self.raw() >> lsb) & Self::mask(n)
    }

    /// Value offset into the unsigned range: `value + 2^(nbits-1)` for signed
    /// words, `value` otherwise.
    #[inline]
    pub fn offset_unsigned(&self) -> u32 {
        if self.signed {
            (self.value + (1 << (self.nbits - 1))) as u32
        } else {
            self.value as u32
        }
    }

    #[inline]
    fn mask(n: u32) -> u32 {
        if n >= 32 {
            u32::MAX
        } else {
            (1u32 << n) - 1
        }
    }
}

impl std::fmt::Display for FixedWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:0width$b}", self.raw(), width = self.nbits as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unsigned_bounds() {
        assert!(FixedWord::unsigned(0, 4).is_ok());
        assert!(FixedWord::unsigned(15, 4).is_ok());
        assert!(FixedWord::unsigned(16, 4).is_err());
        assert!(FixedWord::unsigned(-1, 4).is_err());
    }

    #[test]
    fn test_signed_bounds() {
        assert!(FixedWord::signed(-8, 4).is_ok());
        assert!(FixedWord::signed(7, 4).is_ok());
        assert!(FixedWord::signed(8, 4).is_err());
        assert!(FixedWord::signed(-9, 4).is_err());
    }

    #[test]
    fn test_bits_of_negative_value() {
        let word = FixedWord::signed(-3, 6).unwrap();
        assert_eq!(word.raw(), 0b111101);
        assert_eq!(word.bits(0, 3), 0b101);
        assert_eq!(word.bits(3, 3), 0b111);
        assert_eq!(word.to_string(), "111101");
    }

    #[test]
    fn test_offset_unsigned() {
        let word = FixedWord::signed(-64, 7).unwrap();
        assert_eq!(word.offset_unsigned(), 0);
        let word = FixedWord::signed(63, 7).unwrap();
        assert_eq!(word.offset_unsigned(), 127);
    }

    #[test]
    fn test_zero_width_rejected() {
        assert!(FixedWord::unsigned(0, 0).is_err());
        assert!(FixedWord::unsigned(0, 32).is_err());
    }

    proptest! {
        #[test]
        fn prop_signed_words_round_trip_through_range(nbits in 2u32..20, value in -600_000i64..600_000) {
            let (min, max) = FixedWord::range(nbits, true);
            let word = FixedWord::signed(value, nbits);
            prop_assert_eq!(word.is_ok(), value >= min && value <= max);
            if let Ok(word) = word {
                prop_assert_eq!(word.value() as i64, value);
                prop_assert!(word.offset_unsigned() < (1u32 << nbits));
            }
        }
    }
}
