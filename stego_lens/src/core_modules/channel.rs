// THEORY:
// The `channel` module holds the smallest vocabulary of the engine: which of the
// four 8-bit samples of a pixel we are talking about (`Channel`), which bit of that
// sample (`BitIndex`), and the canonical four-channel value every raw encoding is
// translated into (`Argb`).
//
// Key principles:
// 1.  **Canonical order**: Alpha, Red, Green, Blue map to the indices 0..=3. Every
//     layout table in the codec is indexed by this order, never by physical position.
// 2.  **Loud preconditions**: an out-of-range channel or bit index is a programming
//     error. The panicking constructors exist for call sites that hold a literal;
//     the `try_*`/`new` forms exist for call sites that hold untrusted input. Neither
//     clamps.
// 3.  **Opaque by default**: a source without alpha reads as fully opaque. That rule
//     lives in the codec; `Argb::opaque` is the value it produces.

use std::fmt;

use crate::error::PreconditionViolation;

/// Maximum intensity of an 8-bit sample; also the implicit alpha of opaque sources.
pub const OPAQUE: u8 = u8::MAX;

/// One of the four 8-bit samples of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Alpha,
    Red,
    Green,
    Blue,
}

impl Channel {
    /// All channels in canonical order.
    pub const ALL: [Channel; 4] = [Channel::Alpha, Channel::Red, Channel::Green, Channel::Blue];

    /// The three colour channels, without alpha.
    pub const COLOR: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    /// Canonical index (Alpha 0, Red 1, Green 2, Blue 3).
    pub const fn index(self) -> usize {
        match self {
            Channel::Alpha => 0,
            Channel::Red => 1,
            Channel::Green => 2,
            Channel::Blue => 3,
        }
    }

    /// Resolves a canonical index. Panics outside 0..=3.
    pub fn from_index(index: usize) -> Self {
        match Self::try_from_index(index) {
            Ok(channel) => channel,
            Err(violation) => panic!("{violation}"),
        }
    }

    pub fn try_from_index(index: usize) -> Result<Self, PreconditionViolation> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(PreconditionViolation::ChannelIndexOutOfRange(index))
    }

    pub const fn name(self) -> &'static str {
        match self {
            Channel::Alpha => "Alpha",
            Channel::Red => "Red",
            Channel::Green => "Green",
            Channel::Blue => "Blue",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Selects one bit (0 = least significant) within an 8-bit channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitIndex(u8);

impl BitIndex {
    pub const LSB: BitIndex = BitIndex(0);
    pub const MSB: BitIndex = BitIndex(7);

    pub fn new(bit: u8) -> Result<Self, PreconditionViolation> {
        if bit > 7 {
            return Err(PreconditionViolation::BitIndexOutOfRange(bit));
        }
        Ok(Self(bit))
    }

    /// Every bit position from least to most significant.
    pub fn all() -> impl Iterator<Item = BitIndex> {
        (0..8u8).map(BitIndex)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// True when this bit is set in `sample`.
    #[inline]
    pub const fn is_set(self, sample: u8) -> bool {
        (sample >> self.0) & 1 == 1
    }
}

impl fmt::Display for BitIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical four-channel pixel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Argb {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Argb {
    pub const fn new(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self { a, r, g, b }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { a: OPAQUE, r, g, b }
    }

    #[inline]
    pub const fn channel(&self, channel: Channel) -> u8 {
        match channel {
            Channel::Alpha => self.a,
            Channel::Red => self.r,
            Channel::Green => self.g,
            Channel::Blue => self.b,
        }
    }

    #[inline]
    pub fn set_channel(&mut self, channel: Channel, value: u8) {
        match channel {
            Channel::Alpha => self.a = value,
            Channel::Red => self.r = value,
            Channel::Green => self.g = value,
            Channel::Blue => self.b = value,
        }
    }

    /// Unpacks a `0xAARRGGBB` word.
    #[inline]
    pub const fn from_word(word: u32) -> Self {
        Self {
            a: (word >> 24) as u8,
            r: (word >> 16) as u8,
            g: (word >> 8) as u8,
            b: word as u8,
        }
    }

    /// Packs into a `0xAARRGGBB` word.
    #[inline]
    pub const fn to_word(self) -> u32 {
        (self.a as u32) << 24 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    /// True for the "grey bit" pixels where R, G and B are numerically equal.
    #[inline]
    pub const fn is_symmetric(&self) -> bool {
        self.r == self.g && self.g == self.b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_indices_round_trip() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_index(channel.index()), channel);
        }
    }

    #[test]
    fn channel_index_out_of_range_is_rejected() {
        assert_eq!(
            Channel::try_from_index(4),
            Err(PreconditionViolation::ChannelIndexOutOfRange(4))
        );
    }

    #[test]
    #[should_panic(expected = "channel index 9")]
    fn channel_from_index_panics_outside_range() {
        let _ = Channel::from_index(9);
    }

    #[test]
    fn bit_index_rejects_eight_and_above() {
        assert!(BitIndex::new(7).is_ok());
        assert_eq!(BitIndex::new(8), Err(PreconditionViolation::BitIndexOutOfRange(8)));
        assert_eq!(BitIndex::new(255), Err(PreconditionViolation::BitIndexOutOfRange(255)));
    }

    #[test]
    fn bit_index_tests_single_bits() {
        assert!(BitIndex::LSB.is_set(0b0000_0001));
        assert!(!BitIndex::LSB.is_set(0b0000_0010));
        assert!(BitIndex::MSB.is_set(0b1000_0000));
        assert_eq!(BitIndex::all().count(), 8);
    }

    #[test]
    fn word_packing_uses_argb_positions() {
        let pixel = Argb::new(0x11, 0x22, 0x33, 0x44);
        assert_eq!(pixel.to_word(), 0x1122_3344);
        assert_eq!(Argb::from_word(0x1122_3344), pixel);
    }

    #[test]
    fn symmetric_pixels_ignore_alpha() {
        assert!(Argb::new(0, 10, 10, 10).is_symmetric());
        assert!(!Argb::opaque(10, 20, 30).is_symmetric());
    }
}
