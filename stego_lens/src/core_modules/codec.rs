// THEORY:
// The `codec` module is the single place that knows how a pixel is physically laid
// out in a backing buffer. Every transform asks "give me Red of pixel i" and the
// codec answers; no transform ever computes a byte offset or a shift on its own.
//
// Two raw families are understood natively:
//   - Interleaved bytes: 3 or 4 consecutive bytes per pixel, in some channel order.
//   - Packed words:      one `u32` per pixel, channels at fixed 8-bit lanes.
// For each family only the "RGB family" orders (RGB, RGBA, ARGB) and the "BGR
// family" orders (BGR, BGRA, ABGR) resolve to a precomputed layout table. Any other
// permutation is still valid input but is served by the generic slot-scanning path
// in `pixel_source`, which is always correct and never assumed to be fast.
//
// A `ChannelOrder` lists, slot by slot, which canonical channel lives there. For
// interleaved bytes slot 0 is the first byte of the pixel. For packed words slot 0
// is the most significant byte (bits 24..=31) and slot 3 the least (bits 0..=7).
//
// Opaque-alpha rule: decoding a source without alpha yields alpha = 255 no matter
// what the buffer holds in the alpha slot, if it has one at all.

use crate::core_modules::channel::{Argb, Channel, OPAQUE};
use crate::error::PreconditionViolation;

/// Which supported family a channel order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFamily {
    /// Red before Blue in memory (bytes) or Red in the higher lane (words).
    Rgb,
    /// Blue before Red in memory (bytes) or Blue in the higher lane (words).
    Bgr,
}

/// Physical slot layout of one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOrder {
    slots: [Option<Channel>; 4],
}

impl ChannelOrder {
    pub const RGB: ChannelOrder = ChannelOrder::from_slots([
        Some(Channel::Red),
        Some(Channel::Green),
        Some(Channel::Blue),
        None,
    ]);
    pub const BGR: ChannelOrder = ChannelOrder::from_slots([
        Some(Channel::Blue),
        Some(Channel::Green),
        Some(Channel::Red),
        None,
    ]);
    pub const RGBA: ChannelOrder = ChannelOrder::from_slots([
        Some(Channel::Red),
        Some(Channel::Green),
        Some(Channel::Blue),
        Some(Channel::Alpha),
    ]);
    pub const BGRA: ChannelOrder = ChannelOrder::from_slots([
        Some(Channel::Blue),
        Some(Channel::Green),
        Some(Channel::Red),
        Some(Channel::Alpha),
    ]);
    pub const ARGB: ChannelOrder = ChannelOrder::from_slots([
        Some(Channel::Alpha),
        Some(Channel::Red),
        Some(Channel::Green),
        Some(Channel::Blue),
    ]);
    pub const ABGR: ChannelOrder = ChannelOrder::from_slots([
        Some(Channel::Alpha),
        Some(Channel::Blue),
        Some(Channel::Green),
        Some(Channel::Red),
    ]);

    const fn from_slots(slots: [Option<Channel>; 4]) -> Self {
        Self { slots }
    }

    /// Builds a custom order. A channel may occupy at most one slot; `None` marks
    /// padding.
    pub fn new(slots: [Option<Channel>; 4]) -> Result<Self, PreconditionViolation> {
        for (i, slot) in slots.iter().enumerate() {
            if let Some(channel) = slot {
                if slots[i + 1..].contains(&Some(*channel)) {
                    return Err(PreconditionViolation::DuplicateChannel(*channel));
                }
            }
        }
        Ok(Self { slots })
    }

    pub fn slots(&self) -> [Option<Channel>; 4] {
        self.slots
    }

    /// Slot holding `channel` among the first `width` slots.
    pub fn position_of(&self, channel: Channel, width: usize) -> Option<usize> {
        self.slots[..width.min(4)]
            .iter()
            .position(|slot| *slot == Some(channel))
    }

    /// The supported family of this order, if any.
    pub fn family(&self) -> Option<OrderFamily> {
        if *self == Self::RGB || *self == Self::RGBA || *self == Self::ARGB {
            Some(OrderFamily::Rgb)
        } else if *self == Self::BGR || *self == Self::BGRA || *self == Self::ABGR {
            Some(OrderFamily::Bgr)
        } else {
            None
        }
    }
}

/// Tagged description of a raw backing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferEncoding {
    ByteInterleaved {
        bytes_per_pixel: u8,
        channel_order: ChannelOrder,
    },
    PackedWord {
        channel_order: ChannelOrder,
    },
    /// Opaque per-pixel accessor; the slow path.
    Generic,
}

impl BufferEncoding {
    /// Bytes occupied by one pixel, when the encoding has a fixed stride.
    pub fn stride(&self) -> Option<usize> {
        match self {
            BufferEncoding::ByteInterleaved {
                bytes_per_pixel, ..
            } => Some(*bytes_per_pixel as usize),
            BufferEncoding::PackedWord { .. } => Some(4),
            BufferEncoding::Generic => None,
        }
    }
}

/// Resolved byte offsets of each canonical channel inside an interleaved pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteLayout {
    bytes_per_pixel: usize,
    offsets: [Option<usize>; 4],
}

impl ByteLayout {
    /// `image::RgbImage` layout.
    pub const RGB: ByteLayout = ByteLayout {
        bytes_per_pixel: 3,
        offsets: [None, Some(0), Some(1), Some(2)],
    };

    /// `image::RgbaImage` layout.
    pub const RGBA: ByteLayout = ByteLayout {
        bytes_per_pixel: 4,
        offsets: [Some(3), Some(0), Some(1), Some(2)],
    };

    /// Layout table for a supported `(bytes_per_pixel, order)` combination.
    pub fn resolve(bytes_per_pixel: u8, order: ChannelOrder) -> Option<Self> {
        let bytes_per_pixel = bytes_per_pixel as usize;
        if !(3..=4).contains(&bytes_per_pixel) {
            return None;
        }
        order.family()?;

        let mut offsets = [None; 4];
        for channel in Channel::ALL {
            offsets[channel.index()] = order.position_of(channel, bytes_per_pixel);
        }
        // Every supported family keeps all three colour channels in the pixel.
        if Channel::COLOR.iter().any(|c| offsets[c.index()].is_none()) {
            return None;
        }
        Some(Self {
            bytes_per_pixel,
            offsets,
        })
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    /// Offset of `channel` relative to the pixel's first byte.
    #[inline]
    pub fn offset(&self, channel: Channel) -> Option<usize> {
        self.offsets[channel.index()]
    }

    pub fn has_alpha_slot(&self) -> bool {
        self.offsets[Channel::Alpha.index()].is_some()
    }

    /// Reads one channel from a pixel slice. Colour channels always resolve; a
    /// missing alpha slot reads as opaque.
    #[inline]
    pub fn sample(&self, pixel: &[u8], channel: Channel) -> u8 {
        match self.offsets[channel.index()] {
            Some(offset) => pixel[offset],
            None => OPAQUE,
        }
    }

    #[inline]
    pub fn decode(&self, pixel: &[u8], has_alpha: bool) -> Argb {
        Argb {
            a: if has_alpha {
                self.sample(pixel, Channel::Alpha)
            } else {
                OPAQUE
            },
            r: self.sample(pixel, Channel::Red),
            g: self.sample(pixel, Channel::Green),
            b: self.sample(pixel, Channel::Blue),
        }
    }

    /// Writes `value` into a pixel slice. Channels without a slot are dropped.
    #[inline]
    pub fn encode(&self, value: Argb, pixel: &mut [u8]) {
        for channel in Channel::ALL {
            if let Some(offset) = self.offsets[channel.index()] {
                pixel[offset] = value.channel(channel);
            }
        }
    }
}

/// Resolved bit shifts of each canonical channel inside a packed word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordLayout {
    shifts: [u32; 4],
}

impl WordLayout {
    /// Shift table for `ARGB` (Red in bits 16..=23) or `ABGR` (Blue there instead).
    pub fn resolve(order: ChannelOrder) -> Option<Self> {
        if order != ChannelOrder::ARGB && order != ChannelOrder::ABGR {
            return None;
        }
        let mut shifts = [0; 4];
        for channel in Channel::ALL {
            let slot = order.position_of(channel, 4)?;
            shifts[channel.index()] = 24 - 8 * slot as u32;
        }
        Some(Self { shifts })
    }

    #[inline]
    pub fn shift(&self, channel: Channel) -> u32 {
        self.shifts[channel.index()]
    }

    #[inline]
    pub fn sample(&self, word: u32, channel: Channel) -> u8 {
        (word >> self.shifts[channel.index()]) as u8
    }

    #[inline]
    pub fn decode(&self, word: u32, has_alpha: bool) -> Argb {
        Argb {
            a: if has_alpha {
                self.sample(word, Channel::Alpha)
            } else {
                OPAQUE
            },
            r: self.sample(word, Channel::Red),
            g: self.sample(word, Channel::Green),
            b: self.sample(word, Channel::Blue),
        }
    }

    #[inline]
    pub fn encode(&self, value: Argb) -> u32 {
        Channel::ALL.iter().fold(0u32, |word, channel| {
            word | (value.channel(*channel) as u32) << self.shifts[channel.index()]
        })
    }
}
