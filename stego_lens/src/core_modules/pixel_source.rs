// THEORY:
// `PixelSource` is the immutable, canonical raster every analysis reads from. It
// owns the decoded pixels in whatever raw form they arrived in and answers channel
// queries against that raw form directly, through the layout tables of the codec.
// Nothing downstream ever receives a mutable view of it: transforms allocate their
// own output, and anyone who wants an "unedited" copy gets a deep clone.
//
// Three backing forms exist, mirroring `BufferEncoding`:
//   - `Bytes`: interleaved 3/4-byte pixels with a resolved `ByteLayout`.
//   - `Words`: packed `u32` pixels with a resolved `WordLayout`.
//   - `Generic`: a boxed `PixelAccess`, either an `image::DynamicImage` (its own
//     colour model does the conversion) or a slot scanner for raw buffers whose
//     channel order has no precomputed table.
//
// Two read styles are offered:
//   - random access (`sample`, `sample_xy`, `pixel`) dispatches per call;
//   - sweeps (`pixels`, `channel_samples`) dispatch once and then walk the raw
//     buffer, which is what the transform library uses.
// Both must agree exactly; the tests below cross-check them on every encoding.

use std::fmt;
use std::slice::{ChunksExact, Iter};

use image::{DynamicImage, GenericImageView, RgbImage, RgbaImage};

use crate::core_modules::channel::{Argb, Channel, OPAQUE};
use crate::core_modules::codec::{BufferEncoding, ByteLayout, ChannelOrder, WordLayout};
use crate::error::PreconditionViolation;

/// Per-pixel accessor behind the `Generic` encoding.
///
/// Implementations return the raw alpha they hold; the opaque-alpha rule is applied
/// by `PixelSource`.
pub trait PixelAccess: Send + Sync + fmt::Debug {
    fn dimensions(&self) -> (u32, u32);
    fn argb(&self, x: u32, y: u32) -> Argb;
    fn boxed_clone(&self) -> Box<dyn PixelAccess>;
}

impl PixelAccess for DynamicImage {
    fn dimensions(&self) -> (u32, u32) {
        GenericImageView::dimensions(self)
    }

    fn argb(&self, x: u32, y: u32) -> Argb {
        let [r, g, b, a] = self.get_pixel(x, y).0;
        Argb { a, r, g, b }
    }

    fn boxed_clone(&self) -> Box<dyn PixelAccess> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone)]
enum ScannedBuffer {
    Bytes { bytes_per_pixel: usize, data: Vec<u8> },
    Words(Vec<u32>),
}

/// Raw buffer whose channel order has no layout table. Looks every slot up on
/// every read.
#[derive(Debug, Clone)]
struct SlotScanner {
    order: ChannelOrder,
    width: u32,
    height: u32,
    buffer: ScannedBuffer,
}

impl PixelAccess for SlotScanner {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn argb(&self, x: u32, y: u32) -> Argb {
        let index = y as usize * self.width as usize + x as usize;
        let mut value = Argb::new(OPAQUE, 0, 0, 0);
        for channel in Channel::ALL {
            let sample = match &self.buffer {
                ScannedBuffer::Bytes {
                    bytes_per_pixel,
                    data,
                } => self
                    .order
                    .position_of(channel, *bytes_per_pixel)
                    .map(|slot| data[index * bytes_per_pixel + slot]),
                ScannedBuffer::Words(data) => self
                    .order
                    .position_of(channel, 4)
                    .map(|slot| (data[index] >> word_shift(slot)) as u8),
            };
            if let Some(sample) = sample {
                value.set_channel(channel, sample);
            }
        }
        value
    }

    fn boxed_clone(&self) -> Box<dyn PixelAccess> {
        Box::new(self.clone())
    }
}

/// Slot 0 is the most significant byte of a packed word.
fn word_shift(slot: usize) -> u32 {
    24 - 8 * slot as u32
}

enum RawBuffer {
    Bytes { layout: ByteLayout, data: Vec<u8> },
    Words { layout: WordLayout, data: Vec<u32> },
    Generic(Box<dyn PixelAccess>),
}

impl RawBuffer {
    fn deep_clone(&self) -> Self {
        match self {
            RawBuffer::Bytes { layout, data } => RawBuffer::Bytes {
                layout: *layout,
                data: data.clone(),
            },
            RawBuffer::Words { layout, data } => RawBuffer::Words {
                layout: *layout,
                data: data.clone(),
            },
            RawBuffer::Generic(access) => RawBuffer::Generic(access.boxed_clone()),
        }
    }
}

impl fmt::Debug for RawBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawBuffer::Bytes { data, .. } => write!(f, "Bytes({} bytes)", data.len()),
            RawBuffer::Words { data, .. } => write!(f, "Words({} words)", data.len()),
            RawBuffer::Generic(access) => write!(f, "Generic({access:?})"),
        }
    }
}

/// The canonical, read-only raster of an analysis.
#[derive(Debug)]
pub struct PixelSource {
    width: u32,
    height: u32,
    has_alpha: bool,
    encoding: BufferEncoding,
    raw: RawBuffer,
}

impl PixelSource {
    /// Wraps a decoded image without copying its pixels. 8-bit RGB and RGBA keep
    /// their buffers as interleaved bytes; every other colour type goes through the
    /// image's own colour model.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let (width, height) = GenericImageView::dimensions(&image);
        match image {
            DynamicImage::ImageRgb8(buffer) => Self::interleaved(
                width,
                height,
                false,
                ChannelOrder::RGB,
                ByteLayout::RGB,
                buffer.into_raw(),
            ),
            DynamicImage::ImageRgba8(buffer) => Self::interleaved(
                width,
                height,
                true,
                ChannelOrder::RGBA,
                ByteLayout::RGBA,
                buffer.into_raw(),
            ),
            other => {
                let has_alpha = other.color().has_alpha();
                Self::from_accessor(Box::new(other), has_alpha)
            }
        }
    }

    /// Wraps an arbitrary accessor as a `Generic` source.
    pub fn from_accessor(access: Box<dyn PixelAccess>, has_alpha: bool) -> Self {
        let (width, height) = access.dimensions();
        Self {
            width,
            height,
            has_alpha,
            encoding: BufferEncoding::Generic,
            raw: RawBuffer::Generic(access),
        }
    }

    /// Wraps an interleaved byte buffer. Orders without a layout table route to the
    /// generic path.
    pub fn from_interleaved(
        width: u32,
        height: u32,
        has_alpha: bool,
        bytes_per_pixel: u8,
        order: ChannelOrder,
        data: Vec<u8>,
    ) -> Result<Self, PreconditionViolation> {
        if !(3..=4).contains(&bytes_per_pixel) {
            return Err(PreconditionViolation::BytesPerPixel(bytes_per_pixel));
        }
        let slots = bytes_per_pixel as usize;
        check_length(width, height, slots, data.len())?;
        check_slots(order, slots, has_alpha)?;

        if let Some(layout) = ByteLayout::resolve(bytes_per_pixel, order) {
            return Ok(Self::interleaved(
                width, height, has_alpha, order, layout, data,
            ));
        }

        let scanner = SlotScanner {
            order,
            width,
            height,
            buffer: ScannedBuffer::Bytes {
                bytes_per_pixel: slots,
                data,
            },
        };
        Ok(Self::from_accessor(Box::new(scanner), has_alpha))
    }

    /// Wraps a packed-word buffer. Only `ARGB` and `ABGR` words take the fast path.
    pub fn from_packed_words(
        width: u32,
        height: u32,
        has_alpha: bool,
        order: ChannelOrder,
        data: Vec<u32>,
    ) -> Result<Self, PreconditionViolation> {
        check_length(width, height, 1, data.len())?;
        check_slots(order, 4, has_alpha)?;

        match WordLayout::resolve(order) {
            Some(layout) => Ok(Self {
                width,
                height,
                has_alpha,
                encoding: BufferEncoding::PackedWord {
                    channel_order: order,
                },
                raw: RawBuffer::Words { layout, data },
            }),
            None => {
                let scanner = SlotScanner {
                    order,
                    width,
                    height,
                    buffer: ScannedBuffer::Words(data),
                };
                Ok(Self::from_accessor(Box::new(scanner), has_alpha))
            }
        }
    }

    /// Encodes canonical pixels (row-major) into the requested encoding.
    pub fn from_argb(
        width: u32,
        height: u32,
        has_alpha: bool,
        encoding: BufferEncoding,
        pixels: &[Argb],
    ) -> Result<Self, PreconditionViolation> {
        check_length(width, height, 1, pixels.len())?;

        match encoding {
            BufferEncoding::ByteInterleaved {
                bytes_per_pixel,
                channel_order,
            } => {
                if !(3..=4).contains(&bytes_per_pixel) {
                    return Err(PreconditionViolation::BytesPerPixel(bytes_per_pixel));
                }
                let stride = bytes_per_pixel as usize;
                let mut data = vec![0u8; pixels.len() * stride];
                let layout = ByteLayout::resolve(bytes_per_pixel, channel_order);
                for (value, pixel) in pixels.iter().zip(data.chunks_exact_mut(stride)) {
                    match layout {
                        Some(layout) => layout.encode(*value, pixel),
                        None => {
                            for (slot, channel) in channel_order.slots()[..stride].iter().enumerate() {
                                if let Some(channel) = channel {
                                    pixel[slot] = value.channel(*channel);
                                }
                            }
                        }
                    }
                }
                Self::from_interleaved(width, height, has_alpha, bytes_per_pixel, channel_order, data)
            }
            BufferEncoding::PackedWord { channel_order } => {
                let layout = WordLayout::resolve(channel_order);
                let data = pixels
                    .iter()
                    .map(|value| match layout {
                        Some(layout) => layout.encode(*value),
                        None => channel_order
                            .slots()
                            .iter()
                            .enumerate()
                            .fold(0u32, |word, (slot, channel)| match channel {
                                Some(channel) => word | (value.channel(*channel) as u32) << word_shift(slot),
                                None => word,
                            }),
                    })
                    .collect();
                Self::from_packed_words(width, height, has_alpha, channel_order, data)
            }
            BufferEncoding::Generic => {
                let image = if has_alpha {
                    let bytes = pixels.iter().flat_map(|p| [p.r, p.g, p.b, p.a]).collect();
                    RgbaImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgba8)
                } else {
                    let bytes = pixels.iter().flat_map(|p| [p.r, p.g, p.b]).collect();
                    RgbImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgb8)
                };
                let image = image.ok_or(PreconditionViolation::BufferLength {
                    expected: pixel_count(width, height),
                    actual: pixels.len(),
                })?;
                Ok(Self::from_accessor(Box::new(image), has_alpha))
            }
        }
    }

    fn interleaved(
        width: u32,
        height: u32,
        has_alpha: bool,
        order: ChannelOrder,
        layout: ByteLayout,
        data: Vec<u8>,
    ) -> Self {
        Self {
            width,
            height,
            has_alpha,
            encoding: BufferEncoding::ByteInterleaved {
                bytes_per_pixel: layout.bytes_per_pixel() as u8,
                channel_order: order,
            },
            raw: RawBuffer::Bytes { layout, data },
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn encoding(&self) -> BufferEncoding {
        self.encoding
    }

    pub fn total_pixels(&self) -> usize {
        pixel_count(self.width, self.height)
    }

    /// One channel of the pixel at `index` (row-major). Alpha of a source without
    /// alpha is 255 and never touches the buffer.
    ///
    /// Panics when `index` is outside `[0, total_pixels)`.
    pub fn sample(&self, channel: Channel, index: usize) -> u8 {
        self.check_index(index);
        if channel == Channel::Alpha && !self.has_alpha {
            return OPAQUE;
        }
        match &self.raw {
            RawBuffer::Bytes { layout, data } => {
                let base = index * layout.bytes_per_pixel();
                layout.sample(&data[base..base + layout.bytes_per_pixel()], channel)
            }
            RawBuffer::Words { layout, data } => layout.sample(data[index], channel),
            RawBuffer::Generic(access) => {
                let (x, y) = self.coordinates(index);
                access.argb(x, y).channel(channel)
            }
        }
    }

    /// Two-dimensional form of `sample`. Panics when `(x, y)` is outside the raster.
    pub fn sample_xy(&self, channel: Channel, x: u32, y: u32) -> u8 {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) out of bounds for {}x{} source",
            self.width,
            self.height
        );
        self.sample(channel, y as usize * self.width as usize + x as usize)
    }

    /// All four channels of the pixel at `index`.
    pub fn pixel(&self, index: usize) -> Argb {
        self.check_index(index);
        match &self.raw {
            RawBuffer::Bytes { layout, data } => {
                let base = index * layout.bytes_per_pixel();
                layout.decode(&data[base..base + layout.bytes_per_pixel()], self.has_alpha)
            }
            RawBuffer::Words { layout, data } => layout.decode(data[index], self.has_alpha),
            RawBuffer::Generic(access) => {
                let (x, y) = self.coordinates(index);
                self.apply_alpha_rule(access.argb(x, y))
            }
        }
    }

    /// Row-major sweep over every pixel.
    pub fn pixels(&self) -> Pixels<'_> {
        let inner = match &self.raw {
            RawBuffer::Bytes { layout, data } => PixelsInner::Bytes {
                layout: *layout,
                chunks: data.chunks_exact(layout.bytes_per_pixel()),
            },
            RawBuffer::Words { layout, data } => PixelsInner::Words {
                layout: *layout,
                words: data.iter(),
            },
            RawBuffer::Generic(access) => PixelsInner::Generic {
                access: access.as_ref(),
                width: self.width,
                next: 0,
                total: self.total_pixels(),
            },
        };
        Pixels {
            inner,
            has_alpha: self.has_alpha,
        }
    }

    /// Row-major sweep over one channel.
    pub fn channel_samples(&self, channel: Channel) -> ChannelSamples<'_> {
        let total = self.total_pixels();
        if channel == Channel::Alpha && !self.has_alpha {
            return ChannelSamples {
                inner: SamplesInner::Constant {
                    value: OPAQUE,
                    remaining: total,
                },
            };
        }
        let inner = match &self.raw {
            RawBuffer::Bytes { layout, data } => match layout.offset(channel) {
                Some(offset) => SamplesInner::Bytes {
                    offset,
                    chunks: data.chunks_exact(layout.bytes_per_pixel()),
                },
                None => SamplesInner::Constant {
                    value: OPAQUE,
                    remaining: total,
                },
            },
            RawBuffer::Words { layout, data } => SamplesInner::Words {
                shift: layout.shift(channel),
                words: data.iter(),
            },
            RawBuffer::Generic(access) => SamplesInner::Generic {
                access: access.as_ref(),
                channel,
                width: self.width,
                next: 0,
                total,
            },
        };
        ChannelSamples { inner }
    }

    /// Deep copy of the raster; never an alias of this source's buffer.
    pub fn clone_canonical(&self) -> PixelSource {
        PixelSource {
            width: self.width,
            height: self.height,
            has_alpha: self.has_alpha,
            encoding: self.encoding,
            raw: self.raw.deep_clone(),
        }
    }

    fn check_index(&self, index: usize) {
        assert!(
            index < self.total_pixels(),
            "pixel index {index} out of bounds for {}x{} source",
            self.width,
            self.height
        );
    }

    fn coordinates(&self, index: usize) -> (u32, u32) {
        let width = self.width as usize;
        ((index % width) as u32, (index / width) as u32)
    }

    fn apply_alpha_rule(&self, mut value: Argb) -> Argb {
        if !self.has_alpha {
            value.a = OPAQUE;
        }
        value
    }
}

impl Clone for PixelSource {
    fn clone(&self) -> Self {
        self.clone_canonical()
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn check_length(
    width: u32,
    height: u32,
    per_pixel: usize,
    actual: usize,
) -> Result<(), PreconditionViolation> {
    let expected = pixel_count(width, height)
        .checked_mul(per_pixel)
        .ok_or(PreconditionViolation::BufferLength {
            expected: usize::MAX,
            actual,
        })?;
    if expected != actual {
        return Err(PreconditionViolation::BufferLength { expected, actual });
    }
    Ok(())
}

fn check_slots(
    order: ChannelOrder,
    slots: usize,
    has_alpha: bool,
) -> Result<(), PreconditionViolation> {
    for channel in Channel::COLOR {
        if order.position_of(channel, slots).is_none() {
            return Err(PreconditionViolation::MissingColorSlot(channel));
        }
    }
    if has_alpha && order.position_of(Channel::Alpha, slots).is_none() {
        return Err(PreconditionViolation::MissingAlphaSlot);
    }
    Ok(())
}

enum PixelsInner<'a> {
    Bytes {
        layout: ByteLayout,
        chunks: ChunksExact<'a, u8>,
    },
    Words {
        layout: WordLayout,
        words: Iter<'a, u32>,
    },
    Generic {
        access: &'a dyn PixelAccess,
        width: u32,
        next: usize,
        total: usize,
    },
}

/// Iterator returned by [`PixelSource::pixels`].
pub struct Pixels<'a> {
    inner: PixelsInner<'a>,
    has_alpha: bool,
}

impl Iterator for Pixels<'_> {
    type Item = Argb;

    #[inline]
    fn next(&mut self) -> Option<Argb> {
        match &mut self.inner {
            PixelsInner::Bytes { layout, chunks } => {
                chunks.next().map(|pixel| layout.decode(pixel, self.has_alpha))
            }
            PixelsInner::Words { layout, words } => {
                words.next().map(|word| layout.decode(*word, self.has_alpha))
            }
            PixelsInner::Generic {
                access,
                width,
                next,
                total,
            } => {
                if *next >= *total {
                    return None;
                }
                let index = *next;
                *next += 1;
                let w = *width as usize;
                let mut value = access.argb((index % w) as u32, (index / w) as u32);
                if !self.has_alpha {
                    value.a = OPAQUE;
                }
                Some(value)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match &self.inner {
            PixelsInner::Bytes { chunks, .. } => chunks.len(),
            PixelsInner::Words { words, .. } => words.len(),
            PixelsInner::Generic { next, total, .. } => total - next,
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Pixels<'_> {}

enum SamplesInner<'a> {
    Constant {
        value: u8,
        remaining: usize,
    },
    Bytes {
        offset: usize,
        chunks: ChunksExact<'a, u8>,
    },
    Words {
        shift: u32,
        words: Iter<'a, u32>,
    },
    Generic {
        access: &'a dyn PixelAccess,
        channel: Channel,
        width: u32,
        next: usize,
        total: usize,
    },
}

/// Iterator returned by [`PixelSource::channel_samples`].
pub struct ChannelSamples<'a> {
    inner: SamplesInner<'a>,
}

impl Iterator for ChannelSamples<'_> {
    type Item = u8;

    #[inline]
    fn next(&mut self) -> Option<u8> {
        match &mut self.inner {
            SamplesInner::Constant { value, remaining } => {
                if *remaining == 0 {
                    return None;
                }
                *remaining -= 1;
                Some(*value)
            }
            SamplesInner::Bytes { offset, chunks } => chunks.next().map(|pixel| pixel[*offset]),
            SamplesInner::Words { shift, words } => words.next().map(|word| (*word >> *shift) as u8),
            SamplesInner::Generic {
                access,
                channel,
                width,
                next,
                total,
            } => {
                if *next >= *total {
                    return None;
                }
                let index = *next;
                *next += 1;
                let w = *width as usize;
                Some(access.argb((index % w) as u32, (index / w) as u32).channel(*channel))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match &self.inner {
            SamplesInner::Constant { remaining, .. } => *remaining,
            SamplesInner::Bytes { chunks, .. } => chunks.len(),
            SamplesInner::Words { words, .. } => words.len(),
            SamplesInner::Generic { next, total, .. } => total - next,
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChannelSamples<'_> {}
