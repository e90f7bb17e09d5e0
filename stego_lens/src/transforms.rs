// THEORY:
// The transform library is the catalogue of visual aids an analyst flips through
// when hunting for hidden data. Every entry is a pure function of the immutable
// `PixelSource`: it reads pixels only through the source's sweeps (so byte layout
// knowledge stays in the codec), allocates its own output through `PixelWriter`,
// and returns freshly owned images. Nothing here touches shared state, which is
// what lets the scheduler run every entry on a different worker at the same time.
//
// Entries that derive several images from the same per-pixel work (the eight
// planes of a channel, the four bit pairs, the four HSB recombinations) compute
// them in a single sweep and return them together; one catalogue entry is one unit
// of scheduling, not one image.
//
// Catalogue (labels are what collaborators see):
//   Unedited                      deep copy, natural or configured encoding
//   Grey bits                     fill where R == G == B, background elsewhere
//   Grayscale [+ gamma variant]   Rec. 709 luminance, rounded to nearest
//   <Channel> channel             one channel copied into R, G and B
//   <Channel> plane 0..7          fill where bit i is set, background elsewhere
//   Bit pair 0-1 .. 6-7           bit pair of R, G, B shifted into the high bits
//   XOR inversion                 R, G, B complemented, alpha forced opaque
//   Hue / saturation / brightness inversions from one HSB decomposition
//
// Alpha-plane entries are only catalogued when the source carries alpha. The
// Alpha channel view is always catalogued and renders an opaque black placeholder
// for sources without alpha.

use std::fmt;
use std::sync::Arc;

use crate::core_modules::channel::{Argb, BitIndex, Channel, OPAQUE};
use crate::core_modules::hsb::Hsb;
use crate::core_modules::new_image::{NewImage, OutputEncoding, PixelWriter};
use crate::core_modules::pixel_source::PixelSource;
use crate::error::PreconditionViolation;

/// Rec. 709 luma weights, applied to linear (non gamma-corrected) samples.
const LUMA_RED: f64 = 0.2126;
const LUMA_GREEN: f64 = 0.7152;
const LUMA_BLUE: f64 = 0.0722;
const DISPLAY_GAMMA: f64 = 2.2;

/// One labelled output image.
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub label: String,
    pub image: Arc<NewImage>,
}

impl TransformResult {
    pub fn new(label: impl Into<String>, image: NewImage) -> Self {
        Self {
            label: label.into(),
            image: Arc::new(image),
        }
    }
}

/// Parameters shared by every catalogue entry, validated once up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    /// Colour of "signal" pixels in binary masks.
    pub fill_color: Argb,
    /// Colour of "no signal" pixels in binary masks.
    pub background: Argb,
    pub gamma_grayscale: bool,
    /// Encoding of the unedited copy; `None` follows the source.
    unedited: Option<OutputEncoding>,
}

impl TransformOptions {
    pub fn new(
        fill_color: Argb,
        background: Argb,
        gamma_grayscale: bool,
        unedited: Option<OutputEncoding>,
    ) -> Result<Self, PreconditionViolation> {
        if unedited == Some(OutputEncoding::Gray) {
            return Err(PreconditionViolation::UnsupportedOutput(
                "the unedited copy keeps colour and cannot be rendered as L8".to_string(),
            ));
        }
        Ok(Self {
            fill_color,
            background,
            gamma_grayscale,
            unedited,
        })
    }

    pub fn unedited_encoding(&self) -> Option<OutputEncoding> {
        self.unedited
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            fill_color: Argb::opaque(0, 0, 0),
            background: Argb::opaque(255, 255, 255),
            gamma_grayscale: false,
            unedited: None,
        }
    }
}

/// Identity of a catalogue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    Unedited,
    GreyBits,
    Grayscale,
    Channel(Channel),
    BitPlanes(Channel),
    BitPairs,
    XorInversion,
    HsbFamily,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformKind::Unedited => f.write_str("Unedited"),
            TransformKind::GreyBits => f.write_str("Grey bits"),
            TransformKind::Grayscale => f.write_str("Grayscale"),
            TransformKind::Channel(channel) => write!(f, "{channel} channel"),
            TransformKind::BitPlanes(channel) => write!(f, "{channel} planes"),
            TransformKind::BitPairs => f.write_str("Bit pairs"),
            TransformKind::XorInversion => f.write_str("XOR inversion"),
            TransformKind::HsbFamily => f.write_str("HSB inversions"),
        }
    }
}

/// One unit of scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformTask {
    pub kind: TransformKind,
    pub options: TransformOptions,
}

impl TransformTask {
    pub fn label(&self) -> String {
        self.kind.to_string()
    }

    /// Number of images this entry produces.
    pub fn output_count(&self) -> usize {
        match self.kind {
            TransformKind::Grayscale if self.options.gamma_grayscale => 2,
            TransformKind::BitPlanes(_) => 8,
            TransformKind::BitPairs | TransformKind::HsbFamily => 4,
            _ => 1,
        }
    }

    pub fn run(&self, source: &PixelSource) -> Result<Vec<TransformResult>, PreconditionViolation> {
        let options = &self.options;
        match self.kind {
            TransformKind::Unedited => {
                let encoding = options.unedited.unwrap_or(if source.has_alpha() {
                    OutputEncoding::Argb
                } else {
                    OutputEncoding::Rgb
                });
                Ok(vec![TransformResult::new("Unedited", unedited_copy(source, encoding)?)])
            }
            TransformKind::GreyBits => Ok(vec![TransformResult::new(
                "Grey bits",
                grey_bits(source, options.fill_color, options.background)?,
            )]),
            TransformKind::Grayscale => {
                let mut results = vec![TransformResult::new("Grayscale", grayscale(source)?)];
                if options.gamma_grayscale {
                    results.push(TransformResult::new("Grayscale (gamma)", grayscale_gamma(source)?));
                }
                Ok(results)
            }
            TransformKind::Channel(channel) => Ok(vec![TransformResult::new(
                format!("{channel} channel"),
                channel_image(source, channel)?,
            )]),
            TransformKind::BitPlanes(channel) => {
                let planes = bit_planes(source, channel, options.fill_color, options.background)?;
                Ok(planes
                    .into_iter()
                    .zip(BitIndex::all())
                    .map(|(image, bit)| TransformResult::new(format!("{channel} plane {bit}"), image))
                    .collect())
            }
            TransformKind::BitPairs => {
                let pairs = bit_pairs(source)?;
                Ok(pairs
                    .into_iter()
                    .enumerate()
                    .map(|(pair, image)| {
                        TransformResult::new(format!("Bit pair {}-{}", pair * 2, pair * 2 + 1), image)
                    })
                    .collect())
            }
            TransformKind::XorInversion => Ok(vec![TransformResult::new(
                "XOR inversion",
                xor_inversion(source)?,
            )]),
            TransformKind::HsbFamily => {
                let [hue, hue_brightness, saturation, brightness] = hsb_inversions(source)?;
                Ok(vec![
                    TransformResult::new("Hue inverted", hue),
                    TransformResult::new("Hue and brightness inverted", hue_brightness),
                    TransformResult::new("Saturation inverted", saturation),
                    TransformResult::new("Brightness inverted", brightness),
                ])
            }
        }
    }
}

/// Every entry that applies to a source, in catalogue order.
pub fn catalogue(has_alpha: bool, options: &TransformOptions) -> Vec<TransformTask> {
    let mut kinds = vec![
        TransformKind::Unedited,
        TransformKind::GreyBits,
        TransformKind::Grayscale,
    ];
    kinds.extend(Channel::ALL.map(TransformKind::Channel));
    kinds.extend(
        Channel::ALL
            .into_iter()
            .filter(|channel| has_alpha || *channel != Channel::Alpha)
            .map(TransformKind::BitPlanes),
    );
    kinds.extend([
        TransformKind::BitPairs,
        TransformKind::XorInversion,
        TransformKind::HsbFamily,
    ]);

    kinds
        .into_iter()
        .map(|kind| TransformTask {
            kind,
            options: *options,
        })
        .collect()
}

/// Deep copy of the source in an RGB or ARGB raster. RGB drops alpha; ARGB of a
/// source without alpha is opaque.
pub fn unedited_copy(source: &PixelSource, encoding: OutputEncoding) -> Result<NewImage, PreconditionViolation> {
    if encoding == OutputEncoding::Gray {
        return Err(PreconditionViolation::UnsupportedOutput(
            "the unedited copy keeps colour and cannot be rendered as L8".to_string(),
        ));
    }
    let mut writer = PixelWriter::new(encoding, source.total_pixels());
    for pixel in source.pixels() {
        writer.push(pixel);
    }
    writer.finish(source.width(), source.height())
}

/// Marks the symmetric pixels (R == G == B) with `fill`.
pub fn grey_bits(source: &PixelSource, fill: Argb, background: Argb) -> Result<NewImage, PreconditionViolation> {
    let mut writer = PixelWriter::new(OutputEncoding::Rgb, source.total_pixels());
    for pixel in source.pixels() {
        writer.push(if pixel.is_symmetric() { fill } else { background });
    }
    writer.finish(source.width(), source.height())
}

/// Linear Rec. 709 luminance, rounded to nearest.
pub fn luminance(pixel: Argb) -> u8 {
    let lum = LUMA_RED * pixel.r as f64 + LUMA_GREEN * pixel.g as f64 + LUMA_BLUE * pixel.b as f64;
    (lum + 0.5) as u8
}

/// Rec. 709 luminance computed on gamma-expanded samples and re-compressed.
pub fn luminance_gamma(pixel: Argb) -> u8 {
    let expand = |sample: u8| (sample as f64 / 255.0).powf(DISPLAY_GAMMA);
    let linear = LUMA_RED * expand(pixel.r) + LUMA_GREEN * expand(pixel.g) + LUMA_BLUE * expand(pixel.b);
    (linear.powf(1.0 / DISPLAY_GAMMA) * 255.0 + 0.5) as u8
}

pub fn grayscale(source: &PixelSource) -> Result<NewImage, PreconditionViolation> {
    let mut writer = PixelWriter::new(OutputEncoding::Gray, source.total_pixels());
    for pixel in source.pixels() {
        writer.push_gray(luminance(pixel));
    }
    writer.finish(source.width(), source.height())
}

pub fn grayscale_gamma(source: &PixelSource) -> Result<NewImage, PreconditionViolation> {
    let mut writer = PixelWriter::new(OutputEncoding::Gray, source.total_pixels());
    for pixel in source.pixels() {
        writer.push_gray(luminance_gamma(pixel));
    }
    writer.finish(source.width(), source.height())
}

/// One channel's intensity copied into R, G and B.
pub fn channel_image(source: &PixelSource, channel: Channel) -> Result<NewImage, PreconditionViolation> {
    if channel == Channel::Alpha && !source.has_alpha() {
        return Ok(NewImage::filled(
            source.width(),
            source.height(),
            OutputEncoding::Rgb,
            Argb::opaque(0, 0, 0),
        ));
    }
    let mut writer = PixelWriter::new(OutputEncoding::Rgb, source.total_pixels());
    for sample in source.channel_samples(channel) {
        writer.push_gray(sample);
    }
    writer.finish(source.width(), source.height())
}

/// A single bit-plane of one channel.
pub fn bit_plane(
    source: &PixelSource,
    channel: Channel,
    bit: BitIndex,
    fill: Argb,
    background: Argb,
) -> Result<NewImage, PreconditionViolation> {
    let mut writer = PixelWriter::new(OutputEncoding::Rgb, source.total_pixels());
    for sample in source.channel_samples(channel) {
        writer.push(if bit.is_set(sample) { fill } else { background });
    }
    writer.finish(source.width(), source.height())
}

/// All eight bit-planes of one channel from a single sweep, least significant first.
pub fn bit_planes(
    source: &PixelSource,
    channel: Channel,
    fill: Argb,
    background: Argb,
) -> Result<Vec<NewImage>, PreconditionViolation> {
    let total = source.total_pixels();
    let mut writers: Vec<PixelWriter> = (0..8)
        .map(|_| PixelWriter::new(OutputEncoding::Rgb, total))
        .collect();
    for sample in source.channel_samples(channel) {
        for (bit, writer) in BitIndex::all().zip(writers.iter_mut()) {
            writer.push(if bit.is_set(sample) { fill } else { background });
        }
    }
    writers
        .into_iter()
        .map(|writer| writer.finish(source.width(), source.height()))
        .collect()
}

/// Bits `2 * pair` and `2 * pair + 1` of a sample, moved into the top two bits.
#[inline]
fn isolate_pair(sample: u8, pair: u8) -> u8 {
    ((sample >> (pair * 2)) & 0b11) << 6
}

/// One bit pair (0 = bits 0-1 .. 3 = bits 6-7) of R, G and B at once.
pub fn bit_pair(source: &PixelSource, pair: u8) -> Result<NewImage, PreconditionViolation> {
    if pair > 3 {
        return Err(PreconditionViolation::PairIndexOutOfRange(pair));
    }
    let mut writer = PixelWriter::new(OutputEncoding::Argb, source.total_pixels());
    for pixel in source.pixels() {
        writer.push(Argb::new(
            OPAQUE,
            isolate_pair(pixel.r, pair),
            isolate_pair(pixel.g, pair),
            isolate_pair(pixel.b, pair),
        ));
    }
    writer.finish(source.width(), source.height())
}

/// All four bit pairs from a single sweep.
pub fn bit_pairs(source: &PixelSource) -> Result<Vec<NewImage>, PreconditionViolation> {
    let total = source.total_pixels();
    let mut writers: Vec<PixelWriter> = (0..4)
        .map(|_| PixelWriter::new(OutputEncoding::Argb, total))
        .collect();
    for pixel in source.pixels() {
        for (pair, writer) in (0u8..4).zip(writers.iter_mut()) {
            writer.push(Argb::new(
                OPAQUE,
                isolate_pair(pixel.r, pair),
                isolate_pair(pixel.g, pair),
                isolate_pair(pixel.b, pair),
            ));
        }
    }
    writers
        .into_iter()
        .map(|writer| writer.finish(source.width(), source.height()))
        .collect()
}

/// Complements R, G and B; alpha is forced opaque.
pub fn xor_inversion(source: &PixelSource) -> Result<NewImage, PreconditionViolation> {
    let mut writer = PixelWriter::new(OutputEncoding::Argb, source.total_pixels());
    for pixel in source.pixels() {
        let word = (pixel.to_word() ^ 0x00FF_FFFF) | 0xFF00_0000;
        writer.push(Argb::from_word(word));
    }
    writer.finish(source.width(), source.height())
}

/// Hue, hue + brightness, saturation and brightness inversions, in that order.
pub fn hsb_inversions(source: &PixelSource) -> Result<[NewImage; 4], PreconditionViolation> {
    let total = source.total_pixels();
    let mut writers: [PixelWriter; 4] =
        std::array::from_fn(|_| PixelWriter::new(OutputEncoding::Rgb, total));

    for pixel in source.pixels() {
        let hsb = Hsb::from_rgb(pixel.r, pixel.g, pixel.b);
        let variants = [
            hsb.hue_inverted(),
            hsb.hue_inverted().brightness_inverted(),
            hsb.saturation_inverted(),
            hsb.brightness_inverted(),
        ];
        for (variant, writer) in variants.into_iter().zip(writers.iter_mut()) {
            let (r, g, b) = variant.to_rgb();
            writer.push(Argb::opaque(r, g, b));
        }
    }

    let (width, height) = (source.width(), source.height());
    let [hue, hue_brightness, saturation, brightness] = writers;
    Ok([
        hue.finish(width, height)?,
        hue_brightness.finish(width, height)?,
        saturation.finish(width, height)?,
        brightness.finish(width, height)?,
    ])
}
