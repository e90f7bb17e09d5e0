// THEORY:
// A `NewImage` is what every transform hands back: a freshly allocated raster that
// shares nothing with the `PixelSource` it was computed from. Only the three
// encodings the transform library naturally produces are representable (RGB, ARGB
// and 8-bit grayscale), each backed by the matching `image` crate buffer type so
// collaborators can encode, display or compare it without another conversion.
//
// `PixelWriter` is the single way transforms fill an output. It takes canonical
// `Argb` values in row-major order and lays them out for the target encoding, so
// no transform needs to know how an `RgbaImage` orders its bytes.

use image::{ColorType, DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

use crate::core_modules::channel::{Argb, OPAQUE};
use crate::error::PreconditionViolation;

/// Encodings a transform may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputEncoding {
    Rgb,
    Argb,
    Gray,
}

impl OutputEncoding {
    pub const fn channels(self) -> usize {
        match self {
            OutputEncoding::Rgb => 3,
            OutputEncoding::Argb => 4,
            OutputEncoding::Gray => 1,
        }
    }

    pub const fn color_type(self) -> ColorType {
        match self {
            OutputEncoding::Rgb => ColorType::Rgb8,
            OutputEncoding::Argb => ColorType::Rgba8,
            OutputEncoding::Gray => ColorType::L8,
        }
    }
}

impl TryFrom<ColorType> for OutputEncoding {
    type Error = PreconditionViolation;

    fn try_from(color_type: ColorType) -> Result<Self, Self::Error> {
        match color_type {
            ColorType::Rgb8 => Ok(OutputEncoding::Rgb),
            ColorType::Rgba8 => Ok(OutputEncoding::Argb),
            ColorType::L8 => Ok(OutputEncoding::Gray),
            other => Err(PreconditionViolation::UnsupportedOutput(format!("{other:?}"))),
        }
    }
}

/// A transform's output raster.
#[derive(Debug, Clone, PartialEq)]
pub enum NewImage {
    Rgb(RgbImage),
    Argb(RgbaImage),
    Gray(GrayImage),
}

impl NewImage {
    /// Wraps an already laid-out buffer; its length must be
    /// `width * height * encoding.channels()`.
    pub fn from_raw(
        width: u32,
        height: u32,
        encoding: OutputEncoding,
        data: Vec<u8>,
    ) -> Result<Self, PreconditionViolation> {
        let expected = width as usize * height as usize * encoding.channels();
        let actual = data.len();
        let mismatch = PreconditionViolation::BufferLength { expected, actual };
        match encoding {
            OutputEncoding::Rgb => RgbImage::from_raw(width, height, data).map(NewImage::Rgb),
            OutputEncoding::Argb => RgbaImage::from_raw(width, height, data).map(NewImage::Argb),
            OutputEncoding::Gray => GrayImage::from_raw(width, height, data).map(NewImage::Gray),
        }
        .filter(|_| expected == actual)
        .ok_or(mismatch)
    }

    /// An image where every pixel is `value`.
    pub fn filled(width: u32, height: u32, encoding: OutputEncoding, value: Argb) -> Self {
        match encoding {
            OutputEncoding::Rgb => {
                NewImage::Rgb(RgbImage::from_pixel(width, height, Rgb([value.r, value.g, value.b])))
            }
            OutputEncoding::Argb => NewImage::Argb(RgbaImage::from_pixel(
                width,
                height,
                Rgba([value.r, value.g, value.b, value.a]),
            )),
            OutputEncoding::Gray => NewImage::Gray(GrayImage::from_pixel(width, height, Luma([value.r]))),
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            NewImage::Rgb(image) => image.width(),
            NewImage::Argb(image) => image.width(),
            NewImage::Gray(image) => image.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            NewImage::Rgb(image) => image.height(),
            NewImage::Argb(image) => image.height(),
            NewImage::Gray(image) => image.height(),
        }
    }

    pub fn encoding(&self) -> OutputEncoding {
        match self {
            NewImage::Rgb(_) => OutputEncoding::Rgb,
            NewImage::Argb(_) => OutputEncoding::Argb,
            NewImage::Gray(_) => OutputEncoding::Gray,
        }
    }

    /// Reads a pixel back as canonical `Argb`. Gray expands to `(l, l, l)`; RGB and
    /// gray read as opaque.
    pub fn argb_at(&self, x: u32, y: u32) -> Argb {
        match self {
            NewImage::Rgb(image) => {
                let [r, g, b] = image.get_pixel(x, y).0;
                Argb::opaque(r, g, b)
            }
            NewImage::Argb(image) => {
                let [r, g, b, a] = image.get_pixel(x, y).0;
                Argb::new(a, r, g, b)
            }
            NewImage::Gray(image) => {
                let [l] = image.get_pixel(x, y).0;
                Argb::opaque(l, l, l)
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            NewImage::Rgb(image) => image.as_raw(),
            NewImage::Argb(image) => image.as_raw(),
            NewImage::Gray(image) => image.as_raw(),
        }
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        match self {
            NewImage::Rgb(image) => DynamicImage::ImageRgb8(image.clone()),
            NewImage::Argb(image) => DynamicImage::ImageRgba8(image.clone()),
            NewImage::Gray(image) => DynamicImage::ImageLuma8(image.clone()),
        }
    }
}

impl From<NewImage> for DynamicImage {
    fn from(image: NewImage) -> Self {
        match image {
            NewImage::Rgb(image) => DynamicImage::ImageRgb8(image),
            NewImage::Argb(image) => DynamicImage::ImageRgba8(image),
            NewImage::Gray(image) => DynamicImage::ImageLuma8(image),
        }
    }
}

/// Row-major output builder used by every transform.
pub struct PixelWriter {
    encoding: OutputEncoding,
    data: Vec<u8>,
}

impl PixelWriter {
    pub fn new(encoding: OutputEncoding, pixels: usize) -> Self {
        Self {
            encoding,
            data: Vec::with_capacity(pixels * encoding.channels()),
        }
    }

    /// Appends one pixel. Gray outputs take the red sample; RGB drops alpha.
    #[inline]
    pub fn push(&mut self, value: Argb) {
        match self.encoding {
            OutputEncoding::Rgb => self.data.extend_from_slice(&[value.r, value.g, value.b]),
            OutputEncoding::Argb => {
                self.data.extend_from_slice(&[value.r, value.g, value.b, value.a])
            }
            OutputEncoding::Gray => self.data.push(value.r),
        }
    }

    /// Appends a grey level (all colour channels equal, opaque).
    #[inline]
    pub fn push_gray(&mut self, level: u8) {
        self.push(Argb::new(OPAQUE, level, level, level));
    }

    pub fn finish(self, width: u32, height: u32) -> Result<NewImage, PreconditionViolation> {
        NewImage::from_raw(width, height, self.encoding, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_colour_types_are_rejected() {
        assert_eq!(OutputEncoding::try_from(ColorType::Rgba8), Ok(OutputEncoding::Argb));
        assert!(matches!(
            OutputEncoding::try_from(ColorType::Rgb16),
            Err(PreconditionViolation::UnsupportedOutput(_))
        ));
        assert!(OutputEncoding::try_from(ColorType::La8).is_err());
    }

    #[test]
    fn writer_lays_out_each_encoding() {
        let value = Argb::new(4, 1, 2, 3);
        for (encoding, expected) in [
            (OutputEncoding::Rgb, vec![1, 2, 3]),
            (OutputEncoding::Argb, vec![1, 2, 3, 4]),
            (OutputEncoding::Gray, vec![1]),
        ] {
            let mut writer = PixelWriter::new(encoding, 1);
            writer.push(value);
            let image = writer.finish(1, 1).unwrap();
            assert_eq!(image.as_bytes(), expected.as_slice());
            assert_eq!(image.encoding(), encoding);
        }
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert_eq!(
            NewImage::from_raw(2, 2, OutputEncoding::Rgb, vec![0; 11]),
            Err(PreconditionViolation::BufferLength {
                expected: 12,
                actual: 11
            })
        );
    }

    #[test]
    fn oversized_buffers_are_rejected() {
        assert!(NewImage::from_raw(1, 1, OutputEncoding::Gray, vec![0; 2]).is_err());
    }

    #[test]
    fn filled_images_read_back_uniformly() {
        let image = NewImage::filled(3, 2, OutputEncoding::Argb, Argb::new(255, 9, 8, 7));
        assert_eq!(image.width(), 3);
        assert_eq!(image.height(), 2);
        assert_eq!(image.argb_at(2, 1), Argb::new(255, 9, 8, 7));
    }
}
