// THEORY:
// Loading turns whatever the host has (a path, encoded bytes, an already decoded
// image, or raw pixels it built itself) into the immutable `PixelSource` a session
// analyses. Encoded inputs fail as early as possible: the format is sniffed and the
// header dimensions are checked against the pixel limit before a full decode, so an
// oversized file never gets its raster allocated.
//
// Everything here is synchronous and CPU/IO bound; the session runs it on a
// blocking task of its own.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView, ImageReader};

use crate::core_modules::pixel_source::PixelSource;
use crate::error::LoadError;

/// Where a session's image comes from.
#[derive(Debug)]
pub enum ImageSource {
    FilePath(PathBuf),
    /// Encoded image bytes (PNG, BMP, ...).
    Bytes(Vec<u8>),
    Decoded(DynamicImage),
    Pixels(PixelSource),
}

impl ImageSource {
    /// Short description for log lines.
    pub fn describe(&self) -> String {
        match self {
            ImageSource::FilePath(path) => format!("file {}", path.display()),
            ImageSource::Bytes(bytes) => format!("{} encoded bytes", bytes.len()),
            ImageSource::Decoded(image) => {
                let (width, height) = image.dimensions();
                format!("decoded {width}x{height} image")
            }
            ImageSource::Pixels(source) => {
                format!("{}x{} pixel buffer", source.width(), source.height())
            }
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::FilePath(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::FilePath(path.to_path_buf())
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(image: DynamicImage) -> Self {
        ImageSource::Decoded(image)
    }
}

impl From<PixelSource> for ImageSource {
    fn from(source: PixelSource) -> Self {
        ImageSource::Pixels(source)
    }
}

pub fn load(source: ImageSource, max_decoded_pixels: u64) -> Result<PixelSource, LoadError> {
    match source {
        ImageSource::FilePath(path) => {
            let bytes = std::fs::read(&path)
                .map_err(|e| LoadError::FileSystem(format!("{}: {e}", path.display())))?;
            decode_bytes(&bytes, max_decoded_pixels)
        }
        ImageSource::Bytes(bytes) => decode_bytes(&bytes, max_decoded_pixels),
        ImageSource::Decoded(image) => {
            let (width, height) = image.dimensions();
            check_pixel_limit(width, height, max_decoded_pixels)?;
            Ok(PixelSource::from_dynamic(image))
        }
        ImageSource::Pixels(source) => {
            check_pixel_limit(source.width(), source.height(), max_decoded_pixels)?;
            Ok(source)
        }
    }
}

fn decode_bytes(bytes: &[u8], max_decoded_pixels: u64) -> Result<PixelSource, LoadError> {
    let (width, height) = inspect_dimensions(bytes)?;
    check_pixel_limit(width, height, max_decoded_pixels)?;

    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| LoadError::InvalidFormat(e.to_string()))?
        .decode()
        .map_err(map_decode_error)?;
    Ok(PixelSource::from_dynamic(image))
}

/// Reads width and height from the image header only.
fn inspect_dimensions(bytes: &[u8]) -> Result<(u32, u32), LoadError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| LoadError::InvalidFormat(e.to_string()))?;
    if reader.format().is_none() {
        return Err(LoadError::InvalidFormat(
            "no known image signature in the first bytes".to_string(),
        ));
    }
    reader.into_dimensions().map_err(map_decode_error)
}

fn check_pixel_limit(width: u32, height: u32, max_decoded_pixels: u64) -> Result<(), LoadError> {
    let pixels = (width as u64) * (height as u64);
    if pixels > max_decoded_pixels {
        return Err(LoadError::ResourceLimit(format!(
            "{width}x{height} is {pixels} pixels (limit {max_decoded_pixels})"
        )));
    }
    Ok(())
}

fn map_decode_error(error: image::ImageError) -> LoadError {
    match error {
        image::ImageError::Unsupported(e) => LoadError::InvalidFormat(e.to_string()),
        image::ImageError::Limits(e) => LoadError::ResourceLimit(e.to_string()),
        image::ImageError::IoError(e) => LoadError::FileSystem(e.to_string()),
        other => LoadError::Decode(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 7, 200]));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn encoded_bytes_decode_to_a_pixel_source() {
        let source = load(ImageSource::Bytes(png_bytes(3, 2)), 100).unwrap();
        assert_eq!((source.width(), source.height()), (3, 2));
        assert!(source.has_alpha());
        assert_eq!(source.pixel(4).a, 200);
    }

    #[test]
    fn oversized_headers_are_refused_before_decoding() {
        let error = load(ImageSource::Bytes(png_bytes(10, 10)), 99).unwrap_err();
        assert!(matches!(error, LoadError::ResourceLimit(_)));
    }

    #[test]
    fn garbage_is_an_invalid_format() {
        let error = load(ImageSource::Bytes(b"definitely not an image".to_vec()), 100).unwrap_err();
        assert!(matches!(error, LoadError::InvalidFormat(_)));
    }

    #[test]
    fn truncated_files_fail_to_decode() {
        let mut bytes = png_bytes(16, 16);
        bytes.truncate(bytes.len() / 2);
        let error = load(ImageSource::Bytes(bytes), 1_000).unwrap_err();
        assert!(matches!(
            error,
            LoadError::Decode(_) | LoadError::FileSystem(_) | LoadError::InvalidFormat(_)
        ));
    }

    #[test]
    fn missing_files_are_file_system_errors() {
        let error = load(ImageSource::FilePath(PathBuf::from("/nonexistent/stego.png")), 100).unwrap_err();
        assert!(matches!(error, LoadError::FileSystem(_)));
    }

    #[test]
    fn decoded_images_respect_the_limit() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(5, 5));
        assert!(load(ImageSource::Decoded(image.clone()), 25).is_ok());
        assert!(matches!(
            load(ImageSource::Decoded(image), 24),
            Err(LoadError::ResourceLimit(_))
        ));
    }
}
