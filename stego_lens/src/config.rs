use image::{ColorType, Rgb};

use crate::core_modules::channel::Argb;
use crate::core_modules::new_image::OutputEncoding;
use crate::error::PreconditionViolation;
use crate::transforms::TransformOptions;

/// Header dimensions above this many pixels are refused before decoding.
pub const DEFAULT_MAX_DECODED_PIXELS: u64 = 40_000_000;

/// Configuration for an `AnalysisSession`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Colour of "signal" pixels in grey-bit and bit-plane masks.
    pub fill_color: Rgb<u8>,
    /// Colour of "no signal" pixels in the same masks.
    pub background: Rgb<u8>,
    /// Upper bound on transforms computed at the same time.
    pub worker_count: usize,
    pub max_decoded_pixels: u64,
    /// Adds a gamma-corrected grayscale next to the linear one.
    pub gamma_grayscale: bool,
    /// Raster type of the unedited copy. `None` keeps RGB for opaque sources and
    /// RGBA for sources with alpha.
    pub unedited_color_type: Option<ColorType>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fill_color: Rgb([0, 0, 0]),
            background: Rgb([255, 255, 255]),
            worker_count: num_cpus::get(),
            max_decoded_pixels: DEFAULT_MAX_DECODED_PIXELS,
            gamma_grayscale: false,
            unedited_color_type: None,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), PreconditionViolation> {
        if self.worker_count == 0 {
            return Err(PreconditionViolation::WorkerCount);
        }
        self.transform_options().map(|_| ())
    }

    pub fn transform_options(&self) -> Result<TransformOptions, PreconditionViolation> {
        let [fill_r, fill_g, fill_b] = self.fill_color.0;
        let [back_r, back_g, back_b] = self.background.0;
        let unedited = self
            .unedited_color_type
            .map(OutputEncoding::try_from)
            .transpose()?;
        TransformOptions::new(
            Argb::opaque(fill_r, fill_g, fill_b),
            Argb::opaque(back_r, back_g, back_b),
            self.gamma_grayscale,
            unedited,
        )
    }
}
