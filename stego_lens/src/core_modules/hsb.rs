// THEORY (HSB decomposition):
// Hue, saturation and brightness of an 8-bit RGB pixel, in the integer-RGB HSB
// model: brightness is the maximum channel, saturation is chroma relative to that
// maximum, hue is the position on the colour wheel expressed as a fraction of a
// full turn in [0, 1). Converting back rounds each channel to nearest (+0.5 then
// truncate), so a decompose/recompose trip reproduces the input exactly for fully
// saturated colours and to within one step otherwise.
//
// The inversion helpers are the four recombinations the HSB transform family
// renders. Hue inversion rotates half a turn, which makes it an involution up to
// floating-point rounding.

/// One pixel in hue/saturation/brightness form, every component in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsb {
    pub hue: f32,
    pub saturation: f32,
    pub brightness: f32,
}

impl Hsb {
    pub fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        let maximum_channel = red.max(green).max(blue) as f32;
        let minimum_channel = red.min(green).min(blue) as f32;
        let chroma = maximum_channel - minimum_channel;

        let brightness = maximum_channel / 255.0;
        let saturation = if maximum_channel != 0.0 {
            chroma / maximum_channel
        } else {
            0.0
        };

        if saturation == 0.0 {
            return Self {
                hue: 0.0,
                saturation,
                brightness,
            };
        }

        let (red, green, blue) = (red as f32, green as f32, blue as f32);
        let red_distance = (maximum_channel - red) / chroma;
        let green_distance = (maximum_channel - green) / chroma;
        let blue_distance = (maximum_channel - blue) / chroma;

        let sextant = if red == maximum_channel {
            blue_distance - green_distance
        } else if green == maximum_channel {
            2.0 + red_distance - blue_distance
        } else {
            4.0 + green_distance - red_distance
        };

        let mut hue = sextant / 6.0;
        if hue < 0.0 {
            hue += 1.0;
        }
        Self {
            hue,
            saturation,
            brightness,
        }
    }

    pub fn to_rgb(self) -> (u8, u8, u8) {
        let brightness = self.brightness;
        if self.saturation == 0.0 {
            let level = to_byte(brightness);
            return (level, level, level);
        }

        let wheel = (self.hue - self.hue.floor()) * 6.0;
        let fraction = wheel - wheel.floor();
        let p = brightness * (1.0 - self.saturation);
        let q = brightness * (1.0 - self.saturation * fraction);
        let t = brightness * (1.0 - self.saturation * (1.0 - fraction));

        let (red, green, blue) = match wheel as u32 {
            0 => (brightness, t, p),
            1 => (q, brightness, p),
            2 => (p, brightness, t),
            3 => (p, q, brightness),
            4 => (t, p, brightness),
            _ => (brightness, p, q),
        };
        (to_byte(red), to_byte(green), to_byte(blue))
    }

    pub fn hue_inverted(self) -> Self {
        Self {
            hue: (self.hue + 0.5) % 1.0,
            ..self
        }
    }

    pub fn saturation_inverted(self) -> Self {
        Self {
            saturation: 1.0 - self.saturation,
            ..self
        }
    }

    pub fn brightness_inverted(self) -> Self {
        Self {
            brightness: 1.0 - self.brightness,
            ..self
        }
    }
}

#[inline]
fn to_byte(component: f32) -> u8 {
    (component * 255.0 + 0.5) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn primaries_sit_on_their_sextants() {
        let red = Hsb::from_rgb(255, 0, 0);
        assert_eq!((red.hue, red.saturation, red.brightness), (0.0, 1.0, 1.0));

        let green = Hsb::from_rgb(0, 255, 0);
        assert!((green.hue - 1.0 / 3.0).abs() < 1e-6);

        let blue = Hsb::from_rgb(0, 0, 255);
        assert!((blue.hue - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn greys_have_no_hue_or_saturation() {
        let grey = Hsb::from_rgb(128, 128, 128);
        assert_eq!(grey.hue, 0.0);
        assert_eq!(grey.saturation, 0.0);
        assert_eq!(grey.to_rgb(), (128, 128, 128));

        let black = Hsb::from_rgb(0, 0, 0);
        assert_eq!(black.saturation, 0.0);
        assert_eq!(black.to_rgb(), (0, 0, 0));
    }

    #[test]
    fn hue_inversion_maps_red_to_cyan_and_back() {
        let cyan = Hsb::from_rgb(255, 0, 0).hue_inverted();
        assert_eq!(cyan.to_rgb(), (0, 255, 255));
        assert_eq!(Hsb::from_rgb(0, 255, 255).hue_inverted().to_rgb(), (255, 0, 0));
    }

    #[test]
    fn brightness_inversion_of_white_is_black() {
        assert_eq!(Hsb::from_rgb(255, 255, 255).brightness_inverted().to_rgb(), (0, 0, 0));
    }

    proptest! {
        #[test]
        fn hue_inversion_is_an_involution(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let hsb = Hsb::from_rgb(r, g, b);
            let twice = hsb.hue_inverted().hue_inverted();
            let drift = (twice.hue - hsb.hue).abs();
            // A full turn of drift is the same hue.
            prop_assert!(drift < 1e-5 || (1.0 - drift) < 1e-5, "hue {} came back as {}", hsb.hue, twice.hue);
        }

        #[test]
        fn recomposition_stays_within_one_step(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let (r2, g2, b2) = Hsb::from_rgb(r, g, b).to_rgb();
            prop_assert!((r as i16 - r2 as i16).abs() <= 1);
            prop_assert!((g as i16 - g2 as i16).abs() <= 1);
            prop_assert!((b as i16 - b2 as i16).abs() <= 1);
        }
    }
}
