//! Adjustment pipeline applied to the centered baseline.
//!
//! Stages run in a fixed order: vertical shift, brightness/contrast,
//! saturation, caption band. Every stage returns a new image of the same size,
//! and the whole pipeline is recomputed from the baseline each time.

use image::{Rgb, RgbImage};

use crate::error::PhotoError;

/// Divisor applied to `height * caption_band_ratio` to get the caption band height.
pub const CAPTION_BAND_CALIBRATION: f64 = 2.8;

/// Default fraction of the photo height reserved for the caption band.
pub const DEFAULT_CAPTION_BAND_RATIO: f64 = 0.2;

const CAPTION_FILL: Rgb<u8> = Rgb([0, 0, 0]);

/// User-controlled settings read by one composition pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentSettings {
    /// -100..=100, added to every channel.
    pub brightness: i32,
    /// -100..=100, channel gain of `1 + contrast / 100`.
    pub contrast: i32,
    /// -100..=100, HSV saturation gain of `1 + saturation / 100`.
    pub saturation: i32,
    /// Pixels, positive moves the content down.
    pub vertical_shift: i32,
    pub background_color: Rgb<u8>,
    pub show_caption_band: bool,
    pub caption_band_ratio: f64,
}

impl Default for AdjustmentSettings {
    fn default() -> Self {
        Self {
            brightness: 0,
            contrast: 0,
            saturation: 0,
            vertical_shift: 0,
            background_color: Rgb([255, 255, 255]),
            show_caption_band: false,
            caption_band_ratio: DEFAULT_CAPTION_BAND_RATIO,
        }
    }
}

impl AdjustmentSettings {
    /// Whether the pipeline would return the baseline untouched.
    pub fn is_neutral(&self) -> bool {
        self.brightness == 0
            && self.contrast == 0
            && self.saturation == 0
            && self.vertical_shift == 0
            && !self.show_caption_band
    }

    /// Reset the color sliders, keeping shift, background and caption options.
    pub fn reset_color(&mut self) {
        self.brightness = 0;
        self.contrast = 0;
        self.saturation = 0;
    }

    pub fn validate(&self) -> Result<(), PhotoError> {
        check_slider("brightness", self.brightness)?;
        check_slider("contrast", self.contrast)?;
        check_slider("saturation", self.saturation)?;
        let ratio = self.caption_band_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(PhotoError::OutOfRange {
                name: "caption band ratio",
                value: ratio,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}

fn check_slider(name: &'static str, value: i32) -> Result<(), PhotoError> {
    if !(-100..=100).contains(&value) {
        return Err(PhotoError::OutOfRange {
            name,
            value: value as f64,
            min: -100.0,
            max: 100.0,
        });
    }
    Ok(())
}

/// Translate the image vertically, filling the exposed band with `fill`.
pub fn vertical_shift(img: &RgbImage, shift: i32, fill: Rgb<u8>) -> RgbImage {
    if shift == 0 {
        return img.clone();
    }
    let (width, height) = img.dimensions();
    let shift = shift as i64;
    RgbImage::from_fn(width, height, |x, y| {
        let src_y = y as i64 - shift;
        if (0..height as i64).contains(&src_y) {
            *img.get_pixel(x, src_y as u32)
        } else {
            fill
        }
    })
}

/// `p * (1 + contrast/100) + brightness`, rounded and saturated per channel.
pub fn brightness_contrast(img: &RgbImage, brightness: i32, contrast: i32) -> RgbImage {
    if brightness == 0 && contrast == 0 {
        return img.clone();
    }
    let gain = 1.0 + contrast as f32 / 100.0;
    let offset = brightness as f32;

    // Only 256 distinct inputs per channel
    let mut lut = [0u8; 256];
    for (value, out) in lut.iter_mut().enumerate() {
        *out = (value as f32 * gain + offset).round().clamp(0.0, 255.0) as u8;
    }

    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        for c in 0..3 {
            pixel[c] = lut[pixel[c] as usize];
        }
    }
    output
}

/// Scale HSV saturation by `1 + saturation/100`.
pub fn saturate(img: &RgbImage, saturation: i32) -> RgbImage {
    if saturation == 0 {
        return img.clone();
    }
    let factor = 1.0 + saturation as f32 / 100.0;

    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        let [r, g, b] = hsv_to_rgb(h, (s * factor).clamp(0.0, 1.0), v);
        *pixel = Rgb([r, g, b]);
    }
    output
}

/// Move the content up by `floor(height * ratio / CAPTION_BAND_CALIBRATION)`
/// pixels and fill the bottom band with black.
pub fn caption_band(img: &RgbImage, ratio: f64) -> RgbImage {
    let band = caption_band_height(img.height(), ratio);
    vertical_shift(img, -(band.min(i32::MAX as u32) as i32), CAPTION_FILL)
}

/// Height of the black band revealed by [`caption_band`].
pub fn caption_band_height(height: u32, ratio: f64) -> u32 {
    (height as f64 * ratio / CAPTION_BAND_CALIBRATION).max(0.0) as u32
}

/// Run the full pipeline on `baseline`.
pub fn apply_adjustments(
    baseline: &RgbImage,
    settings: &AdjustmentSettings,
) -> Result<RgbImage, PhotoError> {
    settings.validate()?;

    let shifted = vertical_shift(baseline, settings.vertical_shift, settings.background_color);
    let toned = brightness_contrast(&shifted, settings.brightness, settings.contrast);
    let saturated = saturate(&toned, settings.saturation);
    if settings.show_caption_band {
        Ok(caption_band(&saturated, settings.caption_band_ratio))
    } else {
        Ok(saturated)
    }
}

/// Hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let s = if max == 0.0 { 0.0 } else { delta / max };
    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let c = v * s;
    let sector = h / 60.0;
    let x = c * (1.0 - (sector.rem_euclid(2.0) - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match sector as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    let to_u8 = |value: f32| ((value + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_u8(r), to_u8(g), to_u8(b)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;

    fn create_test_image() -> RgbImage {
        ImageBuffer::from_fn(12, 10, |x, y| {
            Rgb([(x * 20) as u8, (y * 25) as u8, ((x + y) * 10) as u8])
        })
    }

    #[test]
    fn test_neutral_settings_return_baseline() {
        let img = create_test_image();
        let settings = AdjustmentSettings::default();
        assert!(settings.is_neutral());
        let out = apply_adjustments(&img, &settings).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_vertical_shift_fills_with_background() {
        let img = create_test_image();
        let fill = Rgb([1, 2, 3]);
        let down = vertical_shift(&img, 3, fill);
        for x in 0..12 {
            for y in 0..3 {
                assert_eq!(down.get_pixel(x, y), &fill);
            }
            assert_eq!(down.get_pixel(x, 5), img.get_pixel(x, 2));
        }
    }

    #[test]
    fn test_vertical_shift_round_trip_keeps_interior() {
        let img = create_test_image();
        let fill = Rgb([9, 9, 9]);
        let d = 4;
        let back = vertical_shift(&vertical_shift(&img, d, fill), -d, fill);
        let height = img.height();
        for y in 0..height {
            for x in 0..img.width() {
                if y < height - d as u32 {
                    assert_eq!(back.get_pixel(x, y), img.get_pixel(x, y));
                } else {
                    assert_eq!(back.get_pixel(x, y), &fill);
                }
            }
        }
    }

    #[test]
    fn test_vertical_shift_beyond_height_is_all_background() {
        let img = create_test_image();
        let fill = Rgb([200, 10, 10]);
        let out = vertical_shift(&img, -50, fill);
        assert_eq!(out.dimensions(), img.dimensions());
        assert!(out.pixels().all(|p| *p == fill));
    }

    #[test]
    fn test_brightness_contrast_formula() {
        let img = ImageBuffer::from_pixel(1, 1, Rgb([100u8, 200, 10]));
        let out = brightness_contrast(&img, 10, 50);
        // 100*1.5+10, 200*1.5+10 saturates, 10*1.5+10
        assert_eq!(out.get_pixel(0, 0), &Rgb([160, 255, 25]));

        let dark = brightness_contrast(&img, -100, -100);
        assert_eq!(dark.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_saturation_keeps_grays_and_desaturates() {
        let gray = ImageBuffer::from_pixel(2, 2, Rgb([120u8, 120, 120]));
        assert_eq!(saturate(&gray, 80), gray);

        let red = ImageBuffer::from_pixel(1, 1, Rgb([200u8, 100, 100]));
        let flat = saturate(&red, -100);
        assert_eq!(flat.get_pixel(0, 0), &Rgb([200, 200, 200]));

        let boosted = saturate(&red, 100);
        assert_eq!(boosted.get_pixel(0, 0), &Rgb([200, 0, 0]));
    }

    #[test]
    fn test_hsv_round_trip() {
        for rgb in [[255, 0, 0], [0, 255, 0], [0, 0, 255], [200, 30, 180], [12, 240, 77]] {
            let (h, s, v) = rgb_to_hsv(rgb[0], rgb[1], rgb[2]);
            assert!((0.0..360.0).contains(&h));
            assert_eq!(hsv_to_rgb(h, s, v), rgb);
        }
    }

    #[test]
    fn test_caption_band() {
        let img = ImageBuffer::from_pixel(10, 280, Rgb([50u8, 60, 70]));
        assert_eq!(caption_band_height(280, 0.2), 20);
        let out = caption_band(&img, 0.2);
        assert_eq!(out.dimensions(), (10, 280));
        assert_eq!(out.get_pixel(0, 259), &Rgb([50, 60, 70]));
        assert_eq!(out.get_pixel(0, 260), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(9, 279), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_caption_band_rounding_to_zero_keeps_image() {
        // 10 * 0.2 / 2.8 floors to 0
        let img = ImageBuffer::from_pixel(4, 10, Rgb([50u8, 60, 70]));
        assert_eq!(caption_band_height(10, 0.2), 0);
        assert_eq!(caption_band(&img, 0.2), img);
    }

    #[test]
    fn test_pipeline_order_shift_before_color() {
        let img = ImageBuffer::from_pixel(4, 4, Rgb([100u8, 100, 100]));
        let settings = AdjustmentSettings {
            brightness: 20,
            vertical_shift: 1,
            background_color: Rgb([0, 0, 0]),
            ..Default::default()
        };
        let out = apply_adjustments(&img, &settings).unwrap();
        // Exposed band is filled first, then brightened
        assert_eq!(out.get_pixel(0, 0), &Rgb([20, 20, 20]));
        assert_eq!(out.get_pixel(0, 3), &Rgb([120, 120, 120]));
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = AdjustmentSettings {
            brightness: 101,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
        settings.brightness = 0;
        settings.caption_band_ratio = 1.0;
        assert!(settings.validate().is_err());
        settings.caption_band_ratio = 0.5;
        assert!(settings.validate().is_ok());
    }
}
