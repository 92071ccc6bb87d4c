//! Face-centered crop and canvas fit.
//!
//! The crop is sized from the detected face (`FACE_HEIGHT_FACTOR` × face
//! height) and the requested print aspect ratio, then slid inside the source
//! so the full crop is kept whenever the source is large enough.

use image::RgbImage;
use tracing::debug;

use super::face_locator::FaceBox;
use super::resize::{crop_image, resize_exact, CropRegion};
use crate::error::PhotoError;

/// Crop height as a multiple of the detected face height (face + hair + shoulders).
pub const FACE_HEIGHT_FACTOR: f64 = 2.2;

/// Target print aspect ratio, e.g. 3×4 for a 3×4 cm photo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectRatio {
    pub width: f64,
    pub height: f64,
}

impl AspectRatio {
    pub fn new(width: f64, height: f64) -> Result<Self, PhotoError> {
        if !(width > 0.0 && height > 0.0) || !width.is_finite() || !height.is_finite() {
            return Err(PhotoError::OutOfRange {
                name: "aspect ratio",
                value: if width > 0.0 { height } else { width },
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        Ok(Self { width, height })
    }

    pub fn value(&self) -> f64 {
        self.width / self.height
    }
}

/// Result of [`crop_and_frame`].
#[derive(Debug, Clone)]
pub struct FramedPhoto {
    pub image: RgbImage,
    /// Region of the source image that was kept.
    pub crop: CropRegion,
}

/// Place a span of `size` centered at `center` inside `[0, extent)`,
/// sliding it back inside the bounds. `size` must not exceed `extent`.
fn place_span(center: i64, size: i64, extent: u32) -> (u32, u32) {
    let extent = extent as i64;
    let size = size.clamp(1, extent);
    let start = (center - size / 2).clamp(0, extent - size);
    (start as u32, size as u32)
}

/// Largest crop of the requested size and ratio that fits the source.
///
/// When one axis is larger than the source it is clamped to the source
/// extent and the other axis shrinks with it, so the ratio is kept.
fn fit_crop_size(
    crop_width: f64,
    crop_height: f64,
    ratio: f64,
    source_width: u32,
    source_height: u32,
) -> (i64, i64) {
    let (mut width, mut height) = (crop_width, crop_height);
    if height > source_height as f64 {
        height = source_height as f64;
        width = height * ratio;
    }
    if width > source_width as f64 {
        width = source_width as f64;
        height = width / ratio;
    }
    (
        (width.round() as i64).clamp(1, source_width as i64),
        (height.round() as i64).clamp(1, source_height as i64),
    )
}

/// Compute the face-centered crop rectangle for a `source_width` × `source_height` image.
pub fn face_crop_region(
    source_width: u32,
    source_height: u32,
    face: &FaceBox,
    ratio: AspectRatio,
) -> CropRegion {
    let crop_height = ((face.height as f64 * FACE_HEIGHT_FACTOR) as i64).max(1);
    let crop_width = ((crop_height as f64 * ratio.value()) as i64).max(1);
    let (crop_width, crop_height) = fit_crop_size(
        crop_width as f64,
        crop_height as f64,
        ratio.value(),
        source_width,
        source_height,
    );
    let (center_x, center_y) = face.center();

    let (x, width) = place_span(center_x, crop_width, source_width);
    let (y, height) = place_span(center_y, crop_height, source_height);

    CropRegion {
        x,
        y,
        width,
        height,
    }
}

/// Output size that fills the canvas along its binding axis while keeping the
/// crop's aspect ratio. Never letterboxes.
pub fn fit_to_canvas(
    crop_width: u32,
    crop_height: u32,
    canvas_width: u32,
    canvas_height: u32,
) -> (u32, u32) {
    let canvas_aspect = canvas_width as f64 / canvas_height as f64;
    let image_aspect = crop_width as f64 / crop_height as f64;

    let (width, height) = if canvas_aspect > image_aspect {
        let h = canvas_height;
        ((h as f64 * image_aspect) as u32, h)
    } else {
        let w = canvas_width;
        (w, (w as f64 / image_aspect) as u32)
    };
    (width.max(1), height.max(1))
}

/// Crop `source` around `face` at `ratio` and resize it to fill `canvas`.
pub fn crop_and_frame(
    source: &RgbImage,
    face: &FaceBox,
    ratio: AspectRatio,
    canvas: (u32, u32),
) -> Result<FramedPhoto, PhotoError> {
    let (source_width, source_height) = source.dimensions();
    if source_width == 0 || source_height == 0 || canvas.0 == 0 || canvas.1 == 0 {
        return Err(PhotoError::ZeroDimensions);
    }

    let crop = face_crop_region(source_width, source_height, face, ratio);
    let (out_width, out_height) = fit_to_canvas(crop.width, crop.height, canvas.0, canvas.1);

    debug!(
        ?crop,
        out_width, out_height, "framing face in {}x{} source", source_width, source_height
    );

    let cropped = crop_image(source, crop)?;
    let image = resize_exact(&cropped, out_width, out_height)?;

    Ok(FramedPhoto { image, crop })
}
