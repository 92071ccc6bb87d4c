use image::{GrayImage, Rgb, RgbImage, RgbaImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PhotoError, SegmentationError};

/// Per-pixel foreground opacity in `[0, 1]`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    alpha: Vec<f32>,
}

impl SegmentationMask {
    /// Build from raw alpha values; values are clamped into `[0, 1]`.
    pub fn from_alpha(width: u32, height: u32, alpha: Vec<f32>) -> Result<Self, SegmentationError> {
        if alpha.len() != (width as usize) * (height as usize) {
            return Err(SegmentationError::MalformedResponse(format!(
                "mask has {} values for {}x{}",
                alpha.len(),
                width,
                height
            )));
        }
        let alpha = alpha
            .into_iter()
            .map(|a| if a.is_nan() { 0.0 } else { a.clamp(0.0, 1.0) })
            .collect();
        Ok(Self {
            width,
            height,
            alpha,
        })
    }

    /// 8-bit grayscale mask, 255 = foreground.
    pub fn from_luma(mask: &GrayImage) -> Self {
        Self {
            width: mask.width(),
            height: mask.height(),
            alpha: mask.pixels().map(|p| p[0] as f32 / 255.0).collect(),
        }
    }

    /// Hard mask: anything above `threshold` is foreground.
    pub fn from_binary(mask: &GrayImage, threshold: u8) -> Self {
        Self {
            width: mask.width(),
            height: mask.height(),
            alpha: mask
                .pixels()
                .map(|p| if p[0] > threshold { 1.0 } else { 0.0 })
                .collect(),
        }
    }

    /// Alpha channel of a cut-out image (the format remote removal services return).
    pub fn from_rgba_alpha(cutout: &RgbaImage) -> Self {
        Self {
            width: cutout.width(),
            height: cutout.height(),
            alpha: cutout.pixels().map(|p| p[3] as f32 / 255.0).collect(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn alpha_at(&self, x: u32, y: u32) -> f32 {
        self.alpha[(y as usize) * (self.width as usize) + x as usize]
    }

    pub fn values(&self) -> &[f32] {
        &self.alpha
    }

    /// Resample to another size (bilinear), used when a backend works at a fixed resolution.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if (width, height) == (self.width, self.height) {
            return self.clone();
        }
        let gray = GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([(self.alpha_at(x, y) * 255.0).round() as u8])
        });
        let resized =
            image::imageops::resize(&gray, width, height, image::imageops::FilterType::Triangle);
        Self::from_luma(&resized)
    }

    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([(self.alpha_at(x, y) * 255.0).round() as u8])
        })
    }
}

/// Pluggable background segmentation capability.
///
/// Implementations may block (network or inference); they are invoked through
/// a [`SegmentationJob`] so the caller decides on which thread.
pub trait Segmenter: Send + Sync {
    fn segment(&self, image: &RgbImage) -> Result<SegmentationMask, SegmentationError>;
}

/// Replace the background of `image` with `background`, blending by the mask alpha.
pub fn composite_background(
    image: &RgbImage,
    mask: &SegmentationMask,
    background: Rgb<u8>,
) -> Result<RgbImage, PhotoError> {
    let (width, height) = image.dimensions();
    if mask.dimensions() != (width, height) {
        return Err(PhotoError::MaskMismatch {
            mask_width: mask.width,
            mask_height: mask.height,
            image_width: width,
            image_height: height,
        });
    }

    let mut output = RgbImage::new(width, height);
    for ((out, src), &alpha) in output
        .pixels_mut()
        .zip(image.pixels())
        .zip(mask.alpha.iter())
    {
        let inv_alpha = 1.0 - alpha;
        for c in 0..3 {
            let blended = src[c] as f32 * alpha + background[c] as f32 * inv_alpha;
            out[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(output)
}

/// Shared cancellation flag for an in-flight segmentation request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot of the baseline handed to a segmentation backend.
///
/// The job owns its own copy of the image, so it can run on any thread while
/// the session keeps serving the previous state.
#[derive(Debug, Clone)]
pub struct SegmentationJob {
    pub(crate) generation: u64,
    image: RgbImage,
    cancel: CancelToken,
}

/// Outcome of a [`SegmentationJob`], delivered back to the session exactly once.
#[derive(Debug)]
pub struct SegmentationOutcome {
    pub(crate) generation: u64,
    pub(crate) result: Result<SegmentationMask, SegmentationError>,
}

impl SegmentationJob {
    pub(crate) fn new(generation: u64, image: RgbImage) -> Self {
        Self {
            generation,
            image,
            cancel: CancelToken::default(),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the backend, honoring cancellation before and after the call.
    pub fn run(self, segmenter: &dyn Segmenter) -> SegmentationOutcome {
        let result = if self.cancel.is_cancelled() {
            Err(SegmentationError::Cancelled)
        } else {
            let result = segmenter.segment(&self.image);
            if self.cancel.is_cancelled() {
                Err(SegmentationError::Cancelled)
            } else {
                result.and_then(|mask| {
                    let (width, height) = self.image.dimensions();
                    if mask.dimensions() == (width, height) {
                        Ok(mask)
                    } else {
                        // Backends working at a fixed resolution are resampled here.
                        Ok(mask.resized(width, height))
                    }
                })
            }
        };
        SegmentationOutcome {
            generation: self.generation,
            result,
        }
    }
}

impl SegmentationOutcome {
    pub fn result(&self) -> &Result<SegmentationMask, SegmentationError> {
        &self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;

    struct ConstantSegmenter(f32);

    impl Segmenter for ConstantSegmenter {
        fn segment(&self, image: &RgbImage) -> Result<SegmentationMask, SegmentationError> {
            let (w, h) = image.dimensions();
            SegmentationMask::from_alpha(w, h, vec![self.0; (w * h) as usize])
        }
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| Rgb([(x * 20) as u8, (y * 20) as u8, 200]))
    }

    fn half_mask(width: u32, height: u32) -> SegmentationMask {
        let alpha = (0..width * height)
            .map(|i| if i % width < width / 2 { 1.0 } else { 0.0 })
            .collect();
        SegmentationMask::from_alpha(width, height, alpha).unwrap()
    }

    #[test]
    fn test_composite_keeps_foreground_and_replaces_background() {
        let img = gradient(8, 4);
        let mask = half_mask(8, 4);
        let out = composite_background(&img, &mask, Rgb([255, 0, 0])).unwrap();

        assert_eq!(out.get_pixel(1, 1), img.get_pixel(1, 1));
        assert_eq!(out.get_pixel(6, 1), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_composite_soft_edge_blends() {
        let img = ImageBuffer::from_pixel(2, 1, Rgb([200u8, 100, 0]));
        let mask = SegmentationMask::from_alpha(2, 1, vec![0.5, 0.25]).unwrap();
        let out = composite_background(&img, &mask, Rgb([0, 0, 0])).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([100, 50, 0]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([50, 25, 0]));
    }

    #[test]
    fn test_composite_is_deterministic() {
        let img = gradient(8, 8);
        let mask = half_mask(8, 8);
        let a = composite_background(&img, &mask, Rgb([10, 20, 30])).unwrap();
        let b = composite_background(&img, &mask, Rgb([10, 20, 30])).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_composite_rejects_mismatched_mask() {
        let img = gradient(8, 8);
        let mask = half_mask(4, 4);
        assert!(matches!(
            composite_background(&img, &mask, Rgb([0, 0, 0])),
            Err(PhotoError::MaskMismatch { .. })
        ));
    }

    #[test]
    fn test_mask_normalization() {
        let gray = GrayImage::from_fn(2, 1, |x, _| image::Luma([if x == 0 { 255 } else { 100 }]));
        let soft = SegmentationMask::from_luma(&gray);
        assert_eq!(soft.alpha_at(0, 0), 1.0);
        assert!((soft.alpha_at(1, 0) - 100.0 / 255.0).abs() < 1e-6);

        let hard = SegmentationMask::from_binary(&gray, 127);
        assert_eq!(hard.values(), &[1.0, 0.0]);

        let clamped = SegmentationMask::from_alpha(2, 1, vec![1.5, -0.2]).unwrap();
        assert_eq!(clamped.values(), &[1.0, 0.0]);

        assert!(SegmentationMask::from_alpha(2, 2, vec![0.0]).is_err());
    }

    #[test]
    fn test_job_cancelled_before_run() {
        let job = SegmentationJob::new(3, gradient(4, 4));
        job.cancel_token().cancel();
        let outcome = job.run(&ConstantSegmenter(1.0));
        assert_eq!(outcome.generation, 3);
        assert_eq!(outcome.result().as_ref().err(), Some(&SegmentationError::Cancelled));
    }

    #[test]
    fn test_job_resamples_fixed_size_masks() {
        struct TinySegmenter;
        impl Segmenter for TinySegmenter {
            fn segment(&self, _image: &RgbImage) -> Result<SegmentationMask, SegmentationError> {
                SegmentationMask::from_alpha(2, 2, vec![1.0; 4])
            }
        }
        let outcome = SegmentationJob::new(0, gradient(6, 4)).run(&TinySegmenter);
        let mask = outcome.result().as_ref().unwrap();
        assert_eq!(mask.dimensions(), (6, 4));
        assert!(mask.values().iter().all(|&a| a > 0.99));
    }
}
