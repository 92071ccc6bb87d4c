use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Bounding box of a detected face, in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn center(&self) -> (i64, i64) {
        (
            self.x as i64 + self.width as i64 / 2,
            self.y as i64 + self.height as i64 / 2,
        )
    }
}

impl std::str::FromStr for FaceBox {
    type Err = String;

    /// Parse `x,y,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(format!(
                "Invalid face box '{}'. Use X,Y,WIDTH,HEIGHT (e.g., 120,80,200,240)",
                s
            ));
        }
        let mut values = [0u32; 4];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .parse::<u32>()
                .map_err(|_| format!("Invalid face box component: '{}'", part))?;
        }
        if values[2] == 0 || values[3] == 0 {
            return Err("Face box width and height must be greater than 0".to_string());
        }
        Ok(FaceBox {
            x: values[0],
            y: values[1],
            width: values[2],
            height: values[3],
        })
    }
}

/// Pluggable face detection capability.
///
/// Implementations return the single most relevant face, or `None`.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, image: &RgbImage) -> Option<FaceBox>;
}

/// Locator that always reports the same box, for callers that already know
/// where the face is (manual selection, upstream detectors, tests).
#[derive(Debug, Clone, Copy)]
pub struct FixedFaceLocator(pub Option<FaceBox>);

impl FaceLocator for FixedFaceLocator {
    fn locate(&self, _image: &RgbImage) -> Option<FaceBox> {
        self.0
    }
}

/// Detector tuning for one detection pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionPass {
    pub min_face_size: u32,
    pub score_thresh: f64,
    pub pyramid_scale_factor: f32,
    pub window_step: u32,
}

impl DetectionPass {
    /// First pass: conservative, few false positives.
    pub const STRICT: DetectionPass = DetectionPass {
        min_face_size: 30,
        score_thresh: 2.0,
        pyramid_scale_factor: 0.8,
        window_step: 4,
    };

    /// Fallback pass: smaller faces, lower score threshold, finer pyramid.
    pub const PERMISSIVE: DetectionPass = DetectionPass {
        min_face_size: 20,
        score_thresh: 0.8,
        pyramid_scale_factor: 0.9,
        window_step: 2,
    };
}

#[cfg(feature = "rustface")]
pub use rustface_backend::RustfaceLocator;

#[cfg(feature = "rustface")]
mod rustface_backend {
    use super::{DetectionPass, FaceBox, FaceLocator};
    use anyhow::{Context, Result};
    use image::RgbImage;
    use std::path::Path;
    use tracing::debug;

    /// SeetaFace cascade detector with a strict pass and a permissive fallback.
    pub struct RustfaceLocator {
        model: rustface::Model,
    }

    impl RustfaceLocator {
        /// Load a SeetaFace frontal model (`seeta_fd_frontal_v1.0.bin`).
        pub fn from_model_file(path: &Path) -> Result<Self> {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open face model: {}", path.display()))?;
            let model = rustface::read_model(std::io::BufReader::new(file))
                .with_context(|| format!("Failed to parse face model: {}", path.display()))?;
            Ok(Self { model })
        }

        fn run_pass(&self, gray: &image::GrayImage, pass: &DetectionPass) -> Option<FaceBox> {
            let mut detector = rustface::create_detector_with_model(self.model.clone());
            detector.set_min_face_size(pass.min_face_size);
            detector.set_score_thresh(pass.score_thresh);
            detector.set_pyramid_scale_factor(pass.pyramid_scale_factor);
            detector.set_slide_window_step(pass.window_step, pass.window_step);

            let (width, height) = gray.dimensions();
            let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

            faces
                .iter()
                .max_by(|a, b| a.score().total_cmp(&b.score()))
                .map(|face| {
                    let bbox = face.bbox();
                    let x = bbox.x().max(0) as u32;
                    let y = bbox.y().max(0) as u32;
                    FaceBox {
                        x,
                        y,
                        width: bbox.width().min(width.saturating_sub(x)),
                        height: bbox.height().min(height.saturating_sub(y)),
                    }
                })
                .filter(|face| face.width > 0 && face.height > 0)
        }
    }

    impl FaceLocator for RustfaceLocator {
        fn locate(&self, image: &RgbImage) -> Option<FaceBox> {
            let gray = image::imageops::grayscale(image);
            for (index, pass) in [DetectionPass::STRICT, DetectionPass::PERMISSIVE]
                .iter()
                .enumerate()
            {
                if let Some(face) = self.run_pass(&gray, pass) {
                    debug!(pass = index, ?face, "face located");
                    return Some(face);
                }
            }
            debug!("no face found after fallback pass");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_face_box() {
        let face: FaceBox = "120, 80,200,240".parse().unwrap();
        assert_eq!(
            face,
            FaceBox {
                x: 120,
                y: 80,
                width: 200,
                height: 240
            }
        );
        assert_eq!(face.center(), (220, 200));
    }

    #[test]
    fn test_parse_face_box_invalid() {
        assert!("1,2,3".parse::<FaceBox>().is_err());
        assert!("a,2,3,4".parse::<FaceBox>().is_err());
        assert!("1,2,0,4".parse::<FaceBox>().is_err());
    }

    #[test]
    fn test_fixed_locator() {
        let img = RgbImage::new(10, 10);
        assert_eq!(FixedFaceLocator(None).locate(&img), None);
        let face = FaceBox {
            x: 1,
            y: 1,
            width: 5,
            height: 5,
        };
        assert_eq!(FixedFaceLocator(Some(face)).locate(&img), Some(face));
    }

    #[test]
    fn test_fallback_pass_is_more_permissive() {
        let strict = DetectionPass::STRICT;
        let permissive = DetectionPass::PERMISSIVE;
        assert!(permissive.min_face_size < strict.min_face_size);
        assert!(permissive.score_thresh < strict.score_thresh);
    }
}
