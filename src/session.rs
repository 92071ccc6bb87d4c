//! Single-writer pipeline context for one photo.
//!
//! `PhotoSession` owns the source image, the centered baseline, the cached
//! segmentation mask and the cached print layout. Setting changes are batched
//! by the caller and applied with [`PhotoSession::recompute`].

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PhotoError, SegmentationError};
use crate::image_processing::adjust::{apply_adjustments, AdjustmentSettings};
use crate::image_processing::face_locator::{FaceBox, FaceLocator};
use crate::image_processing::frame::{crop_and_frame, AspectRatio};
use crate::image_processing::layout::{compute_layout, PrintLayout, SheetSpec};
use crate::image_processing::photo_size::{PhotoSize, PhotoSizeCatalog};
use crate::image_processing::resize::CropRegion;
use crate::image_processing::segmentation::{
    composite_background, CancelToken, SegmentationJob, SegmentationMask, SegmentationOutcome,
    Segmenter,
};

/// Identity text drawn in the caption band by the sheet renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    pub name: String,
    pub lastname: String,
    pub id_number: String,
}

impl Caption {
    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
            && self.lastname.trim().is_empty()
            && self.id_number.trim().is_empty()
    }

    /// Non-empty lines in drawing order.
    pub fn lines(&self) -> Vec<&str> {
        [&self.name, &self.lastname, &self.id_number]
            .into_iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect()
    }
}

/// Background-replaced baseline, valid for one color.
#[derive(Debug, Clone)]
struct Composite {
    color: Rgb<u8>,
    image: RgbImage,
}

#[derive(Debug, Clone)]
struct PendingSegmentation {
    generation: u64,
    cancel: CancelToken,
}

#[derive(Debug, Default)]
pub struct PhotoSession {
    source: Option<RgbImage>,
    centered: Option<RgbImage>,
    face: Option<FaceBox>,
    crop: Option<CropRegion>,
    mask: Option<SegmentationMask>,
    composite: Option<Composite>,
    final_image: Option<RgbImage>,
    settings: AdjustmentSettings,
    sheet: SheetSpec,
    photo_size: Option<PhotoSize>,
    layout: Option<PrintLayout>,
    caption: Caption,
    generation: u64,
    pending: Option<PendingSegmentation>,
}

impl PhotoSession {
    pub fn new(sheet: SheetSpec, settings: AdjustmentSettings) -> Self {
        Self {
            sheet,
            settings,
            ..Default::default()
        }
    }

    /// Replace the source image. Color sliders are reset and every derived
    /// state (centered baseline, mask, layout) is dropped.
    pub fn load_image(&mut self, image: RgbImage) -> Result<(), PhotoError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PhotoError::ZeroDimensions);
        }
        debug!("loading {}x{} source", image.width(), image.height());
        self.invalidate_segmentation();
        self.source = Some(image);
        self.centered = None;
        self.face = None;
        self.crop = None;
        self.final_image = None;
        self.layout = None;
        self.settings.reset_color();
        Ok(())
    }

    /// Locate the face and make the face-centered crop the new baseline.
    ///
    /// On failure the previous baseline stays active.
    pub fn center_face(
        &mut self,
        locator: &dyn FaceLocator,
        ratio: AspectRatio,
        canvas: (u32, u32),
    ) -> Result<FaceBox, PhotoError> {
        let source = self.source.as_ref().ok_or(PhotoError::NoImageLoaded)?;
        let face = locator.locate(source).ok_or(PhotoError::NoFaceFound)?;
        let framed = crop_and_frame(source, &face, ratio, canvas)?;

        info!(
            "Centered face at {},{} ({}x{}), baseline {}x{}",
            face.x,
            face.y,
            face.width,
            face.height,
            framed.image.width(),
            framed.image.height()
        );

        self.invalidate_segmentation();
        self.centered = Some(framed.image);
        self.crop = Some(framed.crop);
        self.face = Some(face);
        self.layout = None;
        self.recompute()?;
        Ok(face)
    }

    /// [`center_face`](Self::center_face) using the selected photo size as the target ratio.
    pub fn center_face_for_photo_size(
        &mut self,
        locator: &dyn FaceLocator,
        canvas: (u32, u32),
    ) -> Result<FaceBox, PhotoError> {
        let ratio = self
            .photo_size
            .as_ref()
            .ok_or(PhotoError::NoPhotoSize)?
            .aspect_ratio();
        self.center_face(locator, ratio, canvas)
    }

    /// Snapshot the baseline for a segmentation backend.
    ///
    /// Any job already in flight is cancelled; only the newest job can complete.
    pub fn begin_segmentation(&mut self) -> Result<SegmentationJob, PhotoError> {
        let centered = self.centered.as_ref().ok_or(PhotoError::NotCentered)?;
        if let Some(previous) = self.pending.take() {
            previous.cancel.cancel();
        }
        self.generation += 1;
        let job = SegmentationJob::new(self.generation, centered.clone());
        self.pending = Some(PendingSegmentation {
            generation: self.generation,
            cancel: job.cancel_token(),
        });
        Ok(job)
    }

    /// Cancel the in-flight job, if any. Current mask and image are untouched.
    pub fn cancel_segmentation(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(generation = pending.generation, "segmentation cancelled");
            pending.cancel.cancel();
        }
    }

    pub fn segmentation_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Deliver a job outcome. Returns `Ok(true)` when a new mask was installed
    /// and the final image recomposed, `Ok(false)` when the outcome was stale or
    /// cancelled. Backend errors are returned and leave prior state untouched.
    pub fn complete_segmentation(&mut self, outcome: SegmentationOutcome) -> Result<bool, PhotoError> {
        let current = match &self.pending {
            Some(pending) if pending.generation == outcome.generation => pending.generation,
            _ => {
                debug!(generation = outcome.generation, "discarding stale segmentation result");
                return Ok(false);
            }
        };
        self.pending = None;

        let mask = match outcome.result {
            Ok(mask) => mask,
            Err(SegmentationError::Cancelled) => return Ok(false),
            Err(e) => {
                warn!("Segmentation failed: {}", e);
                return Err(e.into());
            }
        };

        let centered = self.centered.as_ref().ok_or(PhotoError::NotCentered)?;
        if mask.dimensions() != centered.dimensions() {
            let (mask_width, mask_height) = mask.dimensions();
            return Err(PhotoError::MaskMismatch {
                mask_width,
                mask_height,
                image_width: centered.width(),
                image_height: centered.height(),
            });
        }

        debug!(generation = current, "segmentation mask installed");
        self.mask = Some(mask);
        self.composite = None;
        self.recompute()?;
        Ok(true)
    }

    /// Run `segmenter` on the current thread and install its mask.
    pub fn segment_with(&mut self, segmenter: &dyn Segmenter) -> Result<bool, PhotoError> {
        let job = self.begin_segmentation()?;
        let outcome = job.run(segmenter);
        self.complete_segmentation(outcome)
    }

    /// Install a mask produced outside a [`SegmentationJob`].
    pub fn set_mask(&mut self, mask: SegmentationMask) -> Result<(), PhotoError> {
        let centered = self.centered.as_ref().ok_or(PhotoError::NotCentered)?;
        if mask.dimensions() != centered.dimensions() {
            let (mask_width, mask_height) = mask.dimensions();
            return Err(PhotoError::MaskMismatch {
                mask_width,
                mask_height,
                image_width: centered.width(),
                image_height: centered.height(),
            });
        }
        self.cancel_segmentation();
        self.mask = Some(mask);
        self.composite = None;
        Ok(())
    }

    /// Takes effect on the next [`recompute`](Self::recompute); the cached mask is reused.
    pub fn set_background_color(&mut self, color: Rgb<u8>) {
        self.settings.background_color = color;
    }

    pub fn settings(&self) -> &AdjustmentSettings {
        &self.settings
    }

    /// Mutable settings; call [`recompute`](Self::recompute) after a batch of changes.
    pub fn settings_mut(&mut self) -> &mut AdjustmentSettings {
        &mut self.settings
    }

    pub fn set_settings(&mut self, settings: AdjustmentSettings) {
        self.settings = settings;
    }

    /// Rebuild the final image from the baseline with the current settings.
    pub fn recompute(&mut self) -> Result<&RgbImage, PhotoError> {
        let centered = self.centered.as_ref().ok_or(PhotoError::NotCentered)?;
        self.settings.validate()?;

        let baseline = match &self.mask {
            Some(mask) => {
                let color = self.settings.background_color;
                let cached = matches!(&self.composite, Some(c) if c.color == color);
                if !cached {
                    let image = composite_background(centered, mask, color)?;
                    self.composite = Some(Composite { color, image });
                }
                match &self.composite {
                    Some(composite) => &composite.image,
                    None => centered,
                }
            }
            None => centered,
        };

        let image = apply_adjustments(baseline, &self.settings)?;
        Ok(self.final_image.insert(image))
    }

    /// Select a photo size. A different size clears the layout.
    pub fn set_photo_size(&mut self, size: PhotoSize) {
        let changed = match &self.photo_size {
            Some(current) => !current.same_dimensions(&size),
            None => true,
        };
        if changed && self.layout.take().is_some() {
            debug!("photo size changed, layout cleared");
        }
        info!("Photo size set to {}x{} cm", size.width_cm, size.height_cm);
        self.photo_size = Some(size);
    }

    /// Resolve `name` against `catalog`. On failure the current size is kept.
    pub fn select_photo_size(
        &mut self,
        catalog: &PhotoSizeCatalog,
        name: &str,
    ) -> Result<&PhotoSize, PhotoError> {
        let size = catalog.resolve(name)?;
        self.set_photo_size(size);
        self.photo_size.as_ref().ok_or(PhotoError::NoPhotoSize)
    }

    pub fn photo_size(&self) -> Option<&PhotoSize> {
        self.photo_size.as_ref()
    }

    pub fn sheet(&self) -> &SheetSpec {
        &self.sheet
    }

    /// Replace the sheet parameters; the cached layout no longer applies.
    pub fn set_sheet(&mut self, sheet: SheetSpec) {
        self.sheet = sheet;
        self.layout = None;
    }

    /// Pack the selected photo size onto the sheet. Failure leaves the layout empty.
    pub fn compute_layout(&mut self) -> Result<&PrintLayout, PhotoError> {
        self.layout = None;
        if self.source.is_none() {
            return Err(PhotoError::NoImageLoaded);
        }
        if self.centered.is_none() {
            return Err(PhotoError::NotCentered);
        }
        let size = self.photo_size.as_ref().ok_or(PhotoError::NoPhotoSize)?;
        let layout = compute_layout(&self.sheet, size)?;
        Ok(self.layout.insert(layout))
    }

    pub fn clear_layout(&mut self) {
        self.layout = None;
    }

    /// Slots of the current layout; empty until computed.
    pub fn layout(&self) -> Option<&PrintLayout> {
        self.layout.as_ref()
    }

    pub fn caption(&self) -> Option<&Caption> {
        if self.caption.is_empty() {
            None
        } else {
            Some(&self.caption)
        }
    }

    pub fn set_caption(&mut self, caption: Caption) {
        self.caption = caption;
    }

    pub fn is_centered(&self) -> bool {
        self.centered.is_some()
    }

    pub fn source(&self) -> Option<&RgbImage> {
        self.source.as_ref()
    }

    /// Centered crop before background replacement and adjustments.
    pub fn centered(&self) -> Option<&RgbImage> {
        self.centered.as_ref()
    }

    pub fn face(&self) -> Option<FaceBox> {
        self.face
    }

    pub fn crop(&self) -> Option<CropRegion> {
        self.crop
    }

    pub fn mask(&self) -> Option<&SegmentationMask> {
        self.mask.as_ref()
    }

    /// Output of the last [`recompute`](Self::recompute).
    pub fn final_image(&self) -> Option<&RgbImage> {
        self.final_image.as_ref()
    }

    /// Most processed image available: final, else the loaded source.
    pub fn current_image(&self) -> Option<&RgbImage> {
        self.final_image.as_ref().or(self.source.as_ref())
    }

    fn invalidate_segmentation(&mut self) {
        self.cancel_segmentation();
        self.generation += 1;
        self.mask = None;
        self.composite = None;
    }
}
