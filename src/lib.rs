// Library exports for reuse by front ends and other applications
pub mod cli;
pub mod config_file;
pub mod error;
pub mod image_processing;
pub mod json_output;
pub mod render;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use cli::OutputType;
pub use error::{ErrorCategory, PhotoError, SegmentationError};
pub use image_processing::adjust::AdjustmentSettings;
pub use image_processing::face_locator::{FaceBox, FaceLocator, FixedFaceLocator};
pub use image_processing::frame::{crop_and_frame, AspectRatio, FramedPhoto};
pub use image_processing::layout::{compute_layout, PrintLayout, PrintLayoutSlot, SheetSpec};
pub use image_processing::photo_size::{PhotoSize, PhotoSizeCatalog};
pub use image_processing::segmentation::{
    composite_background, SegmentationJob, SegmentationMask, SegmentationOutcome, Segmenter,
};
pub use image_processing::{ProcessingConfig, ProcessingEngine, ProcessingResult};
pub use json_output::JsonMessage;
pub use session::{Caption, PhotoSession};
