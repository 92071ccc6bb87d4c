//! Local background segmentation with a U²-Net style ONNX model.
//!
//! The model takes a `[1, 3, 320, 320]` RGB tensor scaled to `[0, 1]` and
//! returns a single-channel saliency map, which is min-max normalized and
//! resampled back to the image size.
use image::RgbImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use super::segmentation::{SegmentationMask, Segmenter};
use crate::error::SegmentationError;

const MODEL_INPUT_SIZE: u32 = 320;

pub struct OnnxSegmenter {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxSegmenter {
    pub fn from_model_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let _ = ort::init();
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_cpus::get().min(4))?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load segmentation model: {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .context("Segmentation model has no inputs")?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .context("Segmentation model has no outputs")?;

        debug!(%input_name, %output_name, "segmentation model loaded");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

/// NCHW tensor from a `MODEL_INPUT_SIZE` square image.
fn prepare_tensor(img: &RgbImage) -> Vec<f32> {
    let side = MODEL_INPUT_SIZE as usize;
    let mut tensor_data = vec![0.0f32; 3 * side * side];
    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = y as usize * side + x as usize;
        for c in 0..3 {
            tensor_data[c * side * side + offset] = pixel[c] as f32 / 255.0;
        }
    }
    tensor_data
}

/// Min-max normalize a prediction into `[0, 1]`. A flat map becomes all background.
fn normalize_prediction(prediction: &[f32]) -> Vec<f32> {
    let (min, max) = prediction
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    if !(range > f32::EPSILON) {
        return vec![0.0; prediction.len()];
    }
    prediction.iter().map(|&v| (v - min) / range).collect()
}

impl Segmenter for OnnxSegmenter {
    fn segment(&self, image: &RgbImage) -> Result<SegmentationMask, SegmentationError> {
        let (width, height) = image.dimensions();
        let resized = image::imageops::resize(
            image,
            MODEL_INPUT_SIZE,
            MODEL_INPUT_SIZE,
            image::imageops::FilterType::Triangle,
        );

        let side = MODEL_INPUT_SIZE as usize;
        let input_value = Value::from_array((vec![1usize, 3, side, side], prepare_tensor(&resized)))
            .map_err(|e| SegmentationError::Unavailable(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| SegmentationError::Unavailable("model session poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(|e| SegmentationError::Unavailable(e.to_string()))?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| SegmentationError::MalformedResponse(e.to_string()))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let plane = side * side;
        if dims.iter().product::<usize>() < plane || data.len() < plane {
            return Err(SegmentationError::MalformedResponse(format!(
                "unexpected output shape {:?}",
                dims
            )));
        }

        let mask = SegmentationMask::from_alpha(
            MODEL_INPUT_SIZE,
            MODEL_INPUT_SIZE,
            normalize_prediction(&data[..plane]),
        )?;
        Ok(mask.resized(width, height))
    }
}
