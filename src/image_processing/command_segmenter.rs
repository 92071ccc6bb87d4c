//! Background removal through an external program.
//!
//! The program is invoked as
//! `<program> [args...] --image <input.png> --mask <output.png> --output-format json`
//! and prints a JSON report on stdout:
//!
//! ```json
//! {"status": 200, "mask": "/tmp/out.png"}
//! {"status": 402, "error": "credits exhausted"}
//! ```
//!
//! `status` follows HTTP conventions so wrappers around remote removal
//! services can pass the service's status code through unchanged.

use image::{DynamicImage, RgbImage};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::segmentation::{SegmentationMask, Segmenter};
use crate::error::SegmentationError;

#[derive(Debug, Clone, Deserialize)]
struct CommandReport {
    status: u16,
    #[serde(default)]
    mask: Option<PathBuf>,
    #[serde(default)]
    error: Option<String>,
}

/// Segmenter backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandSegmenter {
    program: PathBuf,
    args: Vec<String>,
    work_dir: PathBuf,
}

impl CommandSegmenter {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: std::env::temp_dir(),
        }
    }

    /// Directory for the temporary input/mask files (defaults to the system temp dir).
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    fn temp_paths(&self) -> (PathBuf, PathBuf) {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let stem = format!("idphoto_seg_{}_{}", std::process::id(), id);
        (
            self.work_dir.join(format!("{stem}_input.png")),
            self.work_dir.join(format!("{stem}_mask.png")),
        )
    }

    fn run(&self, input: &Path, mask: &Path) -> Result<SegmentationMask, SegmentationError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--image")
            .arg(input)
            .arg("--mask")
            .arg(mask)
            .arg("--output-format")
            .arg("json")
            .output()
            .map_err(|e| {
                SegmentationError::Unavailable(format!(
                    "failed to execute {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SegmentationError::Network(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        interpret_report(&stdout, mask)
    }
}

/// Turn the program's JSON report into a mask or a categorized error.
fn interpret_report(stdout: &str, default_mask: &Path) -> Result<SegmentationMask, SegmentationError> {
    let report: CommandReport = serde_json::from_str(stdout.trim()).map_err(|e| {
        SegmentationError::MalformedResponse(format!("{} | Raw output: {}", e, stdout.trim()))
    })?;

    if let Some(error) = SegmentationError::from_status(
        report.status,
        report.error.as_deref().unwrap_or("no details"),
    ) {
        return Err(error);
    }

    let mask_path = report.mask.as_deref().unwrap_or(default_mask);
    load_mask(mask_path)
}

/// Decode a mask file: alpha channel when present, otherwise luminance.
fn load_mask(path: &Path) -> Result<SegmentationMask, SegmentationError> {
    let decoded = image::open(path).map_err(|e| {
        SegmentationError::MalformedResponse(format!("cannot read mask {}: {}", path.display(), e))
    })?;
    let mask = match decoded {
        DynamicImage::ImageRgba8(cutout) => SegmentationMask::from_rgba_alpha(&cutout),
        other if other.color().has_alpha() => SegmentationMask::from_rgba_alpha(&other.to_rgba8()),
        other => SegmentationMask::from_luma(&other.to_luma8()),
    };
    Ok(mask)
}

impl Segmenter for CommandSegmenter {
    fn segment(&self, image: &RgbImage) -> Result<SegmentationMask, SegmentationError> {
        let (input, mask) = self.temp_paths();
        image.save(&input).map_err(|e| {
            SegmentationError::Unavailable(format!("cannot write {}: {}", input.display(), e))
        })?;

        debug!(program = %self.program.display(), "running segmentation command");
        let result = self.run(&input, &mask);

        let _ = std::fs::remove_file(&input);
        let _ = std::fs::remove_file(&mask);
        result
    }
}
