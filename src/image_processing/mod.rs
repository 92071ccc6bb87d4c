pub mod adjust;
pub mod command_segmenter;
pub mod face_locator;
pub mod frame;
pub mod layout;
pub mod layout_report;
#[cfg(feature = "ai")]
pub mod onnx_segmentation;
pub mod orientation;
pub mod photo_size;
pub mod resize;
pub mod segmentation;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cli::OutputType;
use crate::render::{load_font, render_sheet, RenderOptions};
use crate::session::{Caption, PhotoSession};
use crate::utils::{has_valid_extension, verbose_println};

use adjust::AdjustmentSettings;
use face_locator::{FaceBox, FaceLocator};
use layout::SheetSpec;
use photo_size::PhotoSize;
use segmentation::Segmenter;

#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub photo_size: PhotoSize,
    pub sheet: SheetSpec,
    pub settings: AdjustmentSettings,
    pub caption: Caption,
    pub cut_guides: bool,
    /// Caption font specification, only loaded when the caption has text
    pub font: Option<String>,
    pub output_format: OutputType,
    pub extensions: Vec<String>,
    pub verbose: bool,
    pub parallel_jobs: usize,
    pub dry_run: bool,
}

pub struct ProcessingEngine {
    config: ProcessingConfig,
    locator: Box<dyn FaceLocator>,
    segmenter: Option<Box<dyn Segmenter>>,
    render_options: RenderOptions,
    pool: rayon::ThreadPool,
}

impl ProcessingEngine {
    pub fn new(
        config: ProcessingConfig,
        locator: Box<dyn FaceLocator>,
        segmenter: Option<Box<dyn Segmenter>>,
    ) -> Result<Self> {
        config.sheet.validate()?;
        config.settings.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_jobs.max(1))
            .build()
            .context("Failed to initialize thread pool")?;

        let font = match (&config.font, config.caption.is_empty()) {
            (Some(spec), false) => match load_font(spec) {
                Ok(font) => Some(font),
                Err(e) => {
                    warn!("Caption font unavailable: {:#}", e);
                    None
                }
            },
            _ => None,
        };

        let render_options = RenderOptions {
            cut_guides: config.cut_guides,
            font,
        };

        Ok(Self {
            config,
            locator,
            segmenter,
            render_options,
            pool,
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Pixel canvas of one photo at the sheet's print resolution.
    pub fn photo_canvas(&self) -> (u32, u32) {
        let sheet = &self.config.sheet;
        let size = &self.config.photo_size;
        (
            sheet.mm_to_px(size.width_mm()).round().max(1.0) as u32,
            sheet.mm_to_px(size.height_mm()).round().max(1.0) as u32,
        )
    }

    /// Discover all image files in the input directories
    pub fn discover_images(&self, input_paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut image_files = Vec::new();

        for input_path in input_paths {
            if input_path.is_file() {
                if has_valid_extension(input_path, &self.config.extensions) {
                    image_files.push(input_path.clone());
                } else {
                    verbose_println(
                        self.config.verbose,
                        &format!("Skipping unsupported file: {}", input_path.display()),
                    );
                }
                continue;
            }

            verbose_println(
                self.config.verbose,
                &format!("Scanning directory: {}", input_path.display()),
            );

            let walker = WalkDir::new(input_path).follow_links(false).max_depth(10);

            for entry in walker {
                let entry = entry.context("Failed to read directory entry")?;
                let path = entry.path();

                if path.is_file() && has_valid_extension(path, &self.config.extensions) {
                    image_files.push(path.to_path_buf());
                }
            }
        }

        // Sort for consistent processing order
        image_files.sort();
        image_files.dedup();

        verbose_println(
            self.config.verbose,
            &format!("Found {} image files", image_files.len()),
        );
        Ok(image_files)
    }

    /// Process a batch of images, reporting each completion to `progress_callback`.
    /// Results are returned in input order.
    pub fn process_batch<F>(
        &self,
        image_files: &[PathBuf],
        output_dir: &Path,
        progress_callback: F,
    ) -> Vec<Result<ProcessingResult>>
    where
        F: Fn(usize, &Path, &Result<ProcessingResult>) + Send + Sync,
    {
        let processed_count = AtomicUsize::new(0);

        self.pool.install(|| {
            image_files
                .par_iter()
                .map(|image_path| {
                    let result = self.process_single_image(image_path, output_dir, None);
                    let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
                    progress_callback(count, image_path, &result);
                    result
                })
                .collect()
        })
    }

    /// Process a batch of images with multi-progress support
    pub fn process_batch_with_progress(
        &self,
        image_files: &[PathBuf],
        output_dir: &Path,
        main_progress: &ProgressBar,
        thread_progress_bars: &[ProgressBar],
    ) -> Vec<Result<ProcessingResult>> {
        let processed_count = AtomicUsize::new(0);
        let thread_assignment = Mutex::new(HashMap::new());
        let next_thread_id = AtomicUsize::new(0);

        self.pool.install(|| {
            image_files
                .par_iter()
                .map(|image_path| {
                    let thread_pb = if thread_progress_bars.is_empty() {
                        None
                    } else {
                        let current_thread_id = rayon::current_thread_index().unwrap_or(0);
                        let mut assignment = match thread_assignment.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        let pb_index = *assignment.entry(current_thread_id).or_insert_with(|| {
                            next_thread_id.fetch_add(1, Ordering::Relaxed)
                                % thread_progress_bars.len()
                        });
                        Some(&thread_progress_bars[pb_index])
                    };

                    let result = self.process_single_image(image_path, output_dir, thread_pb);

                    let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
                    main_progress.inc(1);
                    main_progress.set_message(format!("Completed: {}/{}", count, image_files.len()));

                    if let Some(pb) = thread_pb {
                        pb.set_position(0);
                        pb.set_message("Idle");
                    }

                    result
                })
                .collect()
        })
    }

    /// Run one photo through the whole pipeline and write its outputs.
    pub fn process_single_image(
        &self,
        input_path: &Path,
        output_dir: &Path,
        progress_bar: Option<&ProgressBar>,
    ) -> Result<ProcessingResult> {
        let start = Instant::now();
        let filename = input_path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("unknown");
        let stage = |position: u64, label: &str| {
            if let Some(pb) = progress_bar {
                pb.set_position(position);
                pb.set_message(format!("{} - {}", filename, label));
            }
        };

        verbose_println(self.config.verbose, &format!("Processing: {}", input_path.display()));

        stage(10, "Loading");
        let image = orientation::load_oriented(input_path)?;

        let mut session = PhotoSession::new(self.config.sheet.clone(), self.config.settings.clone());
        session.load_image(image)?;
        session.set_photo_size(self.config.photo_size.clone());
        session.set_caption(self.config.caption.clone());

        stage(30, "Centering face");
        let face = session
            .center_face_for_photo_size(self.locator.as_ref(), self.photo_canvas())
            .with_context(|| format!("Failed to center {}", filename))?;

        let segmented = match &self.segmenter {
            Some(segmenter) => {
                stage(50, "Removing background");
                session
                    .segment_with(segmenter.as_ref())
                    .with_context(|| format!("Background removal failed for {}", filename))?
            }
            None => false,
        };

        stage(70, "Adjusting");
        session.set_settings(self.config.settings.clone());
        session.recompute()?;

        stage(80, "Laying out sheet");
        let copies = session.compute_layout()?.len();

        let stem = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("photo");
        let photo_path = output_dir.join(format!("{}_photo.png", stem));
        let sheet_path = output_dir.join(format!(
            "{}_sheet.{}",
            stem,
            self.config.output_format.extension()
        ));
        let layout_path = output_dir.join(format!("{}_layout.json", stem));

        if !self.config.dry_run {
            let (Some(photo), Some(layout)) = (session.final_image(), session.layout()) else {
                return Err(anyhow::anyhow!("Pipeline produced no output for {}", filename));
            };

            stage(90, "Rendering sheet");
            let sheet = render_sheet(photo, layout, session.caption(), &self.render_options)?;

            photo
                .save(&photo_path)
                .with_context(|| format!("Failed to save photo: {}", photo_path.display()))?;
            sheet
                .save(&sheet_path)
                .with_context(|| format!("Failed to save sheet: {}", sheet_path.display()))?;

            let report = serde_json::to_string_pretty(layout)
                .context("Failed to serialize layout")?;
            std::fs::write(&layout_path, report)
                .with_context(|| format!("Failed to save layout: {}", layout_path.display()))?;
        }

        stage(100, "Complete");
        let processing_time = start.elapsed();
        debug!(file = filename, copies, segmented, ?processing_time, "photo processed");

        Ok(ProcessingResult {
            input_path: input_path.to_path_buf(),
            photo_path,
            sheet_path,
            layout_path,
            face,
            copies,
            segmented,
            processing_time,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub input_path: PathBuf,
    pub photo_path: PathBuf,
    pub sheet_path: PathBuf,
    pub layout_path: PathBuf,
    pub face: FaceBox,
    pub copies: usize,
    pub segmented: bool,
    pub processing_time: Duration,
}

impl ProcessingResult {
    pub fn output_paths(&self) -> [&Path; 3] {
        [&self.photo_path, &self.sheet_path, &self.layout_path]
    }
}
