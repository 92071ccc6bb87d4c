use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Instant;

use idphoto_sheet::cli::Args;
use idphoto_sheet::error::PhotoError;
use idphoto_sheet::image_processing::command_segmenter::CommandSegmenter;
use idphoto_sheet::image_processing::face_locator::{FaceLocator, FixedFaceLocator};
use idphoto_sheet::image_processing::layout::compute_layout;
use idphoto_sheet::image_processing::layout_report::{print_catalog, print_layout};
use idphoto_sheet::image_processing::photo_size::PhotoSizeCatalog;
use idphoto_sheet::image_processing::segmentation::Segmenter;
use idphoto_sheet::image_processing::{ProcessingConfig, ProcessingEngine, ProcessingResult};
use idphoto_sheet::json_output::JsonMessage;
use idphoto_sheet::utils::{
    create_progress_bar, format_duration, format_hex_color, validate_inputs, verbose_println,
    warn_println,
};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_catalog(args: &Args) -> Result<PhotoSizeCatalog> {
    if args.catalog_entries.is_empty() {
        Ok(PhotoSizeCatalog::default())
    } else {
        PhotoSizeCatalog::from_entries(&args.catalog_entries)
            .context("Invalid photo size catalog in config file")
    }
}

fn build_face_locator(args: &Args) -> Result<Box<dyn FaceLocator>> {
    if let Some(face) = args.parse_face().map_err(|e| anyhow::anyhow!(e))? {
        return Ok(Box::new(FixedFaceLocator(Some(face))));
    }

    #[cfg(feature = "rustface")]
    if let Some(model) = &args.face_model {
        use idphoto_sheet::image_processing::face_locator::RustfaceLocator;
        return Ok(Box::new(RustfaceLocator::from_model_file(model)?));
    }

    Err(anyhow::anyhow!("No face locator available"))
}

fn build_segmenter(args: &Args) -> Result<Option<Box<dyn Segmenter>>> {
    if let Some(program) = &args.segment_command {
        return Ok(Some(Box::new(CommandSegmenter::new(
            program.clone(),
            args.segment_args.clone(),
        ))));
    }

    #[cfg(feature = "ai")]
    if let Some(model) = &args.segment_model {
        use idphoto_sheet::image_processing::onnx_segmentation::OnnxSegmenter;
        return Ok(Some(Box::new(OnnxSegmenter::from_model_file(model)?)));
    }

    Ok(None)
}

fn print_configuration(args: &Args, config: &ProcessingConfig) {
    println!("{}", style("Configuration:").bold());
    println!("  Photo size: {}", config.photo_size);
    println!(
        "  Sheet: {}x{} mm at {} DPI (safety {} mm, gap {} mm, max {} copies)",
        config.sheet.width_mm,
        config.sheet.height_mm,
        config.sheet.dpi,
        config.sheet.safety_margin_mm,
        config.sheet.inter_margin_mm,
        config.sheet.max_copies
    );
    println!(
        "  Background: {}",
        format_hex_color(config.settings.background_color)
    );
    println!(
        "  Adjustments: brightness {}, contrast {}, saturation {}, shift {} px",
        config.settings.brightness,
        config.settings.contrast,
        config.settings.saturation,
        config.settings.vertical_shift
    );
    if config.settings.show_caption_band {
        println!(
            "  Caption band: {:.0}% of the photo height",
            config.settings.caption_band_ratio * 100.0
        );
    }
    if !config.caption.is_empty() {
        println!("  Caption: {}", config.caption.lines().join(" / "));
    }
    println!(
        "  Face locator: {}",
        match (&args.face, &args.face_model) {
            (Some(face), _) => format!("fixed box {}", face),
            (None, Some(model)) => format!("SeetaFace model {}", model.display()),
            (None, None) => "none".to_string(),
        }
    );
    println!(
        "  Background removal: {}",
        match (&args.segment_command, &args.segment_model) {
            (Some(program), _) => format!("command {}", program.display()),
            (None, Some(model)) => format!("ONNX model {}", model.display()),
            (None, None) => "disabled".to_string(),
        }
    );
    println!("  Cut guides: {}", config.cut_guides);
    println!("  Output format: {}", config.output_format);
    println!("  Parallel jobs: {}", config.parallel_jobs);
    println!("  Extensions: {:?}", config.extensions);
    if config.dry_run {
        println!("  Dry run mode: enabled (simulation only - no files will be created)");
    }
    println!();
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let mut args = Args::parse();
    init_tracing(args.verbose);
    args.load_and_merge_config()?;

    let json_mode = args.json_progress;
    let catalog = build_catalog(&args)?;

    if args.list_sizes {
        let sheet = args.parse_sheet().map_err(|e| anyhow::anyhow!(e))?;
        print_catalog(&catalog, &sheet);
        return Ok(());
    }

    if !json_mode {
        println!("{}", style("ID Photo Sheet - Photo Processor").bold().blue());
        println!("{}", style("Face-centered ID photos packed for printing").dim());
        println!();
    }

    validate_inputs(&args)?;

    let photo_size = catalog.resolve(&args.size)?;
    let config = ProcessingConfig {
        photo_size,
        sheet: args.parse_sheet().map_err(|e| anyhow::anyhow!(e))?,
        settings: args.adjustment_settings()?,
        caption: args.caption(),
        cut_guides: args.cut_guides,
        font: Some(args.font.clone()),
        output_format: args.output_format,
        extensions: args.parse_extensions(),
        verbose: args.verbose && !json_mode,
        parallel_jobs: if args.jobs == 0 {
            num_cpus::get()
        } else {
            args.jobs
        },
        dry_run: args.dry_run,
    };

    if config.verbose {
        print_configuration(&args, &config);
    }

    // Fail early when the size cannot be packed at all
    let layout = compute_layout(&config.sheet, &config.photo_size)?;
    if args.show_layout && !json_mode {
        print_layout(&layout);
    }

    if !config.dry_run {
        std::fs::create_dir_all(&args.output_dir).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                args.output_dir.display()
            )
        })?;
    } else {
        verbose_println(config.verbose, "Dry run mode: Skipping output directory creation");
    }

    let dry_run_mode = config.dry_run;
    let parallel_jobs = config.parallel_jobs;
    let engine = ProcessingEngine::new(config, build_face_locator(&args)?, build_segmenter(&args)?)?;

    let image_files = engine.discover_images(&args.input_paths)?;
    if image_files.is_empty() {
        if json_mode {
            JsonMessage::summary(0, 0, 0, start_time.elapsed().as_secs_f64());
        } else {
            println!("{}", style("No images found with specified extensions").red());
        }
        return Ok(());
    }

    let results = if json_mode {
        let total = image_files.len();
        engine.process_batch(&image_files, &args.output_dir, |count, path, result| {
            match result {
                Ok(done) => JsonMessage::file_completed(
                    path,
                    &done.output_paths(),
                    done.copies,
                    done.processing_time.as_millis(),
                ),
                Err(e) => JsonMessage::file_failed(
                    path,
                    e.downcast_ref::<PhotoError>().map(PhotoError::category),
                    format!("{:#}", e),
                ),
            }
            JsonMessage::progress(count, total, path.display().to_string());
        })
    } else {
        let multi_progress = MultiProgress::new();

        let main_progress = multi_progress.add(create_progress_bar(image_files.len() as u64));
        main_progress.set_message("Processing photos");

        let thread_count = parallel_jobs.min(image_files.len());
        let mut thread_progress_bars = Vec::new();
        for i in 0..thread_count {
            let thread_pb = multi_progress.add(ProgressBar::new(100));
            thread_pb.set_style(
                ProgressStyle::with_template(&format!(
                    "Job {:02}: [{{bar:15.blue/cyan}}] {{msg}}",
                    i + 1
                ))?
                .progress_chars("██▌ "),
            );
            thread_pb.set_message("Waiting...");
            thread_progress_bars.push(thread_pb);
        }

        let results = engine.process_batch_with_progress(
            &image_files,
            &args.output_dir,
            &main_progress,
            &thread_progress_bars,
        );

        main_progress.finish_with_message("✓ Processing complete!");
        for (i, pb) in thread_progress_bars.iter().enumerate() {
            pb.finish_with_message(format!("✓ Thread {} finished", i + 1));
        }
        println!();
        results
    };

    let successful = results.iter().filter(|r| r.is_ok()).count();
    let failed = results.len() - successful;
    let total_time = start_time.elapsed();

    if json_mode {
        JsonMessage::summary(
            image_files.len(),
            successful,
            failed,
            total_time.as_secs_f64(),
        );
        return Ok(());
    }

    print_summary(&results, dry_run_mode);

    println!();
    println!("{}", style("Performance:").bold().blue());
    println!(
        "  Total processing time: {}",
        style(format_duration(total_time)).bold()
    );
    println!(
        "  Average time per image: {}",
        style(format_duration(total_time / image_files.len() as u32)).dim()
    );

    println!();
    let output_header = if dry_run_mode {
        style("Output files (would be created):").bold().cyan()
    } else {
        style("Output files:").bold().green()
    };
    println!("{}", output_header);
    println!("  {}", args.output_dir.display());

    if failed > 0 {
        println!();
        println!("{}", style("Errors encountered:").bold().red());
        for (i, (path, result)) in image_files.iter().zip(&results).enumerate() {
            if let Err(e) = result {
                let filename = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("unknown");
                let category = e
                    .downcast_ref::<PhotoError>()
                    .map(|p| format!(" [{}]", p.category()))
                    .unwrap_or_default();
                println!(
                    "  {}: {}{} - {:#}",
                    style(format!("#{}", i + 1)).dim(),
                    style(filename).bold().red(),
                    style(category).dim(),
                    e
                );
            }
        }
        println!();
        warn_println(&format!("{} photos could not be processed", failed));
        println!("  Check the face box and input files, or retry with --verbose for more details");
    }

    Ok(())
}

fn print_summary(results: &[Result<ProcessingResult>], dry_run_mode: bool) {
    let successful: Vec<&ProcessingResult> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let failed = results.len() - successful.len();

    let header = if dry_run_mode {
        style("Dry Run Results Summary:").bold().cyan()
    } else {
        style("Results Summary:").bold().green()
    };
    println!("{}", header);

    let processed_label = if dry_run_mode {
        "Would be processed"
    } else {
        "Successfully processed"
    };
    println!(
        "  {}: {}",
        processed_label,
        style(successful.len()).bold().green()
    );
    if failed > 0 {
        println!("  Failed: {}", style(failed).bold().red());
    }

    let segmented = successful.iter().filter(|r| r.segmented).count();
    if segmented > 0 {
        println!(
            "  Background replaced: {}",
            style(segmented).bold().cyan()
        );
    }

    if successful.is_empty() {
        return;
    }

    println!();
    println!("{}", style("Sheets:").bold().blue());
    for (i, result) in successful.iter().enumerate() {
        let filename = result
            .input_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown");
        let sheet_name = result
            .sheet_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown");
        println!(
            "  {}: {} → {} ({} copies, face {}x{} at {},{}) {}",
            style(format!("#{}", i + 1)).dim(),
            style(filename).bold(),
            style(sheet_name).cyan(),
            result.copies,
            result.face.width,
            result.face.height,
            result.face.x,
            result.face.y,
            style(format_duration(result.processing_time)).dim()
        );
    }
}
