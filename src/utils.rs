use anyhow::Result;
use console::style;
use image::Rgb;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use crate::cli::Args;
use crate::error::PhotoError;

/// Create a styled progress bar
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.blue} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg} ({eta})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Format duration in a human-readable way
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 60 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        format!("{}m {}s", mins, secs)
    } else if total_secs > 0 {
        format!("{}.{:03}s", total_secs, millis)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Validate command line arguments
pub fn validate_inputs(args: &Args) -> Result<()> {
    for input_path in &args.input_paths {
        if !input_path.exists() {
            return Err(anyhow::anyhow!(
                "Input path does not exist: {}",
                input_path.display()
            ));
        }
        if !input_path.is_dir() && !input_path.is_file() {
            return Err(anyhow::anyhow!(
                "Input path is neither a file nor a directory: {}",
                input_path.display()
            ));
        }
    }

    let extensions = args.parse_extensions();
    if extensions.is_empty() {
        return Err(anyhow::anyhow!("No valid extensions specified"));
    }

    if args.jobs > 32 {
        return Err(anyhow::anyhow!(
            "Job count too high (max 32), got: {}",
            args.jobs
        ));
    }

    args.adjustment_settings()?;
    args.parse_sheet().map_err(|e| anyhow::anyhow!(e))?;
    args.parse_face().map_err(|e| anyhow::anyhow!(e))?;

    if args.face.is_none() && args.face_model.is_none() {
        return Err(anyhow::anyhow!(
            "No face locator configured. Pass --face X,Y,W,H or --face-model <FILE>"
        ));
    }

    if args.face_model.is_some() {
        #[cfg(not(feature = "rustface"))]
        {
            return Err(anyhow::anyhow!(
                "Face detection is not available. \
                 Rebuild with --features rustface to load a SeetaFace model"
            ));
        }
    }

    if args.segment_model.is_some() {
        #[cfg(not(feature = "ai"))]
        {
            return Err(anyhow::anyhow!(
                "Local segmentation is not available. \
                 Rebuild with --features ai to run an ONNX segmentation model"
            ));
        }
    }

    if args.segment_model.is_some() && args.segment_command.is_some() {
        return Err(anyhow::anyhow!(
            "--segment-model and --segment-command are mutually exclusive"
        ));
    }

    Ok(())
}

/// Parse `#RGB` or `#RRGGBB` into an RGB color.
pub fn parse_hex_color(color: &str) -> Result<Rgb<u8>, PhotoError> {
    let invalid = || PhotoError::InvalidColor(color.to_string());
    let hex = color.trim().strip_prefix('#').ok_or_else(invalid)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = channel(&c.to_string())?;
                rgb[i] = v * 17;
            }
            Ok(Rgb(rgb))
        }
        6 => Ok(Rgb([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        ])),
        _ => Err(invalid()),
    }
}

pub fn format_hex_color(color: Rgb<u8>) -> String {
    format!("#{:02X}{:02X}{:02X}", color[0], color[1], color[2])
}

/// Get file extension in lowercase
pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Check if a file has one of the specified extensions
pub fn has_valid_extension(path: &Path, extensions: &[String]) -> bool {
    if let Some(ext) = get_file_extension(path) {
        extensions.contains(&ext)
    } else {
        false
    }
}

/// Print verbose information if verbose mode is enabled
pub fn verbose_println(verbose: bool, message: &str) {
    if verbose {
        println!("{} {}", style("[VERBOSE]").dim(), message);
    }
}

/// Print warning message
pub fn warn_println(message: &str) {
    println!("{} {}", style("[WARNING]").yellow().bold(), message);
}
