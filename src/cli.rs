use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::error::PhotoError;
use crate::image_processing::adjust::AdjustmentSettings;
use crate::image_processing::face_locator::FaceBox;
use crate::image_processing::layout::SheetSpec;
use crate::session::Caption;
use crate::utils::parse_hex_color;

#[derive(
    Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum OutputType {
    /// Lossless PNG sheet
    #[value(name = "png")]
    Png,
    /// JPEG sheet (smaller, for print kiosks)
    #[value(name = "jpg")]
    Jpg,
}

impl OutputType {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputType::Png => "png",
            OutputType::Jpg => "jpg",
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "idphoto-sheet",
    about = "Identification photo processor and print sheet composer",
    long_about = "
ID Photo Sheet - Identification photo processor

Centers each photo on the subject's face, crops it to a standard ID size,
optionally replaces the background, applies color adjustments and packs as many
copies as fit onto a printable sheet.

Key Features:
• Face-centered crop with the standard head-to-frame proportion
• Background replacement through an external removal program or an ONNX model
• Brightness, contrast, saturation and vertical position adjustments
• Print layout packing with copy-count rules per photo size
• Optional caption box with name, lastname and id number
• Parallel batch processing with progress tracking

Example Usage:
  # Passport photo on a 10x15 cm sheet, face box given explicitly
  idphoto-sheet -i portrait.jpg -o ~/prints --size Pasaporte --face 420,310,380,460

  # Batch a folder with the SeetaFace detector and a blue background
  idphoto-sheet -i ~/Photos -o ~/prints --size 3x4 --face-model seeta_fd_frontal_v1.0.bin \\
    --segment-command ./remove-bg.sh --background '#1E90FF' --cut-guides

  # Show the available photo sizes
  idphoto-sheet --list-sizes

  # Print the slot table for a size without processing anything
  idphoto-sheet -i portrait.jpg --size 'Visa' --face 1,1,10,10 --show-layout --dry-run"
)]
pub struct Args {
    /// Input directories or single image files (can be specified multiple times)
    #[arg(
        short = 'i',
        long = "input",
        required_unless_present_any = ["list_sizes"],
        value_name = "DIR|FILE"
    )]
    pub input_paths: Vec<PathBuf>,

    /// Output directory for photos, sheets and layout reports
    #[arg(short = 'o', long = "output", value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Photo size: a catalog label ("Pasaporte"), a catalog entry or WxH in cm ("3.5x4.5")
    #[arg(short = 's', long = "size", default_value = "3x4", value_name = "SIZE")]
    pub size: String,

    /// Sheet size in millimeters (format: WIDTHxHEIGHT)
    #[arg(long = "sheet", default_value = "152x102", value_name = "WIDTHxHEIGHT")]
    pub sheet: String,

    /// Print resolution in dots per inch
    #[arg(long = "dpi", default_value = "300", value_name = "DPI")]
    pub dpi: f64,

    /// Unprintable border on every sheet edge, in millimeters
    #[arg(long = "safety-margin", default_value = "5", value_name = "MM")]
    pub safety_margin: f64,

    /// Gap between neighbouring photos, in millimeters
    #[arg(long = "inter-margin", default_value = "2", value_name = "MM")]
    pub inter_margin: f64,

    /// Maximum number of copies per sheet
    #[arg(long = "max-copies", default_value = "8", value_name = "N")]
    pub max_copies: u32,

    /// Background replacement color (hex, e.g. #FFFFFF)
    #[arg(long = "background", default_value = "#FFFFFF", value_name = "COLOR")]
    pub background: String,

    /// Brightness adjustment (-100 to 100)
    #[arg(long = "brightness", default_value = "0", allow_hyphen_values = true)]
    pub brightness: i32,

    /// Contrast adjustment (-100 to 100)
    #[arg(long = "contrast", default_value = "0", allow_hyphen_values = true)]
    pub contrast: i32,

    /// Saturation adjustment (-100 to 100)
    #[arg(long = "saturation", default_value = "0", allow_hyphen_values = true)]
    pub saturation: i32,

    /// Vertical shift in pixels (positive moves the subject down)
    #[arg(long = "shift", default_value = "0", allow_hyphen_values = true, value_name = "PX")]
    pub shift: i32,

    /// Black out the bottom band of the photo where the caption goes
    #[arg(long = "caption-band")]
    pub caption_band: bool,

    /// Fraction of the photo height reserved for the caption band
    #[arg(long = "caption-ratio", default_value = "0.2", value_name = "RATIO")]
    pub caption_ratio: f64,

    /// Caption first line
    #[arg(long = "name", value_name = "TEXT")]
    pub name: Option<String>,

    /// Caption second line
    #[arg(long = "lastname", value_name = "TEXT")]
    pub lastname: Option<String>,

    /// Caption third line
    #[arg(long = "id-number", value_name = "TEXT")]
    pub id_number: Option<String>,

    /// Draw cut guides at every photo corner
    #[arg(long = "cut-guides")]
    pub cut_guides: bool,

    /// Caption font: family name ("Arial"), font filename ("Arial.ttf") or full path
    #[arg(long = "font", default_value = "Arial", value_name = "FONT")]
    pub font: String,

    /// Face bounding box in source pixels (format: X,Y,WIDTH,HEIGHT)
    #[arg(long = "face", value_name = "X,Y,W,H")]
    pub face: Option<String>,

    /// SeetaFace frontal model for automatic face detection (requires the rustface feature)
    #[arg(long = "face-model", value_name = "FILE")]
    pub face_model: Option<PathBuf>,

    /// External background removal program
    #[arg(long = "segment-command", value_name = "PROGRAM")]
    pub segment_command: Option<PathBuf>,

    /// Extra argument passed to the removal program (repeatable)
    #[arg(long = "segment-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub segment_args: Vec<String>,

    /// ONNX segmentation model for local background removal (requires the ai feature)
    #[arg(long = "segment-model", value_name = "FILE")]
    pub segment_model: Option<PathBuf>,

    /// Sheet output format
    #[arg(long = "output-format", default_value = "png")]
    pub output_format: OutputType,

    /// Comma-separated list of image extensions to process
    #[arg(long = "extensions", default_value = "jpg,jpeg,png,webp,tiff")]
    pub extensions_str: String,

    /// Number of parallel processing jobs (0 = auto-detect CPU cores)
    #[arg(short = 'j', long = "jobs", default_value = "0", value_name = "N")]
    pub jobs: usize,

    /// Enable verbose output with detailed progress information
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Emit progress as JSON lines instead of progress bars
    #[arg(long = "json-progress")]
    pub json_progress: bool,

    /// JSON configuration file; command-line flags take precedence
    #[arg(long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// List the photo size catalog and exit
    #[arg(long = "list-sizes")]
    pub list_sizes: bool,

    /// Print the slot table of the computed layout
    #[arg(long = "show-layout")]
    pub show_layout: bool,

    /// Perform a dry run: compute layouts and show what would be generated without creating files
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Photo size catalog entries ("Label - WxH cm"), set from the config file
    #[arg(skip)]
    pub catalog_entries: Vec<String>,
}

impl Args {
    /// Parse the extensions string into a vector
    pub fn parse_extensions(&self) -> Vec<String> {
        self.extensions_str
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Sheet dimensions, margins, DPI and copy cap as one validated spec.
    pub fn parse_sheet(&self) -> Result<SheetSpec, String> {
        let parts: Vec<&str> = self.sheet.split(['x', 'X']).collect();
        if parts.len() != 2 {
            return Err(format!(
                "Invalid sheet format '{}'. Use WIDTHxHEIGHT in mm (e.g., 152x102)",
                self.sheet
            ));
        }

        let width_mm = parts[0]
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("Invalid sheet width: '{}'", parts[0]))?;
        let height_mm = parts[1]
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("Invalid sheet height: '{}'", parts[1]))?;

        let sheet = SheetSpec {
            width_mm,
            height_mm,
            safety_margin_mm: self.safety_margin,
            inter_margin_mm: self.inter_margin,
            dpi: self.dpi,
            max_copies: self.max_copies,
        };
        sheet.validate().map_err(|e| e.to_string())?;
        Ok(sheet)
    }

    pub fn parse_face(&self) -> Result<Option<FaceBox>, String> {
        self.face.as_deref().map(str::parse).transpose()
    }

    pub fn adjustment_settings(&self) -> Result<AdjustmentSettings, PhotoError> {
        let settings = AdjustmentSettings {
            brightness: self.brightness,
            contrast: self.contrast,
            saturation: self.saturation,
            vertical_shift: self.shift,
            background_color: parse_hex_color(&self.background)?,
            show_caption_band: self.caption_band,
            caption_band_ratio: self.caption_ratio,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn caption(&self) -> Caption {
        Caption {
            name: self.name.clone().unwrap_or_default(),
            lastname: self.lastname.clone().unwrap_or_default(),
            id_number: self.id_number.clone().unwrap_or_default(),
        }
    }
}


// Default implementation for tests
#[cfg(test)]
impl Default for Args {
    fn default() -> Self {
        Self {
            input_paths: vec![],
            output_dir: PathBuf::new(),
            size: "3x4".to_string(),
            sheet: "152x102".to_string(),
            dpi: 300.0,
            safety_margin: 5.0,
            inter_margin: 2.0,
            max_copies: 8,
            background: "#FFFFFF".to_string(),
            brightness: 0,
            contrast: 0,
            saturation: 0,
            shift: 0,
            caption_band: false,
            caption_ratio: 0.2,
            name: None,
            lastname: None,
            id_number: None,
            cut_guides: false,
            font: "Arial".to_string(),
            face: None,
            face_model: None,
            segment_command: None,
            segment_args: vec![],
            segment_model: None,
            output_format: OutputType::Png,
            extensions_str: "jpg,jpeg,png,webp,tiff".to_string(),
            jobs: 0,
            verbose: false,
            json_progress: false,
            config_file: None,
            list_sizes: false,
            show_layout: false,
            dry_run: false,
            catalog_entries: vec![],
        }
    }
}
