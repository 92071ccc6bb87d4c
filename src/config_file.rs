use crate::cli::{Args, OutputType};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Saved settings file written by front ends and reused across runs
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub name: Option<String>,
    pub last_modified: Option<String>,
    pub config: ProcessingConfigJson,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingConfigJson {
    pub input_path: Option<String>,
    pub output_path: Option<String>,
    pub photo_size: Option<String>,
    /// Catalog entries in "Label - WxH cm" form; replaces the built-in catalog
    pub photo_sizes: Option<Vec<String>>,
    pub sheet: Option<String>,
    pub dpi: Option<f64>,
    pub safety_margin: Option<f64>,
    pub inter_margin: Option<f64>,
    pub max_copies: Option<u32>,
    pub background_color: Option<String>,
    pub brightness: Option<i32>,
    pub contrast: Option<i32>,
    pub saturation: Option<i32>,
    pub vertical_shift: Option<i32>,
    pub caption_band: Option<bool>,
    pub caption_band_ratio: Option<f64>,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub id_number: Option<String>,
    pub cut_guides: Option<bool>,
    pub font: Option<String>,
    pub face_model: Option<String>,
    pub segment_command: Option<String>,
    pub segment_args: Option<Vec<String>>,
    pub segment_model: Option<String>,
    pub output_format: Option<String>,
    pub extensions: Option<String>,
    pub jobs: Option<usize>,
    pub dry_run: Option<bool>,
}

impl Args {
    /// Load configuration from a JSON file and merge with command-line arguments
    /// Command-line arguments take precedence over config file values
    pub fn load_and_merge_config(&mut self) -> Result<()> {
        if let Some(config_path) = self.config_file.clone() {
            let contents = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let config: ConfigFile = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            let args_from_cli = std::env::args().collect::<Vec<_>>();
            self.merge_from_config(config.config, &args_from_cli)?;

            tracing::debug!(path = ?config_path, "configuration loaded");
        }
        Ok(())
    }

    /// Apply every config value whose flag was not given on the command line.
    fn merge_from_config(
        &mut self,
        config: ProcessingConfigJson,
        args_from_cli: &[String],
    ) -> Result<()> {
        let on_cli = |flags: &[&str]| {
            args_from_cli.iter().any(|a| {
                flags
                    .iter()
                    .any(|f| a == f || a.starts_with(&format!("{}=", f)))
            })
        };

        if !on_cli(&["-i", "--input"]) {
            if let Some(input) = config.input_path {
                self.input_paths = vec![PathBuf::from(input)];
            }
        }

        if !on_cli(&["-o", "--output"]) {
            if let Some(output) = config.output_path {
                self.output_dir = PathBuf::from(output);
            }
        }

        if !on_cli(&["-s", "--size"]) {
            if let Some(size) = config.photo_size {
                self.size = size;
            }
        }

        if let Some(entries) = config.photo_sizes {
            self.catalog_entries = entries;
        }

        if !on_cli(&["--sheet"]) {
            if let Some(sheet) = config.sheet {
                self.sheet = sheet;
            }
        }

        if !on_cli(&["--dpi"]) {
            if let Some(dpi) = config.dpi {
                self.dpi = dpi;
            }
        }

        if !on_cli(&["--safety-margin"]) {
            if let Some(margin) = config.safety_margin {
                self.safety_margin = margin;
            }
        }

        if !on_cli(&["--inter-margin"]) {
            if let Some(margin) = config.inter_margin {
                self.inter_margin = margin;
            }
        }

        if !on_cli(&["--max-copies"]) {
            if let Some(cap) = config.max_copies {
                self.max_copies = cap;
            }
        }

        if !on_cli(&["--background"]) {
            if let Some(color) = config.background_color {
                self.background = color;
            }
        }

        // Numeric sliders - only apply if using defaults
        if self.brightness == 0 {
            if let Some(brightness) = config.brightness {
                self.brightness = brightness;
            }
        }

        if self.contrast == 0 {
            if let Some(contrast) = config.contrast {
                self.contrast = contrast;
            }
        }

        if self.saturation == 0 {
            if let Some(saturation) = config.saturation {
                self.saturation = saturation;
            }
        }

        if self.shift == 0 {
            if let Some(shift) = config.vertical_shift {
                self.shift = shift;
            }
        }

        if !on_cli(&["--caption-ratio"]) {
            if let Some(ratio) = config.caption_band_ratio {
                self.caption_ratio = ratio;
            }
        }

        // Boolean flags - only apply if currently false (default)
        if !self.caption_band {
            self.caption_band = config.caption_band.unwrap_or(false);
        }

        if !self.cut_guides {
            self.cut_guides = config.cut_guides.unwrap_or(false);
        }

        if !self.dry_run {
            self.dry_run = config.dry_run.unwrap_or(false);
        }

        if self.name.is_none() {
            self.name = config.name;
        }
        if self.lastname.is_none() {
            self.lastname = config.lastname;
        }
        if self.id_number.is_none() {
            self.id_number = config.id_number;
        }

        if self.font == "Arial" {
            if let Some(font) = config.font {
                self.font = font;
            }
        }

        if self.face_model.is_none() {
            self.face_model = config.face_model.map(PathBuf::from);
        }

        if self.segment_command.is_none() && self.segment_model.is_none() {
            self.segment_command = config.segment_command.map(PathBuf::from);
            self.segment_model = config.segment_model.map(PathBuf::from);
        }

        if self.segment_args.is_empty() {
            if let Some(extra) = config.segment_args {
                self.segment_args = extra;
            }
        }

        if !on_cli(&["--output-format"]) {
            if let Some(format) = config.output_format {
                self.output_format = match format.to_lowercase().as_str() {
                    "jpg" | "jpeg" => OutputType::Jpg,
                    "png" => OutputType::Png,
                    other => {
                        return Err(anyhow::anyhow!(
                            "Invalid output format '{}' in config. Valid formats: png, jpg",
                            other
                        ))
                    }
                };
            }
        }

        if self.extensions_str == "jpg,jpeg,png,webp,tiff" {
            if let Some(ext) = config.extensions {
                self.extensions_str = ext;
            }
        }

        if self.jobs == 0 {
            if let Some(jobs) = config.jobs {
                self.jobs = jobs;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ProcessingConfigJson {
        let file: ConfigFile = serde_json::from_str(json).unwrap();
        file.config
    }

    #[test]
    fn test_config_fills_defaults() {
        let config = parse(
            r##"{
                "name": "kiosk",
                "config": {
                    "photoSize": "Pasaporte",
                    "sheet": "210x297",
                    "maxCopies": 4,
                    "backgroundColor": "#1E90FF",
                    "brightness": 15,
                    "captionBand": true,
                    "photoSizes": ["Carnet - 3x4 cm", "Mini - 2x2 cm"],
                    "outputFormat": "jpg",
                    "segmentCommand": "/usr/local/bin/remove-bg"
                }
            }"##,
        );
        let mut args = Args::default();
        args.merge_from_config(config, &[]).unwrap();

        assert_eq!(args.size, "Pasaporte");
        assert_eq!(args.sheet, "210x297");
        assert_eq!(args.max_copies, 4);
        assert_eq!(args.background, "#1E90FF");
        assert_eq!(args.brightness, 15);
        assert!(args.caption_band);
        assert_eq!(args.catalog_entries.len(), 2);
        assert_eq!(args.output_format, OutputType::Jpg);
        assert_eq!(
            args.segment_command,
            Some(PathBuf::from("/usr/local/bin/remove-bg"))
        );
    }

    #[test]
    fn test_cli_values_take_precedence() {
        let config = parse(
            r#"{"config": {"photoSize": "Visa", "maxCopies": 2, "brightness": 40}}"#,
        );
        let mut args = Args {
            size: "3.5x4.5".to_string(),
            brightness: -10,
            ..Default::default()
        };
        let cli = vec![
            "idphoto-sheet".to_string(),
            "--size".to_string(),
            "3.5x4.5".to_string(),
        ];
        args.merge_from_config(config, &cli).unwrap();

        assert_eq!(args.size, "3.5x4.5");
        assert_eq!(args.brightness, -10);
        assert_eq!(args.max_copies, 2);
    }

    #[test]
    fn test_invalid_output_format_rejected() {
        let config = parse(r#"{"config": {"outputFormat": "bmp"}}"#);
        let mut args = Args::default();
        assert!(args.merge_from_config(config, &[]).is_err());
    }
}
