use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use super::frame::AspectRatio;
use crate::error::PhotoError;

/// Catalog shipped when the configuration does not provide one.
pub const DEFAULT_CATALOG: &[&str] = &[
    "Carnet - 3x4 cm",
    "Pasaporte - 3.5x4.5 cm",
    "Visa - 5x5 cm",
    "Credencial - 6x9 cm",
    " - 2.5x3cm",
    " - 4x4cm",
];

fn size_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<label>.*?)\s*-\s*(?P<w>\d+(?:[.,]\d+)?)\s*[xX×]\s*(?P<h>\d+(?:[.,]\d+)?)\s*cm\s*$",
        )
        .expect("photo size pattern is valid")
    })
}

/// Physical photo size selected from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoSize {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub width_cm: f64,
    pub height_cm: f64,
}

impl PhotoSize {
    pub fn new(width_cm: f64, height_cm: f64) -> Result<Self, PhotoError> {
        for (name, value) in [("photo width", width_cm), ("photo height", height_cm)] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(PhotoError::OutOfRange {
                    name,
                    value,
                    min: 0.0,
                    max: f64::MAX,
                });
            }
        }
        Ok(Self {
            label: None,
            width_cm,
            height_cm,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.label = if label.trim().is_empty() {
            None
        } else {
            Some(label.trim().to_string())
        };
        self
    }

    pub fn width_mm(&self) -> f64 {
        self.width_cm * 10.0
    }

    pub fn height_mm(&self) -> f64 {
        self.height_cm * 10.0
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        AspectRatio {
            width: self.width_cm,
            height: self.height_cm,
        }
    }

    /// Same physical dimensions, ignoring the label.
    pub fn same_dimensions(&self, other: &PhotoSize) -> bool {
        self.width_cm == other.width_cm && self.height_cm == other.height_cm
    }

    /// Whether `name` selects this entry: the label (case-insensitive), the
    /// full catalog string, or bare `WxH` dimensions.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.trim();
        if let Some(label) = &self.label {
            if label.eq_ignore_ascii_case(name) {
                return true;
            }
        }
        if name.eq_ignore_ascii_case(self.to_string().trim()) {
            return true;
        }
        let dims = format!("{}x{}", self.width_cm, self.height_cm);
        name.eq_ignore_ascii_case(&dims) || name.eq_ignore_ascii_case(&format!("{dims}cm"))
    }
}

impl FromStr for PhotoSize {
    type Err = PhotoError;

    /// Parse `"Label - WxH cm"` or the unnamed `" - WxHcm"` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PhotoError::InvalidPhotoSize(s.to_string());
        let caps = size_pattern().captures(s).ok_or_else(invalid)?;

        let number = |key: &str| -> Result<f64, PhotoError> {
            caps[key].replace(',', ".").parse::<f64>().map_err(|_| invalid())
        };
        let size = PhotoSize::new(number("w")?, number("h")?).map_err(|_| invalid())?;
        Ok(size.with_label(&caps["label"]))
    }
}

impl fmt::Display for PhotoSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} - {}x{} cm", label, self.width_cm, self.height_cm),
            None => write!(f, " - {}x{}cm", self.width_cm, self.height_cm),
        }
    }
}

/// Ordered list of selectable photo sizes.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoSizeCatalog {
    entries: Vec<PhotoSize>,
}

impl Default for PhotoSizeCatalog {
    fn default() -> Self {
        Self {
            entries: DEFAULT_CATALOG
                .iter()
                .filter_map(|entry| entry.parse().ok())
                .collect(),
        }
    }
}

impl PhotoSizeCatalog {
    /// Parse every entry; the first malformed one is reported.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<Self, PhotoError> {
        let entries = entries
            .iter()
            .map(|entry| entry.as_ref().parse())
            .collect::<Result<Vec<PhotoSize>, _>>()?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PhotoSize] {
        &self.entries
    }

    /// Look up an entry by name, falling back to parsing `name` as a size.
    pub fn resolve(&self, name: &str) -> Result<PhotoSize, PhotoError> {
        if let Some(size) = self.entries.iter().find(|size| size.matches(name)) {
            return Ok(size.clone());
        }
        name.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_size() {
        let size: PhotoSize = "Pasaporte - 3.5x4.5 cm".parse().unwrap();
        assert_eq!(size.label.as_deref(), Some("Pasaporte"));
        assert_eq!((size.width_cm, size.height_cm), (3.5, 4.5));
        assert_eq!((size.width_mm(), size.height_mm()), (35.0, 45.0));
    }

    #[test]
    fn test_parse_unnamed_size() {
        let size: PhotoSize = " - 2.5x3cm".parse().unwrap();
        assert_eq!(size.label, None);
        assert_eq!((size.width_cm, size.height_cm), (2.5, 3.0));
        assert_eq!(size.to_string(), " - 2.5x3cm");
    }

    #[test]
    fn test_parse_failure_is_recoverable() {
        for bad in ["", "Carnet", "Carnet - 3 cm", "Carnet - 0x4 cm", "- axb cm"] {
            assert!(
                matches!(bad.parse::<PhotoSize>(), Err(PhotoError::InvalidPhotoSize(_))),
                "'{}' should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_default_catalog_parses_completely() {
        let catalog = PhotoSizeCatalog::default();
        assert_eq!(catalog.entries().len(), DEFAULT_CATALOG.len());
    }

    #[test]
    fn test_catalog_resolve() {
        let catalog = PhotoSizeCatalog::default();
        assert_eq!(catalog.resolve("carnet").unwrap().width_cm, 3.0);
        assert_eq!(catalog.resolve("4x4").unwrap().height_cm, 4.0);
        assert_eq!(catalog.resolve("Visa - 5x5 cm").unwrap().label.as_deref(), Some("Visa"));
        // Not in the catalog but well-formed
        assert_eq!(catalog.resolve("Custom - 2x2 cm").unwrap().width_cm, 2.0);
        assert!(catalog.resolve("unknown").is_err());
    }
}
