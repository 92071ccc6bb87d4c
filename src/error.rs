use thiserror::Error;

/// Broad class of a [`PhotoError`], used by callers to decide how to report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ErrorCategory {
    /// Missing input or selection; the caller should re-prompt.
    #[strum(serialize = "user input")]
    UserInput,
    /// The segmentation backend failed; the pipeline keeps its previous state.
    #[strum(serialize = "external service")]
    ExternalService,
    /// The selected photo size does not fit the sheet.
    #[strum(serialize = "geometry")]
    Geometry,
    /// Invalid settings or malformed data handed to the core.
    #[strum(serialize = "invalid input")]
    Invalid,
}

/// Failure reported by a segmentation backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SegmentationError {
    #[error("segmentation quota exhausted")]
    QuotaExceeded,

    #[error("segmentation rate limit exceeded")]
    RateLimited,

    #[error("segmentation backend unreachable: {0}")]
    Network(String),

    #[error("malformed segmentation response: {0}")]
    MalformedResponse(String),

    #[error("segmentation backend unavailable: {0}")]
    Unavailable(String),

    #[error("segmentation request cancelled")]
    Cancelled,
}

impl SegmentationError {
    /// Map an HTTP-style status code reported by a remote backend.
    ///
    /// Returns `None` for success codes.
    pub fn from_status(status: u16, detail: &str) -> Option<Self> {
        match status {
            200..=299 => None,
            401 | 403 => Some(SegmentationError::Unavailable(format!(
                "credentials rejected ({status})"
            ))),
            402 => Some(SegmentationError::QuotaExceeded),
            429 => Some(SegmentationError::RateLimited),
            _ => Some(SegmentationError::Network(format!("status {status}: {detail}"))),
        }
    }
}

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("no source image loaded")]
    NoImageLoaded,

    #[error("no face found in the source image")]
    NoFaceFound,

    #[error("no photo size selected")]
    NoPhotoSize,

    #[error("image has not been centered on a face yet")]
    NotCentered,

    #[error(transparent)]
    Segmentation(#[from] SegmentationError),

    #[error("photo {width_mm}x{height_mm} mm is too large for the {sheet_width_mm}x{sheet_height_mm} mm sheet")]
    PhotoTooLarge {
        width_mm: f64,
        height_mm: f64,
        sheet_width_mm: f64,
        sheet_height_mm: f64,
    },

    #[error("invalid photo size '{0}', expected 'Label - WxH cm'")]
    InvalidPhotoSize(String),

    #[error("invalid color '{0}', expected #RGB or #RRGGBB")]
    InvalidColor(String),

    #[error("{name} must be within {min}..={max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("mask is {mask_width}x{mask_height} but image is {image_width}x{image_height}")]
    MaskMismatch {
        mask_width: u32,
        mask_height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("image dimensions are zero")]
    ZeroDimensions,

    #[error("failed to resize image: {0}")]
    ResizeError(String),
}

impl PhotoError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PhotoError::NoImageLoaded
            | PhotoError::NoFaceFound
            | PhotoError::NoPhotoSize
            | PhotoError::NotCentered => ErrorCategory::UserInput,
            PhotoError::Segmentation(_) => ErrorCategory::ExternalService,
            PhotoError::PhotoTooLarge { .. } => ErrorCategory::Geometry,
            _ => ErrorCategory::Invalid,
        }
    }
}
