use anyhow::{Context, Result};
use exif::{In, Reader, Tag, Value};
use image::{imageops, RgbImage};
use std::path::Path;
use tracing::debug;

/// EXIF orientation tag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ExifOrientation {
    #[strum(serialize = "undefined")]
    Undefined = 0,
    #[strum(serialize = "normal")]
    TopLeft = 1,
    #[strum(serialize = "mirrored")]
    TopRight = 2,
    #[strum(serialize = "rotated 180°")]
    BottomRight = 3,
    #[strum(serialize = "flipped vertically")]
    BottomLeft = 4,
    #[strum(serialize = "rotated 90° CCW, mirrored")]
    LeftTop = 5,
    #[strum(serialize = "rotated 90° CW")]
    RightTop = 6,
    #[strum(serialize = "rotated 90° CW, mirrored")]
    RightBottom = 7,
    #[strum(serialize = "rotated 90° CCW")]
    LeftBottom = 8,
}

impl From<u32> for ExifOrientation {
    fn from(value: u32) -> Self {
        match value {
            1 => ExifOrientation::TopLeft,
            2 => ExifOrientation::TopRight,
            3 => ExifOrientation::BottomRight,
            4 => ExifOrientation::BottomLeft,
            5 => ExifOrientation::LeftTop,
            6 => ExifOrientation::RightTop,
            7 => ExifOrientation::RightBottom,
            8 => ExifOrientation::LeftBottom,
            _ => ExifOrientation::Undefined,
        }
    }
}

impl ExifOrientation {
    /// Width and height swap once the rotation is applied.
    pub fn swaps_dimensions(&self) -> bool {
        matches!(
            self,
            ExifOrientation::LeftTop
                | ExifOrientation::RightTop
                | ExifOrientation::RightBottom
                | ExifOrientation::LeftBottom
        )
    }
}

/// Read the orientation tag; files without EXIF report `Undefined`.
pub fn read_exif_orientation(image_path: &Path) -> Result<ExifOrientation> {
    let file = std::fs::File::open(image_path).with_context(|| {
        format!(
            "Failed to open image for EXIF reading: {}",
            image_path.display()
        )
    })?;

    let mut buf_reader = std::io::BufReader::new(file);
    let exif = match Reader::new().read_from_container(&mut buf_reader) {
        Ok(exif) => exif,
        Err(_) => return Ok(ExifOrientation::Undefined),
    };

    let orientation = exif
        .get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|field| match &field.value {
            Value::Short(values) => values.first().map(|&v| ExifOrientation::from(v as u32)),
            _ => None,
        })
        .unwrap_or(ExifOrientation::Undefined);
    Ok(orientation)
}

/// Undo the camera orientation so the image displays upright.
pub fn apply_rotation(img: &RgbImage, orientation: ExifOrientation) -> RgbImage {
    match orientation {
        ExifOrientation::Undefined | ExifOrientation::TopLeft => img.clone(),
        ExifOrientation::TopRight => imageops::flip_horizontal(img),
        ExifOrientation::BottomRight => imageops::rotate180(img),
        ExifOrientation::BottomLeft => imageops::flip_vertical(img),
        ExifOrientation::LeftTop => imageops::flip_horizontal(&imageops::rotate270(img)),
        ExifOrientation::RightTop => imageops::rotate90(img),
        ExifOrientation::RightBottom => imageops::flip_horizontal(&imageops::rotate90(img)),
        ExifOrientation::LeftBottom => imageops::rotate270(img),
    }
}

/// Decode a photo from disk as RGB, upright according to its EXIF orientation.
pub fn load_oriented(image_path: &Path) -> Result<RgbImage> {
    let img = image::open(image_path)
        .with_context(|| format!("Failed to open image: {}", image_path.display()))?
        .to_rgb8();

    let orientation = read_exif_orientation(image_path).unwrap_or(ExifOrientation::Undefined);
    debug!(
        path = %image_path.display(),
        %orientation,
        "loaded {}x{}",
        img.width(),
        img.height()
    );
    Ok(apply_rotation(&img, orientation))
}
