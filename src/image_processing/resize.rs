use fast_image_resize::{images::Image, PixelType, ResizeOptions, Resizer};
use image::{ImageBuffer, Rgb, RgbImage};
use std::num::NonZeroU32;

use crate::error::PhotoError;

/// Rectangle inside a source image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Copy a region out of `img`. The region must lie inside the image.
pub fn crop_image(img: &RgbImage, region: CropRegion) -> Result<RgbImage, PhotoError> {
    let (img_width, img_height) = img.dimensions();
    let CropRegion {
        x,
        y,
        width,
        height,
    } = region;

    if width == 0 || height == 0 {
        return Err(PhotoError::ZeroDimensions);
    }
    if x + width > img_width || y + height > img_height {
        return Err(PhotoError::ResizeError(format!(
            "crop ({},{},{}x{}) exceeds {}x{} image",
            x, y, width, height, img_width, img_height
        )));
    }

    Ok(ImageBuffer::from_fn(width, height, |out_x, out_y| {
        *img.get_pixel(x + out_x, y + out_y)
    }))
}

/// Resize to exact dimensions with fast_image_resize's default convolution filter.
pub fn resize_exact(img: &RgbImage, width: u32, height: u32) -> Result<RgbImage, PhotoError> {
    let (src_width, src_height) = img.dimensions();

    if src_width == width && src_height == height {
        return Ok(img.clone());
    }

    let non_zero = |v: u32, what: &str| {
        NonZeroU32::new(v).ok_or_else(|| PhotoError::ResizeError(format!("{what} is zero")))
    };
    let src_width_nz = non_zero(src_width, "source width")?;
    let src_height_nz = non_zero(src_height, "source height")?;
    let dst_width_nz = non_zero(width, "target width")?;
    let dst_height_nz = non_zero(height, "target height")?;

    let src_image = Image::from_vec_u8(
        src_width_nz.get(),
        src_height_nz.get(),
        img.as_raw().clone(),
        PixelType::U8x3,
    )
    .map_err(|e| PhotoError::ResizeError(e.to_string()))?;

    let mut dst_image = Image::new(dst_width_nz.get(), dst_height_nz.get(), PixelType::U8x3);

    let mut resizer = Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, Some(&ResizeOptions::default()))
        .map_err(|e| PhotoError::ResizeError(e.to_string()))?;

    ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| PhotoError::ResizeError("resized buffer has unexpected length".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_image(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_crop_image() {
        let img = create_test_image(100, 100);
        let region = CropRegion {
            x: 10,
            y: 10,
            width: 50,
            height: 50,
        };
        let cropped = crop_image(&img, region).unwrap();

        assert_eq!(cropped.dimensions(), (50, 50));
        assert_eq!(img.get_pixel(15, 15), cropped.get_pixel(5, 5));
    }

    #[test]
    fn test_crop_bounds_validation() {
        let img = create_test_image(50, 50);
        let outside = CropRegion {
            x: 10,
            y: 10,
            width: 50,
            height: 50,
        };
        assert!(crop_image(&img, outside).is_err());

        let inside = CropRegion {
            x: 10,
            y: 10,
            width: 40,
            height: 40,
        };
        assert!(crop_image(&img, inside).is_ok());
    }

    #[test]
    fn test_resize_exact() {
        let img = create_test_image(100, 80);
        let resized = resize_exact(&img, 50, 40).unwrap();
        assert_eq!(resized.dimensions(), (50, 40));
    }

    #[test]
    fn test_resize_same_size_is_copy() {
        let img = create_test_image(30, 20);
        let resized = resize_exact(&img, 30, 20).unwrap();
        assert_eq!(resized, img);
    }

    #[test]
    fn test_resize_to_zero_fails() {
        let img = create_test_image(30, 20);
        assert!(resize_exact(&img, 0, 20).is_err());
    }
}
