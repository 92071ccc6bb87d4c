//! Off-screen sheet renderer.
//!
//! Draws the composed photo into every slot of a [`PrintLayout`], the caption
//! box with the identity text, and optional corner cut guides. The output is a
//! raster at the layout's DPI, ready to be handed to a print spooler.

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::{debug, warn};

use crate::image_processing::layout::PrintLayout;
use crate::image_processing::resize::resize_exact;
use crate::session::Caption;

/// Arm length of a corner cut guide, in sheet pixels.
pub const CUT_GUIDE_LENGTH_PX: f32 = 10.0;

const SHEET_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const GUIDE_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const CAPTION_BOX_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const CAPTION_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Default)]
pub struct RenderOptions {
    pub cut_guides: bool,
    /// Caption font; without one the caption box is drawn empty.
    pub font: Option<FontVec>,
}

/// Render `photo` into every slot of `layout` on a white sheet.
pub fn render_sheet(
    photo: &RgbImage,
    layout: &PrintLayout,
    caption: Option<&Caption>,
    options: &RenderOptions,
) -> Result<RgbImage> {
    let (sheet_width, sheet_height) = layout.sheet.pixel_size();
    let mut sheet = RgbImage::from_pixel(sheet_width, sheet_height, SHEET_COLOR);

    if options.cut_guides {
        for slot in &layout.slots {
            let (x, y, w, h) = slot.pixel_rect();
            draw_cut_guides(&mut sheet, x as f32, y as f32, w as f32, h as f32);
        }
    }

    let caption = caption.filter(|c| !c.is_empty());
    if caption.is_some() && options.font.is_none() {
        warn!("No caption font available, caption text will be omitted");
    }

    let Some(first) = layout.slots.first() else {
        return Ok(sheet);
    };
    // Every slot has the same size, so the photo is resized once.
    let (_, _, tile_width, tile_height) = first.pixel_rect();
    let tile = resize_exact(photo, tile_width, tile_height)
        .context("Failed to scale photo into slot")?;

    for slot in &layout.slots {
        let (x, y, w, h) = slot.pixel_rect();
        imageops::overlay(&mut sheet, &tile, x, y);

        if let Some(caption) = caption {
            draw_caption(&mut sheet, caption, options.font.as_ref(), x, y, w, h);
        }
    }

    debug!(
        slots = layout.slots.len(),
        "rendered {}x{} sheet", sheet_width, sheet_height
    );
    Ok(sheet)
}

/// Crosses centered on each slot corner.
fn draw_cut_guides(sheet: &mut RgbImage, x: f32, y: f32, w: f32, h: f32) {
    let len = CUT_GUIDE_LENGTH_PX;
    for (cx, cy) in [(x, y), (x + w, y), (x, y + h), (x + w, y + h)] {
        draw_line_segment_mut(sheet, (cx - len, cy), (cx + len, cy), GUIDE_COLOR);
        draw_line_segment_mut(sheet, (cx, cy - len), (cx, cy + len), GUIDE_COLOR);
    }
}

/// Black box over the bottom fifth of the slot with name, lastname and id on
/// three fixed rows.
fn draw_caption(
    sheet: &mut RgbImage,
    caption: &Caption,
    font: Option<&FontVec>,
    x: i64,
    y: i64,
    w: u32,
    h: u32,
) {
    let box_height = h as f32 / 5.0;
    let box_top = y as f32 + h as f32 - box_height;
    let rect = Rect::at(x as i32, box_top as i32).of_size(w.max(1), (box_height as u32).max(1));
    draw_filled_rect_mut(sheet, rect, CAPTION_BOX_COLOR);

    let Some(font) = font else {
        return;
    };

    let scale = PxScale::from((box_height / 3.5).max(1.0));
    let margin = box_height / 8.0;
    let line_height = (box_height - margin) / 3.0;
    let base_y = box_top + margin / 2.0;

    let rows = [&caption.name, &caption.lastname, &caption.id_number];
    for (row, text) in rows.iter().enumerate() {
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let (text_width, text_height) = text_size(scale, font, text);
        let text_x = x as f32 + (w as f32 - text_width as f32) / 2.0;
        let row_top = base_y + row as f32 * line_height;
        let text_y = row_top + (line_height - text_height as f32) / 2.0;
        draw_text_mut(
            sheet,
            CAPTION_TEXT_COLOR,
            text_x as i32,
            text_y as i32,
            scale,
            font,
            text,
        );
    }
}

/// Load a caption font.
///
/// Accepts a full path, a font filename searched in the system font
/// directories, or a family name such as "Arial". Falls back to common sans
/// fonts when the requested one cannot be found.
pub fn load_font(font_spec: &str) -> Result<FontVec> {
    let path = Path::new(font_spec);
    if path.is_absolute() {
        return load_font_from_path(path);
    }

    if is_font_filename(font_spec) {
        for dir in system_font_directories() {
            let candidate = Path::new(&expand_home(dir)).join(font_spec);
            if candidate.exists() {
                if let Ok(font) = load_font_from_path(&candidate) {
                    return Ok(font);
                }
            }
        }
    }

    for candidate in font_name_candidates(font_spec)
        .into_iter()
        .chain(FALLBACK_FONTS.iter().map(|s| s.to_string()))
    {
        let candidate = expand_home(&candidate);
        if let Ok(font) = load_font_from_path(Path::new(&candidate)) {
            debug!(font = %candidate, "caption font loaded");
            return Ok(font);
        }
    }

    Err(anyhow::anyhow!(
        "No suitable font found for '{}'. Specify a path to a .ttf/.otf file.",
        font_spec
    ))
}

const FALLBACK_FONTS: &[&str] = &[
    "/System/Library/Fonts/Helvetica.ttc",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/mnt/c/Windows/Fonts/arialbd.ttf",
];

fn load_font_from_path(path: &Path) -> Result<FontVec> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read font file: {}", path.display()))?;
    FontVec::try_from_vec(data)
        .with_context(|| format!("Failed to parse font file: {}", path.display()))
}

fn is_font_filename(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    [".ttf", ".otf", ".ttc"].iter().any(|ext| lower.ends_with(ext))
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home, rest),
        _ => path.to_string(),
    }
}

fn system_font_directories() -> &'static [&'static str] {
    &[
        "/System/Library/Fonts",
        "/System/Library/Fonts/Supplemental",
        "/Library/Fonts",
        "~/Library/Fonts",
        "/usr/share/fonts",
        "/usr/share/fonts/truetype",
        "/usr/share/fonts/TTF",
        "/usr/local/share/fonts",
        "~/.fonts",
        "~/.local/share/fonts",
        "/mnt/c/Windows/Fonts",
    ]
}

/// Likely file locations for a family name.
fn font_name_candidates(font_name: &str) -> Vec<String> {
    let normalized = font_name.to_lowercase().replace([' ', '-'], "");
    let mut paths = Vec::new();
    for ext in ["ttf", "otf"] {
        paths.push(format!("/System/Library/Fonts/Supplemental/{font_name}.{ext}"));
        paths.push(format!("/Library/Fonts/{font_name}.{ext}"));
        paths.push(format!("~/Library/Fonts/{font_name}.{ext}"));
        paths.push(format!("/usr/share/fonts/TTF/{font_name}.{ext}"));
        paths.push(format!("/usr/share/fonts/truetype/{normalized}/{normalized}.{ext}"));
        paths.push(format!("/mnt/c/Windows/Fonts/{font_name}.{ext}"));
    }
    if normalized.starts_with("arial") {
        paths.push("/System/Library/Fonts/Supplemental/Arial Bold.ttf".to_string());
        paths.push("/mnt/c/Windows/Fonts/arialbd.ttf".to_string());
        paths.push("/usr/share/fonts/truetype/msttcorefonts/Arial_Bold.ttf".to_string());
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_processing::layout::{compute_layout, SheetSpec};
    use crate::image_processing::photo_size::PhotoSize;

    fn small_sheet() -> SheetSpec {
        // 25.4 DPI makes one pixel per millimeter
        SheetSpec {
            dpi: 25.4,
            ..Default::default()
        }
    }

    fn blue_photo() -> RgbImage {
        RgbImage::from_pixel(30, 40, Rgb([0, 0, 200]))
    }

    #[test]
    fn test_render_places_photos_in_slots() {
        let layout = compute_layout(&small_sheet(), &PhotoSize::new(3.0, 4.0).unwrap()).unwrap();
        let sheet = render_sheet(&blue_photo(), &layout, None, &RenderOptions::default()).unwrap();
        assert_eq!(sheet.dimensions(), (152, 102));

        for slot in &layout.slots {
            let (x, y, w, h) = slot.pixel_rect();
            let center = sheet.get_pixel((x + w as i64 / 2) as u32, (y + h as i64 / 2) as u32);
            assert_eq!(center, &Rgb([0, 0, 200]));
        }
        // Outside the footprint the sheet stays white
        assert_eq!(sheet.get_pixel(2, 2), &SHEET_COLOR);
    }

    #[test]
    fn test_cut_guides_drawn_outside_slots() {
        let layout = compute_layout(&small_sheet(), &PhotoSize::new(3.0, 4.0).unwrap()).unwrap();
        let options = RenderOptions {
            cut_guides: true,
            font: None,
        };
        let sheet = render_sheet(&blue_photo(), &layout, None, &options).unwrap();
        let (x, y, _, _) = layout.slots[0].pixel_rect();
        // Arm left of the top-left corner, outside the photo
        assert_eq!(sheet.get_pixel((x - 5) as u32, y as u32), &GUIDE_COLOR);
        assert_eq!(sheet.get_pixel(x as u32, (y - 5) as u32), &GUIDE_COLOR);
    }

    #[test]
    fn test_caption_box_without_font() {
        let layout = compute_layout(&small_sheet(), &PhotoSize::new(6.0, 9.0).unwrap()).unwrap();
        let caption = Caption {
            name: "Ana".into(),
            lastname: "Rojas".into(),
            id_number: "1-9".into(),
        };
        let photo = RgbImage::from_pixel(60, 90, Rgb([0, 0, 200]));
        let sheet = render_sheet(&photo, &layout, Some(&caption), &RenderOptions::default()).unwrap();
        let (x, y, w, h) = layout.slots[0].pixel_rect();
        let bottom = sheet.get_pixel((x + w as i64 / 2) as u32, (y + h as i64 - 2) as u32);
        assert_eq!(bottom, &CAPTION_BOX_COLOR);
        let top = sheet.get_pixel((x + w as i64 / 2) as u32, (y + 2) as u32);
        assert_eq!(top, &Rgb([0, 0, 200]));
    }

    #[test]
    fn test_font_helpers() {
        assert!(is_font_filename("Arial.TTF"));
        assert!(!is_font_filename("Arial"));
        assert!(font_name_candidates("Arial")
            .iter()
            .any(|p| p.ends_with("arialbd.ttf")));
        assert!(load_font("/nonexistent/font.ttf").is_err());
    }
}
