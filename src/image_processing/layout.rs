//! Print sheet layout packer.
//!
//! All geometry is computed in millimeters; pixel values are derived with
//! `mm * dpi / 25.4` and kept as floats so callers choose their own rounding.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::photo_size::PhotoSize;
use crate::error::PhotoError;

pub const MM_PER_INCH: f64 = 25.4;

/// Photos with either side at or above this size are limited to two copies.
const TWO_COPY_THRESHOLD_CM: f64 = 5.0;
/// Photos at or above these sizes are limited to one copy.
const SINGLE_COPY_WIDTH_CM: f64 = 6.0;
const SINGLE_COPY_HEIGHT_CM: f64 = 9.0;

/// Physical print medium and packing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetSpec {
    pub width_mm: f64,
    pub height_mm: f64,
    /// Unprintable border kept free on every edge.
    pub safety_margin_mm: f64,
    /// Gap between neighbouring photos.
    pub inter_margin_mm: f64,
    pub dpi: f64,
    pub max_copies: u32,
}

impl Default for SheetSpec {
    fn default() -> Self {
        Self {
            width_mm: 152.0,
            height_mm: 102.0,
            safety_margin_mm: 5.0,
            inter_margin_mm: 2.0,
            dpi: 300.0,
            max_copies: 8,
        }
    }
}

impl SheetSpec {
    pub fn validate(&self) -> Result<(), PhotoError> {
        for (name, value) in [
            ("sheet width", self.width_mm),
            ("sheet height", self.height_mm),
            ("dpi", self.dpi),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(PhotoError::OutOfRange {
                    name,
                    value,
                    min: 0.0,
                    max: f64::MAX,
                });
            }
        }

        let max_safety = self.width_mm.min(self.height_mm) / 2.0;
        if !(0.0..max_safety).contains(&self.safety_margin_mm) {
            return Err(PhotoError::OutOfRange {
                name: "safety margin",
                value: self.safety_margin_mm,
                min: 0.0,
                max: max_safety,
            });
        }
        if !(self.inter_margin_mm >= 0.0 && self.inter_margin_mm.is_finite()) {
            return Err(PhotoError::OutOfRange {
                name: "inter margin",
                value: self.inter_margin_mm,
                min: 0.0,
                max: f64::MAX,
            });
        }
        if self.max_copies == 0 {
            return Err(PhotoError::OutOfRange {
                name: "max copies",
                value: 0.0,
                min: 1.0,
                max: u32::MAX as f64,
            });
        }
        Ok(())
    }

    pub fn px_per_mm(&self) -> f64 {
        self.dpi / MM_PER_INCH
    }

    pub fn mm_to_px(&self, mm: f64) -> f64 {
        mm * self.px_per_mm()
    }

    pub fn usable_width_mm(&self) -> f64 {
        self.width_mm - 2.0 * self.safety_margin_mm
    }

    pub fn usable_height_mm(&self) -> f64 {
        self.height_mm - 2.0 * self.safety_margin_mm
    }

    /// Sheet raster size at the configured DPI.
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.mm_to_px(self.width_mm).round() as u32,
            self.mm_to_px(self.height_mm).round() as u32,
        )
    }
}

/// One photo placement on the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrintLayoutSlot {
    pub x_px: f64,
    pub y_px: f64,
    pub width_px: f64,
    pub height_px: f64,
    pub x_mm: f64,
    pub y_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PrintLayoutSlot {
    /// Integer pixel rectangle `(x, y, width, height)`.
    pub fn pixel_rect(&self) -> (i64, i64, u32, u32) {
        (
            self.x_px.round() as i64,
            self.y_px.round() as i64,
            self.width_px.round().max(1.0) as u32,
            self.height_px.round().max(1.0) as u32,
        )
    }
}

/// Ordered slots for one photo size, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintLayout {
    pub photo_size: PhotoSize,
    pub sheet: SheetSpec,
    pub columns: u32,
    pub rows: u32,
    pub slots: Vec<PrintLayoutSlot>,
}

impl PrintLayout {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Largest `n` with `n * photo + (n - 1) * margin <= usable`.
fn fit_count(usable_mm: f64, photo_mm: f64, margin_mm: f64) -> u32 {
    let mut count = ((usable_mm + margin_mm) / (photo_mm + margin_mm)).floor().max(0.0) as u32;
    if count > 0 {
        let needed = count as f64 * photo_mm + (count - 1) as f64 * margin_mm;
        if needed > usable_mm {
            count -= 1;
        }
    }
    count
}

/// Size-dependent copy limits applied after the geometric fit.
fn apply_copy_rules(photo: &PhotoSize, columns: u32, rows: u32, max_copies: u32) -> (u32, u32) {
    let (mut columns, mut rows) = (columns, rows);
    let (w, h) = (photo.width_cm, photo.height_cm);

    if w >= TWO_COPY_THRESHOLD_CM || h >= TWO_COPY_THRESHOLD_CM {
        if w >= h {
            columns = columns.min(2);
            rows = rows.min(1);
        } else {
            columns = columns.min(1);
            rows = rows.min(2);
        }
    }

    if w >= SINGLE_COPY_WIDTH_CM || h >= SINGLE_COPY_HEIGHT_CM {
        columns = columns.min(1);
        rows = rows.min(1);
    }

    if u64::from(columns) * u64::from(rows) > u64::from(max_copies) {
        // Two copies along the short axis, the rest along the long one
        // (4x2 / 2x4 for the default cap of 8).
        let short = max_copies.min(2);
        let long = (max_copies / short).max(1);
        let columns_long = if columns > long {
            true
        } else if rows > long {
            false
        } else {
            columns >= rows
        };
        if columns_long {
            columns = columns.min(long);
            rows = rows.min(short);
        } else {
            columns = columns.min(short);
            rows = rows.min(long);
        }
    }

    (columns, rows)
}

/// Pack as many copies of `photo` as the rules allow, centered on the sheet.
pub fn compute_layout(sheet: &SheetSpec, photo: &PhotoSize) -> Result<PrintLayout, PhotoError> {
    sheet.validate()?;

    let photo_w = photo.width_mm();
    let photo_h = photo.height_mm();
    let margin = sheet.inter_margin_mm;

    // No axis can hold more than the cap
    let fit_columns = fit_count(sheet.usable_width_mm(), photo_w, margin).min(sheet.max_copies);
    let fit_rows = fit_count(sheet.usable_height_mm(), photo_h, margin).min(sheet.max_copies);
    let (columns, rows) = apply_copy_rules(photo, fit_columns, fit_rows, sheet.max_copies);

    debug!(
        fit_columns,
        fit_rows, columns, rows, "packing {}x{} mm photo", photo_w, photo_h
    );

    if columns == 0 || rows == 0 {
        return Err(PhotoError::PhotoTooLarge {
            width_mm: photo_w,
            height_mm: photo_h,
            sheet_width_mm: sheet.width_mm,
            sheet_height_mm: sheet.height_mm,
        });
    }

    let total_w = columns as f64 * photo_w + (columns - 1) as f64 * margin;
    let total_h = rows as f64 * photo_h + (rows - 1) as f64 * margin;
    let start_x = (sheet.width_mm - total_w) / 2.0;
    let start_y = (sheet.height_mm - total_h) / 2.0;

    let width_px = sheet.mm_to_px(photo_w);
    let height_px = sheet.mm_to_px(photo_h);

    let slots = (0..rows)
        .flat_map(|row| (0..columns).map(move |col| (row, col)))
        .map(|(row, col)| {
            let x_mm = start_x + col as f64 * (photo_w + margin);
            let y_mm = start_y + row as f64 * (photo_h + margin);
            PrintLayoutSlot {
                x_px: sheet.mm_to_px(x_mm),
                y_px: sheet.mm_to_px(y_mm),
                width_px,
                height_px,
                x_mm,
                y_mm,
                width_mm: photo_w,
                height_mm: photo_h,
            }
        })
        .collect::<Vec<_>>();

    info!(
        "Layout: {} columns x {} rows = {} photos, origin {:.1},{:.1} mm",
        columns,
        rows,
        slots.len(),
        start_x,
        start_y
    );

    Ok(PrintLayout {
        photo_size: photo.clone(),
        sheet: sheet.clone(),
        columns,
        rows,
        slots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(w: f64, h: f64) -> PhotoSize {
        PhotoSize::new(w, h).unwrap()
    }

    #[test]
    fn test_three_by_four_default_sheet() {
        let layout = compute_layout(&SheetSpec::default(), &size(3.0, 4.0)).unwrap();
        assert!(layout.columns > 1 && layout.rows > 1);
        assert_eq!((layout.columns, layout.rows), (4, 2));
        assert_eq!(layout.len(), 8);

        let expected_w = 30.0 * 300.0 / 25.4;
        let expected_h = 40.0 * 300.0 / 25.4;
        for slot in &layout.slots {
            assert!((slot.width_px - expected_w).abs() <= 1.0);
            assert!((slot.height_px - expected_h).abs() <= 1.0);
            let (_, _, w, h) = slot.pixel_rect();
            assert_eq!((w, h), (354, 472));
        }
    }

    #[test]
    fn test_footprint_centered_on_full_sheet() {
        let layout = compute_layout(&SheetSpec::default(), &size(3.0, 4.0)).unwrap();
        // 4*30 + 3*2 = 126 wide, 2*40 + 2 = 82 tall
        let first = layout.slots[0];
        assert!((first.x_mm - 13.0).abs() < 1e-9);
        assert!((first.y_mm - 10.0).abs() < 1e-9);

        let last = layout.slots[layout.len() - 1];
        assert!((last.x_mm + last.width_mm - (152.0 - 13.0)).abs() < 1e-9);
        assert!((last.y_mm + last.height_mm - (102.0 - 10.0)).abs() < 1e-9);
    }

    #[test]
    fn test_slots_are_row_major() {
        let layout = compute_layout(&SheetSpec::default(), &size(3.0, 4.0)).unwrap();
        assert!(layout.slots[0].x_mm < layout.slots[1].x_mm);
        assert_eq!(layout.slots[0].y_mm, layout.slots[3].y_mm);
        assert!(layout.slots[4].y_mm > layout.slots[3].y_mm);
        assert_eq!(layout.slots[4].x_mm, layout.slots[0].x_mm);
    }

    #[test]
    fn test_six_by_nine_single_copy() {
        let layout = compute_layout(&SheetSpec::default(), &size(6.0, 9.0)).unwrap();
        assert_eq!(layout.len(), 1);
        let slot = layout.slots[0];
        assert!((slot.x_mm - 46.0).abs() < 1e-9);
        assert!((slot.y_mm - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_five_by_five_two_copies_side_by_side() {
        let layout = compute_layout(&SheetSpec::default(), &size(5.0, 5.0)).unwrap();
        assert_eq!((layout.columns, layout.rows), (2, 1));
    }

    #[test]
    fn test_tall_photo_stacks_vertically() {
        let sheet = SheetSpec {
            width_mm: 102.0,
            height_mm: 152.0,
            ..Default::default()
        };
        let layout = compute_layout(&sheet, &size(4.0, 5.5)).unwrap();
        assert_eq!((layout.columns, layout.rows), (1, 2));
    }

    #[test]
    fn test_small_photo_capped_to_eight() {
        let layout = compute_layout(&SheetSpec::default(), &size(2.5, 3.0)).unwrap();
        // 5x2 fit, capped to 4x2
        assert_eq!((layout.columns, layout.rows), (4, 2));
    }

    #[test]
    fn test_unusual_caps_never_exceed_cap() {
        for cap in 1..=10 {
            let sheet = SheetSpec {
                max_copies: cap,
                ..Default::default()
            };
            let layout = compute_layout(&sheet, &size(2.0, 2.0)).unwrap();
            assert!(layout.len() as u32 <= cap, "cap {} produced {}", cap, layout.len());
            assert!(!layout.is_empty());
        }
    }

    #[test]
    fn test_tiny_photo_without_gap_stays_capped() {
        let sheet = SheetSpec {
            inter_margin_mm: 0.0,
            ..Default::default()
        };
        let layout = compute_layout(&sheet, &size(1e-9, 1e-9)).unwrap();
        assert_eq!((layout.columns, layout.rows), (4, 2));
        assert_eq!(layout.len(), 8);

        let sheet = SheetSpec {
            inter_margin_mm: 0.0,
            max_copies: u32::MAX,
            ..Default::default()
        };
        let (columns, rows) = apply_copy_rules(&size(1e-9, 1e-9), u32::MAX, u32::MAX, sheet.max_copies);
        assert!(u64::from(columns) * u64::from(rows) <= u64::from(u32::MAX));
    }

    #[test]
    fn test_oversize_photo_fails() {
        let result = compute_layout(&SheetSpec::default(), &size(15.0, 10.0));
        assert!(matches!(result, Err(PhotoError::PhotoTooLarge { .. })));

        // Fits the raw sheet height but not the usable area
        let result = compute_layout(&SheetSpec::default(), &size(4.0, 9.5));
        assert!(matches!(result, Err(PhotoError::PhotoTooLarge { .. })));
    }

    #[test]
    fn test_exact_fit_counts() {
        assert_eq!(fit_count(142.0, 30.0, 2.0), 4);
        assert_eq!(fit_count(92.0, 40.0, 2.0), 2);
        assert_eq!(fit_count(92.0, 92.0, 2.0), 1);
        assert_eq!(fit_count(92.0, 93.0, 2.0), 0);
    }

    #[test]
    fn test_invalid_sheet() {
        let sheet = SheetSpec {
            max_copies: 0,
            ..Default::default()
        };
        assert!(compute_layout(&sheet, &size(3.0, 4.0)).is_err());

        let sheet = SheetSpec {
            safety_margin_mm: 60.0,
            ..Default::default()
        };
        assert!(compute_layout(&sheet, &size(3.0, 4.0)).is_err());
    }
}
