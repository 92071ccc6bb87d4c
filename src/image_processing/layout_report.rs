use prettytable::{format, Cell, Row, Table};

use super::layout::{compute_layout, PrintLayout, SheetSpec};
use super::photo_size::PhotoSizeCatalog;

/// Slot rectangles of a layout, one row per copy.
pub fn layout_table(layout: &PrintLayout) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);

    table.add_row(Row::new(vec![
        Cell::new("#"),
        Cell::new("X (mm)"),
        Cell::new("Y (mm)"),
        Cell::new("W x H (mm)"),
        Cell::new("X (px)"),
        Cell::new("Y (px)"),
        Cell::new("W x H (px)"),
    ]));

    for (index, slot) in layout.slots.iter().enumerate() {
        let (x, y, w, h) = slot.pixel_rect();
        table.add_row(Row::new(vec![
            Cell::new(&(index + 1).to_string()),
            Cell::new(&format!("{:.1}", slot.x_mm)),
            Cell::new(&format!("{:.1}", slot.y_mm)),
            Cell::new(&format!("{:.1} x {:.1}", slot.width_mm, slot.height_mm)),
            Cell::new(&x.to_string()),
            Cell::new(&y.to_string()),
            Cell::new(&format!("{} x {}", w, h)),
        ]));
    }

    table
}

/// Catalog entries with the number of copies each one packs onto `sheet`.
pub fn catalog_table(catalog: &PhotoSizeCatalog, sheet: &SheetSpec) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);

    table.add_row(Row::new(vec![
        Cell::new("Name"),
        Cell::new("Size (cm)"),
        Cell::new("Grid"),
        Cell::new("Copies"),
    ]));

    for size in catalog.entries() {
        let (grid, copies) = match compute_layout(sheet, size) {
            Ok(layout) => (
                format!("{} x {}", layout.columns, layout.rows),
                layout.len().to_string(),
            ),
            Err(_) => ("-".to_string(), "too large".to_string()),
        };
        table.add_row(Row::new(vec![
            Cell::new(size.label.as_deref().unwrap_or("")),
            Cell::new(&format!("{} x {}", size.width_cm, size.height_cm)),
            Cell::new(&grid),
            Cell::new(&copies),
        ]));
    }

    table
}

pub fn print_layout(layout: &PrintLayout) {
    println!(
        "\n{} x {} cm on {} x {} mm sheet: {} copies ({} columns x {} rows)\n",
        layout.photo_size.width_cm,
        layout.photo_size.height_cm,
        layout.sheet.width_mm,
        layout.sheet.height_mm,
        layout.len(),
        layout.columns,
        layout.rows
    );
    layout_table(layout).printstd();
    println!();
}

pub fn print_catalog(catalog: &PhotoSizeCatalog, sheet: &SheetSpec) {
    println!(
        "\nPhoto sizes for a {} x {} mm sheet at {} DPI\n",
        sheet.width_mm, sheet.height_mm, sheet.dpi
    );
    catalog_table(catalog, sheet).printstd();
    println!();
}
