use image::{ImageBuffer, Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use idphoto_sheet::render::{render_sheet, RenderOptions};
use idphoto_sheet::{
    compute_layout, AdjustmentSettings, AspectRatio, Caption, ErrorCategory, FaceBox,
    FixedFaceLocator, PhotoError, PhotoSession, PhotoSize, PhotoSizeCatalog, SegmentationError,
    SegmentationMask, Segmenter, SheetSpec,
};

/// Mask keeping a centered ellipse as subject.
struct EllipseSegmenter {
    calls: AtomicUsize,
}

impl EllipseSegmenter {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl Segmenter for EllipseSegmenter {
    fn segment(&self, image: &RgbImage) -> Result<SegmentationMask, SegmentationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (w, h) = image.dimensions();
        let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
        let alpha = (0..h)
            .flat_map(|y| {
                (0..w).map(move |x| {
                    let dx = (x as f32 - cx) / (w as f32 / 3.0);
                    let dy = (y as f32 - cy) / (h as f32 / 3.0);
                    if dx * dx + dy * dy <= 1.0 {
                        1.0
                    } else {
                        0.0
                    }
                })
            })
            .collect();
        SegmentationMask::from_alpha(w, h, alpha)
    }
}

struct FailingSegmenter(SegmentationError);

impl Segmenter for FailingSegmenter {
    fn segment(&self, _image: &RgbImage) -> Result<SegmentationMask, SegmentationError> {
        Err(self.0.clone())
    }
}

fn portrait() -> RgbImage {
    ImageBuffer::from_fn(400, 500, |x, y| {
        Rgb([(x % 200) as u8 + 30, (y % 200) as u8 + 20, 90])
    })
}

fn face() -> FaceBox {
    FaceBox {
        x: 150,
        y: 150,
        width: 100,
        height: 120,
    }
}

fn centered_session() -> PhotoSession {
    let mut session = PhotoSession::new(SheetSpec::default(), AdjustmentSettings::default());
    session.load_image(portrait()).unwrap();
    session
        .select_photo_size(&PhotoSizeCatalog::default(), "Carnet")
        .unwrap();
    session
        .center_face_for_photo_size(&FixedFaceLocator(Some(face())), (300, 400))
        .unwrap();
    session
}

#[test]
fn test_full_pipeline_to_sheet() {
    let mut session = centered_session();
    let segmenter = EllipseSegmenter::new();
    assert!(session.segment_with(&segmenter).unwrap());

    session.set_background_color(Rgb([30, 144, 255]));
    session.settings_mut().brightness = 10;
    let final_image = session.recompute().unwrap().clone();

    // Corner is background: replaced color, then brightened
    assert_eq!(final_image.get_pixel(0, 0), &Rgb([40, 154, 255]));

    let layout = session.compute_layout().unwrap().clone();
    assert_eq!(layout.len(), 8);
    assert_eq!((layout.columns, layout.rows), (4, 2));

    let sheet = render_sheet(&final_image, &layout, None, &RenderOptions::default()).unwrap();
    assert_eq!(sheet.dimensions(), SheetSpec::default().pixel_size());
}

#[test]
fn test_color_change_reuses_mask() {
    let mut session = centered_session();
    let segmenter = EllipseSegmenter::new();
    session.segment_with(&segmenter).unwrap();

    for color in [Rgb([255, 0, 0]), Rgb([0, 255, 0]), Rgb([255, 255, 255])] {
        session.set_background_color(color);
        let image = session.recompute().unwrap();
        assert_eq!(image.get_pixel(0, 0), &color);
    }
    assert_eq!(segmenter.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_backend_failure_keeps_previous_state() {
    let mut session = centered_session();
    session.segment_with(&EllipseSegmenter::new()).unwrap();
    let before = session.final_image().cloned();
    let mask_before = session.mask().cloned();

    for error in [
        SegmentationError::QuotaExceeded,
        SegmentationError::RateLimited,
        SegmentationError::Network("timeout".to_string()),
    ] {
        let err = session
            .segment_with(&FailingSegmenter(error.clone()))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ExternalService);
        assert!(matches!(err, PhotoError::Segmentation(ref e) if *e == error));
        assert_eq!(session.final_image().cloned(), before);
        assert_eq!(session.mask().cloned(), mask_before);
    }
}

#[test]
fn test_stale_segmentation_from_worker_is_discarded() {
    let mut session = centered_session();
    let segmenter = Arc::new(EllipseSegmenter::new());

    let first = session.begin_segmentation().unwrap();
    let second = session.begin_segmentation().unwrap();

    let handles: Vec<_> = [first, second]
        .into_iter()
        .map(|job| {
            let segmenter = Arc::clone(&segmenter);
            thread::spawn(move || job.run(segmenter.as_ref()))
        })
        .collect();
    let mut outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let second_outcome = outcomes.pop().unwrap();
    let first_outcome = outcomes.pop().unwrap();

    // The superseded job never installs a mask
    assert!(!session.complete_segmentation(first_outcome).unwrap());
    assert!(session.mask().is_none());
    assert!(session.complete_segmentation(second_outcome).unwrap());
    assert!(session.mask().is_some());
}

#[test]
fn test_new_image_invalidates_in_flight_segmentation() {
    let mut session = centered_session();
    let job = session.begin_segmentation().unwrap();
    session.load_image(portrait()).unwrap();

    let outcome = job.run(&EllipseSegmenter::new());
    assert!(!session.complete_segmentation(outcome).unwrap());
    assert!(session.mask().is_none());
    assert!(!session.is_centered());
}

#[test]
fn test_workflow_errors_are_user_input() {
    let mut session = PhotoSession::default();
    let err = session.begin_segmentation().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::UserInput);

    session.load_image(portrait()).unwrap();
    let err = session
        .center_face(
            &FixedFaceLocator(None),
            AspectRatio::new(3.0, 4.0).unwrap(),
            (300, 400),
        )
        .unwrap_err();
    assert!(matches!(err, PhotoError::NoFaceFound));
    assert!(session.centered().is_none());

    let err = session.compute_layout().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::UserInput);
}

#[test]
fn test_oversize_photo_is_geometry_error() {
    let err = compute_layout(
        &SheetSpec::default(),
        &PhotoSize::new(20.0, 30.0).unwrap(),
    )
    .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Geometry);
}

#[test]
fn test_catalog_sizes_pack_expected_copies() {
    let catalog = PhotoSizeCatalog::default();
    let sheet = SheetSpec::default();
    let copies: Vec<(String, usize)> = catalog
        .entries()
        .iter()
        .map(|size| {
            let layout = compute_layout(&sheet, size).unwrap();
            (size.to_string(), layout.len())
        })
        .collect();

    let lookup = |dims: (f64, f64)| {
        catalog
            .entries()
            .iter()
            .position(|s| (s.width_cm, s.height_cm) == dims)
            .map(|i| copies[i].1)
    };
    assert_eq!(lookup((3.0, 4.0)), Some(8));
    assert_eq!(lookup((5.0, 5.0)), Some(2));
    assert_eq!(lookup((6.0, 9.0)), Some(1));
}

#[test]
fn test_captioned_sheet_renders_box() {
    let mut session = centered_session();
    session.set_caption(Caption {
        name: "Ana".to_string(),
        lastname: "Rojas".to_string(),
        id_number: "12.345.678-9".to_string(),
    });
    let photo = session.recompute().unwrap().clone();
    let layout = session.compute_layout().unwrap().clone();

    let sheet = render_sheet(&photo, &layout, session.caption(), &RenderOptions::default()).unwrap();
    let (x, y, w, h) = layout.slots[0].pixel_rect();
    let inside_box = sheet.get_pixel((x + w as i64 / 2) as u32, (y + h as i64 - 3) as u32);
    assert_eq!(inside_box, &Rgb([0, 0, 0]));
}
