//! Integration tests for the invoice export pipeline.
//!
//! These tests validate:
//! - Invoice markup renders, captures and exports end to end
//! - Page counts follow the pagination rules for tall and boundary heights
//! - Image mode always yields a single PNG
//! - Captures are deterministic and exports run independently in parallel
//! - Locale fallback and error reporting

use std::sync::Arc;

use sha2::{Digest, Sha256};

use invoice_forge::capture::{decode_data_uri, ResourceStore};
use invoice_forge::i18n::{Catalog, TranslationKey, Translator};
use invoice_forge::invoice::InvoiceRecord;
use invoice_forge::pagination::plan_pages;
use invoice_forge::pipeline::{ExportConfig, InvoiceExporter};
use invoice_forge::render::pixel_bands;
use invoice_forge::templates::{render_invoice_html, INVOICE_ELEMENT_ID};
use invoice_forge::{
    CaptureError, ExportError, ExportMode, ExportRequest, PageGeometry, PageImageStrategy,
    TrailingPage,
};

const BLUE_4X2_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAQAAAACCAYAAAB/qH1jAAAAEUlEQVR4nGNgYPj/HxWjCQAA/yIP8U55HOwAAAAASUVORK5CYII=";

// =====================================================================
// Helper
// =====================================================================

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

fn block(width: u32, height: u32) -> String {
    format!(r#"<div id="block" style="width: {width}px; height: {height}px; background-color: #336699"></div>"#)
}

fn export_block(width: u32, height: u32, config: ExportConfig) -> invoice_forge::ExportOutput {
    let request = ExportRequest::new("block", ExportMode::Document).with_scale(1.0);
    InvoiceExporter::new(ExportConfig {
        viewport_width: width as f32,
        ..config
    })
    .export_markup(&block(width, height), &request)
    .unwrap()
}

fn digest(bytes: &[u8]) -> Vec<u8> {
    Sha256::digest(bytes).to_vec()
}

/// Pixels of the blue test logo in an exported PNG.
fn logo_pixels(png: &[u8]) -> usize {
    let decoded = image::load_from_memory(png).unwrap().to_rgba8();
    decoded.pixels().filter(|p| p.0[2] > 200 && p.0[0] < 50).count()
}

fn export_logo_invoice(config: ExportConfig) -> invoice_forge::ExportOutput {
    InvoiceExporter::new(config)
        .export_invoice(&InvoiceRecord::sample(), &Translator::default(), ExportMode::Image)
        .unwrap()
}

// =====================================================================
// Invoice end to end
// =====================================================================

#[test]
fn sample_invoice_exports_to_pdf() {
    let exporter = InvoiceExporter::default();
    let out = exporter
        .export_invoice(&InvoiceRecord::sample(), &Translator::default(), ExportMode::Document)
        .unwrap();
    assert_valid_pdf(&out.bytes);
    assert_eq!(out.file_name(), "invoice.pdf");
    assert_eq!(out.mime_type(), "application/pdf");
    // Default viewport 800 px at scale 2.
    assert_eq!(out.width_px, 1600);
    let scaled = out.height_px as f64 * 210.0 / out.width_px as f64;
    assert_eq!(out.page_count, (scaled / 297.0).floor() as usize + 1);
}

#[test]
fn sample_invoice_exports_to_single_png() {
    let exporter = InvoiceExporter::default();
    let out = exporter
        .export_invoice(&InvoiceRecord::sample(), &Translator::default(), ExportMode::Image)
        .unwrap();
    assert_eq!(out.page_count, 1);
    assert_eq!(out.file_name(), "invoice.png");
    let decoded = image::load_from_memory(&out.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (out.width_px, out.height_px));
}

#[test]
fn invoice_with_inline_logo_exports() {
    let exporter = InvoiceExporter::new(ExportConfig {
        logo_src: Some(BLUE_4X2_PNG.to_string()),
        ..ExportConfig::default()
    });
    let out = exporter
        .export_invoice(&InvoiceRecord::sample(), &Translator::builtin("es"), ExportMode::Image)
        .unwrap();
    assert!(logo_pixels(&out.bytes) > 0, "logo pixels missing");
}

#[test]
fn custom_file_stem() {
    let exporter = InvoiceExporter::new(ExportConfig {
        file_stem: "KA-310565025-1920".to_string(),
        ..ExportConfig::default()
    });
    let out = exporter
        .export_invoice(&InvoiceRecord::default(), &Translator::default(), ExportMode::Image)
        .unwrap();
    assert_eq!(out.file_name(), "KA-310565025-1920.png");
}

// =====================================================================
// Pagination through the full pipeline
// =====================================================================

#[test]
fn tall_element_spans_three_pages() {
    // 1000 x 4000 px → 840 mm on A4.
    let out = export_block(1000, 4000, ExportConfig::default());
    assert_eq!((out.width_px, out.height_px), (1000, 4000));
    assert_eq!(out.page_count, 3);
    assert_valid_pdf(&out.bytes);
}

#[test]
fn short_element_is_one_page() {
    let out = export_block(1000, 1000, ExportConfig::default());
    assert_eq!(out.page_count, 1);
}

#[test]
fn exact_page_height_keeps_trailing_page_by_default() {
    // 210 x 297 px → exactly one page height.
    let out = export_block(210, 297, ExportConfig::default());
    assert_eq!(out.page_count, 2);

    let out = export_block(
        210,
        297,
        ExportConfig {
            trailing_page: TrailingPage::Omit,
            ..ExportConfig::default()
        },
    );
    assert_eq!(out.page_count, 1);
}

#[test]
fn slice_strategy_shows_the_same_band_per_page() {
    let geometry = PageGeometry::a4();
    for height in [500, 1414, 1415, 2970, 4000] {
        let shifted = export_block(1000, height, ExportConfig::default());
        let sliced = export_block(
            1000,
            height,
            ExportConfig {
                strategy: PageImageStrategy::SliceBands,
                ..ExportConfig::default()
            },
        );
        assert_eq!(shifted.page_count, sliced.page_count, "height {height}");
        assert_valid_pdf(&sliced.bytes);

        // The rows a sliced page embeds are exactly the rows the shifted
        // image exposes through that page's box.
        let plan = plan_pages(1000, height, &geometry, TrailingPage::Keep).unwrap();
        let bands = pixel_bands(&plan, 1000, height);
        assert_eq!(bands.len(), sliced.page_count, "height {height}");
        let px_per_mm = 1000.0 / plan.scaled_width;
        let to_row = |mm: f64| ((mm * px_per_mm).round().max(0.0) as u32).min(height);
        for (placement, band) in plan.placements.iter().zip(&bands) {
            let window_top = -placement.image_offset;
            assert_eq!(placement.band.y_offset, window_top);
            assert_eq!(band.top, to_row(window_top), "height {height} page {}", placement.page_index);
            assert_eq!(
                band.bottom,
                to_row(window_top + geometry.page_height()),
                "height {height} page {}",
                placement.page_index
            );
        }
    }
}

#[test]
fn image_mode_ignores_height() {
    let request = ExportRequest::new("block", ExportMode::Image).with_scale(1.0);
    let exporter = InvoiceExporter::new(ExportConfig {
        viewport_width: 300.0,
        ..ExportConfig::default()
    });
    let out = exporter.export_markup(&block(300, 5000), &request).unwrap();
    assert_eq!(out.page_count, 1);
    assert_eq!(out.height_px, 5000);
}

// =====================================================================
// Capture
// =====================================================================

#[test]
fn pixel_size_is_box_times_scale() {
    let exporter = InvoiceExporter::default();
    for scale in [1.0, 1.5, 2.0, 3.0] {
        let request = ExportRequest::new("block", ExportMode::Image).with_scale(scale);
        let snap = exporter.capture(&block(400, 300), &request).unwrap();
        assert_eq!(
            (snap.width(), snap.height()),
            ((400.0 * scale) as u32, (300.0 * scale) as u32)
        );
    }
}

#[test]
fn capture_is_deterministic() {
    let exporter = InvoiceExporter::default();
    let html = render_invoice_html(&InvoiceRecord::sample(), &Translator::default(), None);
    let request = ExportRequest::new(INVOICE_ELEMENT_ID, ExportMode::Image);
    let a = exporter.capture(&html, &request).unwrap();
    let b = exporter.capture(&html, &request).unwrap();
    assert_eq!(digest(a.pixels().as_raw()), digest(b.pixels().as_raw()));
}

#[test]
fn cross_origin_logo_requires_accommodation() {
    let url = "https://cdn.example.com/logo.png";
    let blocked = InvoiceExporter::new(ExportConfig {
        logo_src: Some(url.to_string()),
        ..ExportConfig::default()
    });
    let err = blocked
        .export_invoice(&InvoiceRecord::sample(), &Translator::default(), ExportMode::Document)
        .unwrap_err();
    assert!(matches!(err, ExportError::NoSnapshot(CaptureError::CrossOrigin { .. })));

    let mut resources = ResourceStore::new();
    resources.insert(url, decode_data_uri(BLUE_4X2_PNG).unwrap());
    let allowed = InvoiceExporter::new(ExportConfig {
        logo_src: Some(url.to_string()),
        allow_cross_origin: true,
        resources,
        ..ExportConfig::default()
    });
    assert_valid_pdf(
        &allowed
            .export_invoice(&InvoiceRecord::sample(), &Translator::default(), ExportMode::Document)
            .unwrap()
            .bytes,
    );

    let inline = export_logo_invoice(ExportConfig {
        logo_src: Some(BLUE_4X2_PNG.to_string()),
        ..ExportConfig::default()
    });
    let remote = export_logo_invoice(allowed.config().clone());
    assert!(logo_pixels(&remote.bytes) > 0, "cross-origin logo pixels missing");
    assert_eq!(logo_pixels(&remote.bytes), logo_pixels(&inline.bytes));
    assert_eq!((remote.width_px, remote.height_px), (inline.width_px, inline.height_px));
}

#[test]
fn same_origin_logo_file_is_painted() {
    let dir = std::env::temp_dir().join(format!("invoice-forge-logo-{}", std::process::id()));
    std::fs::create_dir_all(dir.join("img")).unwrap();
    std::fs::write(dir.join("img/logo.png"), decode_data_uri(BLUE_4X2_PNG).unwrap()).unwrap();

    let inline = export_logo_invoice(ExportConfig {
        logo_src: Some(BLUE_4X2_PNG.to_string()),
        ..ExportConfig::default()
    });
    let local = export_logo_invoice(ExportConfig {
        logo_src: Some("img/logo.png".to_string()),
        base_dir: Some(dir.clone()),
        ..ExportConfig::default()
    });
    let _ = std::fs::remove_dir_all(&dir);

    assert!(logo_pixels(&local.bytes) > 0, "same-origin logo pixels missing");
    assert_eq!(logo_pixels(&local.bytes), logo_pixels(&inline.bytes));
    assert_eq!((local.width_px, local.height_px), (inline.width_px, inline.height_px));
}

#[test]
fn missing_same_origin_logo_means_no_snapshot() {
    let err = InvoiceExporter::new(ExportConfig {
        logo_src: Some("no-such-logo.png".to_string()),
        base_dir: Some(std::env::temp_dir().join("invoice-forge-no-such-dir")),
        ..ExportConfig::default()
    })
    .export_invoice(&InvoiceRecord::sample(), &Translator::default(), ExportMode::Image)
    .unwrap_err();
    assert!(matches!(err, ExportError::NoSnapshot(CaptureError::ResourceUnavailable { .. })));
}

// =====================================================================
// Errors
// =====================================================================

#[test]
fn missing_element_means_no_snapshot() {
    let request = ExportRequest::new("invoice", ExportMode::Document);
    let err = InvoiceExporter::default()
        .export_markup("<div id=\"other\">x</div>", &request)
        .unwrap_err();
    assert!(matches!(err, ExportError::NoSnapshot(CaptureError::ElementNotFound(ref k)) if k == "invoice"));
}

#[test]
fn invalid_scale_means_no_snapshot() {
    let request = ExportRequest::new("block", ExportMode::Image).with_scale(0.0);
    let err = InvoiceExporter::default()
        .export_markup(&block(10, 10), &request)
        .unwrap_err();
    assert!(matches!(err, ExportError::NoSnapshot(CaptureError::InvalidScale(_))));
}

// =====================================================================
// Locale
// =====================================================================

#[test]
fn unknown_locale_renders_default_labels() {
    let t = Translator::new(Arc::new(Catalog::builtin()), "de");
    let html = render_invoice_html(&InvoiceRecord::sample(), &t, None);
    for key in TranslationKey::ALL {
        assert!(!t.t(key).is_empty());
        assert!(html.contains(t.t(key)), "missing label {key:?}");
    }
    assert!(html.contains("Sold By:"));
}

#[test]
fn locales_render_different_documents() {
    let exporter = InvoiceExporter::default();
    let invoice = InvoiceRecord::sample();
    let en = exporter
        .export_invoice(&invoice, &Translator::builtin("en"), ExportMode::Image)
        .unwrap();
    let es = exporter
        .export_invoice(&invoice, &Translator::builtin("es"), ExportMode::Image)
        .unwrap();
    assert_ne!(digest(&en.bytes), digest(&es.bytes));
}

// =====================================================================
// Concurrency
// =====================================================================

#[test]
fn concurrent_exports_are_independent() {
    let exporter = InvoiceExporter::default();
    let invoice = InvoiceRecord::sample();
    let locales = ["en", "es", "en", "es"];

    let sequential: Vec<Vec<u8>> = locales
        .iter()
        .map(|l| {
            let out = exporter
                .export_invoice(&invoice, &Translator::builtin(l), ExportMode::Image)
                .unwrap();
            digest(&out.bytes)
        })
        .collect();

    let parallel: Vec<Vec<u8>> = std::thread::scope(|s| {
        let handles: Vec<_> = locales
            .iter()
            .map(|l| {
                let exporter = &exporter;
                let invoice = &invoice;
                s.spawn(move || {
                    let out = exporter
                        .export_invoice(invoice, &Translator::builtin(l), ExportMode::Image)
                        .unwrap();
                    digest(&out.bytes)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(sequential, parallel);
}

// =====================================================================
// Saving
// =====================================================================

#[test]
fn save_writes_output_file() {
    let dir = std::env::temp_dir().join(format!("invoice-forge-it-{}", std::process::id()));
    let out = export_block(100, 100, ExportConfig::default());
    let path = dir.join(out.file_name());
    out.save(&path).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), out.bytes);
    let _ = std::fs::remove_dir_all(&dir);
}
