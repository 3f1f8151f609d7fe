//! Pipeline – ties together parsing, styling, layout, capture and export
//! into single calls.
//!
//! markup → [`dom`](crate::dom) → [`style`](crate::style) →
//! [`layout`](crate::layout) → [`capture`](crate::capture) →
//! [`export`](crate::export).

use std::path::PathBuf;
use std::time::Instant;

use crate::capture::{capture_with_images, CaptureOptions, ImageSet, RasterSnapshot, ResourceStore};
use crate::dom::{find_by_id, parse_html};
use crate::error::{CaptureError, ExportError};
use crate::export::{export_snapshot, DocumentSettings, ExportMode, ExportOutput, ExportRequest, DEFAULT_FILE_STEM};
use crate::fonts::FontManager;
use crate::i18n::Translator;
use crate::invoice::InvoiceRecord;
use crate::layout::{compute_layout, LayoutNode};
use crate::pagination::{PageGeometry, TrailingPage};
use crate::render::PageImageStrategy;
use crate::style::{build_styled_tree, Color, Stylesheet};
use crate::templates::{render_invoice_html, INVOICE_ELEMENT_ID};

/// Configuration for the export pipeline.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Document title embedded in the PDF metadata (default: "Invoice").
    pub title: String,
    /// Page size in millimetres (default: A4 portrait).
    pub geometry: PageGeometry,
    /// Width in CSS px the markup is laid out at (default: 800).
    pub viewport_width: f32,
    /// Capture scale used by [`InvoiceExporter::export_invoice`] (default: 2).
    pub scale: f32,
    /// Raster background (default: white).
    pub background: Color,
    pub trailing_page: TrailingPage,
    pub strategy: PageImageStrategy,
    /// Embed cross-origin images from `resources` instead of failing.
    pub allow_cross_origin: bool,
    pub resources: ResourceStore,
    /// Directory relative image paths are read from.
    pub base_dir: Option<PathBuf>,
    /// Logo image source for the invoice header.
    pub logo_src: Option<String>,
    /// Stem of [`ExportOutput::file_name`] (default: "invoice").
    pub file_stem: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            title: "Invoice".to_string(),
            geometry: PageGeometry::a4(),
            viewport_width: 800.0,
            scale: 2.0,
            background: Color::WHITE,
            trailing_page: TrailingPage::Keep,
            strategy: PageImageStrategy::ShiftFullImage,
            allow_cross_origin: false,
            resources: ResourceStore::new(),
            base_dir: None,
            logo_src: None,
            file_stem: DEFAULT_FILE_STEM.to_string(),
        }
    }
}

impl ExportConfig {
    fn capture_options(&self, scale: f32) -> CaptureOptions {
        CaptureOptions {
            scale,
            background: self.background,
            allow_cross_origin: self.allow_cross_origin,
            resources: self.resources.clone(),
            base_dir: self.base_dir.clone(),
        }
    }

    fn document_settings(&self) -> DocumentSettings {
        DocumentSettings {
            geometry: self.geometry,
            trailing: self.trailing_page,
            strategy: self.strategy,
        }
    }
}

/// Renders markup and exports captured elements.
///
/// Immutable once built; share it by reference across threads to run
/// independent export requests concurrently.
#[derive(Clone)]
pub struct InvoiceExporter {
    config: ExportConfig,
    fonts: FontManager,
    stylesheet: Stylesheet,
}

impl InvoiceExporter {
    /// Exporter with synthetic font metrics and the invoice stylesheet.
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            fonts: FontManager::default(),
            stylesheet: Stylesheet::invoice(),
        }
    }

    pub fn with_fonts(mut self, fonts: FontManager) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn with_stylesheet(mut self, stylesheet: Stylesheet) -> Self {
        self.stylesheet = stylesheet;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Lay out `markup` and return the visual tree of the element whose id is
    /// `element_key`.
    ///
    /// The whole document is laid out so the element keeps the styles and
    /// width it inherits from its ancestors.
    pub fn render_markup(&self, markup: &str, element_key: &str) -> Result<LayoutNode, CaptureError> {
        let options = self.config.capture_options(self.config.scale);
        self.layout_element(markup, element_key, &options)
            .map(|(element, _)| element)
    }

    /// Resolve the element's images, then lay out the document with their
    /// intrinsic sizes. The same image set is later used for painting.
    fn layout_element(
        &self,
        markup: &str,
        element_key: &str,
        options: &CaptureOptions,
    ) -> Result<(LayoutNode, ImageSet), CaptureError> {
        let dom = parse_html(markup);
        let target = find_by_id(&dom, element_key)
            .ok_or_else(|| CaptureError::ElementNotFound(element_key.to_string()))?;
        let images = ImageSet::resolve(target.image_sources(), options)?;
        let styled = build_styled_tree(&dom, None, &self.stylesheet);
        let boxes = compute_layout(&styled, self.config.viewport_width, &self.fonts, &images)?;
        let element = boxes
            .iter()
            .find_map(|b| b.find(element_key))
            .cloned()
            // Present in the markup but not rendered (hidden, or inline text).
            .ok_or_else(|| CaptureError::EmptyElement(element_key.to_string()))?;
        Ok((element, images))
    }

    /// Capture the requested element of `markup` as a raster snapshot.
    pub fn capture(&self, markup: &str, request: &ExportRequest) -> Result<RasterSnapshot, CaptureError> {
        let started = Instant::now();
        let options = self.config.capture_options(request.scale);
        let (element, images) = self.layout_element(markup, &request.element_key, &options)?;
        let snapshot = capture_with_images(&element, &options, &self.fonts, &images)?;
        log::debug!(
            "captured `{}` at {}x{} px in {:?}",
            request.element_key,
            snapshot.width(),
            snapshot.height(),
            started.elapsed()
        );
        Ok(snapshot)
    }

    /// Full pipeline: markup → captured element → PDF or PNG.
    pub fn export_markup(&self, markup: &str, request: &ExportRequest) -> Result<ExportOutput, ExportError> {
        let snapshot = self.capture(markup, request)?;
        let output = export_snapshot(
            &snapshot,
            request.mode,
            &self.config.document_settings(),
            &self.config.title,
        )?;
        Ok(output.with_file_stem(self.config.file_stem.clone()))
    }

    /// Render `invoice` with the labels of `translator` and export it.
    pub fn export_invoice(
        &self,
        invoice: &InvoiceRecord,
        translator: &Translator,
        mode: ExportMode,
    ) -> Result<ExportOutput, ExportError> {
        let markup = render_invoice_html(invoice, translator, self.config.logo_src.as_deref());
        let request = ExportRequest::new(INVOICE_ELEMENT_ID, mode).with_scale(self.config.scale);
        log::debug!("exporting invoice in locale `{}` as {mode}", translator.locale());
        self.export_markup(&markup, &request)
    }
}

impl Default for InvoiceExporter {
    fn default() -> Self {
        Self::new(ExportConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::decode_data_uri;

    const BLUE_4X2_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAQAAAACCAYAAAB/qH1jAAAAEUlEQVR4nGNgYPj/HxWjCQAA/yIP8U55HOwAAAAASUVORK5CYII=";

    fn logo_markup(src: &str) -> String {
        format!(r#"<div id="d" style="width: 100px; height: 50px"><img src="{src}" /></div>"#)
    }

    /// Image box size and blue pixel count of the captured logo.
    fn render_logo(exporter: &InvoiceExporter, src: &str) -> ((f32, f32), usize) {
        let markup = logo_markup(src);
        let element = exporter.render_markup(&markup, "d").unwrap();
        let img = &element.children[0].bounds;
        let request = ExportRequest::new("d", ExportMode::Image).with_scale(1.0);
        let snap = exporter.capture(&markup, &request).unwrap();
        let blue = snap
            .pixels()
            .pixels()
            .filter(|p| p.0[2] > 200 && p.0[0] < 50)
            .count();
        ((img.width, img.height), blue)
    }

    #[test]
    fn inline_logo_takes_intrinsic_size() {
        let exporter = InvoiceExporter::default();
        assert_eq!(render_logo(&exporter, BLUE_4X2_PNG), ((4.0, 2.0), 8));
    }

    #[test]
    fn cross_origin_logo_takes_intrinsic_size() {
        let url = "https://cdn.example.com/logo.png";
        let mut resources = ResourceStore::new();
        resources.insert(url, decode_data_uri(BLUE_4X2_PNG).unwrap());
        let exporter = InvoiceExporter::new(ExportConfig {
            allow_cross_origin: true,
            resources,
            ..ExportConfig::default()
        });
        assert_eq!(render_logo(&exporter, url), ((4.0, 2.0), 8));
    }

    #[test]
    fn same_origin_logo_takes_intrinsic_size() {
        let dir = std::env::temp_dir().join(format!("invoice-forge-pipeline-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("logo.png"), decode_data_uri(BLUE_4X2_PNG).unwrap()).unwrap();
        let exporter = InvoiceExporter::new(ExportConfig {
            base_dir: Some(dir.clone()),
            ..ExportConfig::default()
        });
        let rendered = render_logo(&exporter, "logo.png");
        let _ = std::fs::remove_dir_all(&dir);
        assert_eq!(rendered, ((4.0, 2.0), 8));
    }

    #[test]
    fn blocked_logo_fails_before_layout() {
        let err = InvoiceExporter::default()
            .render_markup(&logo_markup("https://cdn.example.com/logo.png"), "d")
            .unwrap_err();
        assert!(matches!(err, CaptureError::CrossOrigin { .. }));
    }

    #[test]
    fn pipeline_basic() {
        let html = r#"<div id="doc" style="height: 100px"><h1>Hello</h1><p>World</p></div>"#;
        let request = ExportRequest::new("doc", ExportMode::Document).with_scale(1.0);
        let out = InvoiceExporter::default().export_markup(html, &request).unwrap();
        assert_eq!(out.page_count, 1);
        assert_eq!(&out.bytes[0..5], b"%PDF-");
        assert_eq!(out.width_px, 800);
    }

    #[test]
    fn nested_element_is_captured_at_its_own_size() {
        let html = r#"<div><div id="card" style="width: 300px; height: 120px"></div></div>"#;
        let request = ExportRequest::new("card", ExportMode::Image);
        let snap = InvoiceExporter::default().capture(html, &request).unwrap();
        assert_eq!((snap.width(), snap.height()), (600, 240));
    }

    #[test]
    fn hidden_element_has_no_box() {
        let html = r#"<div id="gone" style="display: none">x</div>"#;
        let err = InvoiceExporter::default()
            .render_markup(html, "gone")
            .unwrap_err();
        assert!(matches!(err, CaptureError::EmptyElement(_)));
    }

    #[test]
    fn exporter_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<InvoiceExporter>();
        assert_send_sync::<Translator>();
        assert_send_sync::<RasterSnapshot>();
    }
}
