//! Snapshot capturer – rasterises a laid-out element into a fixed-resolution
//! RGBA bitmap with `tiny-skia`.
//!
//! The raster is `bounds × scale` device pixels. All embedded images are
//! resolved and decoded before any painting starts, so a blocked or broken
//! resource fails the capture as a whole instead of producing a partial
//! picture.

use std::collections::{BTreeSet, HashMap};
use std::io::Cursor;
use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use image::{ImageFormat, Rgba, RgbaImage};
use tiny_skia::{
    FillRule, FilterQuality, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Transform,
};

use crate::error::CaptureError;
use crate::fonts::FontManager;
use crate::layout::{LayoutNode, NodeContent, TextRun};
use crate::style::{Color, TextAlign};

/// Largest raster edge, in device pixels.
pub const MAX_RASTER_DIMENSION: u32 = 32_767;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable bitmap of a captured element.
#[derive(Debug, Clone)]
pub struct RasterSnapshot {
    pixels: RgbaImage,
    scale: f32,
}

impl RasterSnapshot {
    /// Wrap an existing RGBA buffer captured at `scale`.
    pub fn from_rgba(pixels: RgbaImage, scale: f32) -> Self {
        Self { pixels, scale }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Device pixels per CSS px.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Encode the snapshot as PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>, image::ImageError> {
        encode_png(&self.pixels)
    }
}

pub(crate) fn encode_png(pixels: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    pixels.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

// ---------------------------------------------------------------------------
// Options & resources
// ---------------------------------------------------------------------------

/// Pre-fetched resource bytes keyed by the exact `src` string.
#[derive(Debug, Clone, Default)]
pub struct ResourceStore {
    entries: HashMap<String, Vec<u8>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, src: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(src.into(), bytes);
    }

    pub fn get(&self, src: &str) -> Option<&[u8]> {
        self.entries.get(src).map(Vec::as_slice)
    }
}

/// Capture configuration.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Device pixels per CSS px.
    pub scale: f32,
    /// Colour the raster is cleared to before painting.
    pub background: Color,
    /// Allow cross-origin images; their bytes come from `resources`.
    pub allow_cross_origin: bool,
    pub resources: ResourceStore,
    /// Directory same-origin image paths are resolved against.
    pub base_dir: Option<PathBuf>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            scale: 2.0,
            background: Color::WHITE,
            allow_cross_origin: false,
            resources: ResourceStore::new(),
            base_dir: None,
        }
    }
}

enum ImageSource<'a> {
    Inline,
    SameOrigin(&'a str),
    CrossOrigin,
}

fn classify(src: &str) -> ImageSource<'_> {
    if src.starts_with("data:") {
        ImageSource::Inline
    } else if src.starts_with("http://") || src.starts_with("https://") || src.starts_with("//") {
        ImageSource::CrossOrigin
    } else {
        ImageSource::SameOrigin(src.strip_prefix("file://").unwrap_or(src))
    }
}

/// Parse a `data:<mime>;base64,<data>` URI and return the decoded bytes.
pub fn decode_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let rest = src
        .strip_prefix("data:")
        .ok_or_else(|| "not a data URI".to_string())?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| "invalid data URI: missing `,` separator".to_string())?;
    if !header.ends_with(";base64") {
        return Err("only base64-encoded data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(data.trim())
        .map_err(|e| format!("base64 decode error: {e}"))
}

/// Fetch the raw bytes for an image source according to its origin.
fn read_source(src: &str, options: &CaptureOptions) -> Result<Vec<u8>, CaptureError> {
    let unavailable = |reason: String| CaptureError::ResourceUnavailable {
        src: src.to_string(),
        reason,
    };
    match classify(src) {
        ImageSource::Inline => decode_data_uri(src).map_err(unavailable),
        ImageSource::CrossOrigin => {
            if !options.allow_cross_origin {
                return Err(CaptureError::CrossOrigin {
                    src: src.to_string(),
                });
            }
            options
                .resources
                .get(src)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| unavailable("not present in the resource store".to_string()))
        }
        ImageSource::SameOrigin(path) => {
            if let Some(bytes) = options.resources.get(src) {
                return Ok(bytes.to_vec());
            }
            let full = match &options.base_dir {
                Some(dir) => dir.join(path),
                None => PathBuf::from(path),
            };
            std::fs::read(&full).map_err(|e| unavailable(format!("{}: {e}", full.display())))
        }
    }
}

fn rgba_to_pixmap(img: &RgbaImage) -> Option<Pixmap> {
    let premultiply = |c: u8, a: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
    let data = img
        .pixels()
        .flat_map(|Rgba([r, g, b, a])| {
            [premultiply(*r, *a), premultiply(*g, *a), premultiply(*b, *a), *a]
        })
        .collect();
    Pixmap::from_vec(data, IntSize::from_wh(img.width(), img.height())?)
}

fn pixmap_to_rgba(pixmap: &Pixmap) -> RgbaImage {
    let mut out = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in out.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    out
}

/// Decoded images keyed by their `src`, resolved once per capture and
/// shared by layout (intrinsic sizes) and painting.
#[derive(Debug, Clone, Default)]
pub struct ImageSet {
    images: HashMap<String, RgbaImage>,
}

impl ImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and decode every distinct source, in sorted order so the first
    /// failure reported is stable. Empty sources are skipped.
    pub fn resolve<'s>(
        srcs: impl IntoIterator<Item = &'s str>,
        options: &CaptureOptions,
    ) -> Result<Self, CaptureError> {
        let mut set = Self::new();
        for src in srcs.into_iter().collect::<BTreeSet<_>>() {
            set.load(src, options)?;
        }
        Ok(set)
    }

    fn load(&mut self, src: &str, options: &CaptureOptions) -> Result<(), CaptureError> {
        if src.is_empty() {
            log::warn!("skipping <img> without src");
            return Ok(());
        }
        if self.images.contains_key(src) {
            return Ok(());
        }
        let bytes = read_source(src, options)?;
        let decoded = image::load_from_memory(&bytes).map_err(|e| {
            CaptureError::ResourceUnavailable {
                src: src.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.images.insert(src.to_string(), decoded.to_rgba8());
        Ok(())
    }

    /// Add an already-decoded image.
    pub fn insert(&mut self, src: impl Into<String>, image: RgbaImage) {
        self.images.insert(src.into(), image);
    }

    pub fn get(&self, src: &str) -> Option<&RgbaImage> {
        self.images.get(src)
    }

    /// Intrinsic pixel size of a resolved source.
    pub fn dimensions(&self, src: &str) -> Option<(u32, u32)> {
        self.get(src).map(RgbaImage::dimensions)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Pixmaps for every image under `root`, taken from `preloaded` where
/// possible and resolved now otherwise.
fn load_images(
    root: &LayoutNode,
    options: &CaptureOptions,
    preloaded: &ImageSet,
) -> Result<HashMap<String, Pixmap>, CaptureError> {
    let mut srcs = BTreeSet::new();
    root.walk(&mut |n| {
        if let NodeContent::Image { src } = &n.content {
            srcs.insert(src.as_str());
        }
    });

    let mut missing = ImageSet::new();
    let mut pixmaps = HashMap::new();
    for src in srcs {
        if preloaded.get(src).is_none() {
            missing.load(src, options)?;
        }
        let Some(img) = preloaded.get(src).or_else(|| missing.get(src)) else {
            continue;
        };
        let pixmap = rgba_to_pixmap(img).ok_or_else(|| CaptureError::ResourceUnavailable {
            src: src.to_string(),
            reason: "image has no pixels".to_string(),
        })?;
        pixmaps.insert(src.to_string(), pixmap);
    }
    Ok(pixmaps)
}

// ---------------------------------------------------------------------------
// Painting
// ---------------------------------------------------------------------------

fn paint_for(color: Color) -> Paint<'static> {
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    let mut paint = Paint::default();
    paint.set_color_rgba8(
        channel(color.r),
        channel(color.g),
        channel(color.b),
        channel(color.a),
    );
    paint.anti_alias = true;
    paint
}

/// Maps glyph outlines (font units, y-up) onto the raster path (px, y-down).
struct GlyphPen<'p> {
    path: &'p mut PathBuilder,
    origin_x: f32,
    baseline: f32,
    scale: f32,
}

impl GlyphPen<'_> {
    fn pt(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.baseline - y * self.scale)
    }
}

impl ttf_parser::OutlineBuilder for GlyphPen<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.pt(x, y);
        self.path.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.pt(x, y);
        self.path.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.pt(x1, y1);
        let (x, y) = self.pt(x, y);
        self.path.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.pt(x1, y1);
        let (x2, y2) = self.pt(x2, y2);
        let (x, y) = self.pt(x, y);
        self.path.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.path.close();
    }
}

struct Painter<'a> {
    pixmap: Pixmap,
    transform: Transform,
    fonts: &'a FontManager,
    images: HashMap<String, Pixmap>,
}

impl Painter<'_> {
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        if color.is_transparent() {
            return;
        }
        if let Some(rect) = Rect::from_xywh(x, y, w, h) {
            self.pixmap
                .fill_rect(rect, &paint_for(color), self.transform, None);
        }
    }

    fn paint_node(&mut self, node: &LayoutNode) {
        let b = node.bounds;
        if let Some(bg) = node.background {
            self.fill_rect(b.x, b.y, b.width, b.height, bg);
        }
        if let Some(border) = node.border {
            let w = border.width.min(b.width / 2.0).min(b.height / 2.0);
            self.fill_rect(b.x, b.y, b.width, w, border.color);
            self.fill_rect(b.x, b.y + b.height - w, b.width, w, border.color);
            self.fill_rect(b.x, b.y, w, b.height, border.color);
            self.fill_rect(b.x + b.width - w, b.y, w, b.height, border.color);
        }
        match &node.content {
            NodeContent::Text(run) => self.paint_text(node, run),
            NodeContent::Image { src } => self.paint_image(node, src),
            NodeContent::None => {}
        }
        for child in &node.children {
            self.paint_node(child);
        }
    }

    fn paint_text(&mut self, node: &LayoutNode, run: &TextRun) {
        let b = node.bounds;
        let ascender = self.fonts.ascender_px(run.font_size, run.bold, run.italic);
        let half_leading = (run.line_height - run.font_size) / 2.0;

        for (i, line) in run.lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let line_width = self
                .fonts
                .measure_text_width(line, run.font_size, run.bold, run.italic);
            let x = b.x
                + match run.align {
                    TextAlign::Left => 0.0,
                    TextAlign::Center => (b.width - line_width) / 2.0,
                    TextAlign::Right => b.width - line_width,
                };
            let baseline = b.y + i as f32 * run.line_height + half_leading + ascender;

            let mut path = PathBuilder::new();
            if self.fonts.has_real_fonts() {
                self.trace_glyphs(&mut path, line, x, baseline, run);
            } else {
                self.trace_greeked(&mut path, line, x, baseline, run);
            }
            if let Some(path) = path.finish() {
                self.pixmap.fill_path(
                    &path,
                    &paint_for(run.color),
                    FillRule::Winding,
                    self.transform,
                    None,
                );
            }

            if run.underline {
                let thickness = (run.font_size / 15.0).max(0.5);
                self.fill_rect(x, baseline + run.font_size * 0.1, line_width, thickness, run.color);
            }
        }
    }

    fn trace_glyphs(&self, path: &mut PathBuilder, line: &str, x: f32, baseline: f32, run: &TextRun) {
        let data = self.fonts.get(run.bold, run.italic);
        let Some(face) = data.face() else {
            return;
        };
        let scale = run.font_size / data.units_per_em;
        let mut pen_x = x;
        for ch in line.chars() {
            let Some(gid) = face.glyph_index(ch) else {
                log::warn!("no glyph for {ch:?}");
                pen_x += run.font_size * 0.5;
                continue;
            };
            let mut pen = GlyphPen {
                path: &mut *path,
                origin_x: pen_x,
                baseline,
                scale,
            };
            face.outline_glyph(gid, &mut pen);
            pen_x += face
                .glyph_hor_advance(gid)
                .map(|adv| adv as f32 * scale)
                .unwrap_or(run.font_size * 0.5);
        }
    }

    /// Block glyphs sized by character class, for synthetic metrics.
    fn trace_greeked(&self, path: &mut PathBuilder, line: &str, x: f32, baseline: f32, run: &TextRun) {
        let mut pen_x = x;
        for ch in line.chars() {
            let advance = self
                .fonts
                .measure_text_width(ch.encode_utf8(&mut [0; 4]), run.font_size, run.bold, run.italic);
            if !ch.is_whitespace() {
                let height = if ch.is_uppercase() || ch.is_ascii_digit() {
                    0.7
                } else if ch.is_lowercase() {
                    0.5
                } else {
                    0.4
                } * run.font_size;
                if let Some(rect) = Rect::from_xywh(pen_x, baseline - height, advance * 0.8, height) {
                    path.push_rect(rect);
                }
            }
            pen_x += advance;
        }
    }

    fn paint_image(&mut self, node: &LayoutNode, src: &str) {
        let b = node.bounds;
        let Some(img) = self.images.get(src) else {
            return;
        };
        if b.width <= 0.0 || b.height <= 0.0 {
            return;
        }
        let transform = self
            .transform
            .pre_translate(b.x, b.y)
            .pre_scale(b.width / img.width() as f32, b.height / img.height() as f32);
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        self.pixmap
            .draw_pixmap(0, 0, img.as_ref(), &paint, transform, None);
    }
}

/// Rasterise `element` and everything inside it.
///
/// The raster origin is the element's top-left corner; the pixel size is the
/// element's box size times `options.scale`, rounded to whole pixels.
pub fn capture(
    element: &LayoutNode,
    options: &CaptureOptions,
    fonts: &FontManager,
) -> Result<RasterSnapshot, CaptureError> {
    capture_with_images(element, options, fonts, &ImageSet::new())
}

/// [`capture`] reusing images already resolved for layout.
pub fn capture_with_images(
    element: &LayoutNode,
    options: &CaptureOptions,
    fonts: &FontManager,
    images: &ImageSet,
) -> Result<RasterSnapshot, CaptureError> {
    let scale = options.scale;
    if !(scale.is_finite() && scale > 0.0) {
        return Err(CaptureError::InvalidScale(scale));
    }
    let b = element.bounds;
    let width = (b.width * scale).round();
    let height = (b.height * scale).round();
    let label = || element.id.clone().unwrap_or_else(|| "<anonymous>".to_string());
    if width < 1.0 || height < 1.0 {
        return Err(CaptureError::EmptyElement(label()));
    }
    let max = MAX_RASTER_DIMENSION as f32;
    if width > max || height > max {
        return Err(CaptureError::TooLarge {
            width: width.min(u32::MAX as f32) as u32,
            height: height.min(u32::MAX as f32) as u32,
            max: MAX_RASTER_DIMENSION,
        });
    }
    let (width, height) = (width as u32, height as u32);

    let images = load_images(element, options, images)?;
    log::debug!(
        "capturing {} at {width}x{height} px ({} image(s))",
        label(),
        images.len()
    );

    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| CaptureError::EmptyElement(label()))?;
    pixmap.fill(tiny_skia::Color::TRANSPARENT);

    let mut painter = Painter {
        pixmap,
        transform: Transform::from_scale(scale, scale).pre_translate(-b.x, -b.y),
        fonts,
        images,
    };
    painter.fill_rect(b.x, b.y, b.width, b.height, options.background);
    painter.paint_node(element);

    Ok(RasterSnapshot::from_rgba(pixmap_to_rgba(&painter.pixmap), scale))
}
