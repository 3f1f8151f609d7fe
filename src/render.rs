//! PDF assembly – places a paginated raster snapshot onto printpdf pages
//! (v0.8 ops-based API).
//!
//! Each page carries exactly one image placement. With
//! [`PageImageStrategy::ShiftFullImage`] every page references one shared
//! XObject holding the full snapshot, shifted up by the page's offset and
//! clipped by the page box. With [`PageImageStrategy::SliceBands`] every page
//! embeds its own pre-cropped pixel band placed at the page top.

use ::image::imageops;
use printpdf::*;

use crate::capture::{encode_png, RasterSnapshot};
use crate::error::ExportError;
use crate::pagination::{PagePlacement, PagePlan};

/// PDF points per millimetre.
pub const PT_PER_MM: f64 = 72.0 / 25.4;

/// How a page shows its band of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageImageStrategy {
    /// One shared full-height image, shifted per page.
    #[default]
    ShiftFullImage,
    /// One cropped band image per page.
    SliceBands,
}

/// Pixel rows `[top, bottom)` of the snapshot visible on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBand {
    pub top: u32,
    pub bottom: u32,
}

impl PixelBand {
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Convert each page's band from document units to snapshot pixel rows.
///
/// Rows are rounded at band edges, so consecutive bands share their
/// boundaries and together cover every row exactly once.
pub fn pixel_bands(plan: &PagePlan, raster_width: u32, raster_height: u32) -> Vec<PixelBand> {
    let px_per_unit = raster_width as f64 / plan.scaled_width;
    let to_row = |units: f64| ((units * px_per_unit).round().max(0.0) as u32).min(raster_height);
    plan.placements
        .iter()
        .map(|p| PixelBand {
            top: to_row(p.band.y_offset),
            bottom: to_row(p.band.y_offset + p.band.height),
        })
        .collect()
}

/// Transform placing `px_w × px_h` pixels so they span `width_mm × height_mm`
/// with their top edge `top_mm` below the page top.
///
/// PDF origin is bottom-left; at dpi 72 printpdf maps 1 px to 1 pt, so the
/// scale factors are simply target points over source pixels.
fn image_transform(
    page_height_mm: f64,
    top_mm: f64,
    width_mm: f64,
    height_mm: f64,
    px_w: u32,
    px_h: u32,
) -> XObjectTransform {
    let bottom_pt = (page_height_mm - top_mm - height_mm) * PT_PER_MM;
    XObjectTransform {
        translate_x: Some(Pt(0.0)),
        translate_y: Some(Pt(bottom_pt as f32)),
        dpi: Some(72.0),
        scale_x: Some((width_mm * PT_PER_MM / px_w as f64) as f32),
        scale_y: Some((height_mm * PT_PER_MM / px_h as f64) as f32),
        rotate: None,
    }
}

fn register_png(
    doc: &mut PdfDocument,
    png: &[u8],
    warnings: &mut Vec<PdfWarnMsg>,
) -> Result<XObjectId, ExportError> {
    let raw = RawImage::decode_from_bytes(png, warnings)
        .map_err(|e| ExportError::Assembly(format!("image embedding failed: {e}")))?;
    Ok(doc.add_image(&raw))
}

fn shifted_page_ops(
    plan: &PagePlan,
    placement: &PagePlacement,
    xobj: &XObjectId,
    px_w: u32,
    px_h: u32,
) -> Vec<Op> {
    let g = plan.geometry;
    vec![Op::UseXobject {
        id: xobj.clone(),
        transform: image_transform(
            g.page_height(),
            placement.image_offset,
            plan.scaled_width,
            plan.scaled_height,
            px_w,
            px_h,
        ),
    }]
}

/// Assemble the PDF for `snapshot` following `plan`.
pub fn render_document(
    snapshot: &RasterSnapshot,
    plan: &PagePlan,
    title: &str,
    strategy: PageImageStrategy,
) -> Result<Vec<u8>, ExportError> {
    let g = plan.geometry;
    let page_w = Mm(g.page_width() as f32);
    let page_h = Mm(g.page_height() as f32);
    let (px_w, px_h) = (snapshot.width(), snapshot.height());

    let mut doc = PdfDocument::new(title);
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let mut pages = Vec::with_capacity(plan.page_count());

    match strategy {
        PageImageStrategy::ShiftFullImage => {
            let png = snapshot
                .encode_png()
                .map_err(|e| ExportError::Encode(e.to_string()))?;
            let xobj = register_png(&mut doc, &png, &mut warnings)?;
            for placement in &plan.placements {
                let ops = shifted_page_ops(plan, placement, &xobj, px_w, px_h);
                pages.push(PdfPage::new(page_w, page_h, ops));
            }
        }
        PageImageStrategy::SliceBands => {
            let bands = pixel_bands(plan, px_w, px_h);
            let units_per_px = plan.scaled_width / px_w as f64;
            for band in bands {
                let mut ops = Vec::new();
                if band.height() > 0 {
                    let crop = imageops::crop_imm(snapshot.pixels(), 0, band.top, px_w, band.height())
                        .to_image();
                    let png = encode_png(&crop).map_err(|e| ExportError::Encode(e.to_string()))?;
                    let xobj = register_png(&mut doc, &png, &mut warnings)?;
                    ops.push(Op::UseXobject {
                        id: xobj,
                        transform: image_transform(
                            g.page_height(),
                            0.0,
                            plan.scaled_width,
                            band.height() as f64 * units_per_px,
                            px_w,
                            band.height(),
                        ),
                    });
                }
                pages.push(PdfPage::new(page_w, page_h, ops));
            }
        }
    }

    for w in &warnings {
        log::warn!("pdf image warning: {w:?}");
    }

    doc.with_pages(pages);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut Vec::new());
    log::debug!(
        "assembled {} page(s) ({:?}), {} bytes",
        plan.page_count(),
        strategy,
        bytes.len()
    );
    Ok(bytes)
}
