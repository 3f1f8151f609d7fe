//! Pagination – plans how a tall raster is spread over fixed-size pages.
//!
//! The raster is scaled uniformly so its width fills one page width. Page 1
//! shows the image at offset 0; every following page shows the *same* full
//! image shifted up by one more page height, so exactly one page-height band
//! is visible within each page's bounds. No pixel data is touched here; the
//! plan is pure geometry in document units (millimetres).

use crate::error::ExportError;

/// A4 portrait, in millimetres.
pub const A4_WIDTH_MM: f64 = 210.0;
pub const A4_HEIGHT_MM: f64 = 297.0;

/// Page size in document units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    page_width: f64,
    page_height: f64,
}

impl PageGeometry {
    pub fn new(page_width: f64, page_height: f64) -> Result<Self, ExportError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(page_width) || !valid(page_height) {
            return Err(ExportError::InvalidGeometry {
                width: page_width,
                height: page_height,
            });
        }
        Ok(Self {
            page_width,
            page_height,
        })
    }

    pub const fn a4() -> Self {
        Self {
            page_width: A4_WIDTH_MM,
            page_height: A4_HEIGHT_MM,
        }
    }

    pub fn page_width(&self) -> f64 {
        self.page_width
    }

    pub fn page_height(&self) -> f64 {
        self.page_height
    }

    /// Document units per raster pixel when the raster fills the page width.
    pub fn scale_factor(&self, raster_width: u32) -> f64 {
        self.page_width / raster_width as f64
    }

    /// Height of the raster once scaled to the page width.
    pub fn scaled_height(&self, raster_width: u32, raster_height: u32) -> f64 {
        raster_height as f64 * self.page_width / raster_width as f64
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::a4()
    }
}

/// What to do when the content ends exactly on a page boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingPage {
    /// Keep looping while the remainder is `>= 0`; an exact multiple of the
    /// page height yields one extra, empty trailing page.
    #[default]
    Keep,
    /// Stop once the remainder reaches zero.
    Omit,
}

/// The vertical slice of the scaled image visible on one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBand {
    /// Top of the band within the scaled image.
    pub y_offset: f64,
    /// Height of image content visible on the page (0 for an empty page).
    pub height: f64,
}

/// Where the full scaled image sits on one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePlacement {
    pub page_index: usize,
    /// Vertical offset of the image's top edge from the page top (≤ 0).
    pub image_offset: f64,
    pub band: PageBand,
}

/// The ordered placements for one raster.
#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    pub geometry: PageGeometry,
    pub scaled_width: f64,
    pub scaled_height: f64,
    pub placements: Vec<PagePlacement>,
}

impl PagePlan {
    pub fn page_count(&self) -> usize {
        self.placements.len()
    }

    /// Sum of the visible band heights over all pages.
    pub fn visible_height(&self) -> f64 {
        self.placements.iter().map(|p| p.band.height).sum()
    }
}

/// Plan the pages for a raster of `raster_width × raster_height` pixels.
pub fn plan_pages(
    raster_width: u32,
    raster_height: u32,
    geometry: &PageGeometry,
    trailing: TrailingPage,
) -> Result<PagePlan, ExportError> {
    if raster_width == 0 || raster_height == 0 {
        return Err(ExportError::Assembly(format!(
            "cannot paginate an empty {raster_width}x{raster_height} raster"
        )));
    }
    let scaled_height = geometry.scaled_height(raster_width, raster_height);
    let page_height = geometry.page_height();
    let continues = |remaining: f64| match trailing {
        TrailingPage::Keep => remaining >= 0.0,
        TrailingPage::Omit => remaining > 0.0,
    };
    let place = |page_index: usize, image_offset: f64| {
        let y_offset = -image_offset;
        PagePlacement {
            page_index,
            image_offset,
            band: PageBand {
                y_offset,
                height: (scaled_height - y_offset).clamp(0.0, page_height),
            },
        }
    };

    let mut placements = vec![place(0, 0.0)];
    let mut remaining = scaled_height - page_height;
    while continues(remaining) {
        placements.push(place(placements.len(), remaining - scaled_height));
        remaining -= page_height;
    }

    log::debug!(
        "{raster_width}x{raster_height} px → {scaled_height:.2} units tall, {} page(s)",
        placements.len()
    );
    Ok(PagePlan {
        geometry: *geometry,
        scaled_width: geometry.page_width(),
        scaled_height,
        placements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(w: u32, h: u32) -> PagePlan {
        plan_pages(w, h, &PageGeometry::a4(), TrailingPage::Keep).unwrap()
    }

    #[test]
    fn tall_raster_spans_three_pages() {
        let p = plan(1000, 4000);
        assert_eq!(p.scaled_height, 840.0);
        assert_eq!(p.page_count(), 3);
        let offsets: Vec<f64> = p.placements.iter().map(|p| p.image_offset).collect();
        assert_eq!(offsets, vec![0.0, -297.0, -594.0]);
        let bands: Vec<f64> = p.placements.iter().map(|p| p.band.height).collect();
        assert_eq!(bands, vec![297.0, 297.0, 246.0]);
    }

    #[test]
    fn short_raster_is_one_page() {
        let p = plan(1000, 500);
        assert_eq!(p.page_count(), 1);
        assert_eq!(p.placements[0].band.height, p.scaled_height);
    }

    #[test]
    fn exact_page_height_emits_trailing_page() {
        // 297 × 210 / 210 = 297 units exactly.
        let p = plan(210, 297);
        assert_eq!(p.scaled_height, 297.0);
        assert_eq!(p.page_count(), 2);
        assert_eq!(p.placements[1].band.height, 0.0);
        assert_eq!(p.visible_height(), 297.0);
    }

    #[test]
    fn omit_policy_drops_empty_trailing_page() {
        let geometry = PageGeometry::a4();
        let p = plan_pages(210, 594, &geometry, TrailingPage::Omit).unwrap();
        assert_eq!(p.page_count(), 2);
        let p = plan_pages(210, 600, &geometry, TrailingPage::Omit).unwrap();
        assert_eq!(p.page_count(), 3);
    }

    #[test]
    fn page_count_matches_floor_formula() {
        for height in (1..=3000).step_by(7) {
            let p = plan(210, height);
            let expected = (p.scaled_height / A4_HEIGHT_MM).floor() as usize + 1;
            assert_eq!(p.page_count(), expected, "height {height}");
        }
    }

    #[test]
    fn bands_tile_the_image_without_gaps() {
        for height in [1, 296, 297, 298, 593, 594, 595, 2000, 2971] {
            let p = plan(210, height);
            assert!((p.visible_height() - p.scaled_height).abs() < 1e-9, "height {height}");
            let mut expected_top = 0.0;
            for placement in &p.placements {
                assert!((placement.band.y_offset - expected_top).abs() < 1e-9);
                expected_top += placement.band.height;
            }
        }
    }

    #[test]
    fn scale_factor_maps_pixels_to_units() {
        let g = PageGeometry::a4();
        assert!((g.scale_factor(1000) - 0.21).abs() < 1e-12);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        assert!(PageGeometry::new(0.0, 297.0).is_err());
        assert!(PageGeometry::new(210.0, f64::NAN).is_err());
        assert!(PageGeometry::new(210.0, 297.0).is_ok());
    }

    #[test]
    fn empty_raster_is_rejected() {
        assert!(plan_pages(0, 10, &PageGeometry::a4(), TrailingPage::Keep).is_err());
    }
}
