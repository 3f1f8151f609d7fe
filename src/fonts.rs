//! Font loading, text measurement and glyph access using `ttf-parser`.
//!
//! Without any TTF loaded the manager falls back to Helvetica-like synthetic
//! metrics: every glyph advances by half the font size (a little more for
//! bold). Layout stays deterministic either way; loading a real face only
//! changes the advances and lets the capturer draw true glyph outlines.

use std::collections::HashMap;

/// Family name used for the synthetic fallback metrics.
pub const DEFAULT_FAMILY: &str = "Helvetica";

/// A loaded font face with its vertical metrics in font units.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes; empty for the synthetic fallback.
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
}

impl FontData {
    fn synthetic() -> Self {
        Self {
            bytes: Vec::new(),
            units_per_em: 1000.0,
            ascender: 750.0,
            descender: -250.0,
        }
    }

    /// Parse the face; `None` for synthetic metrics.
    pub fn face(&self) -> Option<ttf_parser::Face<'_>> {
        if self.bytes.is_empty() {
            return None;
        }
        ttf_parser::Face::parse(&self.bytes, 0).ok()
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: String,
    pub bold: bool,
    pub italic: bool,
}

impl FontKey {
    pub fn new(family: &str, bold: bool, italic: bool) -> Self {
        Self {
            family: family.to_string(),
            bold,
            italic,
        }
    }
}

/// Font registry shared read-only by layout and capture.
#[derive(Clone)]
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
    family: String,
    fallback: FontData,
}

impl FontManager {
    /// Manager with synthetic metrics only.
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            family: DEFAULT_FAMILY.to_string(),
            fallback: FontData::synthetic(),
        }
    }

    /// Load a TTF/OTF face. The first face loaded becomes the document
    /// family used for all text.
    pub fn load_font(
        &mut self,
        family: &str,
        bold: bool,
        italic: bool,
        bytes: Vec<u8>,
    ) -> Result<(), String> {
        let face = ttf_parser::Face::parse(&bytes, 0)
            .map_err(|e| format!("Failed to parse font: {e}"))?;
        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            bytes,
        };
        if self.fonts.is_empty() {
            self.family = family.to_string();
        }
        log::debug!("loaded font {family} (bold={bold}, italic={italic})");
        self.fonts.insert(FontKey::new(family, bold, italic), data);
        Ok(())
    }

    /// The family every text run is set in.
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Face for a weight/style: exact match, then the regular face of the
    /// document family, then synthetic metrics.
    pub fn get(&self, bold: bool, italic: bool) -> &FontData {
        self.fonts
            .get(&FontKey::new(&self.family, bold, italic))
            .or_else(|| self.fonts.get(&FontKey::new(&self.family, false, false)))
            .unwrap_or(&self.fallback)
    }

    pub fn has_real_fonts(&self) -> bool {
        !self.fonts.is_empty()
    }

    /// Width of `text` in px at `font_size`.
    pub fn measure_text_width(&self, text: &str, font_size: f32, bold: bool, italic: bool) -> f32 {
        let data = self.get(bold, italic);
        let Some(face) = data.face() else {
            let avg = if bold { 0.55 } else { 0.5 };
            return text.chars().count() as f32 * font_size * avg;
        };
        let scale = font_size / data.units_per_em;
        text.chars()
            .map(|ch| {
                face.glyph_index(ch)
                    .and_then(|gid| face.glyph_hor_advance(gid))
                    .map(|adv| adv as f32 * scale)
                    .unwrap_or(font_size * 0.5)
            })
            .sum()
    }

    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }

    /// Ascender in px, i.e. the baseline offset from the top of a line box.
    pub fn ascender_px(&self, font_size: f32, bold: bool, italic: bool) -> f32 {
        let data = self.get(bold, italic);
        data.ascender * font_size / data.units_per_em
    }
}

impl Default for FontManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Word-wrap text to `max_width` px. Explicit `\n` always breaks; a single
/// word wider than `max_width` is kept on its own line.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    bold: bool,
    italic: bool,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{current} {word}");
            if max_width > 0.0
                && fonts.measure_text_width(&candidate, font_size, bold, italic) > max_width
            {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            } else {
                current = candidate;
            }
        }
        lines.push(current);
    }
    lines
}
