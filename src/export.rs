//! Export – turns one raster snapshot into the caller's requested output.
//!
//! Image mode passes the snapshot through as a single PNG. Document mode
//! plans the pages and assembles a PDF. Either way the result is an
//! [`ExportOutput`] the caller may inspect or [`save`](ExportOutput::save).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::capture::RasterSnapshot;
use crate::error::ExportError;
use crate::pagination::{plan_pages, PageGeometry, TrailingPage};
use crate::render::{render_document, PageImageStrategy};

/// Default output file stem.
pub const DEFAULT_FILE_STEM: &str = "invoice";

/// Output kind selected per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// Paginated PDF.
    #[default]
    Document,
    /// Single flat PNG.
    Image,
}

impl ExportMode {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportMode::Document => "pdf",
            ExportMode::Image => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportMode::Document => "application/pdf",
            ExportMode::Image => "image/png",
        }
    }
}

impl FromStr for ExportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "document" | "pdf" => Ok(ExportMode::Document),
            "image" | "png" => Ok(ExportMode::Image),
            other => Err(format!("unknown export mode `{other}` (expected pdf or png)")),
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportMode::Document => "document",
            ExportMode::Image => "image",
        })
    }
}

/// One export request: which element, which output, at which scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub element_key: String,
    pub mode: ExportMode,
    pub scale: f32,
}

impl ExportRequest {
    pub fn new(element_key: impl Into<String>, mode: ExportMode) -> Self {
        Self {
            element_key: element_key.into(),
            mode,
            scale: 2.0,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }
}

/// Page layout settings for document mode.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DocumentSettings {
    pub geometry: PageGeometry,
    pub trailing: TrailingPage,
    pub strategy: PageImageStrategy,
}

/// Encoded export result.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub mode: ExportMode,
    pub bytes: Vec<u8>,
    /// Number of PDF pages; always 1 in image mode.
    pub page_count: usize,
    /// Snapshot size in device pixels.
    pub width_px: u32,
    pub height_px: u32,
    file_stem: String,
}

impl ExportOutput {
    /// `<stem>.pdf` or `<stem>.png`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.file_stem, self.mode.extension())
    }

    pub fn mime_type(&self) -> &'static str {
        self.mode.mime_type()
    }

    pub fn with_file_stem(mut self, stem: impl Into<String>) -> Self {
        self.file_stem = stem.into();
        self
    }

    /// Write the output to `path`.
    ///
    /// Bytes go to a hidden sibling file first which is then renamed over
    /// `path`; on failure the temporary file is removed and `path` is left
    /// untouched.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let path = path.as_ref();
        let write_err = |source| ExportError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        let tmp = temp_sibling(path);
        if let Err(e) = fs::write(&tmp, &self.bytes).and_then(|_| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e));
        }
        log::info!("saved {} ({} bytes) to '{}'", self.mode, self.bytes.len(), path.display());
        Ok(())
    }
}

/// Distinguishes temp files of concurrent saves within one process.
static SAVE_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_sibling(path: &Path) -> PathBuf {
    let seq = SAVE_SEQ.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_FILE_STEM.to_string());
    path.with_file_name(format!(".{name}.{}.{seq}.partial", std::process::id()))
}

/// Encode `snapshot` in the requested mode.
pub fn export_snapshot(
    snapshot: &RasterSnapshot,
    mode: ExportMode,
    settings: &DocumentSettings,
    title: &str,
) -> Result<ExportOutput, ExportError> {
    let (width_px, height_px) = (snapshot.width(), snapshot.height());
    let (bytes, page_count) = match mode {
        ExportMode::Image => {
            let png = snapshot
                .encode_png()
                .map_err(|e| ExportError::Encode(e.to_string()))?;
            (png, 1)
        }
        ExportMode::Document => {
            let plan = plan_pages(width_px, height_px, &settings.geometry, settings.trailing)?;
            let pdf = render_document(snapshot, &plan, title, settings.strategy)?;
            (pdf, plan.page_count())
        }
    };
    log::info!("exported {width_px}x{height_px} px snapshot as {mode} ({page_count} page(s), {} bytes)", bytes.len());
    Ok(ExportOutput {
        mode,
        bytes,
        page_count,
        width_px,
        height_px,
        file_stem: DEFAULT_FILE_STEM.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn snapshot(w: u32, h: u32) -> RasterSnapshot {
        RasterSnapshot::from_rgba(RgbaImage::from_pixel(w, h, image::Rgba([255, 255, 255, 255])), 2.0)
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("pdf".parse::<ExportMode>(), Ok(ExportMode::Document));
        assert_eq!("Document".parse::<ExportMode>(), Ok(ExportMode::Document));
        assert_eq!("png".parse::<ExportMode>(), Ok(ExportMode::Image));
        assert!("tiff".parse::<ExportMode>().is_err());
    }

    #[test]
    fn image_mode_is_one_png_regardless_of_height() {
        let out = export_snapshot(&snapshot(100, 3000), ExportMode::Image, &DocumentSettings::default(), "t")
            .unwrap();
        assert_eq!(out.page_count, 1);
        assert_eq!(&out.bytes[1..4], b"PNG");
        assert_eq!(out.file_name(), "invoice.png");
        assert_eq!(out.mime_type(), "image/png");
        assert_eq!((out.width_px, out.height_px), (100, 3000));
    }

    #[test]
    fn document_mode_paginates() {
        let out = export_snapshot(&snapshot(100, 400), ExportMode::Document, &DocumentSettings::default(), "t")
            .unwrap();
        // 400 × 210 / 100 = 840 mm → 3 pages.
        assert_eq!(out.page_count, 3);
        assert_eq!(&out.bytes[0..5], b"%PDF-");
        assert_eq!(out.file_name(), "invoice.pdf");
        assert_eq!(out.with_file_stem("INV-7").file_name(), "INV-7.pdf");
    }

    #[test]
    fn save_writes_atomically() {
        let dir = std::env::temp_dir().join(format!("invoice-forge-save-{}", std::process::id()));
        let target = dir.join("nested").join("out.png");
        let out = export_snapshot(&snapshot(4, 4), ExportMode::Image, &DocumentSettings::default(), "t")
            .unwrap();
        out.save(&target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), out.bytes);
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn temp_names_are_unique_per_save() {
        let target = Path::new("out/invoice.pdf");
        let a = temp_sibling(target);
        let b = temp_sibling(target);
        assert_ne!(a, b);
        assert_eq!(a.parent(), target.parent());
    }

    #[test]
    fn concurrent_saves_to_one_target_do_not_collide() {
        let dir = std::env::temp_dir().join(format!("invoice-forge-race-{}", std::process::id()));
        let target = dir.join("out.png");
        let outputs: Vec<ExportOutput> = (1..=8)
            .map(|w| {
                export_snapshot(&snapshot(w, 4), ExportMode::Image, &DocumentSettings::default(), "t")
                    .unwrap()
            })
            .collect();

        std::thread::scope(|s| {
            let handles: Vec<_> = outputs
                .iter()
                .map(|out| {
                    let target = &target;
                    s.spawn(move || out.save(target))
                })
                .collect();
            for h in handles {
                h.join().unwrap().unwrap();
            }
        });

        let written = fs::read(&target).unwrap();
        assert!(outputs.iter().any(|o| o.bytes == written));
        let leftovers = fs::read_dir(&dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .count();
        assert_eq!(leftovers, 0);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_into_missing_location_fails_without_output() {
        let dir = std::env::temp_dir().join(format!("invoice-forge-blocked-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        // A regular file where a directory is expected.
        let blocker = dir.join("file");
        fs::write(&blocker, b"x").unwrap();
        let out = export_snapshot(&snapshot(4, 4), ExportMode::Image, &DocumentSettings::default(), "t")
            .unwrap();
        let err = out.save(blocker.join("out.png")).unwrap_err();
        assert!(matches!(err, ExportError::Write { .. }));
        let _ = fs::remove_dir_all(&dir);
    }
}
