//! # invoice-forge – invoice rendering with paginated PDF and PNG export
//!
//! An invoice record is rendered to markup, laid out, captured as one
//! fixed-resolution raster, and exported either as a single PNG or as a
//! multi-page PDF whose pages each show one page-height band of the raster.
//!
//! 1. **Template** – invoice record + translator → markup ([`templates`])
//! 2. **Parse** – markup → DOM tree ([`dom`])
//! 3. **Style** – class stylesheet and inline declarations ([`style`])
//! 4. **Layout** – flexbox layout with Taffy → visual tree ([`layout`])
//! 5. **Capture** – visual tree → RGBA raster with tiny-skia ([`capture`])
//! 6. **Paginate** – raster height → page placements ([`pagination`])
//! 7. **Export** – PNG pass-through or PDF assembly via printpdf
//!    ([`export`], [`render`])
//!
//! [`pipeline::InvoiceExporter`] runs the whole chain.

pub mod capture;
pub mod dom;
pub mod error;
pub mod export;
pub mod fonts;
pub mod i18n;
pub mod invoice;
pub mod layout;
pub mod pagination;
pub mod pipeline;
pub mod render;
pub mod style;
pub mod templates;

// Re-exports for convenience
pub use capture::{RasterSnapshot, ResourceStore};
pub use error::{CaptureError, ExportError};
pub use export::{ExportMode, ExportOutput, ExportRequest};
pub use i18n::{Catalog, TranslationKey, Translator};
pub use invoice::InvoiceRecord;
pub use pagination::{PageGeometry, TrailingPage};
pub use pipeline::{ExportConfig, InvoiceExporter};
pub use render::PageImageStrategy;
