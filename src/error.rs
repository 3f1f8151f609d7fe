//! Error types for capture and export.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning a visual element into a raster snapshot.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// No element with the requested lookup key exists in the markup.
    #[error("element `{0}` not found")]
    ElementNotFound(String),

    /// The element laid out to a zero-area box.
    #[error("element `{0}` has an empty rendered box")]
    EmptyElement(String),

    /// Scale factors must be finite and strictly positive.
    #[error("invalid capture scale {0}")]
    InvalidScale(f32),

    /// The raster would exceed the largest supported surface.
    #[error("raster of {width}x{height} px exceeds the {max} px limit")]
    TooLarge { width: u32, height: u32, max: u32 },

    /// A cross-origin image was embedded without the accommodation enabled.
    #[error("cross-origin image `{src}` blocked; enable cross-origin loading to embed it")]
    CrossOrigin { src: String },

    /// An embedded resource could not be read or decoded.
    #[error("image `{src}` could not be loaded: {reason}")]
    ResourceUnavailable { src: String, reason: String },

    /// Layout computation failed.
    #[error("layout failed: {0}")]
    Layout(String),
}

/// Errors raised while assembling or writing export output.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The capture step produced no snapshot.
    #[error("no snapshot available: {0}")]
    NoSnapshot(#[from] CaptureError),

    /// Page dimensions must be finite and strictly positive.
    #[error("invalid page geometry {width}x{height}")]
    InvalidGeometry { width: f64, height: f64 },

    /// The snapshot could not be encoded as PNG.
    #[error("image encoding failed: {0}")]
    Encode(String),

    /// The paginated document could not be assembled.
    #[error("document assembly failed: {0}")]
    Assembly(String),

    /// The output could not be written to its destination.
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_failure_converts_into_missing_snapshot() {
        let err: ExportError = CaptureError::ElementNotFound("invoice".into()).into();
        assert!(matches!(err, ExportError::NoSnapshot(_)));
        assert_eq!(
            err.to_string(),
            "no snapshot available: element `invoice` not found"
        );
    }
}
