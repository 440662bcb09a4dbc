//! The seam between the pipeline and image files.
//!
//! The pipeline never touches image files itself. Front ends load and
//! save through an [`ImageCodec`], implemented in `tonestack-io`.

use std::path::Path;

use crate::types::Image;

/// Errors from loading or saving an image file.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Neither the hint nor the file extension named a supported format.
    #[error("unsupported image format {0:?}")]
    UnsupportedFormat(String),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
}

/// Loads and saves working images.
pub trait ImageCodec {
    /// Decode a file into the working RGBA format.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the file cannot be read or decoded.
    fn load(&self, path: &Path) -> Result<Image, CodecError>;

    /// Encode `image` to `path`.
    ///
    /// `format_hint` may name a format (`"png"`) or be a file-dialog
    /// filter string (`"JPEG (*.jpg *.jpeg)"`). Without a usable hint the
    /// extension of `path` decides.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedFormat`] when no format can be
    /// determined, or another [`CodecError`] when writing fails.
    fn save(&self, image: &Image, path: &Path, format_hint: Option<&str>)
    -> Result<(), CodecError>;
}
