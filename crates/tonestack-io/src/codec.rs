//! Filesystem codec backed by the `image` crate.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat};
use log::{debug, warn};
use tonestack_pipeline::{CodecError, Image, ImageCodec};

/// Formats [`ImageFileCodec`] reads and writes.
const SUPPORTED: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Bmp,
    ImageFormat::WebP,
];

/// File-dialog filter strings for the supported formats, each accepted
/// as a save hint.
pub const FILE_FILTERS: [&str; 4] = [
    "PNG (*.png)",
    "JPEG (*.jpg *.jpeg)",
    "BMP (*.bmp)",
    "WebP (*.webp)",
];

/// Resolve a save hint to a format.
///
/// A hint is a format name or extension (`"png"`, `".jpg"`) or a
/// file-dialog filter string (`"JPEG (*.jpg *.jpeg)"`), in which case the
/// first recognised pattern inside the parentheses wins.
#[must_use]
pub fn format_from_hint(hint: &str) -> Option<ImageFormat> {
    let hint = hint.trim();
    if let (Some(open), Some(close)) = (hint.find('('), hint.rfind(')'))
        && open < close
    {
        return hint[open + 1..close]
            .split_whitespace()
            .find_map(|pattern| ImageFormat::from_extension(pattern.trim_start_matches("*.")));
    }
    ImageFormat::from_extension(hint.trim_start_matches("*.").trim_start_matches('.'))
}

/// Reads any supported format into RGBA; writes PNG, JPEG, BMP or WebP.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileCodec;

impl ImageFileCodec {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// The format `save` would use for `path` and `hint`.
    ///
    /// An unrecognised hint falls back to the extension.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedFormat`] when neither names a
    /// supported format.
    pub fn resolve_format(path: &Path, hint: Option<&str>) -> Result<ImageFormat, CodecError> {
        let from_hint = hint.and_then(|h| {
            let format = format_from_hint(h);
            if format.is_none() {
                warn!("ignoring unrecognised format hint {h:?}");
            }
            format
        });
        let format = from_hint
            .or_else(|| ImageFormat::from_path(path).ok())
            .ok_or_else(|| CodecError::UnsupportedFormat(path.display().to_string()))?;
        if SUPPORTED.contains(&format) {
            Ok(format)
        } else {
            Err(CodecError::UnsupportedFormat(format!("{format:?}")))
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CodecError {
    CodecError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl ImageCodec for ImageFileCodec {
    fn load(&self, path: &Path) -> Result<Image, CodecError> {
        let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
        let image = image::load_from_memory(&bytes)?;
        debug!(
            "loaded {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(image.to_rgba8())
    }

    fn save(&self, image: &Image, path: &Path, format_hint: Option<&str>) -> Result<(), CodecError> {
        let format = Self::resolve_format(path, format_hint)?;
        let mut bytes = Cursor::new(Vec::new());
        if format == ImageFormat::Jpeg {
            // No alpha channel in JPEG.
            DynamicImage::ImageRgba8(image.clone())
                .to_rgb8()
                .write_to(&mut bytes, format)?;
        } else {
            image.write_to(&mut bytes, format)?;
        }
        std::fs::write(path, bytes.into_inner()).map_err(|e| io_error(path, e))?;
        debug!("saved {} as {format:?}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_names_and_extensions() {
        assert_eq!(format_from_hint("png"), Some(ImageFormat::Png));
        assert_eq!(format_from_hint("JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(format_from_hint(".jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(format_from_hint("*.bmp"), Some(ImageFormat::Bmp));
        assert_eq!(format_from_hint("no such format"), None);
    }

    #[test]
    fn hint_filter_strings() {
        assert_eq!(format_from_hint("JPEG (*.jpg *.jpeg)"), Some(ImageFormat::Jpeg));
        assert_eq!(format_from_hint("Images (*.xyz *.webp)"), Some(ImageFormat::WebP));
        assert_eq!(format_from_hint("Nothing (*.xyz)"), None);
        for filter in FILE_FILTERS {
            let format = format_from_hint(filter);
            assert!(format.is_some_and(|f| SUPPORTED.contains(&f)), "{filter}");
        }
    }

    #[test]
    fn extension_decides_without_hint() {
        let format = ImageFileCodec::resolve_format(Path::new("out.webp"), None);
        assert_eq!(format.ok(), Some(ImageFormat::WebP));
    }

    #[test]
    fn hint_overrides_extension() {
        let format = ImageFileCodec::resolve_format(Path::new("out.png"), Some("BMP (*.bmp)"));
        assert_eq!(format.ok(), Some(ImageFormat::Bmp));
    }

    #[test]
    fn unrecognised_hint_falls_back_to_extension() {
        let format = ImageFileCodec::resolve_format(Path::new("out.jpg"), Some("???"));
        assert_eq!(format.ok(), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn unsupported_or_missing_format_is_rejected() {
        assert!(matches!(
            ImageFileCodec::resolve_format(Path::new("out"), None),
            Err(CodecError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            ImageFileCodec::resolve_format(Path::new("out.tiff"), None),
            Err(CodecError::UnsupportedFormat(_))
        ));
    }
}
