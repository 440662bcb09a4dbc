//! Integration tests: writing and reading image files.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use image::Rgba;
use tonestack_io::ImageFileCodec;
use tonestack_pipeline::{CodecError, Image, ImageCodec};

fn translucent() -> Image {
    Image::from_fn(8, 6, |x, y| Rgba([(x * 30) as u8, (y * 40) as u8, 90, (x * 20 + 50) as u8]))
}

#[test]
fn lossless_formats_keep_every_channel() {
    let dir = tempfile::tempdir().unwrap();
    let codec = ImageFileCodec::new();
    for name in ["out.png", "out.webp"] {
        let path = dir.path().join(name);
        codec.save(&translucent(), &path, None).unwrap();
        assert_eq!(codec.load(&path).unwrap(), translucent(), "{name}");
    }
}

#[test]
fn bmp_keeps_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bmp");
    let codec = ImageFileCodec::new();
    codec.save(&translucent(), &path, None).unwrap();
    assert_eq!(codec.load(&path).unwrap().dimensions(), (8, 6));
}

#[test]
fn jpeg_drops_alpha() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.jpg");
    let codec = ImageFileCodec::new();
    codec.save(&translucent(), &path, None).unwrap();
    let loaded = codec.load(&path).unwrap();
    assert_eq!(loaded.dimensions(), (8, 6));
    assert!(loaded.pixels().all(|p| p.0[3] == 255));
}

#[test]
fn hint_picks_format_for_odd_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.dat");
    let codec = ImageFileCodec::new();
    codec.save(&translucent(), &path, Some("PNG (*.png)")).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[1..4], b"PNG");
    assert_eq!(codec.load(&path).unwrap(), translucent());
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ImageFileCodec::new().load(&dir.path().join("missing.png"));
    assert!(matches!(result, Err(CodecError::Io { .. })));
}

#[test]
fn garbage_is_a_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noise.png");
    std::fs::write(&path, b"definitely not an image").unwrap();
    let result = ImageFileCodec::new().load(&path);
    assert!(matches!(result, Err(CodecError::Image(_))));
}
