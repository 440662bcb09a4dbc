//! Gaussian pre-blur for the keyer.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`], which only accepts
//! single-channel images, so RGBA input is split, blurred per channel,
//! and reassembled.

use image::{GrayImage, Luma, Rgba};
use tonestack_pipeline::Image;

/// Largest accepted blur radius, in pixels.
pub const MAX_RADIUS: f64 = 100.0;

/// Sigma for a blur of the given pixel radius.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn sigma_for_radius(radius: f64) -> f32 {
    ((radius + 0.5) / 2.45) as f32
}

/// Blur every channel of `image` independently.
///
/// Non-positive sigma returns the image unchanged; `imageproc` panics on
/// `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur_rgba(image: &Image, sigma: f32) -> Image {
    if sigma <= 0.0 || !sigma.is_finite() {
        return image.clone();
    }

    let (w, h) = image.dimensions();
    let channels: [GrayImage; 4] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).0[c]]))
    });
    let blurred: [GrayImage; 4] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));

    Image::from_fn(w, h, |x, y| {
        Rgba(std::array::from_fn(|c| blurred[c].get_pixel(x, y).0[0]))
    })
}
