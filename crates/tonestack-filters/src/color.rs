//! 8-bit color helpers shared by the filters.

/// An HSL triple with every component scaled to `0..=255`.
///
/// Hue maps `[0°, 360°)` onto `0..=255`, so red sits at both ends of the
/// range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsl8 {
    pub h: u8,
    pub s: u8,
    pub l: u8,
}

/// Convert an 8-bit RGB triple to [`Hsl8`].
#[must_use]
pub fn rgb_to_hsl8(r: u8, g: u8, b: u8) -> Hsl8 {
    let r = f32::from(r) / 255.0;
    let g = f32::from(g) / 255.0;
    let b = f32::from(b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let l = (max + min) / 2.0;

    // Achromatic
    if delta < 1e-6 {
        return Hsl8 {
            h: 0,
            s: 0,
            l: to_u8(l),
        };
    }

    let s = if l < 0.5 {
        delta / (max + min)
    } else {
        delta / (2.0 - max - min)
    };

    let h = if (max - r).abs() < 1e-6 {
        let mut h = (g - b) / delta;
        if g < b {
            h += 6.0;
        }
        h * 60.0
    } else if (max - g).abs() < 1e-6 {
        ((b - r) / delta + 2.0) * 60.0
    } else {
        ((r - g) / delta + 4.0) * 60.0
    };

    Hsl8 {
        h: to_u8((h % 360.0) / 360.0),
        s: to_u8(s),
        l: to_u8(l),
    }
}

/// Multiply two values as fractions of 255, rounding to nearest.
#[must_use]
pub const fn mul8(a: u8, b: u8) -> u8 {
    // Max is (255 * 255 + 127) / 255 == 255, so the cast never truncates.
    #[allow(clippy::cast_possible_truncation)]
    let product = ((a as u16 * b as u16 + 127) / 255) as u8;
    product
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(unit: f32) -> u8 {
    (unit * 255.0).round().clamp(0.0, 255.0) as u8
}
