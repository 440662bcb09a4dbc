//! 256-entry lookup tables sampled from a curve.

use crate::interpolation::Interpolator;

/// Number of entries in a [`Lut`].
pub const LUT_SIZE: usize = 256;

/// Maps every 8-bit channel value to an output value.
#[derive(Clone, PartialEq, Eq)]
pub struct Lut([u8; LUT_SIZE]);

impl Lut {
    /// The identity table: `lut[i] == i`.
    #[must_use]
    pub fn identity() -> Self {
        let mut table = [0u8; LUT_SIZE];
        for (value, entry) in (0..=u8::MAX).zip(table.iter_mut()) {
            *entry = value;
        }
        Self(table)
    }

    /// Look up one channel value.
    #[must_use]
    pub const fn apply(&self, value: u8) -> u8 {
        self.0[value as usize]
    }

    /// The raw table.
    #[must_use]
    pub const fn as_array(&self) -> &[u8; LUT_SIZE] {
        &self.0
    }
}

impl std::ops::Index<u8> for Lut {
    type Output = u8;

    fn index(&self, value: u8) -> &u8 {
        &self.0[usize::from(value)]
    }
}

impl std::fmt::Debug for Lut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Lut").field(&&self.0[..]).finish()
    }
}

impl Default for Lut {
    fn default() -> Self {
        Self::identity()
    }
}

/// Sample `curve` at `i / 255` for every `i`, quantized to `[0, 255]`.
///
/// With `inverted` each entry becomes `255 - entry`.
#[must_use]
pub fn build_lut(curve: &Interpolator, inverted: bool) -> Lut {
    let mut table = [0u8; LUT_SIZE];
    for (i, entry) in (0..=u8::MAX).zip(table.iter_mut()) {
        let value = quantize(curve.evaluate(f64::from(i) / 255.0));
        *entry = if inverted { 255 - value } else { value };
    }
    Lut(table)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantize(y: f64) -> u8 {
    // NaN saturates to 0.
    (y * 255.0).round().clamp(0.0, 255.0) as u8
}
