//! A curve paired with its cached lookup table.

use crate::interpolation::{Extrapolation, InterpolationMode, Interpolator};
use crate::knots::{KnotEdit, KnotError, Knots};
use crate::lut::{Lut, build_lut};

/// An [`Interpolator`] plus an invert flag, with the LUT kept in sync.
///
/// Every mutator rebuilds the table, so [`lut`](Self::lut) always
/// reflects the current curve. Filters hold one of these per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneCurve {
    interpolator: Interpolator,
    inverted: bool,
    lut: Lut,
}

impl ToneCurve {
    /// Wrap an interpolator.
    #[must_use]
    pub fn new(interpolator: Interpolator) -> Self {
        let lut = build_lut(&interpolator, false);
        Self {
            interpolator,
            inverted: false,
            lut,
        }
    }

    /// Cubic identity ramp.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(Interpolator::identity())
    }

    /// The underlying curve.
    #[must_use]
    pub const fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    /// Control points of the curve.
    #[must_use]
    pub const fn knots(&self) -> &Knots {
        self.interpolator.knots()
    }

    /// Current interpolation mode.
    #[must_use]
    pub const fn mode(&self) -> InterpolationMode {
        self.interpolator.mode()
    }

    /// Whether table entries are mirrored as `255 - entry`.
    #[must_use]
    pub const fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Table for the current curve and invert flag.
    #[must_use]
    pub const fn lut(&self) -> &Lut {
        &self.lut
    }

    /// Map one channel value through the table.
    #[must_use]
    pub const fn apply(&self, value: u8) -> u8 {
        self.lut.apply(value)
    }

    fn rebuild(&mut self) {
        self.lut = build_lut(&self.interpolator, self.inverted);
    }

    /// Returns `true` if the flag changed.
    pub fn set_inverted(&mut self, inverted: bool) -> bool {
        if self.inverted == inverted {
            return false;
        }
        self.inverted = inverted;
        self.rebuild();
        true
    }

    /// Returns `true` if the mode changed.
    pub fn set_mode(&mut self, mode: InterpolationMode) -> bool {
        let changed = self.interpolator.set_mode(mode);
        if changed {
            self.rebuild();
        }
        changed
    }

    /// Returns `true` if periodicity changed.
    pub fn set_periodic(&mut self, periodic: bool) -> bool {
        let changed = self.interpolator.set_periodic(periodic);
        if changed {
            self.rebuild();
        }
        changed
    }

    /// Set how the curve extends past its end knots.
    pub fn set_extrapolation(&mut self, floor: Extrapolation, ceil: Extrapolation) {
        self.interpolator.set_extrapolation(floor, ceil);
        self.rebuild();
    }

    /// Replace every knot.
    pub fn set_knots(&mut self, knots: Knots) {
        self.interpolator.set_knots(knots);
        self.rebuild();
    }

    /// # Errors
    ///
    /// Propagates [`Knots::insert`] rejections.
    pub fn insert_knot(&mut self, x: f64, y: f64) -> Result<KnotEdit, KnotError> {
        let edit = self.interpolator.insert_knot(x, y)?;
        self.rebuild();
        Ok(edit)
    }

    /// # Errors
    ///
    /// Propagates [`Knots::remove`] rejections.
    pub fn remove_knot(&mut self, index: usize) -> Result<KnotEdit, KnotError> {
        let edit = self.interpolator.remove_knot(index)?;
        self.rebuild();
        Ok(edit)
    }

    /// # Errors
    ///
    /// Propagates [`Knots::move_to`] rejections.
    pub fn move_knot(&mut self, index: usize, x: f64, y: f64) -> Result<KnotEdit, KnotError> {
        let edit = self.interpolator.move_knot(index, x, y)?;
        self.rebuild();
        Ok(edit)
    }
}

impl Default for ToneCurve {
    fn default() -> Self {
        Self::identity()
    }
}
