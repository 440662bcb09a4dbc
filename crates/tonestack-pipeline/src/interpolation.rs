//! Curve evaluation over a [`Knots`] store.
//!
//! An [`Interpolator`] owns its knots and evaluates `f(x)` by one of
//! three schemes:
//!
//! - [`InterpolationMode::NearestNeighbor`]: step function holding the
//!   value of the knot at or before `x`.
//! - [`InterpolationMode::Linear`]: piecewise straight segments.
//! - [`InterpolationMode::Cubic`]: C2 cubic spline. A natural spline
//!   when the knots are open, a periodic spline when they carry a
//!   closing knot.
//!
//! Outside the knot domain the [`Extrapolation`] policy applies, chosen
//! independently for the floor (`x < start`) and the ceiling
//! (`x > end`).
//!
//! Second derivatives for the cubic scheme are solved once per edit and
//! cached, so [`Interpolator::evaluate`] is allocation-free.

use serde::{Deserialize, Serialize};

use crate::knots::{Knot, KnotEdit, KnotError, Knots};

/// Interpolation scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterpolationMode {
    /// Step function: value of the knot at or before `x`.
    NearestNeighbor,
    /// Piecewise linear.
    Linear,
    /// Cubic spline with continuous first and second derivatives.
    #[default]
    Cubic,
}

impl InterpolationMode {
    /// All modes, in parameter-file order.
    pub const ALL: [Self; 3] = [Self::NearestNeighbor, Self::Linear, Self::Cubic];

    /// Name used in filter parameter files (`flat`, `linear`, `smooth`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NearestNeighbor => "flat",
            Self::Linear => "linear",
            Self::Cubic => "smooth",
        }
    }

    /// Parse a parameter-file name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl std::fmt::Display for InterpolationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// End condition of the cubic scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Boundary {
    /// Zero second derivative at both ends.
    #[default]
    Natural,
    /// Value and first two derivatives match across the closing knot.
    Periodic,
}

/// Behaviour outside the knot domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Extrapolation {
    /// Hold a constant: `value`, or the nearest end knot's `y` if `None`.
    Clamp {
        /// Explicit constant, if any.
        value: Option<f64>,
    },
    /// Wrap `x` into the domain modulo its width.
    Repeat,
}

impl Extrapolation {
    /// Hold the nearest end knot's value.
    pub const CLAMP: Self = Self::Clamp { value: None };
}

impl Default for Extrapolation {
    fn default() -> Self {
        Self::CLAMP
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Spline {
    NearestNeighbor,
    Linear,
    Cubic {
        boundary: Boundary,
        /// One second derivative per knot in [`Knots::all`].
        second_derivatives: Vec<f64>,
    },
}

impl Spline {
    fn build(mode: InterpolationMode, knots: &Knots) -> Self {
        match mode {
            InterpolationMode::NearestNeighbor => Self::NearestNeighbor,
            InterpolationMode::Linear => Self::Linear,
            InterpolationMode::Cubic => {
                let boundary = if knots.is_periodic() {
                    Boundary::Periodic
                } else {
                    Boundary::Natural
                };
                let second_derivatives = match boundary {
                    Boundary::Natural => natural_second_derivatives(knots.all()),
                    Boundary::Periodic => periodic_second_derivatives(knots.all()),
                };
                Self::Cubic {
                    boundary,
                    second_derivatives,
                }
            }
        }
    }

    const fn mode(&self) -> InterpolationMode {
        match self {
            Self::NearestNeighbor => InterpolationMode::NearestNeighbor,
            Self::Linear => InterpolationMode::Linear,
            Self::Cubic { .. } => InterpolationMode::Cubic,
        }
    }
}

/// A curve: knots plus the scheme that evaluates between them.
///
/// Cloning produces an independent deep copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolator {
    knots: Knots,
    spline: Spline,
    floor: Extrapolation,
    ceil: Extrapolation,
}

impl Interpolator {
    /// Build an interpolator over `knots`.
    ///
    /// Periodic knots select the periodic boundary and repeat
    /// extrapolation on both sides; open knots select the natural
    /// boundary and clamp.
    #[must_use]
    pub fn new(mode: InterpolationMode, knots: Knots) -> Self {
        let extrapolation = default_extrapolation(knots.is_periodic());
        let spline = Spline::build(mode, &knots);
        Self {
            knots,
            spline,
            floor: extrapolation,
            ceil: extrapolation,
        }
    }

    /// Cubic identity ramp.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(InterpolationMode::Cubic, Knots::identity())
    }

    /// The knot store.
    #[must_use]
    pub const fn knots(&self) -> &Knots {
        &self.knots
    }

    /// Active scheme.
    #[must_use]
    pub const fn mode(&self) -> InterpolationMode {
        self.spline.mode()
    }

    /// Cubic end condition, `None` for the non-cubic schemes.
    #[must_use]
    pub const fn boundary(&self) -> Option<Boundary> {
        match &self.spline {
            Spline::Cubic { boundary, .. } => Some(*boundary),
            _ => None,
        }
    }

    /// Policy for `x` below the domain.
    #[must_use]
    pub const fn floor_extrapolation(&self) -> Extrapolation {
        self.floor
    }

    /// Policy for `x` above the domain.
    #[must_use]
    pub const fn ceil_extrapolation(&self) -> Extrapolation {
        self.ceil
    }

    /// Whether the knots carry a closing knot.
    #[must_use]
    pub const fn is_periodic(&self) -> bool {
        self.knots.is_periodic()
    }

    /// Switch scheme, keeping knots and extrapolation. Returns `true` if
    /// the mode changed.
    pub fn set_mode(&mut self, mode: InterpolationMode) -> bool {
        if self.mode() == mode {
            return false;
        }
        self.spline = Spline::build(mode, &self.knots);
        true
    }

    /// Set both extrapolation policies.
    pub const fn set_extrapolation(&mut self, floor: Extrapolation, ceil: Extrapolation) {
        self.floor = floor;
        self.ceil = ceil;
    }

    /// Toggle periodicity. Enabling adds the closing knot and switches to
    /// the periodic boundary with repeat extrapolation; disabling reverts
    /// to the natural boundary with clamp. Returns `true` if it changed.
    pub fn set_periodic(&mut self, periodic: bool) -> bool {
        if !self.knots.set_periodic(periodic) {
            return false;
        }
        let extrapolation = default_extrapolation(periodic);
        self.floor = extrapolation;
        self.ceil = extrapolation;
        self.rebuild();
        true
    }

    /// Replace the knots. Periodicity follows the current setting.
    pub fn set_knots(&mut self, mut knots: Knots) {
        knots.set_periodic(self.knots.is_periodic());
        self.knots = knots;
        self.rebuild();
    }

    /// Insert a knot; see [`Knots::insert`].
    ///
    /// # Errors
    ///
    /// Propagates the knot store's rejection; the curve is unchanged.
    pub fn insert_knot(&mut self, x: f64, y: f64) -> Result<KnotEdit, KnotError> {
        let edit = self.knots.insert(x, y)?;
        self.rebuild();
        Ok(edit)
    }

    /// Remove a knot; see [`Knots::remove`].
    ///
    /// # Errors
    ///
    /// Propagates the knot store's rejection; the curve is unchanged.
    pub fn remove_knot(&mut self, index: usize) -> Result<KnotEdit, KnotError> {
        let edit = self.knots.remove(index)?;
        self.rebuild();
        Ok(edit)
    }

    /// Move a knot; see [`Knots::move_to`].
    ///
    /// # Errors
    ///
    /// Propagates the knot store's rejection; the curve is unchanged.
    pub fn move_knot(&mut self, index: usize, x: f64, y: f64) -> Result<KnotEdit, KnotError> {
        let edit = self.knots.move_to(index, x, y)?;
        self.rebuild();
        Ok(edit)
    }

    fn rebuild(&mut self) {
        self.spline = Spline::build(self.mode(), &self.knots);
    }

    /// Evaluate the curve at `x`.
    #[must_use]
    pub fn evaluate(&self, x: f64) -> f64 {
        let points = self.knots.all();
        let (start, end) = self.knots.domain();
        if x < start {
            return self.extrapolate(self.floor, x, points[0]);
        }
        if x > end {
            return self.extrapolate(self.ceil, x, points[points.len() - 1]);
        }
        self.interpolate(x)
    }

    fn extrapolate(&self, policy: Extrapolation, x: f64, nearest: Knot) -> f64 {
        match policy {
            Extrapolation::Clamp { value } => value.unwrap_or(nearest.y),
            Extrapolation::Repeat => {
                let (start, end) = self.knots.domain();
                self.interpolate(start + (x - start).rem_euclid(end - start))
            }
        }
    }

    fn interpolate(&self, x: f64) -> f64 {
        let points = self.knots.all();
        let at_or_before = points.partition_point(|k| k.x <= x).saturating_sub(1);
        if let Spline::NearestNeighbor = self.spline {
            return points[at_or_before].y;
        }
        let i = at_or_before.min(points.len() - 2);
        let (k0, k1) = (points[i], points[i + 1]);
        let h = k1.x - k0.x;
        match &self.spline {
            Spline::NearestNeighbor => k0.y,
            Spline::Linear => k0.y + (x - k0.x) / h * (k1.y - k0.y),
            Spline::Cubic {
                second_derivatives: m,
                ..
            } => {
                let a = (k1.x - x) / h;
                let b = (x - k0.x) / h;
                a.mul_add(k0.y, b * k1.y)
                    + (a.powi(3) - a).mul_add(m[i], (b.powi(3) - b) * m[i + 1]) * h * h / 6.0
            }
        }
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::identity()
    }
}

const fn default_extrapolation(periodic: bool) -> Extrapolation {
    if periodic {
        Extrapolation::Repeat
    } else {
        Extrapolation::CLAMP
    }
}

fn slopes(points: &[Knot]) -> (Vec<f64>, Vec<f64>) {
    points
        .windows(2)
        .map(|w| {
            let h = w[1].x - w[0].x;
            (h, (w[1].y - w[0].y) / h)
        })
        .unzip()
}

/// Second derivatives with `M[0] = M[n] = 0`.
fn natural_second_derivatives(points: &[Knot]) -> Vec<f64> {
    let n = points.len();
    let mut m = vec![0.0; n];
    if n < 3 {
        return m;
    }
    let (h, d) = slopes(points);
    let interior = n - 2;
    let mut sub = Vec::with_capacity(interior);
    let mut diag = Vec::with_capacity(interior);
    let mut sup = Vec::with_capacity(interior);
    let mut rhs = Vec::with_capacity(interior);
    for i in 1..n - 1 {
        sub.push(h[i - 1]);
        diag.push(2.0 * (h[i - 1] + h[i]));
        sup.push(h[i]);
        rhs.push(6.0 * (d[i] - d[i - 1]));
    }
    let solved = solve_tridiagonal(&sub, &diag, &sup, &rhs);
    m[1..n - 1].copy_from_slice(&solved);
    m
}

/// Second derivatives with `M[n] = M[0]`, treating the last knot as the
/// closing knot of one period.
fn periodic_second_derivatives(points: &[Knot]) -> Vec<f64> {
    let n = points.len();
    let segments = n - 1;
    let mut m = vec![0.0; n];
    if segments < 2 {
        return m;
    }
    let (h, d) = slopes(points);
    let mut sub = vec![0.0; segments];
    let mut diag = vec![0.0; segments];
    let mut sup = vec![0.0; segments];
    let mut rhs = vec![0.0; segments];
    for i in 0..segments {
        let prev = (i + segments - 1) % segments;
        sub[i] = h[prev];
        diag[i] = 2.0 * (h[prev] + h[i]);
        sup[i] = h[i];
        rhs[i] = 6.0 * (d[i] - d[prev]);
    }
    let solved = if segments == 2 {
        // Both off-diagonal wraps land on the same entry.
        let off01 = sup[0] + sub[0];
        let off10 = sub[1] + sup[1];
        let det = diag[0].mul_add(diag[1], -(off01 * off10));
        vec![
            rhs[0].mul_add(diag[1], -(off01 * rhs[1])) / det,
            diag[0].mul_add(rhs[1], -(off10 * rhs[0])) / det,
        ]
    } else {
        solve_cyclic(&sub, &diag, &sup, &rhs)
    };
    m[..segments].copy_from_slice(&solved);
    m[segments] = m[0];
    m
}

/// Thomas algorithm. `sub[0]` and `sup[last]` are ignored.
fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    let mut gamma = vec![0.0; n];
    let mut x = vec![0.0; n];
    let mut beta = diag[0];
    x[0] = rhs[0] / beta;
    for j in 1..n {
        gamma[j] = sup[j - 1] / beta;
        beta = sub[j].mul_add(-gamma[j], diag[j]);
        x[j] = sub[j].mul_add(-x[j - 1], rhs[j]) / beta;
    }
    for j in (0..n - 1).rev() {
        x[j] -= gamma[j + 1] * x[j + 1];
    }
    x
}

/// Cyclic tridiagonal system via Sherman-Morrison.
///
/// `sub[0]` couples row 0 to the last column and `sup[last]` couples the
/// last row to column 0. Requires at least three unknowns.
fn solve_cyclic(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    let alpha = sup[n - 1];
    let beta = sub[0];
    let gamma = -diag[0];
    let mut modified = diag.to_vec();
    modified[0] = diag[0] - gamma;
    modified[n - 1] = diag[n - 1] - alpha * beta / gamma;
    let mut x = solve_tridiagonal(sub, &modified, sup, rhs);
    let mut u = vec![0.0; n];
    u[0] = gamma;
    u[n - 1] = alpha;
    let z = solve_tridiagonal(sub, &modified, sup, &u);
    let fact = (x[0] + beta * x[n - 1] / gamma) / (1.0 + z[0] + beta * z[n - 1] / gamma);
    for (xi, zi) in x.iter_mut().zip(&z) {
        *xi -= fact * zi;
    }
    x
}
