//! Knot store: the ordered control points a curve is built from.
//!
//! [`Knots`] keeps user-placed points sorted and unique by `x`, with a
//! minimum separation (`min_gap`) enforced on every insert and move.
//! Both coordinates live in the normalized `[0, 1]` square.
//!
//! A periodic store additionally carries a synthetic closing knot after
//! the last editable one. It mirrors the first knot's `y` and sits one
//! period to the right of it, so cubic construction can close the loop.
//! The closing knot is never returned by the editing accessors and never
//! accepted as an edit target.
//!
//! # Index stability
//!
//! Every structural edit shifts knot indices. Callers that hold an index
//! (a "selected knot" in an editor, for example) must rebase it through
//! [`KnotEdit::rebase`] after each edit.

use serde::{Deserialize, Serialize};

/// Default minimum x-separation between neighbouring knots.
pub const DEFAULT_MIN_GAP: f64 = 1.0 / 1024.0;

/// Default maximum number of editable knots.
pub const DEFAULT_MAX_KNOTS: usize = 32;

/// Fewest editable knots a store may hold.
pub const MIN_KNOTS: usize = 2;

/// A single control point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Knot {
    /// Domain position.
    pub x: f64,
    /// Curve value at `x`.
    pub y: f64,
}

impl Knot {
    /// Create a new knot.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A structural edit applied to a [`Knots`] store.
///
/// Returned by the editing operations so callers can rebase any knot
/// index they hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnotEdit {
    /// A knot was inserted at this index; later indices shifted by +1.
    Inserted(usize),
    /// The knot at this index was removed; later indices shifted by -1.
    Removed(usize),
    /// The knot at this index changed position; no index shifted.
    Moved(usize),
}

impl KnotEdit {
    /// Rebase a previously valid knot index across this edit.
    ///
    /// Returns `None` when the referenced knot no longer exists.
    #[must_use]
    pub const fn rebase(self, selected: Option<usize>) -> Option<usize> {
        match (self, selected) {
            (_, None) => None,
            (Self::Inserted(at), Some(s)) if s >= at => Some(s + 1),
            (Self::Removed(at), Some(s)) if s == at => None,
            (Self::Removed(at), Some(s)) if s > at => Some(s - 1),
            (_, Some(s)) => Some(s),
        }
    }

    /// Index of the knot this edit touched.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Inserted(i) | Self::Removed(i) | Self::Moved(i) => i,
        }
    }
}

/// Errors from constructing or editing a knot store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KnotError {
    /// A coordinate was NaN or infinite.
    #[error("knot coordinates must be finite, got ({x}, {y})")]
    NonFinite {
        /// Offending x.
        x: f64,
        /// Offending y.
        y: f64,
    },

    /// A coordinate fell outside `[0, 1]` in a knot list being adopted.
    #[error("knot ({x}, {y}) lies outside the unit square")]
    OutOfRange {
        /// Offending x.
        x: f64,
        /// Offending y.
        y: f64,
    },

    /// Knots in an adopted list were not increasing by at least `min_gap`.
    #[error("knot {index} is not at least {min_gap} to the right of its predecessor")]
    Unordered {
        /// Index of the first knot that breaks the ordering.
        index: usize,
        /// Required separation.
        min_gap: f64,
    },

    /// The neighbours leave no room for a new knot.
    #[error("no room for a knot between {low} and {high} (minimum gap {min_gap})")]
    NoRoom {
        /// Lowest admissible x for the new knot.
        low: f64,
        /// Highest admissible x for the new knot.
        high: f64,
        /// Required separation.
        min_gap: f64,
    },

    /// The store is already at its maximum knot count.
    #[error("curve already has the maximum of {max} knots")]
    TooMany {
        /// Configured maximum.
        max: usize,
    },

    /// The edit would leave fewer than [`MIN_KNOTS`] editable knots.
    #[error("curve needs at least {min} knots")]
    TooFew {
        /// Required minimum.
        min: usize,
    },

    /// The minimum separation was zero, negative or not finite.
    #[error("minimum knot gap must be finite and positive, got {min_gap}")]
    InvalidMinGap {
        /// Rejected separation.
        min_gap: f64,
    },

    /// The index does not name an editable knot.
    #[error("knot index {index} is out of range for {len} editable knots")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of editable knots.
        len: usize,
    },
}

/// Ordered, unique-by-x set of control points.
///
/// Always holds between [`MIN_KNOTS`] and `max_knots` editable knots,
/// plus the synthetic closing knot when periodic.
#[derive(Debug, Clone, PartialEq)]
pub struct Knots {
    /// Editable knots followed by the closing knot when `periodic`.
    points: Vec<Knot>,
    periodic: bool,
    min_gap: f64,
    max_knots: usize,
}

impl Knots {
    /// Adopt a knot list with the default limits.
    ///
    /// # Errors
    ///
    /// See [`with_limits`](Self::with_limits).
    pub fn new(points: Vec<Knot>) -> Result<Self, KnotError> {
        Self::with_limits(points, DEFAULT_MIN_GAP, DEFAULT_MAX_KNOTS)
    }

    /// Adopt a knot list with explicit separation and count limits.
    ///
    /// Unlike the editing operations, adoption never clamps: every knot
    /// must already be finite, inside the unit square, and at least
    /// `min_gap` to the right of its predecessor.
    ///
    /// # Errors
    ///
    /// Returns [`KnotError::InvalidMinGap`] unless `min_gap` is finite and
    /// positive, [`KnotError::TooFew`] or [`KnotError::TooMany`] for a bad
    /// count, [`KnotError::NonFinite`] or [`KnotError::OutOfRange`] for a
    /// bad coordinate, and [`KnotError::Unordered`] for a bad ordering.
    pub fn with_limits(
        points: Vec<Knot>,
        min_gap: f64,
        max_knots: usize,
    ) -> Result<Self, KnotError> {
        if !min_gap.is_finite() || min_gap <= 0.0 {
            return Err(KnotError::InvalidMinGap { min_gap });
        }
        let max_knots = max_knots.max(MIN_KNOTS);
        if points.len() < MIN_KNOTS {
            return Err(KnotError::TooFew { min: MIN_KNOTS });
        }
        if points.len() > max_knots {
            return Err(KnotError::TooMany { max: max_knots });
        }
        for (index, k) in points.iter().enumerate() {
            if !k.x.is_finite() || !k.y.is_finite() {
                return Err(KnotError::NonFinite { x: k.x, y: k.y });
            }
            if !(0.0..=1.0).contains(&k.x) || !(0.0..=1.0).contains(&k.y) {
                return Err(KnotError::OutOfRange { x: k.x, y: k.y });
            }
            if index > 0 && k.x - points[index - 1].x < min_gap {
                return Err(KnotError::Unordered { index, min_gap });
            }
        }
        Ok(Self {
            points,
            periodic: false,
            min_gap,
            max_knots,
        })
    }

    /// The two-knot identity ramp `(0, 0), (1, 1)`.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            points: vec![Knot::new(0.0, 0.0), Knot::new(1.0, 1.0)],
            periodic: false,
            min_gap: DEFAULT_MIN_GAP,
            max_knots: DEFAULT_MAX_KNOTS,
        }
    }

    /// Adopt a knot list and make it periodic in one step.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn periodic(points: Vec<Knot>) -> Result<Self, KnotError> {
        let mut knots = Self::new(points)?;
        knots.set_periodic(true);
        Ok(knots)
    }

    /// Editable knots, in increasing x order.
    #[must_use]
    pub fn as_slice(&self) -> &[Knot] {
        let editable = self.points.len() - usize::from(self.periodic);
        &self.points[..editable]
    }

    /// Every knot the interpolator sees, including the closing knot.
    #[must_use]
    pub fn all(&self) -> &[Knot] {
        &self.points
    }

    /// Number of editable knots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Always `false`: a store never holds fewer than [`MIN_KNOTS`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// The editable knot at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Knot> {
        self.as_slice().get(index).copied()
    }

    /// The synthetic closing knot, present only when periodic.
    #[must_use]
    pub fn closing(&self) -> Option<Knot> {
        if self.periodic {
            self.points.last().copied()
        } else {
            None
        }
    }

    /// Whether the store carries a closing knot.
    #[must_use]
    pub const fn is_periodic(&self) -> bool {
        self.periodic
    }

    /// Minimum x-separation enforced between neighbours.
    #[must_use]
    pub const fn min_gap(&self) -> f64 {
        self.min_gap
    }

    /// Maximum number of editable knots.
    #[must_use]
    pub const fn max_knots(&self) -> usize {
        self.max_knots
    }

    /// The `[start, end]` interval spanned by all knots.
    ///
    /// For a periodic store `end - start` is the period.
    #[must_use]
    pub fn domain(&self) -> (f64, f64) {
        let first = self.points.first().map_or(0.0, |k| k.x);
        let last = self.points.last().map_or(1.0, |k| k.x);
        (first, last)
    }

    /// Insert a knot, clamping it between its would-be neighbours.
    ///
    /// `x` is clamped into `[prev.x + min_gap, next.x - min_gap]` (the
    /// domain edges stand in for missing neighbours) and `y` into
    /// `[0, 1]`. Returns the insertion index; every knot index at or
    /// after it shifts by one.
    ///
    /// # Errors
    ///
    /// Returns [`KnotError::NonFinite`] for NaN/infinite input,
    /// [`KnotError::TooMany`] when the store is full, and
    /// [`KnotError::NoRoom`] when the neighbours are closer than
    /// `2 * min_gap`. The store is unchanged on error.
    pub fn insert(&mut self, x: f64, y: f64) -> Result<KnotEdit, KnotError> {
        check_finite(x, y)?;
        if self.len() >= self.max_knots {
            return Err(KnotError::TooMany {
                max: self.max_knots,
            });
        }
        let editable = self.as_slice();
        let index = editable.partition_point(|k| k.x <= x);
        let low = if index > 0 {
            editable[index - 1].x + self.min_gap
        } else {
            0.0
        };
        let high = if index < editable.len() {
            editable[index].x - self.min_gap
        } else {
            1.0
        };
        if low > high {
            return Err(KnotError::NoRoom {
                low,
                high,
                min_gap: self.min_gap,
            });
        }
        self.points
            .insert(index, Knot::new(x.clamp(low, high), y.clamp(0.0, 1.0)));
        self.sync_closing();
        Ok(KnotEdit::Inserted(index))
    }

    /// Remove the editable knot at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`KnotError::IndexOutOfRange`] for an index past the
    /// editable knots (the closing knot is never removable) and
    /// [`KnotError::TooFew`] when only [`MIN_KNOTS`] remain.
    pub fn remove(&mut self, index: usize) -> Result<KnotEdit, KnotError> {
        let len = self.len();
        if index >= len {
            return Err(KnotError::IndexOutOfRange { index, len });
        }
        if len <= MIN_KNOTS {
            return Err(KnotError::TooFew { min: MIN_KNOTS });
        }
        self.points.remove(index);
        self.sync_closing();
        Ok(KnotEdit::Removed(index))
    }

    /// Move the editable knot at `index`, re-clamping against its
    /// neighbours with the same rule as [`insert`](Self::insert).
    ///
    /// # Errors
    ///
    /// Returns [`KnotError::NonFinite`] for NaN/infinite input and
    /// [`KnotError::IndexOutOfRange`] for an index past the editable
    /// knots.
    pub fn move_to(&mut self, index: usize, x: f64, y: f64) -> Result<KnotEdit, KnotError> {
        check_finite(x, y)?;
        let editable = self.as_slice();
        let len = editable.len();
        if index >= len {
            return Err(KnotError::IndexOutOfRange { index, len });
        }
        let low = if index > 0 {
            editable[index - 1].x + self.min_gap
        } else {
            0.0
        };
        let high = if index + 1 < len {
            editable[index + 1].x - self.min_gap
        } else {
            1.0
        };
        self.points[index] = Knot::new(x.clamp(low, high.max(low)), y.clamp(0.0, 1.0));
        self.sync_closing();
        Ok(KnotEdit::Moved(index))
    }

    /// Toggle the synthetic closing knot. Returns `true` if the flag
    /// changed.
    pub fn set_periodic(&mut self, periodic: bool) -> bool {
        if self.periodic == periodic {
            return false;
        }
        if periodic {
            let first = self.points[0];
            self.points.push(first);
            self.periodic = true;
            self.sync_closing();
        } else {
            self.points.pop();
            self.periodic = false;
        }
        true
    }

    /// Keep the closing knot one period right of knot 0, mirroring its y.
    ///
    /// The period is 1 unless the last editable knot sits within
    /// `min_gap` of `first.x + 1`, in which case the closing knot is
    /// pushed to `last.x + min_gap`.
    fn sync_closing(&mut self) {
        if !self.periodic {
            return;
        }
        let n = self.points.len();
        let first = self.points[0];
        let last = self.points[n - 2];
        let x = (first.x + 1.0).max(last.x + self.min_gap);
        self.points[n - 1] = Knot::new(x, first.y);
    }
}

impl Default for Knots {
    fn default() -> Self {
        Self::identity()
    }
}

fn check_finite(x: f64, y: f64) -> Result<(), KnotError> {
    if x.is_finite() && y.is_finite() {
        Ok(())
    } else {
        Err(KnotError::NonFinite { x, y })
    }
}
