//! Shared parameter encodings for curve-based filters.
//!
//! Knot lists are stored as `"x y, x y, ..."` with two decimals;
//! interpolation modes by their short names (`flat`, `linear`, `smooth`).

use rand::Rng;
use rand::RngCore;
use tonestack_pipeline::{
    FilterError, InterpolationMode, Knot, Knots, ParameterStore, ToneCurve,
};

/// Knot list stored when a key is missing.
pub const DEFAULT_KNOTS: &str = "0.0 0.0, 1.0 1.0";

/// Parse a `"x y, x y"` knot list. Needs at least two knots, each
/// coordinate in `[0, 1]`, with strictly increasing `x`.
///
/// # Errors
///
/// Returns [`FilterError::InvalidParameter`] naming `key`.
pub fn parse_knots(key: &str, value: &str) -> Result<Vec<Knot>, FilterError> {
    let invalid = |reason: &str| FilterError::invalid(key, value, reason);
    let mut knots = Vec::new();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let mut coords = pair.split_whitespace();
        let (Some(x), Some(y), None) = (coords.next(), coords.next(), coords.next()) else {
            return Err(invalid("each knot must be `x y`"));
        };
        let x: f64 = x.parse().map_err(|_| invalid("knot x is not a number"))?;
        let y: f64 = y.parse().map_err(|_| invalid("knot y is not a number"))?;
        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            return Err(invalid("knot coordinates must lie in [0, 1]"));
        }
        knots.push(Knot::new(x, y));
    }
    if knots.len() < 2 {
        return Err(invalid("at least two knots are required"));
    }
    Ok(knots)
}

/// Parse a knot list into a store, periodic if requested.
///
/// # Errors
///
/// Returns [`FilterError::InvalidParameter`] for a malformed list or one
/// the knot store refuses (out of order, too many).
pub fn load_knots(store: &ParameterStore, key: &str, periodic: bool) -> Result<Knots, FilterError> {
    let value = store.get(key).unwrap_or(DEFAULT_KNOTS);
    let points = parse_knots(key, value)?;
    let mut knots = Knots::new(points).map_err(|e| FilterError::invalid(key, value, e.to_string()))?;
    knots.set_periodic(periodic);
    Ok(knots)
}

/// Format knots the way [`parse_knots`] reads them.
#[must_use]
pub fn format_knots(knots: &[Knot]) -> String {
    knots
        .iter()
        .map(|k| format!("{:.2} {:.2}", k.x, k.y))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse an interpolation mode, defaulting to `smooth` when missing.
///
/// # Errors
///
/// Returns [`FilterError::InvalidParameter`] for an unknown name.
pub fn load_mode(store: &ParameterStore, key: &str) -> Result<InterpolationMode, FilterError> {
    match store.get(key) {
        None => Ok(InterpolationMode::Cubic),
        Some(value) => InterpolationMode::from_name(value.trim())
            .ok_or_else(|| FilterError::invalid(key, value, "expected flat, linear or smooth")),
    }
}

/// Load mode plus knots for the curve stored under `prefix`.
///
/// # Errors
///
/// See [`load_mode`] and [`load_knots`].
pub fn load_curve(
    store: &ParameterStore,
    prefix: &str,
    periodic: bool,
) -> Result<(InterpolationMode, Knots), FilterError> {
    let mode = load_mode(store, &format!("{prefix}interpolationmode"))?;
    let knots = load_knots(store, &format!("{prefix}knots"), periodic)?;
    Ok((mode, knots))
}

/// Store mode plus knots for `curve` under `prefix`. A periodic curve's
/// closing knot is not written.
pub fn save_curve(store: &mut ParameterStore, prefix: &str, curve: &ToneCurve) {
    store.set(format!("{prefix}interpolationmode"), curve.mode().name());
    store.set(format!("{prefix}knots"), format_knots(curve.knots().as_slice()));
}

/// Random but valid knots on the two-decimal grid [`format_knots`]
/// writes, so they survive a save and reload exactly.
pub fn random_knots(rng: &mut dyn RngCore, periodic: bool) -> Knots {
    let mut xs: Vec<u32> = vec![0];
    for _ in 0..rng.gen_range(0..=3) {
        xs.push(rng.gen_range(5..=95));
    }
    if !periodic {
        xs.push(100);
    }
    xs.sort_unstable();
    xs.dedup();
    if xs.len() < 2 {
        xs.push(50);
    }
    let points = xs
        .into_iter()
        .map(|x| Knot::new(f64::from(x) / 100.0, f64::from(rng.gen_range(0..=100u32)) / 100.0))
        .collect();
    let mut knots = Knots::new(points).unwrap_or_else(|_| Knots::identity());
    knots.set_periodic(periodic);
    knots
}

/// A random interpolation mode.
pub fn random_mode(rng: &mut dyn RngCore) -> InterpolationMode {
    InterpolationMode::ALL[rng.gen_range(0..InterpolationMode::ALL.len())]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn parses_comma_separated_pairs() {
        let knots = parse_knots("k", "0.0 0.1,  0.5 0.9 ,1 1").unwrap();
        assert_eq!(
            knots,
            vec![Knot::new(0.0, 0.1), Knot::new(0.5, 0.9), Knot::new(1.0, 1.0)]
        );
    }

    #[test]
    fn rejects_single_knot() {
        assert!(parse_knots("k", "0.5 0.5").is_err());
    }

    #[test]
    fn rejects_out_of_range_coordinate() {
        assert!(parse_knots("k", "0 0, 1.2 1").is_err());
        assert!(parse_knots("k", "0 -0.1, 1 1").is_err());
    }

    #[test]
    fn rejects_malformed_pair() {
        assert!(parse_knots("k", "0 0 0, 1 1").is_err());
        assert!(parse_knots("k", "0, 1 1").is_err());
        assert!(parse_knots("k", "a b, 1 1").is_err());
    }

    #[test]
    fn unordered_knots_are_rejected_by_store() {
        let store: ParameterStore = [("k", "0.8 0, 0.2 1")].into_iter().collect();
        assert!(load_knots(&store, "k", false).is_err());
    }

    #[test]
    fn format_uses_two_decimals() {
        let text = format_knots(&[Knot::new(0.0, 0.126), Knot::new(1.0, 1.0)]);
        assert_eq!(text, "0.00 0.13, 1.00 1.00");
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let store: ParameterStore = [("m", "bezier")].into_iter().collect();
        assert!(load_mode(&store, "m").is_err());
        assert_eq!(
            load_mode(&ParameterStore::new(), "m").unwrap(),
            InterpolationMode::Cubic
        );
    }

    #[test]
    fn random_knots_survive_formatting() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let knots = random_knots(&mut rng, false);
            let text = format_knots(knots.as_slice());
            assert_eq!(parse_knots("k", &text).unwrap(), knots.as_slice());
            let periodic = random_knots(&mut rng, true);
            assert!(periodic.is_periodic());
            assert!(periodic.len() >= 2);
        }
    }
}
