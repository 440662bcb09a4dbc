//! tonestack-filters: the built-in filter set.
//!
//! - [`CurvesFilter`]: luma and per-channel RGBA tone curves.
//! - [`HslKeyerFilter`]: keys pixels by hue, saturation and lightness.
//!
//! [`registry`] returns a [`FilterRegistry`] with both registered, ready
//! to hand to a [`FilterList`](tonestack_pipeline::FilterList).

pub mod blur;
pub mod color;
pub mod curves;
pub mod hsl_keyer;
pub mod params;

pub use curves::{CURVES_ID, CurveChannel, CurvesFilter};
pub use hsl_keyer::{HSL_KEYER_ID, HslChannel, HslKeyerFilter, OutputMode};

use tonestack_pipeline::{FilterInfo, FilterRegistry, ImageFilter};

fn curves() -> Box<dyn ImageFilter> {
    Box::new(CurvesFilter::new())
}

fn hsl_keyer() -> Box<dyn ImageFilter> {
    Box::new(HslKeyerFilter::new())
}

/// Registry of every built-in filter.
#[must_use]
pub fn registry() -> FilterRegistry {
    FilterRegistry::new()
        .with(
            CURVES_ID,
            FilterInfo::new(
                "Curves",
                "Adjusts luma and RGBA channels with interpolated tone curves",
            ),
            curves,
        )
        .with(
            HSL_KEYER_ID,
            FilterInfo::new(
                "HSL Keyer",
                "Keys out pixels selected by hue, saturation and lightness curves",
            ),
            hsl_keyer,
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn registry_creates_every_filter_under_its_id() {
        let registry = registry();
        assert_eq!(registry.ids().collect::<Vec<_>>(), [CURVES_ID, HSL_KEYER_ID]);
        for id in registry.ids() {
            assert_eq!(registry.create(id).unwrap().id(), id);
        }
        assert_eq!(registry.info(CURVES_ID).unwrap().name, "Curves");
    }
}
