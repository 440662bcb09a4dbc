//! Hue / saturation / lightness keyer.
//!
//! Each pixel's key is the 8-bit product of three curves sampled at the
//! pixel's HSL components. The key knocks out alpha (keyed image mode)
//! or is rendered as a grayscale matte. The hue curve is periodic so
//! keys can wrap through red.

use std::any::Any;

use image::Rgba;
use log::{debug, warn};
use rand::Rng;
use rand::RngCore;
use tonestack_pipeline::{
    FilterError, Image, ImageFilter, InterpolationMode, Interpolator, Knot, Knots, ParameterStore,
    ToneCurve,
};

use crate::blur::{MAX_RADIUS, gaussian_blur_rgba, sigma_for_radius};
use crate::color::{mul8, rgb_to_hsl8};
use crate::params::{load_curve, random_knots, random_mode, save_curve};

/// Registry id of [`HslKeyerFilter`].
pub const HSL_KEYER_ID: &str = "tonestack.filter.hslkeyer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HslChannel {
    Hue,
    Saturation,
    Lightness,
}

impl HslChannel {
    pub const ALL: [Self; 3] = [Self::Hue, Self::Saturation, Self::Lightness];

    /// Key prefix of the channel's parameters.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hue => "hue",
            Self::Saturation => "saturation",
            Self::Lightness => "lightness",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }

    const fn is_periodic(self) -> bool {
        matches!(self, Self::Hue)
    }
}

/// What the keyer writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputMode {
    /// Original colors with the key removed from alpha.
    #[default]
    KeyedImage,
    /// The remaining alpha as opaque gray.
    Matte,
}

impl OutputMode {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::KeyedImage => "keyedimage",
            Self::Matte => "matte",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::KeyedImage, Self::Matte]
            .into_iter()
            .find(|m| m.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HslKeyerFilter {
    curves: [ToneCurve; 3],
    output_mode: OutputMode,
    preblur_radius: f64,
}

impl Default for HslKeyerFilter {
    /// Keys out greens: hue peaks at a third of the wheel, saturation
    /// ramps up, lightness peaks at mid gray.
    fn default() -> Self {
        let hue = Knots::periodic(vec![
            Knot::new(0.0, 0.0),
            Knot::new(0.33, 1.0),
            Knot::new(0.66, 0.0),
        ]);
        let lightness = Knots::new(vec![
            Knot::new(0.0, 0.0),
            Knot::new(0.5, 1.0),
            Knot::new(1.0, 0.0),
        ]);
        let cubic = |knots: Option<Knots>| {
            ToneCurve::new(Interpolator::new(
                InterpolationMode::Cubic,
                knots.unwrap_or_else(Knots::identity),
            ))
        };
        Self {
            curves: [cubic(hue.ok()), cubic(None), cubic(lightness.ok())],
            output_mode: OutputMode::KeyedImage,
            preblur_radius: 0.0,
        }
    }
}

impl HslKeyerFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn curve(&self, channel: HslChannel) -> &ToneCurve {
        &self.curves[channel.index()]
    }

    pub const fn curve_mut(&mut self, channel: HslChannel) -> &mut ToneCurve {
        &mut self.curves[channel.index()]
    }

    #[must_use]
    pub const fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    /// Returns `true` if the mode changed.
    pub fn set_output_mode(&mut self, mode: OutputMode) -> bool {
        let changed = self.output_mode != mode;
        self.output_mode = mode;
        changed
    }

    /// Pre-blur radius in pixels; zero disables the blur.
    #[must_use]
    pub const fn preblur_radius(&self) -> f64 {
        self.preblur_radius
    }

    /// Clamped to `[0, 100]`. Returns `true` if the radius changed.
    pub fn set_preblur_radius(&mut self, radius: f64) -> bool {
        let radius = if radius.is_finite() {
            radius.clamp(0.0, MAX_RADIUS)
        } else {
            0.0
        };
        #[allow(clippy::float_cmp)]
        let changed = self.preblur_radius != radius;
        self.preblur_radius = radius;
        changed
    }

    /// Build a filter from stored parameters without touching `self`.
    fn parse(store: &ParameterStore) -> Result<Self, FilterError> {
        let mut curves = Self::default().curves;
        for channel in HslChannel::ALL {
            let (mode, knots) = load_curve(store, channel.name(), channel.is_periodic())?;
            let inverted = store.get_bool(&format!("{}isinverted", channel.name()), false)?;
            let mut curve = ToneCurve::new(Interpolator::new(mode, knots));
            curve.set_inverted(inverted);
            curves[channel.index()] = curve;
        }

        let output_mode = match store.get("outputmode") {
            None => OutputMode::KeyedImage,
            Some(value) => OutputMode::from_name(value.trim()).ok_or_else(|| {
                FilterError::invalid("outputmode", value, "expected keyedimage or matte")
            })?,
        };

        let preblur_radius = store.get_f64("preblurradius", 0.0)?;
        if !(0.0..=MAX_RADIUS).contains(&preblur_radius) {
            return Err(FilterError::invalid(
                "preblurradius",
                store.get("preblurradius").unwrap_or_default(),
                "expected a radius in [0, 100]",
            ));
        }

        Ok(Self {
            curves,
            output_mode,
            preblur_radius,
        })
    }

    fn key(&self, Rgba([r, g, b, _]): Rgba<u8>) -> u8 {
        let [hue, saturation, lightness] = &self.curves;
        let hsl = rgb_to_hsl8(r, g, b);
        mul8(
            hue.apply(hsl.h),
            mul8(saturation.apply(hsl.s), lightness.apply(hsl.l)),
        )
    }
}

impl ImageFilter for HslKeyerFilter {
    fn id(&self) -> &str {
        HSL_KEYER_ID
    }

    fn process(&self, image: &Image) -> Result<Image, FilterError> {
        // The blur only feeds the key; colors come from the input.
        let blurred;
        let source = if self.preblur_radius > 0.0 {
            let sigma = sigma_for_radius(self.preblur_radius);
            debug!(
                "{HSL_KEYER_ID}: pre-blur radius {} (sigma {sigma:.2})",
                self.preblur_radius
            );
            blurred = gaussian_blur_rgba(image, sigma);
            &blurred
        } else {
            image
        };

        let mut out = image.clone();
        for (pixel, keyed) in out.pixels_mut().zip(source.pixels()) {
            let alpha = mul8(pixel.0[3], 255 - self.key(*keyed));
            match self.output_mode {
                OutputMode::KeyedImage => pixel.0[3] = alpha,
                OutputMode::Matte => *pixel = Rgba([alpha, alpha, alpha, 255]),
            }
        }
        Ok(out)
    }

    fn load_parameters(&mut self, store: &ParameterStore) -> Result<(), FilterError> {
        *self = Self::parse(store).inspect_err(|err| warn!("{HSL_KEYER_ID}: {err}"))?;
        Ok(())
    }

    fn save_parameters(&self, store: &mut ParameterStore) {
        for channel in HslChannel::ALL {
            let curve = self.curve(channel);
            save_curve(store, channel.name(), curve);
            store.set(
                format!("{}isinverted", channel.name()),
                curve.is_inverted().to_string(),
            );
        }
        store.set("outputmode", self.output_mode.name());
        store.set("preblurradius", self.preblur_radius.to_string());
    }

    fn clone_filter(&self) -> Box<dyn ImageFilter> {
        Box::new(self.clone())
    }

    fn randomize_parameters(&mut self, rng: &mut dyn RngCore) {
        for channel in HslChannel::ALL {
            let mode = random_mode(rng);
            let knots = random_knots(rng, channel.is_periodic());
            let mut curve = ToneCurve::new(Interpolator::new(mode, knots));
            curve.set_inverted(rng.gen_bool(0.25));
            self.curves[channel.index()] = curve;
        }
        self.output_mode = if rng.gen_bool(0.5) {
            OutputMode::KeyedImage
        } else {
            OutputMode::Matte
        };
        self.preblur_radius = if rng.gen_bool(0.5) {
            0.0
        } else {
            f64::from(rng.gen_range(1..=10u32))
        };
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    fn store(pairs: &[(&str, &str)]) -> ParameterStore {
        pairs.iter().copied().collect()
    }

    /// Half red, half green.
    fn split_image() -> Image {
        Image::from_fn(16, 4, |x, _| if x < 8 { RED } else { GREEN })
    }

    #[test]
    fn default_keys_out_green_and_keeps_red() {
        let out = HslKeyerFilter::new().process(&split_image()).unwrap();
        assert_eq!(*out.get_pixel(0, 0), RED);
        let green = out.get_pixel(15, 0).0;
        assert_eq!(green[..3], [0, 255, 0]);
        assert!(green[3] < 16, "green alpha = {}", green[3]);
    }

    #[test]
    fn matte_writes_remaining_alpha_as_gray() {
        let mut filter = HslKeyerFilter::new();
        filter.set_output_mode(OutputMode::Matte);
        let out = filter.process(&split_image()).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255, 255]);
        let green = out.get_pixel(15, 0).0;
        assert!(green[0] < 16);
        assert_eq!(green[0], green[1]);
        assert_eq!(green[1], green[2]);
        assert_eq!(green[3], 255);
    }

    #[test]
    fn key_scales_with_input_alpha() {
        let mut filter = HslKeyerFilter::new();
        // Constant zero hue curve: nothing is keyed.
        filter
            .load_parameters(&store(&[("hueknots", "0 0, 0.5 0")]))
            .unwrap();
        let image = Image::from_pixel(2, 2, Rgba([0, 255, 0, 100]));
        let out = filter.process(&image).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [0, 255, 0, 100]);

        filter.set_output_mode(OutputMode::Matte);
        let matte = filter.process(&image).unwrap();
        assert_eq!(matte.get_pixel(0, 0).0, [100, 100, 100, 255]);
    }

    #[test]
    fn inverted_curve_flips_the_key() {
        let mut filter = HslKeyerFilter::new();
        filter
            .load_parameters(&store(&[
                ("hueknots", "0 0, 0.5 0"),
                ("hueisinverted", "true"),
                ("saturationknots", "0 1, 1 1"),
                ("lightnessknots", "0 1, 1 1"),
            ]))
            .unwrap();
        let out = filter.process(&split_image()).unwrap();
        assert!(out.pixels().all(|p| p.0[3] == 0));
    }

    #[test_log::test]
    fn preblur_changes_key_but_not_colors() {
        let image = split_image();
        let sharp = HslKeyerFilter::new().process(&image).unwrap();
        let mut filter = HslKeyerFilter::new();
        assert!(filter.set_preblur_radius(3.0));
        let soft = filter.process(&image).unwrap();

        for (a, b) in soft.pixels().zip(image.pixels()) {
            assert_eq!(a.0[..3], b.0[..3]);
        }
        assert!(soft.pixels().zip(sharp.pixels()).any(|(a, b)| a.0[3] != b.0[3]));
    }

    #[test]
    fn saved_hue_knots_exclude_closing_knot() {
        let mut saved = ParameterStore::new();
        HslKeyerFilter::new().save_parameters(&mut saved);
        assert_eq!(saved.get("hueknots"), Some("0.00 0.00, 0.33 1.00, 0.66 0.00"));
        assert_eq!(saved.get("lightnessknots"), Some("0.00 0.00, 0.50 1.00, 1.00 0.00"));
        assert_eq!(saved.get("hueinterpolationmode"), Some("smooth"));
        assert_eq!(saved.get("outputmode"), Some("keyedimage"));
        assert_eq!(saved.get("preblurradius"), Some("0"));
        assert_eq!(saved.get("saturationisinverted"), Some("false"));
    }

    #[test]
    fn parameters_round_trip() {
        let mut filter = HslKeyerFilter::new();
        filter.set_output_mode(OutputMode::Matte);
        filter.set_preblur_radius(2.5);
        filter.curve_mut(HslChannel::Saturation).set_inverted(true);
        filter
            .curve_mut(HslChannel::Lightness)
            .set_mode(InterpolationMode::Linear);

        let mut saved = ParameterStore::new();
        filter.save_parameters(&mut saved);
        let mut loaded = HslKeyerFilter::new();
        loaded.load_parameters(&saved).unwrap();
        assert_eq!(loaded, filter);
        assert!(loaded.curve(HslChannel::Hue).knots().is_periodic());
    }

    #[test_log::test]
    fn rejected_parameters_leave_filter_unchanged() {
        let mut filter = HslKeyerFilter::new();
        filter.set_preblur_radius(4.0);
        let before = filter.clone();
        for bad in [
            store(&[("preblurradius", "101")]),
            store(&[("preblurradius", "-1")]),
            store(&[("preblurradius", "wide")]),
            store(&[("outputmode", "alpha")]),
            store(&[("lightnessisinverted", "maybe")]),
            store(&[("hueknots", "0.1 0.2")]),
            store(&[("saturationinterpolationmode", "cubic")]),
        ] {
            assert!(filter.load_parameters(&bad).is_err());
            assert_eq!(filter, before);
        }
    }

    #[test]
    fn preblur_radius_is_clamped() {
        let mut filter = HslKeyerFilter::new();
        filter.set_preblur_radius(250.0);
        assert!((filter.preblur_radius() - MAX_RADIUS).abs() < f64::EPSILON);
        filter.set_preblur_radius(f64::NAN);
        assert!(filter.preblur_radius().abs() < f64::EPSILON);
        assert!(!filter.set_preblur_radius(-3.0));
    }

    #[test]
    fn randomized_filter_saves_loadable_parameters() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let mut filter = HslKeyerFilter::new();
            filter.randomize_parameters(&mut rng);
            let mut saved = ParameterStore::new();
            filter.save_parameters(&mut saved);
            let mut loaded = HslKeyerFilter::new();
            loaded.load_parameters(&saved).unwrap();
            assert_eq!(loaded, filter);
        }
    }
}
