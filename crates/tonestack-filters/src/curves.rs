//! Per-channel tone curves.
//!
//! Five curves: a luma curve applied after each color curve, and an
//! alpha curve. A pixel maps as
//! `r' = luma[red[r]]`, `g' = luma[green[g]]`, `b' = luma[blue[b]]`,
//! `a' = alpha[a]`.

use std::any::Any;

use image::Rgba;
use log::warn;
use rand::RngCore;
use tonestack_pipeline::{
    FilterError, Image, ImageFilter, Interpolator, ParameterStore, ToneCurve,
};

use crate::params::{load_curve, random_knots, random_mode, save_curve};

/// Registry id of [`CurvesFilter`].
pub const CURVES_ID: &str = "tonestack.filter.curves";

/// Which curve the filter is editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CurveChannel {
    #[default]
    Luma,
    Red,
    Green,
    Blue,
    Alpha,
}

impl CurveChannel {
    pub const ALL: [Self; 5] = [Self::Luma, Self::Red, Self::Green, Self::Blue, Self::Alpha];

    /// Parameter name, also the key prefix of the channel's curve.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Luma => "luma",
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Alpha => "alpha",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for CurveChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// RGBA curves adjustment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CurvesFilter {
    working_channel: CurveChannel,
    curves: [ToneCurve; 5],
}

impl CurvesFilter {
    /// Every curve the cubic identity, working channel luma.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn working_channel(&self) -> CurveChannel {
        self.working_channel
    }

    /// Returns `true` if the channel changed.
    pub fn set_working_channel(&mut self, channel: CurveChannel) -> bool {
        let changed = self.working_channel != channel;
        self.working_channel = channel;
        changed
    }

    #[must_use]
    pub const fn curve(&self, channel: CurveChannel) -> &ToneCurve {
        &self.curves[channel.index()]
    }

    /// Mutable access to one curve; its table stays in sync through the
    /// [`ToneCurve`] mutators.
    pub const fn curve_mut(&mut self, channel: CurveChannel) -> &mut ToneCurve {
        &mut self.curves[channel.index()]
    }

    /// The curve of the working channel.
    #[must_use]
    pub const fn working_curve(&self) -> &ToneCurve {
        self.curve(self.working_channel)
    }

    pub const fn working_curve_mut(&mut self) -> &mut ToneCurve {
        self.curve_mut(self.working_channel)
    }

    /// Build a filter from stored parameters without touching `self`.
    fn parse(store: &ParameterStore) -> Result<Self, FilterError> {
        let working_channel = match store.get("workingchannel") {
            None => CurveChannel::Luma,
            Some(value) => CurveChannel::from_name(value.trim()).ok_or_else(|| {
                FilterError::invalid(
                    "workingchannel",
                    value,
                    "expected luma, red, green, blue or alpha",
                )
            })?,
        };
        let mut curves: [ToneCurve; 5] = Default::default();
        for channel in CurveChannel::ALL {
            let (mode, knots) = load_curve(store, channel.name(), false)?;
            curves[channel.index()] = ToneCurve::new(Interpolator::new(mode, knots));
        }
        Ok(Self {
            working_channel,
            curves,
        })
    }

    fn map_pixel(&self, Rgba([r, g, b, a]): Rgba<u8>) -> Rgba<u8> {
        let [luma, red, green, blue, alpha] = &self.curves;
        Rgba([
            luma.apply(red.apply(r)),
            luma.apply(green.apply(g)),
            luma.apply(blue.apply(b)),
            alpha.apply(a),
        ])
    }
}

impl ImageFilter for CurvesFilter {
    fn id(&self) -> &str {
        CURVES_ID
    }

    fn process(&self, image: &Image) -> Result<Image, FilterError> {
        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            *pixel = self.map_pixel(*pixel);
        }
        Ok(out)
    }

    fn load_parameters(&mut self, store: &ParameterStore) -> Result<(), FilterError> {
        *self = Self::parse(store).inspect_err(|err| warn!("{CURVES_ID}: {err}"))?;
        Ok(())
    }

    fn save_parameters(&self, store: &mut ParameterStore) {
        store.set("workingchannel", self.working_channel.name());
        for channel in CurveChannel::ALL {
            save_curve(store, channel.name(), self.curve(channel));
        }
    }

    fn clone_filter(&self) -> Box<dyn ImageFilter> {
        Box::new(self.clone())
    }

    fn randomize_parameters(&mut self, rng: &mut dyn RngCore) {
        for curve in &mut self.curves {
            let mode = random_mode(rng);
            *curve = ToneCurve::new(Interpolator::new(mode, random_knots(rng, false)));
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
