//! tonestack-pipeline: cached, cancellable image filter stacks.
//!
//! A [`FilterList`] chains [`ImageFilter`]s over an RGBA input image.
//! Each stage caches its output, so an edit to stage `i` only recomputes
//! stages `i..`. Recomputation runs on a background thread and can be
//! cancelled at any stage boundary; a newer request always supersedes an
//! older one.
//!
//! The crate also holds the curve machinery filters are built from:
//! [`Knots`], [`Interpolator`], and the 256-entry [`Lut`] they sample
//! into, bundled as a [`ToneCurve`].
//!
//! Filter lists persist as `.ifl` INI files (see [`ifl`]). Image files
//! are out of scope here; front ends go through an [`ImageCodec`].

pub mod codec;
pub mod curve;
pub mod diagnostics;
pub mod filter;
pub mod ifl;
pub mod interpolation;
pub mod knots;
pub mod lut;
pub mod pipeline;
pub mod runner;
pub mod stage;
pub mod types;

pub use codec::{CodecError, ImageCodec};
pub use curve::ToneCurve;
pub use diagnostics::{RunDiagnostics, StageAction, StageDiagnostics};
pub use filter::{FilterError, FilterInfo, FilterRegistry, ImageFilter, ParameterStore};
pub use ifl::{FilterEntry, FilterListDocument, FilterListError};
pub use interpolation::{Boundary, Extrapolation, InterpolationMode, Interpolator};
pub use knots::{Knot, KnotEdit, KnotError, Knots};
pub use lut::{Lut, build_lut};
pub use pipeline::FilterList;
pub use runner::{CancelToken, PipelineEvent, RunHandle, RunId, RunOutcome};
pub use stage::{StageFilter, StageInfo};
pub use types::{Image, PipelineError};
