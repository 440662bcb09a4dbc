//! tonestack-io: image files on disk.
//!
//! [`ImageFileCodec`] implements the pipeline's
//! [`ImageCodec`](tonestack_pipeline::ImageCodec) seam on top of the
//! `image` crate.

pub mod codec;

pub use codec::{FILE_FILTERS, ImageFileCodec, format_from_hint};
