//! Shared types for the filter pipeline.

use crate::filter::FilterError;
use crate::ifl::FilterListError;

/// Working image format: 8-bit RGBA, the only representation filters see.
pub type Image = image::RgbaImage;

/// Errors returned by [`FilterList`](crate::FilterList) operations.
///
/// Filter failures during a background run are not surfaced here; they
/// arrive as [`RunOutcome::Failed`](crate::RunOutcome::Failed).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A stage index was past the end of the list.
    #[error("stage index {index} is out of range for a list of {len} stages")]
    StageIndex {
        /// Requested index.
        index: usize,
        /// Current stage count.
        len: usize,
    },

    /// A run was requested before any input image was set.
    #[error("no input image has been set")]
    NoInputImage,

    /// The registry has no filter with this id.
    #[error("no filter with id `{0}` is registered")]
    UnknownFilter(String),

    /// The stage holds a placeholder, so there is no filter to edit.
    #[error("stage {index} is a broken `{filter_id}` placeholder")]
    BrokenStage {
        /// Stage index.
        index: usize,
        /// Id the placeholder was loaded with.
        filter_id: String,
    },

    /// A typed edit asked for the wrong concrete filter type.
    #[error("stage {index} holds `{filter_id}`, not the requested filter type")]
    FilterType {
        /// Stage index.
        index: usize,
        /// Id of the filter actually present.
        filter_id: String,
    },

    /// A filter rejected a parameter operation.
    #[error("stage {index} (`{filter_id}`): {source}")]
    Filter {
        /// Stage index.
        index: usize,
        /// Id of the failing filter.
        filter_id: String,
        /// Underlying filter error.
        #[source]
        source: FilterError,
    },

    /// A filter-list document was malformed.
    #[error("malformed filter list: {0}")]
    ListFile(#[from] FilterListError),

    /// Reading or writing a filter-list file failed, or the runner
    /// thread could not be spawned.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The background runner is no longer accepting jobs.
    #[error("the background runner has stopped")]
    RunnerStopped,
}
