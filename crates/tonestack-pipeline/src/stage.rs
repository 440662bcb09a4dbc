//! One position in a filter list: a filter, its bypass flag, and its
//! cached output.
//!
//! Validity is tracked with version stamps from the list's global edit
//! counter. A stage is stamped with `modified_at` whenever it or anything
//! upstream changes; its cache is valid only while the cache's
//! `computed_at` is at least that stamp.

use std::sync::Arc;

use crate::filter::{ImageFilter, ParameterStore};
use crate::runner::{PlannedStage, RunId, StageWork};
use crate::types::Image;

/// The filter occupying a stage.
pub enum StageFilter {
    /// A live filter.
    Active(Box<dyn ImageFilter>),
    /// The filter could not be created or refused its stored parameters.
    /// The stage passes its input through and keeps the raw parameters so
    /// a save writes them back unchanged.
    Broken {
        id: String,
        parameters: ParameterStore,
        reason: String,
    },
}

impl StageFilter {
    /// Id of the filter, or the id a broken stage was loaded with.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Active(filter) => filter.id(),
            Self::Broken { id, .. } => id,
        }
    }

    #[must_use]
    pub const fn is_broken(&self) -> bool {
        matches!(self, Self::Broken { .. })
    }

    /// The live filter, if any.
    #[must_use]
    pub fn as_filter(&self) -> Option<&dyn ImageFilter> {
        match self {
            Self::Active(filter) => Some(filter.as_ref()),
            Self::Broken { .. } => None,
        }
    }

    pub fn as_filter_mut(&mut self) -> Option<&mut dyn ImageFilter> {
        match self {
            Self::Active(filter) => Some(filter.as_mut()),
            Self::Broken { .. } => None,
        }
    }

    /// Parameters as they would be written to a file.
    #[must_use]
    pub fn parameters(&self) -> ParameterStore {
        match self {
            Self::Active(filter) => {
                let mut store = ParameterStore::new();
                filter.save_parameters(&mut store);
                store
            }
            Self::Broken { parameters, .. } => parameters.clone(),
        }
    }
}

impl Clone for StageFilter {
    fn clone(&self) -> Self {
        match self {
            Self::Active(filter) => Self::Active(filter.clone_filter()),
            Self::Broken {
                id,
                parameters,
                reason,
            } => Self::Broken {
                id: id.clone(),
                parameters: parameters.clone(),
                reason: reason.clone(),
            },
        }
    }
}

impl std::fmt::Debug for StageFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active(filter) => f.debug_tuple("Active").field(&filter.id()).finish(),
            Self::Broken { id, reason, .. } => f
                .debug_struct("Broken")
                .field("id", id)
                .field("reason", reason)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StageCache {
    pub(crate) output: Arc<Image>,
    pub(crate) computed_at: u64,
    pub(crate) run: RunId,
}

#[derive(Debug)]
pub(crate) struct FilterStage {
    pub(crate) filter: StageFilter,
    pub(crate) bypass: bool,
    pub(crate) modified_at: u64,
    pub(crate) cache: Option<StageCache>,
}

impl FilterStage {
    pub(crate) const fn new(filter: StageFilter, bypass: bool, version: u64) -> Self {
        Self {
            filter,
            bypass,
            modified_at: version,
            cache: None,
        }
    }

    /// Cached output, if still valid for the current input.
    pub(crate) fn valid_output(&self, input_version: u64) -> Option<&Arc<Image>> {
        self.cache
            .as_ref()
            .filter(|c| c.computed_at >= self.modified_at && c.computed_at >= input_version)
            .map(|c| &c.output)
    }

    /// Stamp the stage stale at `version` and drop its cache.
    pub(crate) fn invalidate(&mut self, version: u64) {
        self.modified_at = version;
        self.cache = None;
    }

    pub(crate) fn store(&mut self, output: Arc<Image>, computed_at: u64, run: RunId) {
        self.cache = Some(StageCache {
            output,
            computed_at,
            run,
        });
    }

    /// Snapshot for the runner. Filters are cloned so edits made while the
    /// run is in flight cannot reach it.
    pub(crate) fn plan(&self, index: usize) -> PlannedStage {
        let work = match (&self.filter, self.bypass) {
            (_, true) => StageWork::Bypass,
            (StageFilter::Broken { .. }, false) => StageWork::Broken,
            (StageFilter::Active(filter), false) => StageWork::Process(filter.clone_filter()),
        };
        PlannedStage {
            index,
            filter_id: self.filter.id().to_owned(),
            work,
        }
    }

    pub(crate) fn info(&self, index: usize, input_version: u64) -> StageInfo {
        StageInfo {
            index,
            filter_id: self.filter.id().to_owned(),
            bypass: self.bypass,
            broken_reason: match &self.filter {
                StageFilter::Broken { reason, .. } => Some(reason.clone()),
                StageFilter::Active(_) => None,
            },
            cached_run: self
                .valid_output(input_version)
                .and(self.cache.as_ref())
                .map(|c| c.run),
        }
    }
}

/// Read-only snapshot of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInfo {
    pub index: usize,
    pub filter_id: String,
    pub bypass: bool,
    /// Set when the stage holds a broken placeholder.
    pub broken_reason: Option<String>,
    /// Run that produced the stage's valid cached output, if any.
    pub cached_run: Option<RunId>,
}

impl StageInfo {
    #[must_use]
    pub const fn is_broken(&self) -> bool {
        self.broken_reason.is_some()
    }

    #[must_use]
    pub const fn is_cached(&self) -> bool {
        self.cached_run.is_some()
    }
}
