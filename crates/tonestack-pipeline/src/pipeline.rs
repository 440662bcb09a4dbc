//! The filter list: an ordered chain of stages with cached outputs.
//!
//! Edits happen on the caller's thread under a short lock. Each edit
//! bumps a list-wide version counter, stamps the affected stage and
//! everything downstream as stale, and cancels any run in flight. With
//! auto-run enabled the edit then requests a fresh run, which resumes
//! from the first stale stage.
//!
//! Results and progress reach callers two ways: the [`RunHandle`]
//! returned by [`FilterList::request_recompute`], and the
//! [`PipelineEvent`] stream from [`FilterList::subscribe`].

use std::hash::Hasher as _;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use siphasher::sip::SipHasher13;

use crate::filter::{FilterRegistry, ImageFilter, ParameterStore};
use crate::ifl::{FilterEntry, FilterListDocument};
use crate::runner::{
    CancelToken, Job, JobHeader, PipelineEvent, RunHandle, RunId, RunTarget, Runner,
};
use crate::stage::{FilterStage, StageFilter, StageInfo};
use crate::types::{Image, PipelineError};

/// Mutable list state guarded by one lock.
#[derive(Debug, Default)]
struct ListState {
    stages: Vec<FilterStage>,
    input: Option<Arc<Image>>,
    input_fingerprint: u64,
    /// Version at which the input image last changed.
    input_version: u64,
    /// Global edit counter.
    version: u64,
    output: Option<Arc<Image>>,
    /// Some edit has not yet been followed by a completed run.
    dirty: bool,
    /// Token of the most recently requested run.
    active: Option<CancelToken>,
}

impl ListState {
    fn check_index(&self, index: usize) -> Result<(), PipelineError> {
        if index < self.stages.len() {
            Ok(())
        } else {
            Err(PipelineError::StageIndex {
                index,
                len: self.stages.len(),
            })
        }
    }

    fn cancel_active(&mut self) {
        if let Some(token) = self.active.take() {
            token.cancel();
        }
    }

    /// Stamp `from..` stale at a new version.
    fn invalidate_from(&mut self, from: usize) {
        self.version += 1;
        let version = self.version;
        for stage in self.stages.iter_mut().skip(from) {
            stage.invalidate(version);
        }
        self.dirty = true;
        self.cancel_active();
    }

    /// First stale stage, and the image feeding it.
    fn resume_point(&self, input: &Arc<Image>) -> (usize, Arc<Image>) {
        let mut source = Arc::clone(input);
        for (index, stage) in self.stages.iter().enumerate() {
            match stage.valid_output(self.input_version) {
                Some(output) => source = Arc::clone(output),
                None => return (index, source),
            }
        }
        (self.stages.len(), source)
    }
}

/// State shared with the runner thread.
#[derive(Default)]
struct Shared {
    state: Mutex<ListState>,
    observers: Mutex<Vec<Sender<PipelineEvent>>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RunTarget for Shared {
    fn commit(
        &self,
        job: &JobHeader,
        outputs: &[Arc<Image>],
        finished: Option<&Arc<Image>>,
    ) -> bool {
        let mut state = self.state();
        // Every invalidating edit cancels the active token under this lock,
        // so an uncancelled job's plan still matches the stages.
        if job.token.is_cancelled() {
            return false;
        }
        for (offset, output) in outputs.iter().enumerate() {
            if let Some(stage) = state.stages.get_mut(job.start + offset) {
                stage.store(Arc::clone(output), job.version, job.run);
            }
        }
        if let Some(image) = finished {
            state.output = Some(Arc::clone(image));
            state.dirty = false;
        }
        if state
            .active
            .as_ref()
            .is_some_and(|token| token.same_as(&job.token))
        {
            state.active = None;
        }
        true
    }

    fn emit(&self, event: PipelineEvent) {
        let mut observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        observers.retain(|observer| observer.send(event.clone()).is_ok());
    }
}

/// An ordered chain of image filters with per-stage caching and
/// cancellable background recomputation.
///
/// Dropping a list cancels its run in flight and joins the runner thread.
/// Cancellation is only observed between stages, so the drop blocks until
/// the stage currently in `process` returns. Handles of the cancelled run
/// receive [`RunOutcome::Cancelled`](crate::RunOutcome::Cancelled).
pub struct FilterList {
    registry: Arc<FilterRegistry>,
    shared: Arc<Shared>,
    runner: Runner,
    next_run: u64,
    auto_run: bool,
    name: String,
    description: String,
}

impl FilterList {
    /// Create an empty list backed by its own runner thread.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the runner thread cannot be
    /// spawned.
    pub fn new(registry: Arc<FilterRegistry>) -> Result<Self, PipelineError> {
        let shared = Arc::new(Shared::default());
        let runner = Runner::spawn(Arc::clone(&shared))?;
        Ok(Self {
            registry,
            shared,
            runner,
            next_run: 1,
            auto_run: true,
            name: String::new(),
            description: String::new(),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    /// Receive every future [`PipelineEvent`].
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        let (sender, receiver) = mpsc::channel();
        self.shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    #[must_use]
    pub const fn auto_run(&self) -> bool {
        self.auto_run
    }

    /// When enabled (the default), every invalidating edit requests a run.
    pub const fn set_auto_run(&mut self, auto_run: bool) {
        self.auto_run = auto_run;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state().stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an edit has happened since the last completed run.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.shared.state().dirty
    }

    #[must_use]
    pub fn stages(&self) -> Vec<StageInfo> {
        let state = self.shared.state();
        state
            .stages
            .iter()
            .enumerate()
            .map(|(i, s)| s.info(i, state.input_version))
            .collect()
    }

    #[must_use]
    pub fn stage(&self, index: usize) -> Option<StageInfo> {
        let state = self.shared.state();
        state
            .stages
            .get(index)
            .map(|s| s.info(index, state.input_version))
    }

    #[must_use]
    pub fn input_image(&self) -> Option<Arc<Image>> {
        self.shared.state().input.clone()
    }

    /// Final image of the most recent completed run.
    #[must_use]
    pub fn output_image(&self) -> Option<Arc<Image>> {
        self.shared.state().output.clone()
    }

    /// Replace the input image.
    ///
    /// Setting the same image again (the same allocation, or equal
    /// dimensions and pixels) is a no-op. Returns `true` if caches were
    /// invalidated.
    pub fn set_input_image(&mut self, image: impl Into<Arc<Image>>) -> bool {
        let image = image.into();
        let fingerprint = fingerprint(&image);
        {
            let mut state = self.shared.state();
            let unchanged = state.input.as_ref().is_some_and(|current| {
                Arc::ptr_eq(current, &image)
                    || (state.input_fingerprint == fingerprint && **current == *image)
            });
            if unchanged {
                log::trace!("input image unchanged, caches kept");
                return false;
            }
            state.invalidate_from(0);
            state.input_version = state.version;
            state.input = Some(image);
            state.input_fingerprint = fingerprint;
        }
        self.after_edit();
        true
    }

    /// Insert `filter` at `index` (`index == len` appends).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StageIndex`] for `index > len`.
    pub fn insert(
        &mut self,
        index: usize,
        filter: Box<dyn ImageFilter>,
    ) -> Result<(), PipelineError> {
        {
            let mut state = self.shared.state();
            if index > state.stages.len() {
                return Err(PipelineError::StageIndex {
                    index,
                    len: state.stages.len(),
                });
            }
            let version = state.version;
            state.stages.insert(
                index,
                FilterStage::new(StageFilter::Active(filter), false, version),
            );
            state.invalidate_from(index);
        }
        self.after_edit();
        Ok(())
    }

    /// Append `filter`.
    pub fn push(&mut self, filter: Box<dyn ImageFilter>) {
        let mut state = self.shared.state();
        let index = state.stages.len();
        let version = state.version;
        state.stages.push(FilterStage::new(StageFilter::Active(filter), false, version));
        state.invalidate_from(index);
        drop(state);
        self.after_edit();
    }

    /// Create a filter by id with default parameters and insert it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownFilter`] if the registry has no
    /// such id, or [`PipelineError::StageIndex`] for `index > len`.
    pub fn insert_by_id(&mut self, index: usize, id: &str) -> Result<(), PipelineError> {
        let filter = self
            .registry
            .create(id)
            .ok_or_else(|| PipelineError::UnknownFilter(id.to_owned()))?;
        self.insert(index, filter)
    }

    /// Remove the stage at `index`, returning its filter.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StageIndex`] for an out-of-range index.
    pub fn remove(&mut self, index: usize) -> Result<StageFilter, PipelineError> {
        let removed = {
            let mut state = self.shared.state();
            state.check_index(index)?;
            let removed = state.stages.remove(index);
            state.invalidate_from(index);
            removed
        };
        self.after_edit();
        Ok(removed.filter)
    }

    /// Move the stage at `from` so it ends up at `to`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StageIndex`] if either index is out of
    /// range.
    pub fn move_stage(&mut self, from: usize, to: usize) -> Result<(), PipelineError> {
        {
            let mut state = self.shared.state();
            state.check_index(from)?;
            state.check_index(to)?;
            if from == to {
                return Ok(());
            }
            let stage = state.stages.remove(from);
            state.stages.insert(to, stage);
            state.invalidate_from(from.min(to));
        }
        self.after_edit();
        Ok(())
    }

    /// Remove every stage.
    pub fn clear(&mut self) {
        {
            let mut state = self.shared.state();
            if state.stages.is_empty() {
                return;
            }
            state.stages.clear();
            state.invalidate_from(0);
        }
        self.after_edit();
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::StageIndex`] for an out-of-range index.
    pub fn bypass(&self, index: usize) -> Result<bool, PipelineError> {
        let state = self.shared.state();
        state.check_index(index)?;
        Ok(state.stages[index].bypass)
    }

    /// Set a stage's bypass flag. Setting the current value is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StageIndex`] for an out-of-range index.
    pub fn set_bypass(&mut self, index: usize, bypass: bool) -> Result<(), PipelineError> {
        {
            let mut state = self.shared.state();
            state.check_index(index)?;
            if state.stages[index].bypass == bypass {
                return Ok(());
            }
            state.stages[index].bypass = bypass;
            state.invalidate_from(index);
        }
        self.after_edit();
        Ok(())
    }

    /// Edit a stage's filter in place and invalidate from that stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StageIndex`] for an out-of-range index
    /// and [`PipelineError::BrokenStage`] for a placeholder.
    pub fn edit_filter<R>(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut dyn ImageFilter) -> R,
    ) -> Result<R, PipelineError> {
        let result = {
            let mut state = self.shared.state();
            state.check_index(index)?;
            let stage = &mut state.stages[index];
            let filter_id = stage.filter.id().to_owned();
            let filter = stage
                .filter
                .as_filter_mut()
                .ok_or(PipelineError::BrokenStage { index, filter_id })?;
            let result = edit(filter);
            state.invalidate_from(index);
            result
        };
        self.after_edit();
        Ok(result)
    }

    /// [`edit_filter`](Self::edit_filter) with a downcast to `T`.
    ///
    /// # Errors
    ///
    /// As `edit_filter`, plus [`PipelineError::FilterType`] when the
    /// stage holds a different filter type.
    pub fn edit_filter_as<T: ImageFilter, R>(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut T) -> R,
    ) -> Result<R, PipelineError> {
        {
            let state = self.shared.state();
            state.check_index(index)?;
            let filter = &state.stages[index].filter;
            match filter.as_filter() {
                None => {
                    return Err(PipelineError::BrokenStage {
                        index,
                        filter_id: filter.id().to_owned(),
                    });
                }
                Some(f) if !f.as_any().is::<T>() => {
                    return Err(PipelineError::FilterType {
                        index,
                        filter_id: f.id().to_owned(),
                    });
                }
                Some(_) => {}
            }
        }
        self.edit_filter(index, |filter| filter.as_any_mut().downcast_mut::<T>().map(edit))?
            .ok_or_else(|| {
                let filter_id = self.stage(index).map(|s| s.filter_id).unwrap_or_default();
                PipelineError::FilterType { index, filter_id }
            })
    }

    /// Read a stage's filter without invalidating anything.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StageIndex`] for an out-of-range index
    /// and [`PipelineError::BrokenStage`] for a placeholder.
    pub fn inspect_filter<R>(
        &self,
        index: usize,
        inspect: impl FnOnce(&dyn ImageFilter) -> R,
    ) -> Result<R, PipelineError> {
        let state = self.shared.state();
        state.check_index(index)?;
        let filter = &state.stages[index].filter;
        filter
            .as_filter()
            .map(inspect)
            .ok_or_else(|| PipelineError::BrokenStage {
                index,
                filter_id: filter.id().to_owned(),
            })
    }

    /// Cancel the run in flight, if any. Caches are left as they are.
    pub fn cancel(&self) {
        self.shared.state().cancel_active();
    }

    /// Start a run from the first stale stage.
    ///
    /// Any run already in flight is cancelled; the most recent request
    /// always wins. When nothing is stale the run completes immediately
    /// with the cached final image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoInputImage`] before an input is set and
    /// [`PipelineError::RunnerStopped`] if the runner is gone.
    pub fn request_recompute(&mut self) -> Result<RunHandle, PipelineError> {
        let (job, handle) = {
            let mut state = self.shared.state();
            let input = state.input.clone().ok_or(PipelineError::NoInputImage)?;
            state.cancel_active();
            let run = RunId::new(self.next_run);
            self.next_run += 1;
            let (start, source) = state.resume_point(&input);
            let stages = state
                .stages
                .iter()
                .enumerate()
                .skip(start)
                .map(|(index, stage)| stage.plan(index))
                .collect();
            let token = CancelToken::new();
            state.active = Some(token.clone());
            log::debug!("run {run} planned from stage {start}");
            Job::new(
                run,
                state.version,
                start,
                state.stages.len(),
                source,
                stages,
                token,
            )
        };
        self.runner.submit(job)?;
        Ok(handle)
    }

    fn after_edit(&mut self) {
        if !self.auto_run || self.shared.state().input.is_none() {
            return;
        }
        if let Err(err) = self.request_recompute() {
            log::warn!("automatic run not started: {err}");
        }
    }

    /// Snapshot the list as a document.
    #[must_use]
    pub fn to_document(&self) -> FilterListDocument {
        let state = self.shared.state();
        FilterListDocument {
            name: self.name.clone(),
            description: self.description.clone(),
            filters: state
                .stages
                .iter()
                .map(|stage| FilterEntry {
                    id: stage.filter.id().to_owned(),
                    bypass: stage.bypass,
                    parameters: stage.filter.parameters(),
                })
                .collect(),
        }
    }

    /// Replace every stage from a document.
    ///
    /// Entries whose id is unknown, or whose parameters the filter
    /// rejects, become broken placeholders that pass their input through
    /// and save back unchanged.
    pub fn load_document(&mut self, document: FilterListDocument) {
        let stages: Vec<(StageFilter, bool)> = document
            .filters
            .into_iter()
            .enumerate()
            .map(|(index, entry)| (self.instantiate(index, entry.id, entry.parameters), entry.bypass))
            .collect();
        {
            let mut state = self.shared.state();
            let version = state.version;
            state.stages = stages
                .into_iter()
                .map(|(filter, bypass)| FilterStage::new(filter, bypass, version))
                .collect();
            state.output = None;
            state.invalidate_from(0);
        }
        self.name = document.name;
        self.description = document.description;
        self.after_edit();
    }

    fn instantiate(
        &self,
        index: usize,
        id: String,
        parameters: ParameterStore,
    ) -> StageFilter {
        let Some(mut filter) = self.registry.create(&id) else {
            log::warn!("stage {index}: unknown filter `{id}`, keeping as broken");
            return StageFilter::Broken {
                reason: format!("unknown filter `{id}`"),
                id,
                parameters,
            };
        };
        match filter.load_parameters(&parameters) {
            Ok(()) => StageFilter::Active(filter),
            Err(err) => {
                log::warn!("stage {index}: `{id}` rejected its parameters: {err}");
                StageFilter::Broken {
                    reason: err.to_string(),
                    id,
                    parameters,
                }
            }
        }
    }

    /// Write the list to an `.ifl` file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_document().to_ifl_string())?;
        log::info!("saved filter list to {}", path.display());
        Ok(())
    }

    /// Replace the list from an `.ifl` file.
    ///
    /// The file is fully parsed before anything changes, so a malformed
    /// file leaves the list untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the file cannot be read and
    /// [`PipelineError::ListFile`] if it is malformed.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let document: FilterListDocument = text.parse()?;
        log::info!(
            "loaded {} filters from {}",
            document.filters.len(),
            path.display()
        );
        self.load_document(document);
        Ok(())
    }
}

impl Drop for FilterList {
    /// Cancels the active run; the `runner` field then joins its thread.
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for FilterList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterList")
            .field("name", &self.name)
            .field("stages", &self.stages())
            .field("auto_run", &self.auto_run)
            .finish_non_exhaustive()
    }
}

fn fingerprint(image: &Image) -> u64 {
    let mut hasher = SipHasher13::new();
    hasher.write_u32(image.width());
    hasher.write_u32(image.height());
    hasher.write(image.as_raw());
    hasher.finish()
}
