//! The filter abstraction, its parameter store, and the id registry.
//!
//! A filter is a pure image transform with a flat, string-keyed
//! parameter set. Parameters round-trip through a [`ParameterStore`],
//! which is also how filter-list files persist them.
//!
//! Filters are created by id through a [`FilterRegistry`]. The registry
//! is an explicit value handed to each [`FilterList`](crate::FilterList),
//! so tests can register their own fakes alongside the built-ins.

use std::any::Any;
use std::collections::BTreeMap;

use rand::RngCore;

use crate::types::Image;

/// Errors a filter can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// A stored parameter value could not be accepted.
    #[error("invalid value {value:?} for parameter `{key}`: {reason}")]
    InvalidParameter {
        /// Parameter key.
        key: String,
        /// Raw stored value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Processing failed.
    #[error("{0}")]
    Processing(String),
}

impl FilterError {
    /// Shorthand for [`FilterError::InvalidParameter`].
    pub fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            key: key.to_owned(),
            value: value.to_owned(),
            reason: reason.into(),
        }
    }
}

/// A pure image transform.
///
/// `process` must not mutate the filter, so a cloned filter can run on
/// the background runner while the original is edited.
pub trait ImageFilter: Send + 'static {
    /// Stable identifier, such as `tonestack.filter.curves`.
    fn id(&self) -> &str;

    /// Produce the filtered image. The output has the input's dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Processing`] when the transform cannot be
    /// applied.
    fn process(&self, image: &Image) -> Result<Image, FilterError>;

    /// Replace parameters from `store`. Missing keys take defaults.
    ///
    /// Implementations must leave the filter untouched on error.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidParameter`] for a value that fails
    /// to parse or validate.
    fn load_parameters(&mut self, store: &ParameterStore) -> Result<(), FilterError>;

    /// Write every parameter into `store`.
    fn save_parameters(&self, store: &mut ParameterStore);

    /// Independent deep copy.
    fn clone_filter(&self) -> Box<dyn ImageFilter>;

    /// Replace parameters with random but valid values.
    fn randomize_parameters(&mut self, rng: &mut dyn RngCore);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn ImageFilter> {
    fn clone(&self) -> Self {
        self.clone_filter()
    }
}

/// Ordered string key/value parameters.
///
/// Keys keep first-insertion order so saved files list parameters the
/// way the filter wrote them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterStore {
    entries: Vec<(String, String)>,
}

impl ParameterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key`, replacing an existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Parse a boolean (`true`/`false`, also `1`/`0`).
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidParameter`] for any other value.
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, FilterError> {
        self.get(key).map_or(Ok(default), |value| {
            parse_bool(value).ok_or_else(|| FilterError::invalid(key, value, "expected a boolean"))
        })
    }

    /// Parse a finite number.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidParameter`] for anything else.
    pub fn get_f64(&self, key: &str, default: f64) -> Result<f64, FilterError> {
        self.get(key).map_or(Ok(default), |value| {
            value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| FilterError::invalid(key, value, "expected a number"))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut store = Self::new();
        for (k, v) in iter {
            store.set(k, v);
        }
        store
    }
}

/// Parse the boolean spellings parameter files use.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Display metadata for a registered filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterInfo {
    /// Short human-readable name.
    pub name: String,
    /// One-line description.
    pub description: String,
}

impl FilterInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Constructor for a filter with default parameters.
pub type FilterFactory = fn() -> Box<dyn ImageFilter>;

#[derive(Debug, Clone)]
struct RegistryEntry {
    info: FilterInfo,
    factory: FilterFactory,
}

/// Maps filter ids to constructors and metadata.
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl FilterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filter. A later registration under the same id wins.
    pub fn register(&mut self, id: impl Into<String>, info: FilterInfo, factory: FilterFactory) {
        let id = id.into();
        if self
            .entries
            .insert(id.clone(), RegistryEntry { info, factory })
            .is_some()
        {
            log::debug!("filter `{id}` re-registered");
        }
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, id: impl Into<String>, info: FilterInfo, factory: FilterFactory) -> Self {
        self.register(id, info, factory);
        self
    }

    /// A new filter with default parameters.
    #[must_use]
    pub fn create(&self, id: &str) -> Option<Box<dyn ImageFilter>> {
        self.entries.get(id).map(|entry| (entry.factory)())
    }

    #[must_use]
    pub fn info(&self, id: &str) -> Option<&FilterInfo> {
        self.entries.get(id).map(|entry| &entry.info)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
