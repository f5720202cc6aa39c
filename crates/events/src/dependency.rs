//! Named, injectable handler dependencies.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use cascade_core::{Event, short_type_name};

use crate::error::BusError;

/// Source of events produced since the last collection.
///
/// Implemented by the unit of work: collection drains the pending events of
/// every aggregate its repositories have seen.
pub trait EventCollector: Send + Sync {
    fn collect_new_events(&self) -> Vec<Box<dyn Event>>;
}

/// A single injectable value.
#[derive(Clone)]
pub struct Dependency {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    collector: Option<Arc<dyn EventCollector>>,
}

impl Dependency {
    fn shared<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            type_name: short_type_name(std::any::type_name::<T>()),
            collector: None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Set when the value was registered as a unit of work.
    pub fn collector(&self) -> Option<&Arc<dyn EventCollector>> {
        self.collector.as_ref()
    }
}

/// Name → shared value map handed to handlers.
///
/// Values are stored behind `Arc`, so cloning a `Dependencies` (and binding a
/// subset of it for a handler) never copies the values themselves.
#[derive(Clone, Default)]
pub struct Dependencies {
    entries: BTreeMap<String, Dependency>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Dependencies::insert`].
    pub fn with<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style [`Dependencies::insert_shared`].
    pub fn with_shared<T: Any + Send + Sync>(
        mut self,
        name: impl Into<String>,
        value: Arc<T>,
    ) -> Self {
        self.insert_shared(name, value);
        self
    }

    /// Builder-style [`Dependencies::insert_unit_of_work`].
    pub fn with_unit_of_work<U>(mut self, name: impl Into<String>, unit_of_work: Arc<U>) -> Self
    where
        U: EventCollector + Any,
    {
        self.insert_unit_of_work(name, unit_of_work);
        self
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.insert_shared(name, Arc::new(value));
    }

    /// Insert a value the caller keeps a handle to.
    pub fn insert_shared<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: Arc<T>) {
        self.entries.insert(name.into(), Dependency::shared(value));
    }

    /// Insert a unit of work.
    ///
    /// Besides being retrievable like any other value, it is the one the bus
    /// collects new events from when registered under the configured
    /// unit-of-work name.
    pub fn insert_unit_of_work<U>(&mut self, name: impl Into<String>, unit_of_work: Arc<U>)
    where
        U: EventCollector + Any,
    {
        let collector: Arc<dyn EventCollector> = unit_of_work.clone();
        let mut dependency = Dependency::shared(unit_of_work);
        dependency.collector = Some(collector);
        self.entries.insert(name.into(), dependency);
    }

    /// Typed lookup; `None` if absent or of a different type.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name)?.value.clone().downcast::<T>().ok()
    }

    /// Typed lookup that explains what went wrong.
    pub fn require<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, BusError> {
        let dependency = self
            .entries
            .get(name)
            .ok_or_else(|| BusError::MissingDependency {
                name: name.to_string(),
            })?;

        dependency
            .value
            .clone()
            .downcast::<T>()
            .map_err(|_| BusError::DependencyType {
                name: name.to_string(),
                expected: short_type_name(std::any::type_name::<T>()),
            })
    }

    pub fn dependency(&self, name: &str) -> Option<&Dependency> {
        self.entries.get(name)
    }

    /// Event collector registered under `name`, if that entry is a unit of work.
    pub fn collector(&self, name: &str) -> Option<Arc<dyn EventCollector>> {
        self.entries.get(name)?.collector.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The sorted names as one shared list.
    pub fn name_set(&self) -> Arc<[String]> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add every entry of `other`, replacing entries with the same name.
    pub fn extend(&mut self, other: Dependencies) {
        self.entries.extend(other.entries);
    }

    /// `self` overlaid with `overrides` (overrides win on name clashes).
    pub fn merged(&self, overrides: &Dependencies) -> Dependencies {
        let mut merged = self.clone();
        merged.extend(overrides.clone());
        merged
    }

    /// Only the named entries that are present.
    pub fn select<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Dependencies {
        let entries = names
            .into_iter()
            .filter_map(|name| {
                self.entries
                    .get_key_value(name)
                    .map(|(k, v)| (k.clone(), v.clone()))
            })
            .collect();
        Dependencies { entries }
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v.type_name)))
            .finish()
    }
}
