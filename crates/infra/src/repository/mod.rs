//! Repositories: persistence access that remembers which aggregates it saw.
//!
//! Every aggregate passed to `add`/`update`, and every aggregate `get` or
//! `modify` loads, is tracked. The unit of work drains the pending events of
//! tracked aggregates to feed the message bus.
//!
//! Tracking takes ownership: a tracked aggregate keeps its pending events
//! until they are drained. Content-equal aggregates are tracked once; when an
//! equal aggregate arrives again, its pending events are moved onto the one
//! already tracked. Aggregates whose events have all been drained are
//! released when the unit of work opens its next scope.

pub mod in_memory;
pub mod r#trait;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use cascade_core::{AggregateRoot, Entity, Event, EventBuffer};

pub use in_memory::InMemoryRepository;
pub use r#trait::{ErasedEntity, RepositoryBackend, RepositoryError, TrackedRepository};

/// Tracked aggregates in tracking order, indexed by content hash.
struct SeenSet<A> {
    entries: Vec<A>,
    by_hash: HashMap<u64, Vec<usize>>,
}

impl<A: AggregateRoot> SeenSet<A> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_hash: HashMap::new(),
        }
    }

    fn position(&self, entity: &A) -> Option<usize> {
        self.by_hash
            .get(&entity.content_hash())?
            .iter()
            .copied()
            .find(|&index| self.entries[index] == *entity)
    }

    fn track(&mut self, mut entity: A) -> usize {
        if let Some(index) = self.position(&entity) {
            self.entries[index].events_mut().absorb(entity.events_mut());
            return index;
        }

        let index = self.entries.len();
        self.by_hash
            .entry(entity.content_hash())
            .or_default()
            .push(index);
        self.entries.push(entity);
        index
    }

    /// Swap in the changed state of the entry at `index`. Events it already
    /// had stay ahead of the ones raised by the change.
    fn replace(&mut self, index: usize, mut changed: A) {
        let previous = &mut self.entries[index];
        let old_hash = previous.content_hash();

        let mut pending = EventBuffer::new();
        pending.absorb(previous.events_mut());
        pending.absorb(changed.events_mut());
        *changed.events_mut() = pending;

        if let Some(slots) = self.by_hash.get_mut(&old_hash) {
            slots.retain(|&slot| slot != index);
            if slots.is_empty() {
                self.by_hash.remove(&old_hash);
            }
        }
        self.by_hash
            .entry(changed.content_hash())
            .or_default()
            .push(index);
        self.entries[index] = changed;
    }

    fn release_settled(&mut self) {
        self.entries.retain(|entity| entity.has_pending_events());
        self.by_hash.clear();
        for (index, entity) in self.entries.iter().enumerate() {
            self.by_hash
                .entry(entity.content_hash())
                .or_default()
                .push(index);
        }
    }
}

pub struct Repository<B: RepositoryBackend> {
    backend: B,
    seen: Mutex<SeenSet<B::Entity>>,
}

impl<B: RepositoryBackend> Repository<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            seen: Mutex::new(SeenSet::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn add(&self, entity: B::Entity) -> Result<(), RepositoryError> {
        self.backend
            .add(&entity)
            .await
            .map_err(RepositoryError::Backend)?;
        self.lock_seen().track(entity);
        Ok(())
    }

    /// Load an aggregate for reading. A found aggregate is tracked and a
    /// snapshot returned; events raised on the snapshot are not collected.
    /// Use [`Repository::modify`] to change it.
    pub async fn get(&self, key: &B::Key) -> Result<Option<B::Entity>, RepositoryError> {
        let found = self
            .backend
            .get(key)
            .await
            .map_err(RepositoryError::Backend)?;

        Ok(found.map(|entity| {
            let mut seen = self.lock_seen();
            let index = seen.track(entity);
            seen.entries[index].clone()
        }))
    }

    /// Load the aggregate under `key`, apply `change` to it and store it.
    ///
    /// The change lands on the tracked aggregate, so the events it raises
    /// are collected with the rest. Returns `Ok(None)` when nothing is stored
    /// under `key`. When `change` fails nothing is stored or tracked beyond
    /// the load.
    ///
    /// ```ignore
    /// uow.repository::<Buildings>("buildings")?
    ///     .modify(&event.building, |building| -> anyhow::Result<()> {
    ///         building.lease(&event.suite)?;
    ///         Ok(())
    ///     })
    ///     .await?;
    /// ```
    pub async fn modify<R, E, F>(&self, key: &B::Key, change: F) -> Result<Option<R>, E>
    where
        F: FnOnce(&mut B::Entity) -> Result<R, E>,
        E: From<RepositoryError>,
    {
        let Some(loaded) = self
            .backend
            .get(key)
            .await
            .map_err(RepositoryError::Backend)?
        else {
            return Ok(None);
        };

        let (index, before) = {
            let mut seen = self.lock_seen();
            let index = seen.track(loaded);
            (index, seen.entries[index].clone())
        };

        let mut working = before.clone();
        let outcome = change(&mut working)?;
        self.backend
            .update(&working)
            .await
            .map_err(RepositoryError::Backend)?;

        let mut seen = self.lock_seen();
        if seen.entries.get(index) == Some(&before) {
            seen.replace(index, working);
        } else {
            // The scope moved on while the change was being stored.
            seen.track(working);
        }
        Ok(Some(outcome))
    }

    pub async fn update(&self, entity: B::Entity) -> Result<(), RepositoryError> {
        self.backend
            .update(&entity)
            .await
            .map_err(RepositoryError::Backend)?;
        self.lock_seen().track(entity);
        Ok(())
    }

    pub fn seen_count(&self) -> usize {
        self.lock_seen().entries.len()
    }

    /// Whether an aggregate equal to `entity` is tracked.
    pub fn is_tracked(&self, entity: &B::Entity) -> bool {
        self.lock_seen().position(entity).is_some()
    }

    pub fn drain_events(&self) -> Vec<Box<dyn Event>> {
        self.lock_seen()
            .entries
            .iter_mut()
            .flat_map(|entity| entity.drain_events())
            .collect()
    }

    /// Forget tracked aggregates that have no pending events left.
    pub fn release_settled(&self) {
        self.lock_seen().release_settled();
    }

    fn lock_seen(&self) -> MutexGuard<'_, SeenSet<B::Entity>> {
        // Tracking never leaves the set half-updated.
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: RepositoryBackend> fmt::Debug for Repository<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Repository, entity_type={}>", B::Entity::type_name())
    }
}

#[async_trait]
impl<B: RepositoryBackend> TrackedRepository for Repository<B> {
    fn entity_type(&self) -> &'static str {
        B::Entity::type_name()
    }

    fn seen_count(&self) -> usize {
        Repository::seen_count(self)
    }

    fn drain_events(&self) -> Vec<Box<dyn Event>> {
        Repository::drain_events(self)
    }

    fn release_settled(&self) {
        Repository::release_settled(self)
    }

    async fn add_any(&self, entity: ErasedEntity) -> Result<(), RepositoryError> {
        self.add(entity.downcast()?).await
    }

    async fn update_any(&self, entity: ErasedEntity) -> Result<(), RepositoryError> {
        self.update(entity.downcast()?).await
    }
}
