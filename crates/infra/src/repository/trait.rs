use std::any::Any;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use cascade_core::{AggregateRoot, Entity, Event};

/// Repository operation error.
///
/// - `TypeMismatch`: an entity was routed to a repository bound to another type
/// - `Backend`: the storage backend failed
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("expecting entity of type {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("repository backend failed: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Storage behind a [`Repository`](super::Repository).
///
/// The backend owns persistence only; tracking of the aggregates that pass
/// through it is the repository's job. Binding `Entity` to
/// [`AggregateRoot`] means a backend for a type that cannot raise events
/// does not compile.
#[async_trait]
pub trait RepositoryBackend: Send + Sync + 'static {
    type Entity: AggregateRoot;
    type Key: Send + Sync;

    async fn add(&self, entity: &Self::Entity) -> anyhow::Result<()>;

    async fn get(&self, key: &Self::Key) -> anyhow::Result<Option<Self::Entity>>;

    async fn update(&self, entity: &Self::Entity) -> anyhow::Result<()>;
}

/// An aggregate with its static type erased, on its way to a named repository.
pub struct ErasedEntity {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl ErasedEntity {
    pub fn new<A: AggregateRoot>(entity: A) -> Self {
        Self {
            value: Box::new(entity),
            type_name: A::type_name(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recover the entity if it is exactly an `A`.
    pub fn downcast<A: AggregateRoot>(self) -> Result<A, RepositoryError> {
        let found = self.type_name;
        self.value
            .downcast::<A>()
            .map(|entity| *entity)
            .map_err(|_| RepositoryError::TypeMismatch {
                expected: A::type_name(),
                found,
            })
    }
}

impl fmt::Debug for ErasedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErasedEntity").field(&self.type_name).finish()
    }
}

/// Object-safe view of a repository, as held by a unit of work.
///
/// Entities routed through `add_any`/`update_any` are checked against the
/// repository's entity type at runtime: the type must match exactly.
#[async_trait]
pub trait TrackedRepository: cascade_core::AsAny + Send + Sync {
    fn entity_type(&self) -> &'static str;

    /// Number of distinct aggregates tracked so far.
    fn seen_count(&self) -> usize;

    /// Drain the pending events of every tracked aggregate, in tracking order.
    fn drain_events(&self) -> Vec<Box<dyn Event>>;

    /// Forget tracked aggregates that have no pending events left.
    fn release_settled(&self);

    async fn add_any(&self, entity: ErasedEntity) -> Result<(), RepositoryError>;

    async fn update_any(&self, entity: ErasedEntity) -> Result<(), RepositoryError>;
}
