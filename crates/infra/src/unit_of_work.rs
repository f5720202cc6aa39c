//! Unit of work: a transactional scope over a fixed set of named repositories.
//!
//! ## Lifecycle
//!
//! - built once from a [`UnitOfWorkBuilder`]; names are validated then
//! - repositories are instantiated on the first [`UnitOfWork::enter`] and
//!   kept for the lifetime of the unit of work (later scopes reuse them)
//! - every `enter` releases the aggregates whose events were already
//!   collected, so a repository only holds what the current scope touched
//!   plus what is still waiting to be collected
//! - [`UnitOfWork::exit`] rolls back unless [`UnitOfWork::commit`] was
//!   called since the last `enter`
//!
//! [`UnitOfWork::run`] wraps a scope body in `enter`/`exit`, so the
//! rollback happens whether or not the body succeeds.
//!
//! ## Event collection
//!
//! [`UnitOfWork::collect_new_events`] drains every aggregate the repositories
//! have seen: repositories in declaration order, aggregates in tracking
//! order, events in emission order.

use std::fmt;
use std::future::Future;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use cascade_core::{AggregateRoot, AsAny, Event, short_type_name};
use cascade_events::EventCollector;

use crate::repository::{
    ErasedEntity, Repository, RepositoryBackend, RepositoryError, TrackedRepository,
};

#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    #[error("{unit_of_work} does not have '{name}' repository")]
    MissingRepository { unit_of_work: String, name: String },

    #[error("{unit_of_work} declares '{name}' repository more than once")]
    DuplicateRepository { unit_of_work: String, name: String },

    #[error("'{name}' repository is not a {expected}")]
    RepositoryType { name: String, expected: &'static str },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("transaction failed: {0}")]
    Transaction(#[source] anyhow::Error),
}

/// Commit/rollback of whatever the repositories buffered.
#[async_trait]
pub trait Transaction: Send + Sync + 'static {
    async fn commit(&self) -> anyhow::Result<()>;

    /// Must succeed when there is nothing to roll back.
    async fn rollback(&self) -> anyhow::Result<()>;
}

/// Transaction that only counts calls. Clones share the counters.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransaction {
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
}

impl InMemoryTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(&self) -> anyhow::Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> anyhow::Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type RepositoryFactory = Box<dyn Fn() -> Box<dyn TrackedRepository> + Send + Sync>;

/// Declares the repositories of a unit of work.
///
/// ```ignore
/// let uow = UnitOfWorkBuilder::new("PropertyUnitOfWork")
///     .repository("buildings", || InMemoryRepository::new(|b: &Building| b.id))
///     .repository("tenants", || InMemoryRepository::new(|t: &Tenant| t.id))
///     .build(InMemoryTransaction::new())?;
/// ```
pub struct UnitOfWorkBuilder {
    name: String,
    declarations: Vec<(String, RepositoryFactory)>,
}

impl UnitOfWorkBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declarations: Vec::new(),
        }
    }

    /// Declare a repository; `backend` runs once, on first scope entry.
    pub fn repository<B, F>(mut self, name: impl Into<String>, backend: F) -> Self
    where
        B: RepositoryBackend,
        F: Fn() -> B + Send + Sync + 'static,
    {
        let factory: RepositoryFactory = Box::new(move || -> Box<dyn TrackedRepository> {
            Box::new(Repository::new(backend()))
        });
        self.declarations.push((name.into(), factory));
        self
    }

    pub fn build<T: Transaction>(self, transaction: T) -> Result<UnitOfWork<T>, UnitOfWorkError> {
        for (i, (name, _)) in self.declarations.iter().enumerate() {
            if self.declarations[..i].iter().any(|(earlier, _)| earlier == name) {
                return Err(UnitOfWorkError::DuplicateRepository {
                    unit_of_work: self.name,
                    name: name.clone(),
                });
            }
        }

        Ok(UnitOfWork {
            name: self.name,
            declarations: self.declarations,
            repositories: OnceLock::new(),
            transaction,
            entered: AtomicBool::new(false),
            committed: AtomicBool::new(false),
        })
    }
}

pub struct UnitOfWork<T> {
    name: String,
    declarations: Vec<(String, RepositoryFactory)>,
    repositories: OnceLock<Vec<(String, Box<dyn TrackedRepository>)>>,
    transaction: T,
    entered: AtomicBool,
    committed: AtomicBool,
}

impl<T: Transaction> UnitOfWork<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transaction(&self) -> &T {
        &self.transaction
    }

    /// Declared repository names, in declaration order.
    pub fn repository_names(&self) -> impl Iterator<Item = &str> {
        self.declarations.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }

    /// Open a scope. Idempotent; repositories are created on the first call.
    pub fn enter(&self) {
        let repositories = self.repositories.get_or_init(|| {
            tracing::debug!(unit_of_work = %self.name, "instantiating repositories");
            self.declarations
                .iter()
                .map(|(name, factory)| (name.clone(), factory()))
                .collect()
        });
        for (_, repository) in repositories {
            repository.release_settled();
        }
        self.committed.store(false, Ordering::SeqCst);
        self.entered.store(true, Ordering::SeqCst);
        tracing::debug!(unit_of_work = %self.name, "entered");
    }

    /// Close the scope, rolling back unless a commit happened since `enter`.
    ///
    /// Safe to call without a matching `enter`.
    pub async fn exit(&self) -> Result<(), UnitOfWorkError> {
        self.entered.store(false, Ordering::SeqCst);
        if self.committed.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.rollback().await
    }

    pub async fn commit(&self) -> Result<(), UnitOfWorkError> {
        self.transaction
            .commit()
            .await
            .map_err(UnitOfWorkError::Transaction)?;
        self.committed.store(true, Ordering::SeqCst);
        tracing::debug!(unit_of_work = %self.name, "committed");
        Ok(())
    }

    pub async fn rollback(&self) -> Result<(), UnitOfWorkError> {
        tracing::debug!(unit_of_work = %self.name, "rolling back");
        self.transaction
            .rollback()
            .await
            .map_err(UnitOfWorkError::Transaction)
    }

    /// Run `body` inside a scope.
    ///
    /// ```ignore
    /// uow.run(|| async {
    ///     uow.add("telemetry", Telemetry::new(&event.message)).await?;
    ///     uow.commit().await?;
    ///     Ok(())
    /// })
    /// .await?;
    /// ```
    pub async fn run<F, Fut, R>(&self, body: F) -> anyhow::Result<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        self.enter();
        let outcome = body().await;
        if let Err(err) = &outcome {
            tracing::warn!(unit_of_work = %self.name, error = %err, "scope failed");
        }

        let exited = self.exit().await;
        let value = outcome?;
        exited?;
        Ok(value)
    }

    /// Typed access to a declared repository.
    pub fn repository<B: RepositoryBackend>(
        &self,
        name: &str,
    ) -> Result<&Repository<B>, UnitOfWorkError> {
        let tracked = self.tracked(name)?;
        AsAny::as_any(tracked)
            .downcast_ref::<Repository<B>>()
            .ok_or_else(|| UnitOfWorkError::RepositoryType {
                name: name.to_string(),
                expected: short_type_name(std::any::type_name::<B>()),
            })
    }

    /// Add `entity` through the repository declared as `name`.
    pub async fn add<A: AggregateRoot>(&self, name: &str, entity: A) -> Result<(), UnitOfWorkError> {
        self.tracked(name)?
            .add_any(ErasedEntity::new(entity))
            .await?;
        Ok(())
    }

    /// Update `entity` through the repository declared as `name`.
    pub async fn update<A: AggregateRoot>(
        &self,
        name: &str,
        entity: A,
    ) -> Result<(), UnitOfWorkError> {
        self.tracked(name)?
            .update_any(ErasedEntity::new(entity))
            .await?;
        Ok(())
    }

    pub fn collect_new_events(&self) -> Vec<Box<dyn Event>> {
        let Some(repositories) = self.repositories.get() else {
            return Vec::new();
        };

        let events: Vec<_> = repositories
            .iter()
            .flat_map(|(_, repository)| repository.drain_events())
            .collect();
        if !events.is_empty() {
            tracing::trace!(unit_of_work = %self.name, count = events.len(), "collected new events");
        }
        events
    }

    /// Before the first `enter` no repository exists, declared or not.
    fn tracked(&self, name: &str) -> Result<&dyn TrackedRepository, UnitOfWorkError> {
        self.repositories
            .get()
            .and_then(|repositories| repositories.iter().find(|(n, _)| n == name))
            .map(|(_, repository)| &**repository)
            .ok_or_else(|| UnitOfWorkError::MissingRepository {
                unit_of_work: self.name.clone(),
                name: name.to_string(),
            })
    }
}

impl<T: Transaction> EventCollector for UnitOfWork<T> {
    fn collect_new_events(&self) -> Vec<Box<dyn Event>> {
        UnitOfWork::collect_new_events(self)
    }
}

/// `<Name, repositories=[...]>`; the list stays empty until the first `enter`.
impl<T> fmt::Display for UnitOfWork<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entity_types: Vec<&str> = self
            .repositories
            .get()
            .map(|repositories| {
                repositories
                    .iter()
                    .map(|(_, repository)| repository.entity_type())
                    .collect()
            })
            .unwrap_or_default();

        write!(f, "<{}, repositories=[", self.name)?;
        for (i, entity_type) in entity_types.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "<Repository, entity_type={entity_type}>")?;
        }
        f.write_str("]>")
    }
}

impl<T> fmt::Debug for UnitOfWork<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Units of work are equal when they render the same.
impl<T> PartialEq for UnitOfWork<T> {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
