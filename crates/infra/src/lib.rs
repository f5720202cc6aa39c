//! Infrastructure layer: repositories and the unit of work.
//!
//! Repositories track the aggregates handlers touch; the unit of work groups
//! them behind a transaction and hands their new events to the message bus.

pub mod repository;
pub mod unit_of_work;


pub use repository::{
    ErasedEntity, InMemoryRepository, Repository, RepositoryBackend, RepositoryError,
    TrackedRepository,
};
pub use unit_of_work::{
    InMemoryTransaction, Transaction, UnitOfWork, UnitOfWorkBuilder, UnitOfWorkError,
};
