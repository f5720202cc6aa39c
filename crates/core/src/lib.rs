//! `cascade-core` — domain building blocks for event-emitting models.
//!
//! This crate contains **pure domain** primitives: events, entities, aggregate
//! roots and the value model entities expose. Dispatching lives in
//! `cascade-events`; persistence tracking lives in `cascade-infra`.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod event;
pub mod value;

pub use aggregate::{AggregateRoot, EventBuffer};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, SerializationError};
pub use event::{AsAny, Event, EventKind, short_type_name};
pub use value::{CustomValue, DefaultValueSerializer, FieldMap, FieldValue, ValueSerializer};
