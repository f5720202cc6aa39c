//! `cascade-events` — in-process message bus.
//!
//! Routes domain events to registered handlers, injects the dependencies each
//! handler declares, and keeps dispatching the events handlers cause (harvested
//! from the unit of work) until the cascade is drained.

pub mod bus;
pub mod cascade;
pub mod config;
pub mod dependency;
pub mod error;
pub mod handler;
mod memo;

pub use bus::MessageBus;
pub use cascade::{Cascade, CascadeState, CascadeSummary};
pub use config::BusConfig;
pub use dependency::{Dependencies, Dependency, EventCollector};
pub use error::BusError;
pub use handler::{
    EVENT_PARAMETER, EventHandler, FnHandler, Handler, HandlerId, HandlerTable, RegisteredHandler,
};

pub use cascade_core::{Event, EventKind};
