use thiserror::Error;

/// Message bus error.
///
/// - `NoHandler` aborts the dispatch call (strict mode only)
/// - `Handler` wraps whatever a handler returned; the rest of the queue is dropped
/// - `MissingDependency` / `DependencyType` come from [`Dependencies::require`](crate::Dependencies::require),
///   typically inside a handler body
#[derive(Debug, Error)]
pub enum BusError {
    #[error("no handlers found for {event_type}")]
    NoHandler { event_type: &'static str },

    #[error("handler {handler} failed while handling {event_type}: {source}")]
    Handler {
        handler: String,
        event_type: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("dependency {name:?} was not provided")]
    MissingDependency { name: String },

    #[error("dependency {name:?} is not a {expected}")]
    DependencyType { name: String, expected: &'static str },
}
