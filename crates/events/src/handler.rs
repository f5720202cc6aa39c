//! Event handlers and the registration table the bus dispatches from.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use cascade_core::{Event, EventKind, short_type_name};

use crate::dependency::Dependencies;

/// Parameter name reserved for the event itself; never bound from dependencies.
pub const EVENT_PARAMETER: &str = "event";

/// Type-erased handler, as stored by the bus.
///
/// Most code implements [`EventHandler`] instead and lets the table adapt it.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    /// Names of the dependencies this handler consumes.
    ///
    /// Names that are not available at dispatch time are left out of the
    /// map the handler receives.
    fn dependencies(&self) -> &[&'static str] {
        &[]
    }

    async fn handle(&self, event: &dyn Event, deps: &Dependencies) -> anyhow::Result<()>;
}

/// Handler for events of type `E`.
///
/// When registered for a supertype, it receives the supertype view of the
/// dispatched event.
///
/// ```ignore
/// struct UpdateLog;
///
/// #[async_trait]
/// impl EventHandler<Received> for UpdateLog {
///     fn dependencies(&self) -> &'static [&'static str] {
///         &["log"]
///     }
///
///     async fn handle(&self, event: &Received, deps: &Dependencies) -> anyhow::Result<()> {
///         let log = deps.require::<TelemetryLog>("log")?;
///         log.record(&event.message);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync + 'static {
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    async fn handle(&self, event: &E, deps: &Dependencies) -> anyhow::Result<()>;
}

struct Typed<E, H> {
    handler: H,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, H> Handler for Typed<E, H>
where
    E: Event,
    H: EventHandler<E>,
{
    fn name(&self) -> &str {
        self.handler.name()
    }

    fn dependencies(&self) -> &[&'static str] {
        self.handler.dependencies()
    }

    async fn handle(&self, event: &dyn Event, deps: &Dependencies) -> anyhow::Result<()> {
        let Some(typed) = event.view::<E>() else {
            anyhow::bail!(
                "{} cannot be viewed as {}",
                event.kind(),
                EventKind::of::<E>()
            );
        };
        self.handler.handle(typed, deps).await
    }
}

/// Handler built from an async closure.
///
/// The closure gets its own copy of the event and of the bound dependency map
/// so the returned future can be `'static`.
pub struct FnHandler<E, F> {
    name: String,
    dependencies: &'static [&'static str],
    f: F,
    _event: PhantomData<fn() -> E>,
}

impl<E, F> FnHandler<E, F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            dependencies: &[],
            f,
            _event: PhantomData,
        }
    }

    pub fn with_dependencies(mut self, dependencies: &'static [&'static str]) -> Self {
        self.dependencies = dependencies;
        self
    }
}

#[async_trait]
impl<E, F, Fut> EventHandler<E> for FnHandler<E, F>
where
    E: Event + Clone,
    F: Fn(E, Dependencies) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &'static [&'static str] {
        self.dependencies
    }

    async fn handle(&self, event: &E, deps: &Dependencies) -> anyhow::Result<()> {
        (self.f)(event.clone(), deps.clone()).await
    }
}

/// Registration identity, assigned in registration order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(usize);

impl HandlerId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Clone)]
pub struct RegisteredHandler {
    id: HandlerId,
    handler: Arc<dyn Handler>,
}

impl RegisteredHandler {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.handler.name()
    }

    pub fn dependencies(&self) -> &[&'static str] {
        self.handler.dependencies()
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }
}

impl fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}

/// Event kind → handlers, in registration order.
#[derive(Clone, Default)]
pub struct HandlerTable {
    entries: HashMap<EventKind, Vec<RegisteredHandler>>,
    next_id: usize,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for `E`.
    pub fn on<E: Event>(&mut self, handler: impl EventHandler<E>) -> HandlerId {
        self.register(
            EventKind::of::<E>(),
            Arc::new(Typed {
                handler,
                _event: PhantomData,
            }),
        )
    }

    /// Builder-style [`HandlerTable::on`].
    pub fn with<E: Event>(mut self, handler: impl EventHandler<E>) -> Self {
        self.on(handler);
        self
    }

    /// Register an async closure for `E`.
    pub fn on_fn<E, F, Fut>(
        &mut self,
        name: impl Into<String>,
        dependencies: &'static [&'static str],
        f: F,
    ) -> HandlerId
    where
        E: Event + Clone,
        F: Fn(E, Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on::<E>(FnHandler::new(name, f).with_dependencies(dependencies))
    }

    /// Register an already erased handler under `kind`.
    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn Handler>) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.entries
            .entry(kind)
            .or_default()
            .push(RegisteredHandler { id, handler });
        id
    }

    /// Handlers registered for exactly `kind`.
    pub fn get(&self, kind: &EventKind) -> Option<&[RegisteredHandler]> {
        self.entries
            .get(kind)
            .map(Vec::as_slice)
            .filter(|handlers| !handlers.is_empty())
    }

    pub fn kinds(&self) -> impl Iterator<Item = &EventKind> {
        self.entries.keys()
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.next_id
    }

    pub fn is_empty(&self) -> bool {
        self.next_id == 0
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(kind, handlers)| (kind.name(), handlers)),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Received {
        message: String,
    }

    impl Event for Received {}

    #[derive(Debug, Clone, PartialEq)]
    struct Echoed(Received);

    impl Event for Echoed {
        fn supertypes(&self) -> Vec<&dyn Event> {
            vec![&self.0]
        }
    }

    struct Persist;

    #[async_trait]
    impl EventHandler<Received> for Persist {
        fn dependencies(&self) -> &'static [&'static str] {
            &["uow"]
        }

        async fn handle(&self, event: &Received, _deps: &Dependencies) -> anyhow::Result<()> {
            anyhow::ensure!(!event.message.is_empty(), "empty message");
            Ok(())
        }
    }

    #[test]
    fn registration_keeps_order_and_assigns_ids() {
        let mut table = HandlerTable::new();
        let first = table.on(Persist);
        let second = table.on_fn("update_log", &["log"], |_: Received, _| async { Ok(()) });

        let handlers = table.get(&EventKind::of::<Received>()).unwrap();
        let names: Vec<_> = handlers.iter().map(RegisteredHandler::name).collect();

        assert_eq!(names, vec!["Persist", "update_log"]);
        assert_eq!(handlers[0].id(), first);
        assert_eq!(handlers[1].id(), second);
        assert!(first < second);
        assert_eq!(handlers[1].dependencies(), &["log"]);
        assert_eq!(table.len(), 2);
        assert!(table.get(&EventKind::of::<Echoed>()).is_none());
    }

    #[tokio::test]
    async fn typed_handler_receives_supertype_view() {
        let table = HandlerTable::new().with(Persist);
        let handler = table.get(&EventKind::of::<Received>()).unwrap()[0].clone();

        let echoed = Echoed(Received {
            message: "hi".into(),
        });
        let empty = Echoed(Received {
            message: String::new(),
        });

        assert!(handler.handler().handle(&echoed, &Dependencies::new()).await.is_ok());
        let err = handler
            .handler()
            .handle(&empty, &Dependencies::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "empty message");
    }

    #[tokio::test]
    async fn typed_handler_rejects_unrelated_events() {
        #[derive(Debug)]
        struct Other;
        impl Event for Other {}

        let table = HandlerTable::new().with(Persist);
        let handler = table.get(&EventKind::of::<Received>()).unwrap()[0].clone();

        let err = handler
            .handler()
            .handle(&Other, &Dependencies::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Other cannot be viewed as Received");
    }
}
