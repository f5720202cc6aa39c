//! In-process message bus with cascading dispatch.
//!
//! ## Dispatch
//!
//! A dispatch call owns a FIFO [`Cascade`] seeded with the initial event. For
//! each event taken off the queue the bus:
//!
//! 1. resolves its handlers (exact kind first, then each direct supertype in
//!    declaration order)
//! 2. runs them one at a time, in registration order, each with only the
//!    dependencies it declared
//! 3. after every handler, drains the unit of work registered under
//!    [`BusConfig::unit_of_work_name`] (if any) and appends the new events to
//!    the back of the queue
//!
//! The call returns once the queue is empty. Nothing bounds the depth of a
//! cascade: handlers that keep raising the events they handle never finish.
//!
//! ## Failure
//!
//! A missing handler (strict mode) or a failing handler aborts the call;
//! events still queued are dropped. There are no retries.

use std::sync::Arc;

use cascade_core::{Event, EventKind};

use crate::cascade::{Cascade, CascadeSummary};
use crate::config::BusConfig;
use crate::dependency::Dependencies;
use crate::error::BusError;
use crate::handler::{EVENT_PARAMETER, HandlerId, HandlerTable, RegisteredHandler};
use crate::memo::Memo;

pub struct MessageBus {
    handlers: HandlerTable,
    dependencies: Dependencies,
    config: BusConfig,
    resolutions: Memo<EventKind, Option<Arc<[RegisteredHandler]>>>,
    bindings: Memo<(HandlerId, Arc<[String]>), Arc<[String]>>,
}

impl MessageBus {
    pub fn new(handlers: HandlerTable, dependencies: Dependencies) -> Self {
        Self::with_config(handlers, dependencies, BusConfig::default())
    }

    pub fn with_config(
        handlers: HandlerTable,
        dependencies: Dependencies,
        config: BusConfig,
    ) -> Self {
        Self {
            resolutions: Memo::new(config.cache_size),
            bindings: Memo::new(config.cache_size),
            handlers,
            dependencies,
            config,
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Base dependencies every handler can draw from.
    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Add base dependencies; entries replace existing ones with the same name.
    pub fn add_dependencies(&mut self, dependencies: Dependencies) {
        self.dependencies.extend(dependencies);
    }

    /// Handlers for `event`, in the order they run.
    pub fn resolve(&self, event: &dyn Event) -> Result<Arc<[RegisteredHandler]>, BusError> {
        let kind = event.kind();
        self.resolutions
            .get_or_insert_with(kind, || self.lookup(kind, event))
            .ok_or(BusError::NoHandler {
                event_type: kind.name(),
            })
    }

    fn lookup(&self, kind: EventKind, event: &dyn Event) -> Option<Arc<[RegisteredHandler]>> {
        if let Some(handlers) = self.handlers.get(&kind) {
            return Some(Arc::from(handlers));
        }

        // Direct supertypes only.
        event
            .supertype_kinds()
            .iter()
            .find_map(|parent| self.handlers.get(parent))
            .map(Arc::from)
    }

    /// The part of `available` that `handler` declared.
    pub fn bind(&self, handler: &RegisteredHandler, available: &Dependencies) -> Dependencies {
        let bound = self.bound_names(handler, &available.name_set());
        available.select(bound.iter().map(String::as_str))
    }

    fn bound_names(&self, handler: &RegisteredHandler, available: &Arc<[String]>) -> Arc<[String]> {
        self.bindings
            .get_or_insert_with((handler.id(), Arc::clone(available)), || {
                handler
                    .dependencies()
                    .iter()
                    .filter(|name| **name != EVENT_PARAMETER)
                    .filter(|name| available.iter().any(|a| a == *name))
                    .map(|name| name.to_string())
                    .collect()
            })
    }

    pub async fn dispatch<E: Event>(&self, event: E) -> Result<CascadeSummary, BusError> {
        self.dispatch_boxed(Box::new(event), &Dependencies::new())
            .await
    }

    /// Dispatch with call-site dependencies layered over the base ones.
    pub async fn dispatch_with<E: Event>(
        &self,
        event: E,
        dependencies: &Dependencies,
    ) -> Result<CascadeSummary, BusError> {
        self.dispatch_boxed(Box::new(event), dependencies).await
    }

    pub async fn dispatch_boxed(
        &self,
        event: Box<dyn Event>,
        dependencies: &Dependencies,
    ) -> Result<CascadeSummary, BusError> {
        let deps = self.dependencies.merged(dependencies);
        let available = deps.name_set();
        let collector = deps.collector(&self.config.unit_of_work_name);

        let mut cascade = Cascade::new(event);

        while let Some(event) = cascade.next_event() {
            let kind = event.kind();
            let handlers = match self.resolve(&*event) {
                Ok(handlers) => handlers,
                Err(BusError::NoHandler { event_type }) if self.config.ignore_missing_handlers => {
                    tracing::warn!(event = event_type, "no handlers registered; event ignored");
                    continue;
                }
                Err(err) => return Err(err),
            };

            for registered in handlers.iter() {
                let bound_names = self.bound_names(registered, &available);
                let bound = deps.select(bound_names.iter().map(String::as_str));

                tracing::debug!(handler = registered.name(), event = %kind, "invoking handler");

                registered
                    .handler()
                    .handle(&*event, &bound)
                    .await
                    .map_err(|source| BusError::Handler {
                        handler: registered.name().to_string(),
                        event_type: kind.name(),
                        source,
                    })?;
                cascade.record_handler();

                if let Some(collector) = &collector {
                    let new_events = collector.collect_new_events();
                    if !new_events.is_empty() {
                        tracing::trace!(count = new_events.len(), "harvested new events");
                        cascade.enqueue(new_events);
                    }
                }
            }
        }

        Ok(cascade.summary())
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("handlers", &self.handlers)
            .field("dependencies", &self.dependencies)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
