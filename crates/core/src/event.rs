//! Domain events: immutable facts raised by aggregates and routed by the bus.
//!
//! Events are identified at dispatch time by their concrete runtime type
//! ([`EventKind`]). An event type may declare *direct* supertypes by exposing
//! views of the parent events it embeds; handler lookup falls back to those
//! parents (one level only) when the concrete type has no registration.

use core::any::{Any, TypeId};
use core::fmt;

/// Runtime identity of a concrete event type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EventKind {
    id: TypeId,
    name: &'static str,
}

impl EventKind {
    /// Kind of the statically known event type `E`.
    pub fn of<E: Event>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: short_type_name(std::any::type_name::<E>()),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Short (module-less) type name, e.g. `SuiteLeased`.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Object-safe access to the concrete type behind a trait object.
///
/// Implemented for every `'static` type; event authors never implement it.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;

    fn any_type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn any_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A domain event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **structurally typed** (a plain struct with a field schema)
/// - optionally **derived** from parent events
///
/// Most events need an empty impl:
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct SuiteAdded { building_id: Uuid, number: String }
///
/// impl Event for SuiteAdded {}
/// ```
///
/// A subtype embeds its parent and exposes it from [`Event::supertypes`]:
///
/// ```ignore
/// struct SuiteLeased(SuiteAdded);
///
/// impl Event for SuiteLeased {
///     fn supertypes(&self) -> Vec<&dyn Event> {
///         vec![&self.0]
///     }
/// }
/// ```
pub trait Event: AsAny + fmt::Debug + Send + Sync + 'static {
    /// Direct parent events, in declaration order.
    ///
    /// The kinds returned must not depend on the instance: the bus memoizes
    /// resolution per concrete event type.
    fn supertypes(&self) -> Vec<&dyn Event> {
        Vec::new()
    }
}

impl dyn Event {
    /// Runtime kind of the concrete event behind this reference.
    pub fn kind(&self) -> EventKind {
        EventKind {
            id: self.as_any().type_id(),
            name: short_type_name(self.any_type_name()),
        }
    }

    /// Kinds of the direct supertypes, in declaration order.
    pub fn supertype_kinds(&self) -> Vec<EventKind> {
        self.supertypes().into_iter().map(|p| p.kind()).collect()
    }

    pub fn is<E: Event>(&self) -> bool {
        self.as_any().is::<E>()
    }

    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    /// View this event as `E`: either it *is* an `E`, or one of its direct
    /// supertypes is.
    pub fn view<E: Event>(&self) -> Option<&E> {
        self.downcast_ref::<E>().or_else(|| {
            self.supertypes()
                .into_iter()
                .find_map(|parent| parent.downcast_ref::<E>())
        })
    }
}

/// Strip the module path from a `std::any::type_name` string.
///
/// Generic arguments are kept as written (`Wrapper<my::Inner>` becomes
/// `Wrapper<my::Inner>`).
pub fn short_type_name(full: &'static str) -> &'static str {
    let head_end = full.find('<').unwrap_or(full.len());
    let start = full[..head_end].rfind("::").map(|i| i + 2).unwrap_or(0);
    &full[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct SuiteAdded {
        number: String,
    }

    impl Event for SuiteAdded {}

    #[derive(Debug, Clone, PartialEq)]
    struct SuiteLeased(SuiteAdded);

    impl Event for SuiteLeased {
        fn supertypes(&self) -> Vec<&dyn Event> {
            vec![&self.0]
        }
    }

    #[derive(Debug)]
    struct Unrelated;

    impl Event for Unrelated {}

    #[test]
    fn kind_of_trait_object_matches_static_kind() {
        let event: Box<dyn Event> = Box::new(SuiteAdded {
            number: "109".into(),
        });

        assert_eq!(event.kind(), EventKind::of::<SuiteAdded>());
        assert_eq!(event.kind().name(), "SuiteAdded");
        assert_ne!(event.kind(), EventKind::of::<SuiteLeased>());
    }

    #[test]
    fn subtype_exposes_parent_kind_and_view() {
        let leased = SuiteLeased(SuiteAdded {
            number: "1735".into(),
        });
        let event: &dyn Event = &leased;

        assert_eq!(event.supertype_kinds(), vec![EventKind::of::<SuiteAdded>()]);
        assert!(event.is::<SuiteLeased>());
        assert!(!event.is::<SuiteAdded>());

        let parent = event.view::<SuiteAdded>().expect("parent view");
        assert_eq!(parent.number, "1735");
        assert!(event.view::<Unrelated>().is_none());
    }

    #[test]
    fn short_type_name_strips_module_paths() {
        assert_eq!(short_type_name("a::b::SuiteAdded"), "SuiteAdded");
        assert_eq!(short_type_name("SuiteAdded"), "SuiteAdded");
        assert_eq!(short_type_name("a::Wrapper<b::Inner>"), "Wrapper<b::Inner>");
    }
}
