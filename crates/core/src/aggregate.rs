//! Aggregate roots: entities that raise domain events.

use core::fmt;
use core::hash::{Hash, Hasher};
use std::collections::VecDeque;

use crate::entity::Entity;
use crate::event::Event;

/// Ordered buffer of events an aggregate has raised and nobody has collected yet.
///
/// The buffer is *not* part of the aggregate's content:
/// - it always compares equal and contributes nothing to the hash
/// - cloning yields an **empty** buffer (a clone is a state snapshot; pending
///   events stay with the original so they can't be collected twice)
#[derive(Default)]
pub struct EventBuffer {
    pending: VecDeque<Box<dyn Event>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<E: Event>(&mut self, event: E) {
        self.pending.push_back(Box::new(event));
    }

    pub fn push_boxed(&mut self, event: Box<dyn Event>) {
        self.pending.push_back(event);
    }

    /// Remove and return every pending event, oldest first.
    pub fn drain(&mut self) -> Vec<Box<dyn Event>> {
        self.pending.drain(..).collect()
    }

    /// Move all of `other`'s pending events to the back of this buffer.
    pub fn absorb(&mut self, other: &mut EventBuffer) {
        self.pending.append(&mut other.pending);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Event> {
        self.pending.iter().map(|e| &**e)
    }
}

impl Clone for EventBuffer {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl PartialEq for EventBuffer {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for EventBuffer {}

impl Hash for EventBuffer {
    fn hash<H: Hasher>(&self, _state: &mut H) {}
}

impl fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.pending.iter().map(|e| e.kind()))
            .finish()
    }
}

/// Aggregate root: the unit of consistency and the source of domain events.
///
/// Business methods record what happened with [`AggregateRoot::add_event`];
/// the unit of work later collects those events with
/// [`AggregateRoot::drain_events`]. Draining is destructive: each event is
/// handed out exactly once.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// struct Building {
///     id: Uuid,
///     suites: Vec<Suite>,
///     events: EventBuffer,
/// }
///
/// impl AggregateRoot for Building {
///     fn events(&self) -> &EventBuffer { &self.events }
///     fn events_mut(&mut self) -> &mut EventBuffer { &mut self.events }
/// }
/// ```
pub trait AggregateRoot: Entity {
    fn events(&self) -> &EventBuffer;

    fn events_mut(&mut self) -> &mut EventBuffer;

    /// Record a domain event raised by a business operation.
    fn add_event<E: Event>(&mut self, event: E)
    where
        Self: Sized,
    {
        self.events_mut().push(event);
    }

    /// Take every pending event, in emission order, leaving the buffer empty.
    fn drain_events(&mut self) -> Vec<Box<dyn Event>> {
        self.events_mut().drain()
    }

    fn has_pending_events(&self) -> bool {
        !self.events().is_empty()
    }

    fn pending_event_count(&self) -> usize {
        self.events().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainError, DomainResult};
    use crate::value::FieldMap;
    use proptest::prelude::*;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Suite {
        number: String,
        name: String,
        leased: bool,
    }

    impl Suite {
        fn new(number: &str, name: &str, leased: bool) -> Self {
            Self {
                number: number.into(),
                name: name.into(),
                leased,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct SuiteAdded {
        building_id: Uuid,
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

    #[derive(Debug, Clone, PartialEq)]
    struct SuiteMadeAvailable(SuiteAdded);

    impl Event for SuiteMadeAvailable {
        fn supertypes(&self) -> Vec<&dyn Event> {
            vec![&self.0]
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct SuiteRemoved {
        building_id: Uuid,
        name: String,
        number: String,
    }

    impl Event for SuiteRemoved {}

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Building {
        id: Uuid,
        name: String,
        suites: Vec<Suite>,
        events: EventBuffer,
    }

    impl Building {
        fn new(name: &str, suites: Vec<Suite>) -> Self {
            Self {
                id: Uuid::now_v7(),
                name: name.into(),
                suites,
                events: EventBuffer::new(),
            }
        }

        fn suite_mut(&mut self, number: &str) -> DomainResult<&mut Suite> {
            self.suites
                .iter_mut()
                .find(|s| s.number == number)
                .ok_or_else(|| DomainError::not_found(format!("suite {number}")))
        }

        fn added(&self, number: &str) -> SuiteAdded {
            SuiteAdded {
                building_id: self.id,
                number: number.into(),
            }
        }

        fn add_suite(&mut self, suite: Suite) -> DomainResult<()> {
            if self.suites.iter().any(|s| s.number == suite.number) {
                return Err(DomainError::conflict("suite already exists"));
            }
            let event = self.added(&suite.number);
            self.suites.push(suite);
            self.add_event(event);
            Ok(())
        }

        fn lease_suite(&mut self, number: &str) -> DomainResult<()> {
            let suite = self.suite_mut(number)?;
            if suite.leased {
                return Err(DomainError::invariant("suite is already leased"));
            }
            suite.leased = true;
            let event = SuiteLeased(self.added(number));
            self.add_event(event);
            Ok(())
        }

        fn make_suite_available(&mut self, number: &str) -> DomainResult<()> {
            let suite = self.suite_mut(number)?;
            if !suite.leased {
                return Err(DomainError::invariant("suite is already available"));
            }
            suite.leased = false;
            let event = SuiteMadeAvailable(self.added(number));
            self.add_event(event);
            Ok(())
        }

        fn remove_suite(&mut self, number: &str) -> DomainResult<()> {
            let idx = self
                .suites
                .iter()
                .position(|s| s.number == number)
                .ok_or_else(|| DomainError::not_found(format!("suite {number}")))?;
            let removed = self.suites.remove(idx);
            self.add_event(SuiteRemoved {
                building_id: self.id,
                name: removed.name,
                number: removed.number,
            });
            Ok(())
        }
    }

    impl Entity for Building {
        fn fields(&self) -> FieldMap {
            FieldMap::new()
                .with("id", self.id)
                .with("name", self.name.as_str())
                .with(
                    "suites",
                    self.suites
                        .iter()
                        .map(|s| s.number.as_str())
                        .collect::<Vec<_>>(),
                )
        }
    }

    impl AggregateRoot for Building {
        fn events(&self) -> &EventBuffer {
            &self.events
        }

        fn events_mut(&mut self) -> &mut EventBuffer {
            &mut self.events
        }
    }

    fn thirty_rock() -> Building {
        Building::new(
            "30 Rockefeller Center",
            vec![
                Suite::new("6700", "Top of the Rock", true),
                Suite::new("1280", "Suite 1280", true),
            ],
        )
    }

    #[test]
    fn business_operations_record_events_in_order() {
        let mut building = thirty_rock();

        assert_eq!(
            building.lease_suite("6700"),
            Err(DomainError::invariant("suite is already leased"))
        );

        building.make_suite_available("1280").unwrap();
        building
            .add_suite(Suite::new("1735", "Suite 1735", false))
            .unwrap();
        building.lease_suite("1735").unwrap();
        building
            .add_suite(Suite::new("109", "Lobby Concessions", false))
            .unwrap();
        building.remove_suite("109").unwrap();

        assert_eq!(building.pending_event_count(), 5);

        let events = building.drain_events();
        assert!(events[0].is::<SuiteMadeAvailable>());
        assert!(events[1].is::<SuiteAdded>());
        assert!(events[2].is::<SuiteLeased>());
        assert!(events[3].is::<SuiteAdded>());

        let removed = events[4].downcast_ref::<SuiteRemoved>().unwrap();
        assert_eq!(removed.name, "Lobby Concessions");
        assert_eq!(removed.number, "109");
        assert_eq!(removed.building_id, building.id);

        // Draining is destructive.
        assert!(!building.has_pending_events());
        assert!(building.drain_events().is_empty());
    }

    #[test]
    fn pending_events_do_not_affect_equality_or_hash() {
        let mut a = thirty_rock();
        let b = a.clone();
        let building_id = a.id;
        a.events_mut().push(SuiteAdded {
            building_id,
            number: "1".into(),
        });

        assert_eq!(a, b);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn clone_starts_with_empty_buffer() {
        let mut building = thirty_rock();
        building.make_suite_available("1280").unwrap();

        let snapshot = building.clone();
        assert_eq!(snapshot.pending_event_count(), 0);
        assert_eq!(building.pending_event_count(), 1);
    }

    #[test]
    fn absorb_appends_after_existing_events() {
        let id = Uuid::nil();
        let mut first = EventBuffer::new();
        first.push(SuiteAdded {
            building_id: id,
            number: "1".into(),
        });
        let mut second = EventBuffer::new();
        second.push(SuiteRemoved {
            building_id: id,
            name: "x".into(),
            number: "2".into(),
        });

        first.absorb(&mut second);

        assert!(second.is_empty());
        let kinds: Vec<_> = first.iter().map(|e| e.kind().name()).collect();
        assert_eq!(kinds, vec!["SuiteAdded", "SuiteRemoved"]);
    }

    proptest! {
        #[test]
        fn drain_hands_out_each_event_once(numbers in proptest::collection::vec("[0-9]{1,4}", 0..16)) {
            let mut buffer = EventBuffer::new();
            for number in &numbers {
                buffer.push(SuiteAdded { building_id: Uuid::nil(), number: number.clone() });
            }

            let drained: Vec<String> = buffer
                .drain()
                .iter()
                .map(|e| e.downcast_ref::<SuiteAdded>().unwrap().number.clone())
                .collect();

            prop_assert_eq!(drained, numbers);
            prop_assert!(buffer.drain().is_empty());
        }
    }
}
