//! Work queue of a single dispatch call.

use std::collections::VecDeque;

use cascade_core::Event;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CascadeState {
    /// Events are waiting; nothing has been taken yet.
    Queued,
    Dispatching,
    /// The queue ran empty.
    Drained,
}

/// What a finished dispatch call did.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    /// Events taken off the queue, the initial one included.
    pub events_dispatched: usize,
    pub handlers_invoked: usize,
}

/// FIFO queue of events for one dispatch call.
///
/// Events harvested while handling generation `n` are appended behind
/// everything already queued, so dispatch is breadth-first across
/// generations.
#[derive(Debug)]
pub struct Cascade {
    queue: VecDeque<Box<dyn Event>>,
    state: CascadeState,
    summary: CascadeSummary,
}

impl Cascade {
    pub fn new(initial: Box<dyn Event>) -> Self {
        Self {
            queue: VecDeque::from([initial]),
            state: CascadeState::Queued,
            summary: CascadeSummary::default(),
        }
    }

    /// Take the head of the queue; `None` once drained.
    pub fn next_event(&mut self) -> Option<Box<dyn Event>> {
        match self.queue.pop_front() {
            Some(event) => {
                self.state = CascadeState::Dispatching;
                self.summary.events_dispatched += 1;
                Some(event)
            }
            None => {
                self.state = CascadeState::Drained;
                None
            }
        }
    }

    pub fn enqueue(&mut self, events: impl IntoIterator<Item = Box<dyn Event>>) {
        self.queue.extend(events);
    }

    pub fn record_handler(&mut self) {
        self.summary.handlers_invoked += 1;
    }

    pub fn state(&self) -> CascadeState {
        self.state
    }

    /// Events still waiting.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn summary(&self) -> CascadeSummary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Tick(u32);

    impl Event for Tick {}

    fn tick(n: u32) -> Box<dyn Event> {
        Box::new(Tick(n))
    }

    #[test]
    fn drains_in_fifo_order() {
        let mut cascade = Cascade::new(tick(0));
        assert_eq!(cascade.state(), CascadeState::Queued);

        let first = cascade.next_event().unwrap();
        assert_eq!(first.downcast_ref::<Tick>().unwrap().0, 0);
        assert_eq!(cascade.state(), CascadeState::Dispatching);

        cascade.enqueue([tick(1), tick(2)]);
        cascade.record_handler();
        cascade.enqueue([tick(3)]);
        assert_eq!(cascade.pending(), 3);

        let mut seen = Vec::new();
        while let Some(event) = cascade.next_event() {
            seen.push(event.downcast_ref::<Tick>().unwrap().0);
        }

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(cascade.state(), CascadeState::Drained);
        assert_eq!(
            cascade.summary(),
            CascadeSummary {
                events_dispatched: 4,
                handlers_invoked: 1,
            }
        );
    }
}
