//! Event queue and simulation clock for the stack simulator

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use simons_stack::Millis;
use simons_stack::topology::InputTypeId;

/// Simulation event type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEventType {
    /// An input changes state; `asserted` is the logical level.
    Sensor { input_type_id: InputTypeId, asserted: bool },
    /// Output states pushed to a follower node, one mask per chain slot.
    Push { masks: Vec<u32> },
}

/// Simulation event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimEvent {
    pub timestamp: Millis,
    pub event_type: SimEventType,
    seq: u64,
}

impl PartialOrd for SimEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Event queue for simulation. Pops earliest first; events scheduled for the
/// same millisecond come out in the order they were pushed.
#[derive(Debug, Default)]
pub struct SimEventQueue {
    queue: BinaryHeap<Reverse<SimEvent>>,
    next_seq: u64,
}

impl SimEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, timestamp: Millis, event_type: SimEventType) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(SimEvent { timestamp, event_type, seq }));
    }

    /// Pops the next event due at or before `now`.
    pub fn pop_due(&mut self, now: Millis) -> Option<SimEvent> {
        if self.queue.peek()?.0.timestamp > now {
            return None;
        }
        self.queue.pop().map(|Reverse(event)| event)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Simulation clock
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    pub current_time: Millis,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, dt: Millis) {
        self.current_time += dt;
    }
}
