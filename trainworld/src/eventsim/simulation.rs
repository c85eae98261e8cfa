use std::collections::BinaryHeap;
use std::cmp::Ordering;

use crate::Tick;

#[derive(Eq, PartialEq, Debug)]
pub struct QueuedEvent<E> {
    pub time: Tick,
    pub id: usize,
    pub event: E,
}

impl<E: Eq> Ord for QueuedEvent<E> {
    fn cmp(&self, other :&QueuedEvent<E>) -> Ordering {
        // Note that the order is flipped on purpose -- to turn
        // the (maximum) BinaryHeap into a minimum heap.
        other.time.cmp(&self.time).
            then_with(|| other.id.cmp(&self.id))
    }
}

impl<E: Eq> PartialOrd for QueuedEvent<E> {
    fn partial_cmp(&self,other :&QueuedEvent<E>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Queue of future deliveries. Events at the same tick come out in the
/// order they were scheduled.
#[derive(Debug)]
pub struct Scheduler<E: Eq> {
    pub time: Tick,
    queue: BinaryHeap<QueuedEvent<E>>,
    id_counter: usize,
}

impl<E: Eq> Default for Scheduler<E> {
    fn default() -> Self {
        Scheduler { time: 0, queue: BinaryHeap::new(), id_counter: 0 }
    }
}

impl<E: Eq> Scheduler<E> {
    pub fn schedule(&mut self, event: E, dt: u32) {
        let time = self.time + dt as Tick;
        self.schedule_at(event, time);
    }

    pub fn schedule_at(&mut self, event: E, time: Tick) {
        let id = self.id_counter;
        self.id_counter += 1;
        self.queue.push(QueuedEvent { time: time.max(self.time), id, event });
    }

    /// Removes the next event and advances the clock to it.
    pub fn pop(&mut self) -> Option<E> {
        let ev = self.queue.pop()?;
        self.time = ev.time;
        Some(ev.event)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[test]
fn test_ordering() {
    let mut p = BinaryHeap::new();
    p.push(QueuedEvent {
        time: 123,
        id: 0,
        event: 0
    });
    p.push(QueuedEvent {
        time: 0,
        id: 1,
        event: 1
    });
    p.push(QueuedEvent {
        time: 122,
        id: 2,
        event: 2
    });
    assert_eq!(p.pop().unwrap().time, 0);
    assert_eq!(p.pop().unwrap().time, 122);
    assert_eq!(p.pop().unwrap().time, 123);
}

#[test]
fn test_same_tick_fifo() {
    let mut s = Scheduler::default();
    s.schedule("b", 5);
    s.schedule("a", 0);
    s.schedule("c", 5);
    s.schedule_at("late", 2);
    assert_eq!(s.pop(), Some("a"));
    assert_eq!(s.pop(), Some("late"));
    assert_eq!(s.time, 2);
    assert_eq!(s.pop(), Some("b"));
    assert_eq!(s.pop(), Some("c"));
    assert_eq!(s.time, 5);
    assert!(s.is_empty());
}
