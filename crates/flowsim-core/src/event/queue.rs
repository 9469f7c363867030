use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use super::types::Event;

/// Pending events, earliest handling time first. Events with equal handling times come out in
/// the order they were pushed.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    heap: BinaryHeap<Queued>,
    pushed: u64,
}

impl EventQueue {
    pub(crate) fn push(&mut self, event: Event) {
        let seq = self.pushed;
        self.pushed += 1;
        self.heap.push(Queued { event, seq });
    }

    pub(crate) fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|q| q.event)
    }

    pub(crate) fn peek(&self) -> Option<&Event> {
        self.heap.peek().map(|q| &q.event)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[derive(Debug)]
struct Queued {
    event: Event,
    seq: u64,
}

impl Queued {
    fn key(&self) -> (OrderedFloat<f64>, u64) {
        (OrderedFloat(self.event.handling_time.into_f64()), self.seq)
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: `BinaryHeap` is a max-heap
        other.key().cmp(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::units::Time;

    fn watcher(t: f64) -> Event {
        let at = Time::new(t);
        Event {
            handling_time: at,
            end_time: at,
            kind: EventKind::Watcher { at },
            user: false,
            epoch: 0,
        }
    }

    #[test]
    fn pops_in_time_order() {
        let mut queue = EventQueue::default();
        for t in [3.0, 0.5, 2.0, 0.0, 7.25] {
            queue.push(watcher(t));
        }
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.peek().map(Event::handling_time), Some(Time::ZERO));
        let times = std::iter::from_fn(|| queue.pop())
            .map(|e| e.handling_time().into_f64())
            .collect::<Vec<_>>();
        assert_eq!(times, vec![0.0, 0.5, 2.0, 3.0, 7.25]);
        assert!(queue.is_empty());
    }

    #[test]
    fn equal_times_are_fifo() {
        let mut queue = EventQueue::default();
        let mut first = watcher(1.0);
        first.end_time = Time::new(10.0);
        let mut second = watcher(1.0);
        second.end_time = Time::new(20.0);
        queue.push(watcher(5.0));
        queue.push(first);
        queue.push(second);
        assert_eq!(queue.pop().map(|e| e.end_time()), Some(Time::new(10.0)));
        assert_eq!(queue.pop().map(|e| e.end_time()), Some(Time::new(20.0)));
        assert_eq!(queue.pop().map(|e| e.end_time()), Some(Time::new(5.0)));
        assert_eq!(queue.pop(), None);
    }
}
