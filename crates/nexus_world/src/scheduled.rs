//! A small min-heap of timed work, drained up to a deadline.

use std::cmp::{Ordering, Reverse};
use std::collections::binary_heap::PeekMut;
use std::collections::BinaryHeap;

struct KeyValue<V>(u64, V);

impl<V> Eq for KeyValue<V> {}

impl<V> PartialEq for KeyValue<V> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<V> Ord for KeyValue<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<V> PartialOrd for KeyValue<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Values scheduled at millisecond keys; `pop_until` drains everything due.
pub struct Scheduled<V> {
    queue: BinaryHeap<Reverse<KeyValue<V>>>,
}

impl<V> Default for Scheduled<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Scheduled<V> {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
        }
    }

    pub fn schedule(&mut self, at_ms: u64, value: V) {
        self.queue.push(Reverse(KeyValue(at_ms, value)));
    }

    /// Pops every entry with key `<= limit`, earliest first.
    pub fn pop_until(&mut self, limit: u64) -> impl Iterator<Item = (u64, V)> + '_ {
        std::iter::from_fn(move || {
            let peek = self.queue.peek_mut()?;
            let Reverse(KeyValue(key, _)) = &*peek;
            (*key <= limit).then(|| {
                let Reverse(KeyValue(key, value)) = PeekMut::pop(peek);
                (key, value)
            })
        })
    }

    pub fn next_due(&self) -> Option<u64> {
        self.queue.peek().map(|Reverse(KeyValue(key, _))| *key)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_key_order_up_to_the_limit() {
        let mut s = Scheduled::new();
        s.schedule(300, "c");
        s.schedule(100, "a");
        s.schedule(200, "b");
        s.schedule(400, "d");

        let due: Vec<_> = s.pop_until(250).collect();
        assert_eq!(due, vec![(100, "a"), (200, "b")]);
        assert_eq!(s.next_due(), Some(300));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn boundary_key_is_due() {
        let mut s = Scheduled::new();
        s.schedule(500, 1u32);
        assert_eq!(s.pop_until(500).count(), 1);
        assert!(s.is_empty());
    }
}
