//! Thread-safe double-ended queue
//!
//! The simplest possible cross-thread handoff primitive: every operation is
//! atomic under one mutex and none of them blocks waiting for data. Consumers
//! are driven by the owning event loop or by explicit polling, so no
//! condition variable is provided.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// A mutex-guarded double-ended queue.
///
/// Used both as the per-connection outgoing buffer (one producer, one
/// consumer) and as the shared inbox of a client or server (many producers,
/// one consumer). Callers must check [`is_empty`](Self::is_empty) or match on
/// the `Option` returned by the pop operations; there is no blocking pop.
#[derive(Debug)]
pub struct ThreadSafeQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> ThreadSafeQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Add an element to the end of the queue.
    pub fn push_back(&self, value: T) {
        self.inner.lock().push_back(value);
    }

    /// Add an element to the start of the queue.
    pub fn push_front(&self, value: T) {
        self.inner.lock().push_front(value);
    }

    /// Remove and return the first element, if any.
    pub fn pop_front(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    /// Remove and return the last element, if any.
    pub fn pop_back(&self) -> Option<T> {
        self.inner.lock().pop_back()
    }

    /// Number of elements currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop every queued element.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl<T: Clone> ThreadSafeQueue<T> {
    /// Copy of the first element, if any.
    pub fn front(&self) -> Option<T> {
        self.inner.lock().front().cloned()
    }

    /// Copy of the last element, if any.
    pub fn back(&self) -> Option<T> {
        self.inner.lock().back().cloned()
    }
}

impl<T> Default for ThreadSafeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn push_pop_both_ends() {
        let queue = ThreadSafeQueue::new();
        queue.push_back(1);
        queue.push_back(2);
        queue.push_front(0);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.front(), Some(0));
        assert_eq!(queue.back(), Some(2));

        assert_eq!(queue.pop_front(), Some(0));
        assert_eq!(queue.pop_back(), Some(2));
        assert_eq!(queue.pop_front(), Some(1));
        assert_eq!(queue.pop_front(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_empties_queue() {
        let queue = ThreadSafeQueue::new();
        for i in 0..10 {
            queue.push_back(i);
        }
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.pop_back(), None);
    }

    #[test]
    fn many_producers_one_consumer() {
        let queue = Arc::new(ThreadSafeQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        queue.push_back(p * 100 + i);
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }

        let mut drained = 0;
        while queue.pop_front().is_some() {
            drained += 1;
        }
        assert_eq!(drained, 400);
    }
}
