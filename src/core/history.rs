//! Bounded FIFO history for live display and pending records
//!
//! When full, the oldest item is evicted before the newest is inserted.
//! Pushing never blocks on capacity and the buffer never grows past it.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Fixed-capacity FIFO with evict-oldest overflow
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    evicted: u64,
}

impl<T> BoundedBuffer<T> {
    /// Create an empty buffer holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Append an item, returning the evicted oldest item if the buffer was full
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.evicted += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Remove and return all queued items, oldest first
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    /// Put previously drained items back in front of the queue.
    ///
    /// `items` are older than anything queued since, so when the result is
    /// over capacity they are the first to be evicted (and counted).
    pub fn requeue_front(&mut self, items: Vec<T>) {
        for item in items.into_iter().rev() {
            self.items.push_front(item);
        }
        while self.items.len() > self.capacity {
            self.items.pop_front();
            self.evicted += 1;
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total items evicted by overflow since creation or the last `reset_evicted`
    #[inline]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn reset_evicted(&mut self) {
        self.evicted = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> BoundedBuffer<T> {
    /// Copy of the queued items, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

/// Thread-shared bounded buffer.
///
/// Every operation holds the lock only for the in-memory push/copy/swap, so a
/// consumer draining the buffer never stalls the producer behind I/O.
#[derive(Debug)]
pub struct SharedBuffer<T> {
    inner: Arc<Mutex<BoundedBuffer<T>>>,
}

impl<T> Clone for SharedBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BoundedBuffer::new(capacity))),
        }
    }

    #[inline]
    pub fn push(&self, item: T) -> Option<T> {
        self.inner.lock().push(item)
    }

    /// Swap out the queued items, leaving the buffer empty
    pub fn drain(&self) -> Vec<T> {
        let mut guard = self.inner.lock();
        let capacity = guard.capacity();
        let taken = std::mem::replace(&mut guard.items, VecDeque::with_capacity(capacity));
        drop(guard);
        taken.into()
    }

    /// Return items from a failed drain for the next consumer pass
    pub fn requeue_front(&self, items: Vec<T>) {
        if !items.is_empty() {
            self.inner.lock().requeue_front(items);
        }
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    pub fn evicted(&self) -> u64 {
        self.inner.lock().evicted()
    }

    pub fn reset_evicted(&self) {
        self.inner.lock().reset_evicted();
    }
}

impl<T: Clone> SharedBuffer<T> {
    /// Copy of the queued items without consuming them
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().to_vec()
    }
}
