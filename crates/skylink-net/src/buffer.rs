//! Bounded single-producer/single-consumer queue with a full-queue policy.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// What happened to an item handed to [`Buffer::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    /// Appended with room to spare.
    Queued,
    /// The queue was full and overwrite is off; the new item was dropped.
    DroppedNewest,
    /// The queue was full; the oldest item was evicted to make room.
    Overwrote,
    /// The buffer is closed; the item was not accepted.
    Closed,
}

/// Outcome of a bounded wait on [`Buffer::dequeue_timeout`].
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeue<T> {
    Item(T),
    TimedOut,
    Closed,
}

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
    capacity: usize,
    overwrite: bool,
}

/// A bounded queue that is either running or closed.
///
/// Cloning yields another handle to the same queue. Each buffer is meant to
/// have exactly one producer and one consuming loop; the lock makes misuse
/// safe but not meaningful.
pub struct Buffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Buffer<T> {
    /// Create a running buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize, overwrite: bool) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                ready: Condvar::new(),
                capacity,
                overwrite,
            }),
        }
    }

    /// Add an item, applying the full-queue policy.
    pub fn enqueue(&self, item: T) -> Enqueue {
        let mut state = self.lock();
        if state.closed {
            return Enqueue::Closed;
        }

        let outcome = if state.queue.len() < self.shared.capacity {
            Enqueue::Queued
        } else if self.shared.overwrite {
            state.queue.pop_front();
            Enqueue::Overwrote
        } else {
            return Enqueue::DroppedNewest;
        };

        state.queue.push_back(item);
        drop(state);
        self.shared.ready.notify_one();
        outcome
    }

    /// Block until an item is available.
    ///
    /// Returns `None` once the buffer is closed and drained.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .shared
                .ready
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Block until an item is available, the buffer closes, or `timeout` elapses.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Dequeue<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Dequeue::Item(item);
            }
            if state.closed {
                return Dequeue::Closed;
            }
            let now = Instant::now();
            if now >= deadline {
                return Dequeue::TimedOut;
            }
            state = match self.shared.ready.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Take an item without blocking.
    pub fn try_dequeue(&self) -> Option<T> {
        self.lock().queue.pop_front()
    }

    /// Stop accepting items. Queued items stay drainable.
    pub fn close(&self) {
        self.lock().closed = true;
        self.shared.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn overwrites(&self) -> bool {
        self.shared.overwrite
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> std::fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Buffer")
            .field("len", &state.queue.len())
            .field("capacity", &self.shared.capacity)
            .field("overwrite", &self.shared.overwrite)
            .field("closed", &state.closed)
            .finish()
    }
}
