//! # ProtectedQueue
//!
//! A bounded multi-producer multi-consumer FIFO shared between threads.
//!
//! ```text
//!            tail (next push)
//!              v
//! ┌────┬────┬────┬────┬────┬────┐
//! │    │ A  │ B  │    │    │    │   count = 2
//! └────┴────┴────┴────┴────┴────┘
//!        ^
//!      head (next pop)
//! ```
//!
//! One mutex guards the ring and the `closed` flag; producers wait on
//! `not_full`, consumers on `not_empty`. Blocking operations wait without a
//! timeout until data, space or [`close`](ProtectedQueue::close) arrives.
//! Failed operations leave head, tail and count unchanged.

use std::error;
use std::fmt;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,
}

/// Returned by [`ProtectedQueue::push`] on a closed queue; holds the item.
#[derive(PartialEq, Eq)]
pub struct PushError<T>(pub T);

/// Returned by [`ProtectedQueue::try_push`]; holds the item.
#[derive(PartialEq, Eq)]
pub enum TryPushError<T> {
    Full(T),
    Closed(T),
}

impl<T> TryPushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TryPushError::Full(item) | TryPushError::Closed(item) => item,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TryPopError {
    #[error("queue is empty")]
    Empty,
    #[error("queue is closed and drained")]
    Closed,
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PushError(..)")
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("pushing to a closed queue")
    }
}

impl<T> error::Error for PushError<T> {}

impl<T> fmt::Debug for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPushError::Full(_) => f.write_str("Full(..)"),
            TryPushError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPushError::Full(_) => f.write_str("queue is full"),
            TryPushError::Closed(_) => f.write_str("pushing to a closed queue"),
        }
    }
}

impl<T> error::Error for TryPushError<T> {}

/// Ring positions at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub head: usize,
    pub tail: usize,
    pub count: usize,
}

struct Ring<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    count: usize,
    closed: bool,
}

impl<T> Ring<T> {
    fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    /// Caller checks `is_full` first.
    fn push_back(&mut self, item: T) {
        self.slots[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.slots.len();
        self.count += 1;
    }

    fn pop_front(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.count -= 1;
        item
    }
}

pub struct ProtectedQueue<T> {
    ring: Mutex<Ring<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> ProtectedQueue<T> {
    /// Creates an empty queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        let slots = (0..capacity).map(|_| None).collect::<Vec<_>>().into_boxed_slice();
        Ok(Self {
            ring: Mutex::new(Ring {
                slots,
                head: 0,
                tail: 0,
                count: 0,
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        })
    }

    /// Appends `item`, waiting while the queue is full.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut ring = self.ring.lock();
        loop {
            if ring.closed {
                return Err(PushError(item));
            }
            if !ring.is_full() {
                break;
            }
            self.not_full.wait(&mut ring);
        }
        ring.push_back(item);
        drop(ring);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Appends `item` if there is room right now.
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        let mut ring = self.ring.lock();
        if ring.closed {
            return Err(TryPushError::Closed(item));
        }
        if ring.is_full() {
            return Err(TryPushError::Full(item));
        }
        ring.push_back(item);
        drop(ring);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest item, waiting while the queue is empty.
    ///
    /// Returns `None` only once the queue is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut ring = self.ring.lock();
        loop {
            if let Some(item) = ring.pop_front() {
                drop(ring);
                self.not_full.notify_one();
                return Some(item);
            }
            if ring.closed {
                return None;
            }
            self.not_empty.wait(&mut ring);
        }
    }

    /// Removes the oldest item if there is one right now.
    pub fn try_pop(&self) -> Result<T, TryPopError> {
        let mut ring = self.ring.lock();
        match ring.pop_front() {
            Some(item) => {
                drop(ring);
                self.not_full.notify_one();
                Ok(item)
            }
            None if ring.closed => Err(TryPopError::Closed),
            None => Err(TryPopError::Empty),
        }
    }

    /// Waits for at least one item, then moves up to `max` items into `out`
    /// without waiting further. Returns the number moved; `0` means the
    /// queue is closed and drained (or `max` is 0).
    pub fn pop_batch(&self, out: &mut Vec<T>, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        let mut ring = self.ring.lock();
        while ring.count == 0 && !ring.closed {
            self.not_empty.wait(&mut ring);
        }
        let mut moved = 0;
        while moved < max {
            match ring.pop_front() {
                Some(item) => {
                    out.push(item);
                    moved += 1;
                }
                None => break,
            }
        }
        drop(ring);
        if moved > 0 {
            self.not_full.notify_all();
        }
        moved
    }

    /// Stops admission and wakes every waiter. Queued items are still
    /// delivered to consumers.
    pub fn close(&self) {
        self.ring.lock().closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.ring.lock().closed
    }

    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().slots.len()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let ring = self.ring.lock();
        QueueSnapshot {
            head: ring.head,
            tail: ring.tail,
            count: ring.count,
        }
    }
}

impl<T> fmt::Debug for ProtectedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.ring.lock();
        f.debug_struct("ProtectedQueue")
            .field("capacity", &ring.slots.len())
            .field("count", &ring.count)
            .field("closed", &ring.closed)
            .finish()
    }
}
