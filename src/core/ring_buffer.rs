//! Fixed-capacity FIFO used for every channel queue
//!
//! Capacity is a const generic and slots are allocated inline, so a queue can
//! live inside a channel struct or behind a static mutex without a heap.
//! One producer context and one consumer context per instance.

use heapless::Deque;

use super::error::Error;

/// Ring buffer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RingBufferError {
    /// Push attempted with every slot occupied
    QueueFull,
    /// Pop attempted with no element queued
    QueueEmpty,
}

impl From<RingBufferError> for Error {
    fn from(err: RingBufferError) -> Self {
        match err {
            RingBufferError::QueueFull => Error::ResourceExhausted,
            RingBufferError::QueueEmpty => Error::NotFound,
        }
    }
}

/// Bounded FIFO of `N` elements that never overwrites
pub struct RingBuffer<T, const N: usize> {
    slots: Deque<T, N>,
}

impl<T, const N: usize> RingBuffer<T, N> {
    /// Create an empty ring buffer
    pub const fn new() -> Self {
        Self { slots: Deque::new() }
    }

    /// Append at the tail; fails without touching the queue when full
    pub fn push(&mut self, element: T) -> Result<(), RingBufferError> {
        self.slots
            .push_back(element)
            .map_err(|_| RingBufferError::QueueFull)
    }

    /// Remove and return the oldest element
    pub fn pop(&mut self) -> Result<T, RingBufferError> {
        self.slots.pop_front().ok_or(RingBufferError::QueueEmpty)
    }

    /// Element at queue position `index`, 0 being the oldest
    pub fn peek_at(&self, index: usize) -> Option<&T> {
        self.slots.iter().nth(index)
    }

    /// Most recently pushed element
    pub fn newest(&self) -> Option<&T> {
        self.slots.back()
    }

    /// Remove the most recently pushed element
    pub fn discard_newest(&mut self) -> Option<T> {
        self.slots.pop_back()
    }

    /// Drop every queued element
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn is_full(&self) -> bool {
        self.slots.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots.iter()
    }
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
