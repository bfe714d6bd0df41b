//! Byte FIFO for buffering serial data between an interrupt and the main loop.
//!
//! Backed by [`heapless::spsc::Queue`], so a buffer of `N` slots holds at
//! most `N - 1` bytes. For lock-free use from two contexts, [`RingBuffer::split`]
//! it into a producer and a consumer half.

use heapless::spsc::{Consumer, Producer, Queue};

use crate::status::{self, StatusCode};

/// Ring buffer error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// No free slot, the byte was not stored
    Full,
    /// Nothing to take
    Empty,
}

impl StatusCode for Error {
    fn code(&self) -> i32 {
        status::FAIL
    }
}

/// Fill level of a [`RingBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// No bytes stored
    pub is_empty: bool,
    /// No free slots
    pub is_full: bool,
}

/// Byte FIFO with `N - 1` usable slots
pub struct RingBuffer<const N: usize> {
    queue: Queue<u8, N>,
}

impl<const N: usize> RingBuffer<N> {
    /// An empty buffer
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
        }
    }

    /// Append `value`
    pub fn enqueue(&mut self, value: u8) -> Result<(), Error> {
        self.queue.enqueue(value).map_err(|_| Error::Full)
    }

    /// Take the oldest byte
    pub fn dequeue(&mut self) -> Result<u8, Error> {
        self.queue.dequeue().ok_or(Error::Empty)
    }

    /// Append as much of `data` as fits, returning the number of bytes stored
    pub fn extend_from_slice(&mut self, data: &[u8]) -> usize {
        data.iter()
            .take_while(|&&byte| self.queue.enqueue(byte).is_ok())
            .count()
    }

    /// Number of bytes stored
    pub fn data_size(&self) -> usize {
        self.queue.len()
    }

    /// Number of bytes the buffer can hold
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Fill level
    pub fn status(&self) -> Status {
        Status {
            is_empty: self.queue.is_empty(),
            is_full: self.queue.is_full(),
        }
    }

    /// Drop all stored bytes
    pub fn clear(&mut self) {
        while self.queue.dequeue().is_some() {}
    }

    /// Split into a producer for interrupt context and a consumer for the
    /// main loop
    pub fn split(&mut self) -> (Producer<'_, u8, N>, Consumer<'_, u8, N>) {
        self.queue.split()
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
