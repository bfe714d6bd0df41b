//! # Asynchronous transfers
//!
//! Starting a read or write hands a `'static` buffer to the driver and returns
//! a [`Transfer`] immediately. The interrupt handler moves the data and
//! finishes the operation; the token reports the [`Outcome`] and gives the
//! buffer back. Dropping an unfinished token aborts the operation, so the
//! hardware never touches a buffer after it was returned.

use core::sync::atomic::{self, Ordering};

use embedded_dma::{ReadBuffer, WriteBuffer};

use crate::event::{OpState, Outcome, State, Ticket};

/// Read-only view of a transmit buffer, as handed to a low-level driver.
///
/// The view stays valid until the operation finishes or is aborted.
#[derive(Debug)]
pub struct TxBuf {
    ptr: *const u8,
    len: usize,
}

// NOTE(unsafe) the owning `Transfer` keeps the buffer alive and unmoved while
// the view is shared with interrupt context.
unsafe impl Send for TxBuf {}

impl TxBuf {
    /// View the memory of `buffer`.
    ///
    /// # Safety
    ///
    /// `buffer` must outlive the view and not be written while the view is used.
    pub unsafe fn new<B: ReadBuffer<Word = u8>>(buffer: &B) -> Self {
        let (ptr, len) = buffer.read_buffer();
        Self { ptr, len }
    }

    /// A view onto `len` bytes at `ptr`.
    ///
    /// # Safety
    ///
    /// See [`TxBuf::new`].
    pub(crate) unsafe fn from_raw(ptr: *const u8, len: usize) -> Self {
        Self { ptr, len }
    }

    /// A view onto a borrowed slice.
    ///
    /// # Safety
    ///
    /// The operation using the view must finish before the borrow ends.
    pub(crate) unsafe fn from_slice(data: &[u8]) -> Self {
        Self::from_raw(data.as_ptr(), data.len())
    }

    /// A view onto a `'static` slice
    pub fn from_static(data: &'static [u8]) -> Self {
        Self {
            ptr: data.as_ptr(),
            len: data.len(),
        }
    }

    /// Number of bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start address, e.g. for a DMA memory address register
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// The bytes behind the view.
    ///
    /// # Safety
    ///
    /// Only valid while the operation that received the view is in flight.
    pub unsafe fn as_slice(&self) -> &[u8] {
        core::slice::from_raw_parts(self.ptr, self.len)
    }
}

/// Writable view of a receive buffer, as handed to a low-level driver.
#[derive(Debug)]
pub struct RxBuf {
    ptr: *mut u8,
    len: usize,
}

// NOTE(unsafe) see `TxBuf`
unsafe impl Send for RxBuf {}

impl RxBuf {
    /// View the memory of `buffer`.
    ///
    /// # Safety
    ///
    /// `buffer` must outlive the view and not be accessed while the view is used.
    pub unsafe fn new<B: WriteBuffer<Word = u8>>(buffer: &mut B) -> Self {
        let (ptr, len) = buffer.write_buffer();
        Self { ptr, len }
    }

    /// A view onto a borrowed slice.
    ///
    /// # Safety
    ///
    /// See [`TxBuf::from_slice`].
    pub(crate) unsafe fn from_slice(data: &mut [u8]) -> Self {
        Self {
            ptr: data.as_mut_ptr(),
            len: data.len(),
        }
    }

    /// Number of bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start address
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Start address, e.g. for a DMA memory address register
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr
    }

    /// The bytes behind the view.
    ///
    /// # Safety
    ///
    /// Only valid while the operation that received the view is in flight.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        core::slice::from_raw_parts_mut(self.ptr, self.len)
    }
}

/// The operation a [`Transfer`] waits on.
pub trait Operation {
    /// State machine of the operation
    fn state(&self) -> &OpState;

    /// Generation the operation was started in
    fn ticket(&self) -> Ticket;

    /// Abort the low-level operation if it is still running and release the
    /// state. Does nothing once the instance has moved on to a later
    /// generation.
    fn cancel(&self);
}

/// An operation in flight, owning its buffer(s).
pub struct Transfer<B, O: Operation> {
    inner: Option<(B, O)>,
}

impl<B, O: Operation> Transfer<B, O> {
    pub(crate) fn new(buffer: B, operation: O) -> Self {
        Self {
            inner: Some((buffer, operation)),
        }
    }

    fn operation(&self) -> &O {
        // `inner` is only taken by consuming methods
        match &self.inner {
            Some((_, op)) => op,
            None => unreachable!(),
        }
    }

    /// Current state of the operation
    pub fn state(&self) -> State {
        let op = self.operation();
        op.state().state_of(op.ticket())
    }

    /// Is this transfer finished?
    pub fn is_complete(&self) -> bool {
        self.outcome().is_some()
    }

    /// How the transfer ended, if it has
    pub fn outcome(&self) -> Option<Outcome> {
        self.state().outcome()
    }

    /// Busy-wait until the transfer finishes and return the buffer.
    pub fn wait(mut self) -> (B, Outcome) {
        let outcome = loop {
            if let Some(outcome) = self.outcome() {
                break outcome;
            }
            core::hint::spin_loop();
        };

        // Memory written by the interrupt must not be read before this point
        atomic::compiler_fence(Ordering::SeqCst);

        match self.inner.take() {
            Some((buffer, op)) => {
                op.state().release(op.ticket());
                (buffer, outcome)
            }
            None => unreachable!(),
        }
    }

    /// Abort the transfer and return the buffer.
    pub fn stop(mut self) -> B {
        match self.inner.take() {
            Some((buffer, op)) => {
                op.cancel();
                atomic::compiler_fence(Ordering::SeqCst);
                buffer
            }
            None => unreachable!(),
        }
    }
}

impl<B, O: Operation> Drop for Transfer<B, O> {
    fn drop(&mut self) {
        if let Some((_, op)) = self.inner.take() {
            op.cancel();
            atomic::compiler_fence(Ordering::SeqCst);
        }
    }
}
