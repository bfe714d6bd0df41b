//! # Event bitmasks and operation state
//!
//! Interrupt handlers report what happened as a set of OR-composable flags.
//! The flags are accumulated in an [`EventCell`] owned by the peripheral
//! instance, which the main flow can [`poll`](EventCell::poll),
//! [`wait_any`](EventCell::wait_any) on and [`clear`](EventCell::clear).
//! Bits are only ever removed by an explicit `clear` or `take`.
//!
//! Independently of the flags every instance tracks its outstanding operation
//! with an [`OpState`]:
//!
//! ```text
//! Idle -> InProgress -> (Complete | Incomplete | Timeout) -> Idle
//! ```
//!
//! `Idle -> InProgress` happens inside the call starting the operation,
//! leaving `InProgress` only happens from interrupt context, and the terminal
//! state is consumed by the [`Transfer`](crate::transfer::Transfer) token.
//!
//! Every start and every reset opens a new generation. The [`Ticket`]
//! returned by [`OpState::begin`] names one generation, so a token left over
//! from before a close can neither observe nor cancel a later operation.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, Ordering};

use bitflags::Flags;

use crate::status::Busy;

/// Event callback, invoked synchronously from interrupt context.
///
/// The callback must be short and must not block.
pub type Callback<E> = fn(E);

/// Interrupt-safe accumulator for an event bitmask.
pub struct EventCell<E> {
    bits: AtomicU32,
    _events: PhantomData<fn() -> E>,
}

impl<E> EventCell<E> {
    /// An empty cell
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
            _events: PhantomData,
        }
    }
}

impl<E> Default for EventCell<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventCell<E>
where
    E: Flags<Bits = u32> + Copy,
{
    /// OR `events` into the cell. Previously set bits are preserved.
    #[inline]
    pub fn post(&self, events: E) {
        self.bits.fetch_or(events.bits(), Ordering::AcqRel);
    }

    /// Current set of flags
    #[inline]
    pub fn poll(&self) -> E {
        E::from_bits_retain(self.bits.load(Ordering::Acquire))
    }

    /// Whether every flag in `events` is set
    pub fn contains(&self, events: E) -> bool {
        self.poll().contains(events)
    }

    /// Whether any flag in `events` is set
    pub fn intersects(&self, events: E) -> bool {
        self.poll().intersects(events)
    }

    /// Clear only the given flags.
    pub fn clear(&self, events: E) {
        self.bits.fetch_and(!events.bits(), Ordering::AcqRel);
    }

    /// Return all flags and leave the cell empty.
    pub fn take(&self) -> E {
        E::from_bits_retain(self.bits.swap(0, Ordering::AcqRel))
    }

    /// Busy-wait until any flag of `mask` is set, and return the whole set.
    pub fn wait_any(&self, mask: E) -> E {
        loop {
            let events = self.poll();
            if events.intersects(mask) {
                return events;
            }
            core::hint::spin_loop();
        }
    }
}

/// How a finished operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// All data was moved
    Complete,
    /// The operation stopped early because of an error
    Incomplete,
    /// The operation ended because of a receive timeout (idle line)
    Timeout,
}

impl Outcome {
    /// `Ok` if all data was moved, the outcome otherwise
    pub fn into_result(self) -> Result<(), Outcome> {
        match self {
            Outcome::Complete => Ok(()),
            failed => Err(failed),
        }
    }
}

/// State of the operation tracked by an [`OpState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum State {
    /// Nothing in flight
    Idle = 0,
    /// Started, waiting for the interrupt which finishes it
    InProgress = 1,
    /// Finished with [`Outcome::Complete`]
    Complete = 2,
    /// Finished with [`Outcome::Incomplete`]
    Incomplete = 3,
    /// Finished with [`Outcome::Timeout`]
    Timeout = 4,
}

impl State {
    fn from_bits(bits: u8) -> Self {
        match bits {
            1 => State::InProgress,
            2 => State::Complete,
            3 => State::Incomplete,
            4 => State::Timeout,
            _ => State::Idle,
        }
    }

    /// The outcome, if the operation has finished
    pub fn outcome(self) -> Option<Outcome> {
        match self {
            State::Complete => Some(Outcome::Complete),
            State::Incomplete => Some(Outcome::Incomplete),
            State::Timeout => Some(Outcome::Timeout),
            State::Idle | State::InProgress => None,
        }
    }
}

impl From<Outcome> for State {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Complete => State::Complete,
            Outcome::Incomplete => State::Incomplete,
            Outcome::Timeout => State::Timeout,
        }
    }
}

const STATE_MASK: u32 = 0xFF;
const GENERATION: u32 = 1 << 8;

/// The generation of one started operation, see [`OpState::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u32);

/// Per-operation state machine, shared between main flow and interrupt.
///
/// The low byte holds the [`State`], the bits above it the generation.
pub struct OpState(AtomicU32);

impl OpState {
    /// Idle state
    pub const fn new() -> Self {
        Self(AtomicU32::new(State::Idle as u32))
    }

    fn split(raw: u32) -> (u32, State) {
        (raw & !STATE_MASK, State::from_bits((raw & STATE_MASK) as u8))
    }

    /// Current state
    #[inline]
    pub fn current(&self) -> State {
        Self::split(self.0.load(Ordering::Acquire)).1
    }

    /// Whether an operation is in flight
    pub fn is_busy(&self) -> bool {
        self.current() == State::InProgress
    }

    /// `Idle -> InProgress`, opening a new generation
    ///
    /// Fails if an operation is in flight or its terminal state has not been
    /// consumed yet.
    pub fn begin(&self) -> Result<Ticket, Busy> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                let (generation, state) = Self::split(raw);
                (state == State::Idle)
                    .then(|| generation.wrapping_add(GENERATION) | State::InProgress as u32)
            })
            .map(|raw| Ticket(Self::split(raw).0.wrapping_add(GENERATION)))
            .map_err(|_| Busy)
    }

    /// `InProgress -> outcome`
    ///
    /// Returns `false` if no operation was in flight, e.g. because it was
    /// aborted just before the interrupt was serviced.
    pub fn finish(&self, outcome: Outcome) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                let (generation, state) = Self::split(raw);
                (state == State::InProgress).then(|| generation | State::from(outcome) as u32)
            })
            .is_ok()
    }

    /// Whether `ticket` names the current generation
    pub fn owns(&self, ticket: Ticket) -> bool {
        Self::split(self.0.load(Ordering::Acquire)).0 == ticket.0
    }

    /// State of the operation `ticket` started.
    ///
    /// An operation superseded by a reset reads as [`State::Incomplete`].
    pub fn state_of(&self, ticket: Ticket) -> State {
        match Self::split(self.0.load(Ordering::Acquire)) {
            (generation, state) if generation == ticket.0 => state,
            _ => State::Incomplete,
        }
    }

    /// Back to `Idle` if `ticket` still names the current generation.
    ///
    /// Returns `false`, leaving the state alone, for a superseded ticket.
    pub fn release(&self, ticket: Ticket) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (Self::split(raw).0 == ticket.0).then_some(ticket.0 | State::Idle as u32)
            })
            .is_ok()
    }

    /// Back to `Idle` from any state, invalidating every outstanding ticket.
    pub fn reset(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                Some(Self::split(raw).0.wrapping_add(GENERATION) | State::Idle as u32)
            });
    }
}

impl Default for OpState {
    fn default() -> Self {
        Self::new()
    }
}

/// What a low-level interrupt service routine observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Serviced<E> {
    /// Flags to post to the instance's event cell and callback
    pub events: E,
    /// Set if the outstanding operation finished during this interrupt
    pub outcome: Option<Outcome>,
}

impl<E: Flags<Bits = u32>> Serviced<E> {
    /// Nothing happened (spurious interrupt)
    pub fn none() -> Self {
        Self {
            events: E::empty(),
            outcome: None,
        }
    }

    /// Report `events` without finishing the operation
    pub fn events(events: E) -> Self {
        Self {
            events,
            outcome: None,
        }
    }

    /// Report `events` and finish the operation with `outcome`
    pub fn finished(events: E, outcome: Outcome) -> Self {
        Self {
            events,
            outcome: Some(outcome),
        }
    }
}

#[cfg(feature = "defmt")]
impl<E: Flags<Bits = u32>> defmt::Format for Serviced<E> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Serviced {{ events: {=u32:#x}, outcome: {} }}",
            self.events.bits(),
            self.outcome
        );
    }
}
