//! # Interrupt control
//!
//! [`Controller`] is the family's interrupt controller (the NVIC on Cortex-M).
//! Priorities are given as preemption and sub priority; how the implemented
//! priority bits are split between the two is set by the priority grouping:
//!
//! | grouping | preemption bits | sub priority bits (4 bit NVIC) |
//! |----------|-----------------|--------------------------------|
//! | 0        | 0               | 4                              |
//! | 1        | 1               | 3                              |
//! | 2        | 2               | 2                              |
//! | 3        | 3               | 1                              |
//! | 4        | 4               | 0                              |
//!
//! [`IrqTable`] is a runtime handler table for applications which dispatch
//! several interrupt lines through one vector.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::status::{self, StatusCode};

/// Highest valid priority grouping
pub const MAX_GROUPING: u8 = 4;

/// Interrupt control error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The interrupt number is outside the table
    OutOfRange,
    /// Priority groupings range from 0 to [`MAX_GROUPING`]
    InvalidGrouping,
}

impl StatusCode for Error {
    fn code(&self) -> i32 {
        status::FAIL
    }
}

/// Encode `preempt` and `sub` into a priority value of `bits` bits.
///
/// Out of range priorities are truncated to their field.
///
/// ```
/// # use omni_hal::irq::encode_priority;
/// // two bits each
/// assert_eq!(encode_priority(2, 1, 2, 4), 0b01_10);
/// // all bits preemption
/// assert_eq!(encode_priority(4, 5, 3, 4), 5);
/// ```
pub const fn encode_priority(grouping: u8, preempt: u8, sub: u8, bits: u8) -> u8 {
    let preempt_bits = if grouping < bits { grouping } else { bits };
    let sub_bits = bits - preempt_bits;
    let preempt = (preempt as u32) & ((1 << preempt_bits) - 1);
    let sub = (sub as u32) & ((1 << sub_bits) - 1);
    ((preempt << sub_bits) | sub) as u8
}

/// Split a priority value of `bits` bits into preemption and sub priority.
pub const fn decode_priority(grouping: u8, priority: u8, bits: u8) -> (u8, u8) {
    let preempt_bits = if grouping < bits { grouping } else { bits };
    let sub_bits = bits - preempt_bits;
    let priority = priority as u32;
    (
        ((priority >> sub_bits) & ((1 << preempt_bits) - 1)) as u8,
        (priority & ((1 << sub_bits) - 1)) as u8,
    )
}

/// Interrupt controller of a family
pub trait Controller {
    /// Implemented priority bits, the upper bits of each priority register
    const PRIO_BITS: u8;

    /// Unmask `irq`
    fn enable(&mut self, irq: u16);

    /// Mask `irq`
    fn disable(&mut self, irq: u16);

    /// Whether `irq` is unmasked
    fn is_enabled(&self, irq: u16) -> bool;

    /// Pend `irq` from software
    fn set_pending(&mut self, irq: u16);

    /// Clear a pending `irq`
    fn clear_pending(&mut self, irq: u16);

    /// Whether `irq` is pending
    fn is_pending(&self, irq: u16) -> bool;

    /// Write the priority register of `irq`
    fn write_priority(&mut self, irq: u16, raw: u8);

    /// Read the priority register of `irq`
    fn read_priority(&self, irq: u16) -> u8;

    /// Current priority grouping, `0..=MAX_GROUPING`
    fn grouping(&self) -> u8;

    /// Program a grouping which was already checked
    fn write_grouping(&mut self, grouping: u8);

    /// Set how priority bits are split, see the module documentation.
    fn set_priority_grouping(&mut self, grouping: u8) -> Result<(), Error> {
        if grouping > MAX_GROUPING {
            return Err(Error::InvalidGrouping);
        }
        self.write_grouping(grouping);
        Ok(())
    }

    /// Set the priority of `irq` under the current grouping
    fn set_priority(&mut self, irq: u16, preempt: u8, sub: u8) {
        let priority = encode_priority(self.grouping(), preempt, sub, Self::PRIO_BITS);
        self.write_priority(irq, priority << (8 - Self::PRIO_BITS));
    }

    /// Preemption and sub priority of `irq` under the current grouping
    fn priority(&self, irq: u16) -> (u8, u8) {
        let raw = self.read_priority(irq) >> (8 - Self::PRIO_BITS);
        decode_priority(self.grouping(), raw, Self::PRIO_BITS)
    }
}

/// Runs when an interrupt without handler is dispatched
pub fn default_handler() {
    loop {
        core::hint::spin_loop();
    }
}

/// Interrupt number to handler table
///
/// ```
/// # use omni_hal::irq::IrqTable;
/// static TABLE: IrqTable<8> = IrqTable::new();
///
/// fn on_usart2() {}
///
/// TABLE.register_handler(3, on_usart2).unwrap();
/// assert!(TABLE.register_handler(8, on_usart2).is_err());
/// TABLE.dispatch(3);
/// ```
pub struct IrqTable<const N: usize> {
    handlers: Mutex<RefCell<[Option<fn()>; N]>>,
    default: fn(),
}

impl<const N: usize> IrqTable<N> {
    /// An empty table falling back to [`default_handler`]
    pub const fn new() -> Self {
        Self::with_default(default_handler)
    }

    /// An empty table falling back to `default`
    pub const fn with_default(default: fn()) -> Self {
        Self {
            handlers: Mutex::new(RefCell::new([None; N])),
            default,
        }
    }

    fn index(irq: u16) -> Result<usize, Error> {
        let index = usize::from(irq);
        if index < N {
            Ok(index)
        } else {
            Err(Error::OutOfRange)
        }
    }

    /// Install `handler` for `irq`, replacing any previous one
    pub fn register_handler(&self, irq: u16, handler: fn()) -> Result<(), Error> {
        let index = Self::index(irq)?;
        critical_section::with(|cs| self.handlers.borrow_ref_mut(cs)[index] = Some(handler));
        Ok(())
    }

    /// Remove the handler of `irq`, returning it
    pub fn unregister(&self, irq: u16) -> Result<Option<fn()>, Error> {
        let index = Self::index(irq)?;
        Ok(critical_section::with(|cs| {
            self.handlers.borrow_ref_mut(cs)[index].take()
        }))
    }

    /// The handler of `irq`
    pub fn handler(&self, irq: u16) -> Option<fn()> {
        let index = Self::index(irq).ok()?;
        critical_section::with(|cs| self.handlers.borrow_ref(cs)[index])
    }

    /// Run the handler of `irq`, or the default handler.
    ///
    /// The handler runs outside the table's critical section.
    pub fn dispatch(&self, irq: u16) {
        match self.handler(irq) {
            Some(handler) => handler(),
            None => (self.default)(),
        }
    }
}

impl<const N: usize> Default for IrqTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
