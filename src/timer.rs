//! # Tick source and delays
//!
//! [`Timer`] turns a free-running 32 bit cycle counter into delays, tick
//! counts and deadlines. On Cortex-M parts the counter is the DWT cycle
//! counter, see the family layer.
//!
//! Deadlines compare the wrapping difference of two counter values, so they
//! are correct across one wrap of the counter. A deadline can therefore be at
//! most one counter period away, longer ones saturate (about 59.6 s at 72 MHz).

use core::cell::RefCell;

use critical_section::Mutex;

use crate::hal::blocking::delay::{DelayMs, DelayUs};
use crate::status::{self, NotOpen, StatusCode};
use crate::time::duration::{Microseconds, Milliseconds};
use crate::time::rate::Hertz;

/// Milliseconds per busy-wait slice of [`Timer::delay_ms`]
const MS_SLICE: u32 = 1_000;
/// Microseconds per busy-wait slice of [`Timer::delay_us`]
const US_SLICE: u32 = 1_000;

/// Timer error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The timer has not been opened
    NotOpen,
    /// The timer is open already
    AlreadyOpen,
    /// The counter runs slower than the requested tick
    Unsupported,
}

impl StatusCode for Error {
    fn code(&self) -> i32 {
        status::FAIL
    }
}

impl From<NotOpen> for Error {
    fn from(_: NotOpen) -> Self {
        Error::NotOpen
    }
}

/// Free-running cycle counter of a family
pub trait LowLevel: Send {
    /// Start the counter
    fn configure(&mut self) -> Result<(), Error>;

    /// Current counter value
    fn cycles(&self) -> u32;

    /// Counting frequency
    fn frequency(&self) -> Hertz;
}

/// Resolution of [`Timer::get_tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickFrequency {
    /// Millisecond ticks
    KHz1,
    /// Microsecond ticks
    MHz1,
}

impl TickFrequency {
    /// Ticks per second
    pub const fn hertz(self) -> Hertz {
        match self {
            TickFrequency::KHz1 => Hertz(1_000),
            TickFrequency::MHz1 => Hertz(1_000_000),
        }
    }
}

/// A measurement of the cycle counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instant {
    cycles: u32,
}

impl Instant {
    /// The counter value
    pub fn cycles(self) -> u32 {
        self.cycles
    }

    /// Cycles from `self` to `later`, correct across one counter wrap
    pub fn cycles_until(self, later: Instant) -> u32 {
        later.cycles.wrapping_sub(self.cycles)
    }
}

/// The tick source
pub struct Timer<D> {
    driver: Mutex<RefCell<Option<D>>>,
}

impl<D> Timer<D> {
    /// A closed timer
    pub const fn new() -> Self {
        Self {
            driver: Mutex::new(RefCell::new(None)),
        }
    }
}

impl<D> Default for Timer<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cycles in `units` of `1 / per_second` at `frequency`, saturated to the
/// counter width
fn cycles_for(frequency: Hertz, units: u32, per_second: u32) -> u32 {
    let cycles = u64::from(frequency.0) * u64::from(units) / u64::from(per_second);
    u32::try_from(cycles).unwrap_or(u32::MAX)
}

impl<D: LowLevel> Timer<D> {
    fn with<R>(&self, f: impl FnOnce(&D) -> R) -> Result<R, Error> {
        critical_section::with(|cs| self.driver.borrow_ref(cs).as_ref().map(f).ok_or(Error::NotOpen))
    }

    /// Start the counter and install the driver
    pub fn open(&self, mut driver: D) -> Result<(), Error> {
        if critical_section::with(|cs| self.driver.borrow_ref(cs).is_some()) {
            return Err(Error::AlreadyOpen);
        }
        driver.configure()?;
        critical_section::with(|cs| {
            let mut slot = self.driver.borrow_ref_mut(cs);
            if slot.is_some() {
                return Err(Error::AlreadyOpen);
            }
            debug!("timer: open at {=u32} Hz", driver.frequency().0);
            *slot = Some(driver);
            Ok(())
        })
    }

    /// Remove the driver again
    pub fn close(&self) -> Option<D> {
        critical_section::with(|cs| self.driver.borrow_ref_mut(cs).take())
    }

    /// Counting frequency
    pub fn frequency(&self) -> Result<Hertz, Error> {
        self.with(|d| d.frequency())
    }

    /// The current counter value
    pub fn now(&self) -> Result<Instant, Error> {
        self.with(|d| Instant { cycles: d.cycles() })
    }

    /// Whether `timeout` has passed since `start`
    pub fn has_elapsed(&self, start: Instant, timeout: Milliseconds) -> Result<bool, Error> {
        self.with(|d| {
            let now = Instant { cycles: d.cycles() };
            start.cycles_until(now) >= cycles_for(d.frequency(), timeout.0, 1_000)
        })
    }

    /// Counter value scaled to `frequency`, i.e. `cycles / (clock / frequency)`
    pub fn get_tick(&self, frequency: TickFrequency) -> Result<u32, Error> {
        self.with(|d| {
            let divider = d.frequency().0 / frequency.hertz().0;
            if divider == 0 {
                return Err(Error::Unsupported);
            }
            Ok(d.cycles() / divider)
        })?
    }

    fn spin(&self, cycles: u32) -> Result<(), Error> {
        let start = self.now()?;
        while start.cycles_until(self.now()?) < cycles {
            core::hint::spin_loop();
        }
        Ok(())
    }

    /// Busy-wait for `ms` milliseconds
    pub fn delay_ms(&self, ms: Milliseconds) -> Result<(), Error> {
        let frequency = self.frequency()?;
        let mut remaining = ms.0;
        while remaining > 0 {
            let slice = remaining.min(MS_SLICE);
            self.spin(cycles_for(frequency, slice, 1_000))?;
            remaining -= slice;
        }
        Ok(())
    }

    /// Busy-wait for `us` microseconds
    pub fn delay_us(&self, us: Microseconds) -> Result<(), Error> {
        let frequency = self.frequency()?;
        let mut remaining = us.0;
        while remaining > 0 {
            let slice = remaining.min(US_SLICE);
            self.spin(cycles_for(frequency, slice, 1_000_000))?;
            remaining -= slice;
        }
        Ok(())
    }
}

impl<D: LowLevel> DelayMs<u32> for &Timer<D> {
    fn delay_ms(&mut self, ms: u32) {
        if Timer::delay_ms(*self, Milliseconds(ms)).is_err() {
            warn!("timer: delay on a closed timer");
        }
    }
}

impl<D: LowLevel> DelayMs<u16> for &Timer<D> {
    fn delay_ms(&mut self, ms: u16) {
        DelayMs::<u32>::delay_ms(self, u32::from(ms));
    }
}

impl<D: LowLevel> DelayMs<u8> for &Timer<D> {
    fn delay_ms(&mut self, ms: u8) {
        DelayMs::<u32>::delay_ms(self, u32::from(ms));
    }
}

impl<D: LowLevel> DelayUs<u32> for &Timer<D> {
    fn delay_us(&mut self, us: u32) {
        if Timer::delay_us(*self, Microseconds(us)).is_err() {
            warn!("timer: delay on a closed timer");
        }
    }
}

impl<D: LowLevel> DelayUs<u16> for &Timer<D> {
    fn delay_us(&mut self, us: u16) {
        DelayUs::<u32>::delay_us(self, u32::from(us));
    }
}

impl<D: LowLevel> DelayUs<u8> for &Timer<D> {
    fn delay_us(&mut self, us: u8) {
        DelayUs::<u32>::delay_us(self, u32::from(us));
    }
}
