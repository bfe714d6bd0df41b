//! General Purpose Input / Output
//!
//! Pins are addressed by number: a [`PinId`] packs the port into the high
//! nibble and the pin index into the low nibble, so `PE5` is `0x45`.
//!
//! ```
//! use omni_hal::gpio::{PinId, Port};
//!
//! let led = omni_hal::pin!(E, 9);
//! assert_eq!(led, PinId::new(Port::E, 9));
//! assert_eq!(led.raw(), 0x49);
//! assert_eq!(led.port(), Port::E);
//! ```
//!
//! All operations of [`Gpio`] are synchronous and only touch the electrical
//! state of the addressed pin; GPIO has no events.
//!
//! For use with drivers expecting [`OutputPin`], e.g. as a software
//! chip-select, borrow a [`Pin`] handle with [`Gpio::pin`].

use core::cell::RefCell;

use critical_section::Mutex;

use crate::hal::digital::v2::{InputPin, OutputPin, StatefulOutputPin, ToggleableOutputPin};
use crate::status::{self, StatusCode};

pub mod config;

pub use config::{Config, Level, Mode, Pull, Speed};

/// GPIO port
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Port {
    /// Port A
    A = 0,
    /// Port B
    B = 1,
    /// Port C
    C = 2,
    /// Port D
    D = 3,
    /// Port E
    E = 4,
    /// Port F
    F = 5,
    /// Port G
    G = 6,
    /// Port H
    H = 7,
}

impl Port {
    /// Port from its index, `0` being port A
    pub const fn from_index(index: u8) -> Option<Self> {
        Some(match index {
            0 => Port::A,
            1 => Port::B,
            2 => Port::C,
            3 => Port::D,
            4 => Port::E,
            5 => Port::F,
            6 => Port::G,
            7 => Port::H,
            _ => return None,
        })
    }

    /// Index of the port, `0` being port A
    pub const fn index(self) -> u8 {
        self as u8
    }
}

/// Pin number, `port << 4 | pin`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinId(u8);

impl PinId {
    /// Pin `pin` (0..=15) of `port`
    ///
    /// # Panics
    ///
    /// If `pin` is out of range. Evaluated at compile time in const contexts,
    /// [`PinId::try_new`] checks at runtime.
    pub const fn new(port: Port, pin: u8) -> Self {
        core::assert!(pin < 16, "pin index out of range");
        Self((port as u8) << 4 | pin)
    }

    /// Pin `pin` of `port`, failing with [`Error::InvalidPin`] for pins
    /// above 15
    pub const fn try_new(port: Port, pin: u8) -> Result<Self, Error> {
        if pin < 16 {
            Ok(Self((port as u8) << 4 | pin))
        } else {
            Err(Error::InvalidPin)
        }
    }

    /// Decode a raw pin number, rejecting unknown ports
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match Port::from_index(raw >> 4) {
            Some(_) => Some(Self(raw)),
            None => None,
        }
    }

    /// The raw pin number
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// The port
    pub const fn port(self) -> Port {
        match Port::from_index(self.0 >> 4) {
            Some(port) => port,
            // the constructors only admit valid ports
            None => Port::A,
        }
    }

    /// Pin index within the port
    pub const fn pin(self) -> u8 {
        self.0 & 0xF
    }

    /// Single bit mask of the pin within its port
    pub const fn mask(self) -> u16 {
        1 << self.pin()
    }
}

/// Build a [`PinId`] from a port letter and a pin index
///
/// `pin!(E, 5)` is `PinId::new(Port::E, 5)`.
#[macro_export]
macro_rules! pin {
    ($port:ident, $pin:expr) => {
        $crate::gpio::PinId::new($crate::gpio::Port::$port, $pin)
    };
}

/// GPIO error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The controller has not been opened
    NotOpen,
    /// The controller is open already
    AlreadyOpen,
    /// The port does not exist on this part
    InvalidPort,
    /// The pin index is out of range
    InvalidPin,
    /// The requested mode cannot be realized on this pin
    Unsupported,
}

impl StatusCode for Error {
    fn code(&self) -> i32 {
        status::FAIL
    }
}

impl From<status::NotOpen> for Error {
    fn from(_: status::NotOpen) -> Self {
        Error::NotOpen
    }
}

/// Register level access to the GPIO ports of a family
pub trait LowLevel: Send {
    /// Enable the clock of `port`, failing if the part has no such port.
    fn enable_port(&mut self, port: Port) -> Result<(), Error>;

    /// Program mode, pull and speed of `pin`. The output level has already
    /// been written.
    fn configure(&mut self, pin: PinId, config: &Config) -> Result<(), Error>;

    /// Return `pin` to floating input
    fn reset(&mut self, pin: PinId);

    /// Drive the output latch of `pin`
    fn write(&mut self, pin: PinId, level: Level);

    /// Sample the input of `pin`
    fn read(&self, pin: PinId) -> Level;

    /// The output latch of `pin`
    fn output(&self, pin: PinId) -> Level;
}

/// GPIO controller
pub struct Gpio<D> {
    driver: Mutex<RefCell<Option<D>>>,
}

impl<D> Gpio<D> {
    /// A closed controller
    pub const fn new() -> Self {
        Self {
            driver: Mutex::new(RefCell::new(None)),
        }
    }
}

impl<D> Default for Gpio<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: LowLevel> Gpio<D> {
    fn with<R>(&self, f: impl FnOnce(&mut D) -> R) -> Result<R, Error> {
        critical_section::with(|cs| {
            let mut driver = self.driver.borrow_ref_mut(cs);
            driver.as_mut().map(f).ok_or(Error::NotOpen)
        })
    }

    /// Install the family's GPIO driver
    pub fn open(&self, driver: D) -> Result<(), Error> {
        critical_section::with(|cs| {
            let mut slot = self.driver.borrow_ref_mut(cs);
            if slot.is_some() {
                return Err(Error::AlreadyOpen);
            }
            *slot = Some(driver);
            Ok(())
        })
    }

    /// Remove the driver again
    pub fn close(&self) -> Option<D> {
        critical_section::with(|cs| self.driver.borrow_ref_mut(cs).take())
    }

    /// Configure `pin`.
    ///
    /// The initial level is latched before the pin switches to output, so an
    /// output never glitches to the opposite level.
    pub fn init(&self, pin: PinId, config: Config) -> Result<(), Error> {
        self.with(|d| {
            d.enable_port(pin.port())?;
            d.write(pin, config.level);
            d.configure(pin, &config)
        })?
        .map_err(|e| {
            warn!("gpio: rejected configuration of pin {=u8:#x}", pin.raw());
            e
        })
    }

    /// Return `pin` to floating input
    pub fn deinit(&self, pin: PinId) -> Result<(), Error> {
        self.with(|d| d.reset(pin))
    }

    /// Drive `pin` to `level`
    pub fn set_level(&self, pin: PinId, level: Level) -> Result<(), Error> {
        self.with(|d| d.write(pin, level))
    }

    /// Sample `pin`
    pub fn get_level(&self, pin: PinId) -> Result<Level, Error> {
        self.with(|d| d.read(pin))
    }

    /// Invert the output latch of `pin`
    pub fn toggle(&self, pin: PinId) -> Result<(), Error> {
        self.with(|d| {
            let level = d.output(pin);
            d.write(pin, !level);
        })
    }

    /// Borrow `pin` as an [`embedded_hal`] pin
    pub fn pin(&self, pin: PinId) -> Pin<'_, D> {
        Pin { gpio: self, id: pin }
    }
}

/// A single pin of a [`Gpio`] controller
pub struct Pin<'a, D> {
    gpio: &'a Gpio<D>,
    id: PinId,
}

impl<D> Pin<'_, D> {
    /// The pin number
    pub fn id(&self) -> PinId {
        self.id
    }
}

impl<D: LowLevel> OutputPin for Pin<'_, D> {
    type Error = Error;

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.gpio.set_level(self.id, Level::High)
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.gpio.set_level(self.id, Level::Low)
    }
}

impl<D: LowLevel> StatefulOutputPin for Pin<'_, D> {
    fn is_set_high(&self) -> Result<bool, Self::Error> {
        self.gpio.with(|d| d.output(self.id) == Level::High)
    }

    fn is_set_low(&self) -> Result<bool, Self::Error> {
        self.is_set_high().map(|high| !high)
    }
}

impl<D: LowLevel> ToggleableOutputPin for Pin<'_, D> {
    type Error = Error;

    fn toggle(&mut self) -> Result<(), Self::Error> {
        self.gpio.toggle(self.id)
    }
}

impl<D: LowLevel> InputPin for Pin<'_, D> {
    type Error = Error;

    fn is_high(&self) -> Result<bool, Self::Error> {
        self.gpio.get_level(self.id).map(|l| l == Level::High)
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}
