//! Types for configuring an I2C instance.

use crate::event::Callback;
use crate::time::rate::Hertz;

use super::{Error, Event};

/// Protocol the instance speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Plain I2C
    I2c,
}

/// Bus clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusSpeed {
    /// 100 kHz
    Standard,
    /// 400 kHz
    Fast,
    /// 1 MHz
    FastPlus,
    /// 3.4 MHz
    High,
}

impl BusSpeed {
    /// SCL frequency of this speed grade
    pub const fn frequency(self) -> Hertz {
        match self {
            BusSpeed::Standard => Hertz(100_000),
            BusSpeed::Fast => Hertz(400_000),
            BusSpeed::FastPlus => Hertz(1_000_000),
            BusSpeed::High => Hertz(3_400_000),
        }
    }
}

/// A 7 or 10 bit device address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    /// 7 bit address, `0x00..=0x7F`
    SevenBit(u8),
    /// 10 bit address, `0x000..=0x3FF`
    TenBit(u16),
}

impl Address {
    /// Rejects addresses that do not fit their width.
    pub fn validate(self) -> Result<Self, Error> {
        match self {
            Address::SevenBit(a) if a > 0x7F => Err(Error::InvalidAddress),
            Address::TenBit(a) if a > 0x3FF => Err(Error::InvalidAddress),
            address => Ok(address),
        }
    }

    /// The raw address
    pub fn raw(self) -> u16 {
        match self {
            Address::SevenBit(a) => u16::from(a),
            Address::TenBit(a) => a,
        }
    }

    /// Whether this is a 10 bit address
    pub fn is_ten_bit(self) -> bool {
        matches!(self, Address::TenBit(_))
    }
}

impl From<u8> for Address {
    fn from(address: u8) -> Self {
        Address::SevenBit(address)
    }
}

/// Configuration of an I2C instance.
///
/// ```
/// # use omni_hal::i2c::config::*;
/// let config = Config::default().bus_speed(BusSpeed::Fast);
///
/// assert_eq!(config.bus_speed.frequency().0, 400_000);
/// assert_eq!(config.own_address, Address::SevenBit(0));
/// assert!(!config.general_call);
/// ```
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct Config {
    /// Protocol
    pub mode: Mode,
    /// Bus clock
    pub bus_speed: BusSpeed,
    /// Address the instance answers to as a slave
    pub own_address: Address,
    /// Also answer to the general call address
    pub general_call: bool,
    /// Event callback, run from the instance's interrupt
    pub callback: Option<Callback<Event>>,
}

impl Config {
    /// Sets the bus speed.
    pub fn bus_speed(mut self, bus_speed: BusSpeed) -> Self {
        self.bus_speed = bus_speed;
        self
    }

    /// Sets the own (slave) address.
    pub fn own_address(mut self, address: impl Into<Address>) -> Self {
        self.own_address = address.into();
        self
    }

    /// Enables or disables answering the general call address.
    pub fn general_call(mut self, enable: bool) -> Self {
        self.general_call = enable;
        self
    }

    /// Sets the event callback.
    pub fn callback(mut self, callback: Callback<Event>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Checks the parts of the configuration that do not depend on the family.
    pub fn validate(&self) -> Result<(), Error> {
        self.own_address.validate().map(|_| ())
    }
}

impl Default for Config {
    /// Standard mode, 7 bit own address 0, no callback
    fn default() -> Self {
        Self {
            mode: Mode::I2c,
            bus_speed: BusSpeed::Standard,
            own_address: Address::SevenBit(0),
            general_call: false,
            callback: None,
        }
    }
}

impl From<BusSpeed> for Config {
    fn from(bus_speed: BusSpeed) -> Self {
        Self::default().bus_speed(bus_speed)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Config {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "I2c {{ mode: {}, bus_speed: {}, own_address: {}, general_call: {} }}",
            self.mode,
            self.bus_speed,
            self.own_address,
            self.general_call,
        );
    }
}
