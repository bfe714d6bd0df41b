//! # Instance registry
//!
//! Which peripherals exist is decided by the application: it declares one
//! `static` per enabled instance and registers them at start-up. The
//! [`Registry`] then resolves peripheral numbers to instances. Every lookup is
//! a table index followed by monomorphized calls into the family's low-level
//! types, there is no dynamic dispatch.
//!
//! ```ignore
//! static I2C1: I2c<family::stm32f3::I2cPort> = I2c::new(I2C1_DESCRIPTOR);
//! static USART2: Serial<family::stm32f3::UsartPort> = Serial::new(USART2_DESCRIPTOR);
//!
//! let registry = Registry::<family::stm32f3::Stm32f3>::builder()
//!     .i2c(&I2C1)
//!     .usart(&USART2)
//!     .build()?;
//!
//! let eeprom_bus = registry.i2c(1)?;
//! ```

use crate::gpio::{self, Gpio};
use crate::i2c::{self, I2c};
use crate::serial::{self, Serial};
use crate::spi::{self, Spi};
use crate::status::{self, StatusCode};
use crate::timer::{self, Timer};
use crate::usb::{self, UsbPhy};

/// Highest peripheral number per kind
pub const MAX_INSTANCES: usize = 8;

/// The low-level driver types of one MCU family
pub trait Family: 'static {
    /// GPIO controller
    type Gpio: gpio::LowLevel + 'static;
    /// I2C instance
    type I2c: i2c::LowLevel + 'static;
    /// SPI instance
    type Spi: spi::LowLevel + 'static;
    /// USART instance
    type Usart: serial::LowLevel + 'static;
    /// Tick source
    type Timer: timer::LowLevel + 'static;
    /// USB PHY
    type Usb: usb::LowLevel + 'static;
}

/// Registry errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// No instance with this number is registered
    InvalidPeripheral,
    /// Two instances of the same kind share a number
    Duplicate,
    /// Peripheral numbers start at 1 and end at [`MAX_INSTANCES`]
    OutOfRange,
    /// A singleton (GPIO, timer) was registered twice
    AlreadyRegistered,
}

impl StatusCode for Error {
    fn code(&self) -> i32 {
        status::FAIL
    }
}

type Table<T> = [Option<&'static T>; MAX_INSTANCES];

/// Peripheral number to instance tables for family `F`
pub struct Registry<F: Family> {
    gpio: Option<&'static Gpio<F::Gpio>>,
    timer: Option<&'static Timer<F::Timer>>,
    i2c: Table<I2c<F::I2c>>,
    spi: Table<Spi<F::Spi>>,
    usart: Table<Serial<F::Usart>>,
    usb: Table<UsbPhy<F::Usb>>,
}

fn lookup<T>(table: &Table<T>, number: u8) -> Result<&'static T, Error> {
    usize::from(number)
        .checked_sub(1)
        .and_then(|index| table.get(index))
        .copied()
        .flatten()
        .ok_or(Error::InvalidPeripheral)
}

impl<F: Family> Registry<F> {
    /// Start registering instances
    pub fn builder() -> Builder<F> {
        Builder {
            registry: Registry {
                gpio: None,
                timer: None,
                i2c: [None; MAX_INSTANCES],
                spi: [None; MAX_INSTANCES],
                usart: [None; MAX_INSTANCES],
                usb: [None; MAX_INSTANCES],
            },
            error: None,
        }
    }

    /// The GPIO controller
    pub fn gpio(&self) -> Result<&'static Gpio<F::Gpio>, Error> {
        self.gpio.ok_or(Error::InvalidPeripheral)
    }

    /// The tick source
    pub fn timer(&self) -> Result<&'static Timer<F::Timer>, Error> {
        self.timer.ok_or(Error::InvalidPeripheral)
    }

    /// I2C instance `number`
    pub fn i2c(&self, number: u8) -> Result<&'static I2c<F::I2c>, Error> {
        lookup(&self.i2c, number)
    }

    /// SPI instance `number`
    pub fn spi(&self, number: u8) -> Result<&'static Spi<F::Spi>, Error> {
        lookup(&self.spi, number)
    }

    /// USART instance `number`
    pub fn usart(&self, number: u8) -> Result<&'static Serial<F::Usart>, Error> {
        lookup(&self.usart, number)
    }

    /// USB PHY `number`
    pub fn usb(&self, number: u8) -> Result<&'static UsbPhy<F::Usb>, Error> {
        lookup(&self.usb, number)
    }
}

/// Collects instances, the first error sticks until [`Builder::build`]
pub struct Builder<F: Family> {
    registry: Registry<F>,
    error: Option<Error>,
}

fn insert<T>(table: &mut Table<T>, number: u8, instance: &'static T) -> Result<(), Error> {
    let index = usize::from(number)
        .checked_sub(1)
        .filter(|&index| index < MAX_INSTANCES)
        .ok_or(Error::OutOfRange)?;
    match table[index] {
        Some(_) => Err(Error::Duplicate),
        None => {
            table[index] = Some(instance);
            Ok(())
        }
    }
}

impl<F: Family> Builder<F> {
    fn record(mut self, result: Result<(), Error>) -> Self {
        if let Err(e) = result {
            warn!("registry: rejected instance");
            self.error.get_or_insert(e);
        }
        self
    }

    /// Register the GPIO controller
    pub fn gpio(mut self, gpio: &'static Gpio<F::Gpio>) -> Self {
        let result = match self.registry.gpio.replace(gpio) {
            Some(_) => Err(Error::AlreadyRegistered),
            None => Ok(()),
        };
        self.record(result)
    }

    /// Register the tick source
    pub fn timer(mut self, timer: &'static Timer<F::Timer>) -> Self {
        let result = match self.registry.timer.replace(timer) {
            Some(_) => Err(Error::AlreadyRegistered),
            None => Ok(()),
        };
        self.record(result)
    }

    /// Register an I2C instance under its descriptor's number
    pub fn i2c(mut self, i2c: &'static I2c<F::I2c>) -> Self {
        let result = insert(&mut self.registry.i2c, i2c.descriptor().number, i2c);
        self.record(result)
    }

    /// Register an SPI instance under its descriptor's number
    pub fn spi(mut self, spi: &'static Spi<F::Spi>) -> Self {
        let result = insert(&mut self.registry.spi, spi.descriptor().number, spi);
        self.record(result)
    }

    /// Register a USART instance under its descriptor's number
    pub fn usart(mut self, usart: &'static Serial<F::Usart>) -> Self {
        let result = insert(&mut self.registry.usart, usart.descriptor().number, usart);
        self.record(result)
    }

    /// Register a USB PHY under its descriptor's number
    pub fn usb(mut self, usb: &'static UsbPhy<F::Usb>) -> Self {
        let result = insert(&mut self.registry.usb, usb.descriptor().number, usb);
        self.record(result)
    }

    /// Finish, failing with the first registration error
    pub fn build(self) -> Result<Registry<F>, Error> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.registry),
        }
    }
}
