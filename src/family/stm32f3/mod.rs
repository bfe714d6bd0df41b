//! # STM32F3
//!
//! Low-level drivers for every peripheral kind of the portable core. Bind
//! them into a [`Registry`](crate::registry::Registry) with [`Stm32f3`]:
//!
//! ```ignore
//! use omni_hal::family::stm32f3::{pins, I2cPort, Stm32f3};
//! use omni_hal::i2c::I2c;
//!
//! static I2C1: I2c<I2cPort> = I2c::new(pins::I2C1);
//! ```

#[cfg(feature = "stm32f303")]
mod dma;
mod dwt;
#[cfg(feature = "fault-handlers")]
mod fault;
mod gpio;
mod i2c;
mod mmio;
mod nvic;
pub mod pins;
mod rcc;
mod spi;
mod usart;
mod usb;

pub use dwt::Dwt;
pub use gpio::{has_port, GpioPort};
pub use i2c::I2cPort;
pub use nvic::Nvic;
pub use rcc::ClockControl;
pub use spi::SpiPort;
pub use usart::UsartPort;
pub use usb::{Peripheral, UsbPort};
#[cfg(all(
    feature = "stm32-usbd",
    any(
        feature = "stm32f303xb",
        feature = "stm32f303xc",
        feature = "stm32f303xd",
        feature = "stm32f303xe"
    )
))]
pub use usb::{UsbBus, UsbBusType};

use crate::registry::Family;

/// The STM32F3 family
pub struct Stm32f3;

impl Family for Stm32f3 {
    type Gpio = GpioPort;
    type I2c = I2cPort;
    type Spi = SpiPort;
    type Usart = UsartPort;
    type Timer = Dwt;
    type Usb = UsbPort;
}
