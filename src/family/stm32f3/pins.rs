//! Descriptors for the STM32F3Discovery
//!
//! Pins follow the board's headers. Clocks are the reset values, 8 MHz from
//! the HSI on both APB buses and for the I2C kernel clock. Applications which
//! change the clock tree build their own descriptors with the same pins.

use crate::dma::DmaDescriptor;
use crate::gpio::{PinId, Port};
use crate::instance::{Descriptor, PinBinding, Role};
use crate::time::rate::Hertz;

/// HSI, the clock of every bus after reset
pub const HSI: Hertz = Hertz(8_000_000);

/// Interrupt numbers of the vector table
pub mod irq {
    pub const DMA1_CH1: u16 = 11;
    pub const DMA1_CH2: u16 = 12;
    pub const DMA1_CH3: u16 = 13;
    pub const DMA1_CH4: u16 = 14;
    pub const DMA1_CH5: u16 = 15;
    pub const DMA1_CH6: u16 = 16;
    pub const DMA1_CH7: u16 = 17;
    pub const USB_LP: u16 = 20;
    /// Event line, the error line follows at `+ 1`
    pub const I2C1_EV: u16 = 31;
    pub const I2C2_EV: u16 = 33;
    pub const SPI1: u16 = 35;
    pub const SPI2: u16 = 36;
    pub const USART1: u16 = 37;
    pub const USART2: u16 = 38;
    pub const USART3: u16 = 39;
    pub const SPI3: u16 = 51;
}

const fn pa(pin: u8) -> PinId {
    PinId::new(Port::A, pin)
}

const fn pb(pin: u8) -> PinId {
    PinId::new(Port::B, pin)
}

/// I2C1 on PB6 (SCL) and PB7 (SDA)
pub const I2C1: Descriptor = Descriptor::new(1, HSI)
    .irq(irq::I2C1_EV, 2)
    .pin(PinBinding::new(Role::Scl, pb(6), 4))
    .pin(PinBinding::new(Role::Sda, pb(7), 4));

/// I2C2 on PA9 (SCL) and PA10 (SDA)
pub const I2C2: Descriptor = Descriptor::new(2, HSI)
    .irq(irq::I2C2_EV, 2)
    .pin(PinBinding::new(Role::Scl, pa(9), 4))
    .pin(PinBinding::new(Role::Sda, pa(10), 4));

/// SPI1 on PA5 (SCK), PA6 (MISO) and PA7 (MOSI), interrupt driven
pub const SPI1: Descriptor = Descriptor::new(1, HSI)
    .irq(irq::SPI1, 3)
    .pin(PinBinding::new(Role::Sck, pa(5), 5))
    .pin(PinBinding::new(Role::Miso, pa(6), 5))
    .pin(PinBinding::new(Role::Mosi, pa(7), 5));

/// [`SPI1`] moving its data on DMA1 channels 2 (receive) and 3 (transmit)
pub const SPI1_DMA: Descriptor = SPI1
    .dma_rx(DmaDescriptor::rx(1, 2).irq(irq::DMA1_CH2, 3))
    .dma_tx(DmaDescriptor::tx(1, 3));

/// SPI2 on PB13 (SCK), PB14 (MISO) and PB15 (MOSI)
pub const SPI2: Descriptor = Descriptor::new(2, HSI)
    .irq(irq::SPI2, 3)
    .pin(PinBinding::new(Role::Sck, pb(13), 5))
    .pin(PinBinding::new(Role::Miso, pb(14), 5))
    .pin(PinBinding::new(Role::Mosi, pb(15), 5));

/// USART1 on PC4 (TX) and PC5 (RX)
pub const USART1: Descriptor = Descriptor::new(1, HSI)
    .irq(irq::USART1, 4)
    .pin(PinBinding::new(Role::Tx, PinId::new(Port::C, 4), 7))
    .pin(PinBinding::new(Role::Rx, PinId::new(Port::C, 5), 7));

/// USART2 on PA2 (TX) and PA3 (RX)
pub const USART2: Descriptor = Descriptor::new(2, HSI)
    .irq(irq::USART2, 4)
    .pin(PinBinding::new(Role::Tx, pa(2), 7))
    .pin(PinBinding::new(Role::Rx, pa(3), 7));

/// USB on PA11 (D-) and PA12 (D+). The controller needs the 48 MHz clock
/// of a [`clock::Config::usb`](crate::clock::Config::usb) clock tree.
pub const USB: Descriptor = Descriptor::new(1, Hertz(48_000_000))
    .irq(irq::USB_LP, 5)
    .pin(PinBinding::new(Role::Dm, pa(11), 14))
    .pin(PinBinding::new(Role::Dp, pa(12), 14));
