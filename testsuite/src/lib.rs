/*!
# Testsuite

This testsuite module defines the test setup via the board wiring.

Because of the ease of use, the tests are written for the STM32F3Discovery board.

To easier run any test on other hardware, the wiring is collected here as pin
ids and instance descriptors. In most cases, pins are pairs of GPIOs connected
to each other, so that one pin can confirm the correct behavior of the other
pin and the underlying peripheral.

The clock tree is left at its reset state, every bus runs from the 8 MHz HSI.
*/
#![no_std]
#![cfg_attr(test, no_main)]

use defmt_rtt as _;
use panic_probe as _;

use omni_hal::family::stm32f3::pins::{irq, HSI};
use omni_hal::gpio::PinId;
use omni_hal::instance::{Descriptor, PinBinding, Role};
use omni_hal::pin;

/// Pin connected to Vdd, which should be 3.3 Volts
pub const VDD_PIN: PinId = pin!(C, 2);
/// Pin connected to Ground / GND
pub const GROUND_PIN: PinId = pin!(C, 3);

/// Pin pair directly connected to each other.
///
/// Used for basic GPIO tests
pub const GENERIC_PAIR: (PinId, PinId) = (pin!(C, 0), pin!(C, 1));

/// USART1 with TX on PA9 looped back to RX on PA10
pub const SERIAL_PAIR: Descriptor = Descriptor::new(1, HSI)
    .irq(irq::USART1, 4)
    .pin(PinBinding::new(Role::Tx, pin!(A, 9), 7))
    .pin(PinBinding::new(Role::Rx, pin!(A, 10), 7));

/// SPI3 on PC10 (SCK), PC11 (MISO) and PC12 (MOSI), with MISO wired to MOSI
pub const SPI_PAIR: Descriptor = Descriptor::new(3, HSI)
    .irq(irq::SPI3, 3)
    .pin(PinBinding::new(Role::Sck, pin!(C, 10), 6))
    .pin(PinBinding::new(Role::Miso, pin!(C, 11), 6))
    .pin(PinBinding::new(Role::Mosi, pin!(C, 12), 6));

/// Accelerometer of the on-board LSM303 on I2C1
pub const ACCELEROMETER: u8 = 0x19;

#[export_name = "main"]
unsafe extern "C" fn __dummy_entry() -> ! {
    defmt_test::export::exit()
}
