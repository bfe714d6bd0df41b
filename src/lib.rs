/*!
 # omni-hal

 A uniform driver layer for Cortex-M peripherals. Every bus peripheral (I2C,
 SPI, USART, USB) is presented through the same shape of API:

 * a statically allocated instance, described by a const [`instance::Descriptor`],
 * `open` with a per-peripheral `Config` (including the event callback),
 * asynchronous `read`/`write`/`transfer` calls returning a [`transfer::Transfer`]
   token immediately,
 * an interrupt entry (`on_interrupt`) which decodes hardware flags into an
   event bitmask, posts it to the instance's [`event::EventCell`] and invokes the
   registered callback.

 The portable core builds for any target. Register level code for a concrete
 family lives under [`family`] and is selected with a chip feature.

 # Selecting the right chip

   Please select one of the following

   (Note: `x` denotes any character in [a-z])
   *   stm32f301x6 stm32f301x8
   *   stm32f302xb stm32f302xc stm32f302xd stm32f302xe
   *   stm32f303x6 stm32f303x8 stm32f303xb stm32f303xc stm32f303xd stm32f303xe
   *   stm32f334x4 stm32f334x6 stm32f334x8

   Example: The STM32F3Discovery board has a STM32F303VCT6 chip.
   So you want to expand your call to `cargo` with `--features stm32f303xc`.

   Without a chip feature only the portable driver core is compiled, which is
   what the host test suite runs against.
*/
#![no_std]

#[cfg(all(
    feature = "ld",
    not(feature = "device-selected")
))]
compile_error!(
    "The `ld` feature requires a target chip feature.

    Example: The STM32F3Discovery board has a STM32F303VCT6 chip.
    So you want to expand your call to `cargo` with `--features stm32f303xc`."
);

pub use embedded_hal as hal;

pub use nb;
pub use nb::block;

#[cfg(feature = "stm32f301")]
pub use stm32f3::stm32f301 as pac;

#[cfg(feature = "stm32f302")]
pub use stm32f3::stm32f302 as pac;

#[cfg(feature = "stm32f303")]
pub use stm32f3::stm32f303 as pac;

#[cfg(feature = "stm32f334")]
pub use stm32f3::stm32f3x4 as pac;

// Enable use of interrupt macro
#[cfg(all(feature = "rt", feature = "device-selected"))]
pub use crate::pac::interrupt;

// This mod MUST go first, so that the others see its macros.
#[macro_use]
mod fmt;

pub mod clock;
pub mod devices;
pub mod dma;
pub mod event;
pub mod gpio;
pub mod i2c;
pub mod instance;
pub mod irq;
pub mod prelude;
pub mod registry;
pub mod ring_buffer;
pub mod serial;
pub mod spi;
pub mod status;
pub mod time;
pub mod timer;
pub mod transfer;
pub mod usb;

#[cfg(feature = "device-selected")]
pub mod family;
