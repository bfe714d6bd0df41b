//! # Device drivers
//!
//! Drivers for external chips, layered on the bus façades. They use the
//! blocking calls of the façades, so the bus instance has to be open and its
//! interrupt wired up. The [`console`] needs only the `embedded-hal` serial
//! traits.

pub mod console;
pub mod eeprom;
pub mod flash;
pub mod ssd1306;
