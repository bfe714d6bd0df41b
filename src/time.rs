//! Time units
//!
//! Rates (`Hertz`, `Baud`) and durations (`Milliseconds`, `Microseconds`) come
//! from [`embedded_time`].
//!
//! ```
//! use omni_hal::time::rate::{Baud, Extensions, Hertz};
//!
//! assert_eq!(400_000_u32.Hz(), Hertz(400_000_u32));
//! assert_eq!(115_200_u32.Bd(), Baud(115_200_u32));
//! ```

pub use embedded_time::{duration, rate};
