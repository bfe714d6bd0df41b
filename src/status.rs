//! Numeric status codes.
//!
//! Every driver error converts into one of the codes below, so firmware that
//! reports status over a wire (or compares against the C driver layer) sees a
//! stable value. Success is `0`, failures are always negative.

/// Operation succeeded
pub const OK: i32 = 0;
/// Generic failure: rejected configuration, unknown peripheral, device not ready
pub const FAIL: i32 = -1;
/// Another operation is in flight on this instance
pub const BUSY: i32 = -2;
/// A polled operation ran out of time
pub const TIMEOUT: i32 = -3;

/// Conversion into a numeric status code.
pub trait StatusCode {
    /// The status code, `0` for success and negative for failures.
    fn code(&self) -> i32;
}

impl<T, E: StatusCode> StatusCode for Result<T, E> {
    fn code(&self) -> i32 {
        match self {
            Ok(_) => OK,
            Err(e) => e.code(),
        }
    }
}

/// Marker error returned when an instance already has an operation in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Busy;

impl StatusCode for Busy {
    fn code(&self) -> i32 {
        BUSY
    }
}

/// Marker error returned when an instance has not been opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NotOpen;

impl StatusCode for NotOpen {
    fn code(&self) -> i32 {
        FAIL
    }
}
