//! Types for configuring a serial interface.

use crate::event::Callback;
use crate::time::rate::Baud;

use super::Event;

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Asynchronous
    Uart,
}

/// Word length, excluding the parity bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    /// 8 bits, one byte per word
    Eight,
    /// 9 bits. Without parity every word takes two bytes of the buffer, least
    /// significant byte first. With parity the ninth bit is the parity bit.
    Nine,
}

/// Stop Bit configuration parameter for serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    /// 0.5 stop bit
    Half,
    /// 1 stop bit
    One,
    /// 1.5 stop bit
    OneAndHalf,
    /// 2 stop bit
    Two,
}

/// Parity generation and checking. If odd or even parity is selected, the
/// underlying USART will be configured to send/receive the parity bit in
/// addtion to the data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    /// No parity bit will be added/checked.
    None,
    /// The MSB transmitted/received will be generated/checked to have a
    /// even number of bits set.
    Even,
    /// The MSB transmitted/received will be generated/checked to have a
    /// odd number of bits set.
    Odd,
}

/// Hardware flow control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlowControl {
    /// None
    None,
    /// Request to send
    Rts,
    /// Clear to send
    Cts,
    /// Both
    RtsCts,
}

impl FlowControl {
    /// Whether RTS is driven
    pub fn rts(self) -> bool {
        matches!(self, FlowControl::Rts | FlowControl::RtsCts)
    }

    /// Whether CTS is sampled
    pub fn cts(self) -> bool {
        matches!(self, FlowControl::Cts | FlowControl::RtsCts)
    }
}

/// Configuration struct for [`Serial`](super::Serial).
///
/// Create a configuration by using `default` in combination with the
/// builder methods. The following snippet shows creating a configuration
/// for 19,200 Baud, 8N1 by deriving it from the default value:
/// ```
/// # use omni_hal::serial::config::*;
/// # use omni_hal::time::rate::{Baud, Extensions};
/// let config = Config::default().baudrate(19_200.Bd());
///
/// assert!(config.baudrate == 19_200.Bd());
/// assert!(config.parity == Parity::None);
/// assert!(config.stop_bits == StopBits::One);
/// ```
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct Config {
    /// Operating mode
    pub mode: Mode,
    /// Serial interface baud rate
    pub baudrate: Baud,
    /// Word length
    pub data_bits: DataBits,
    /// The number of stop bits to follow the last data bit or the parity
    /// bit
    pub stop_bits: StopBits,
    /// Whether and how to generate/check a parity bit
    pub parity: Parity,
    /// Hardware flow control
    pub flow_control: FlowControl,
    /// Event callback, run from the instance's interrupt
    pub callback: Option<Callback<Event>>,
}

impl Config {
    /// Sets the given baudrate.
    pub fn baudrate(mut self, baudrate: impl Into<Baud>) -> Self {
        self.baudrate = baudrate.into();
        self
    }

    /// Sets the word length.
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.data_bits = data_bits;
        self
    }

    /// Sets the stop bits to `stop_bits`.
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Sets the given parity.
    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Sets the flow control.
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }

    /// Sets the event callback.
    pub fn callback(mut self, callback: Callback<Event>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Buffer bytes per word on the wire
    pub fn word_bytes(&self) -> usize {
        match (self.data_bits, self.parity) {
            (DataBits::Nine, Parity::None) => 2,
            _ => 1,
        }
    }
}

impl Default for Config {
    /// Creates a new configuration with typically used parameters: 115,200
    /// Baud 8N1.
    fn default() -> Config {
        Config {
            mode: Mode::Uart,
            baudrate: Baud(115_200),
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            callback: None,
        }
    }
}

impl<T: Into<Baud>> From<T> for Config {
    fn from(b: T) -> Config {
        Config {
            baudrate: b.into(),
            ..Default::default()
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Config {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Serial {{ baudrate: {} Bd, data_bits: {}, parity: {}, stop_bits: {}, flow_control: {} }}",
            self.baudrate.0,
            self.data_bits,
            self.parity,
            self.stop_bits,
            self.flow_control,
        );
    }
}
