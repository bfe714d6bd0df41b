//! Types for configuring a spi interface.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

use crate::event::Callback;
use crate::hal::spi::{Mode, Phase, Polarity};
use crate::time::rate::Hertz;

use super::{Error, Event};

/// Operating mode flags of an SPI instance, combined with `|`.
///
/// ```
/// # use omni_hal::spi::config::Options;
/// let options = Options::MASTER | Options::CPOL_HIGH | Options::data_size(16);
///
/// assert_eq!(options.data_bits(), 16);
/// assert!(options.validate().is_ok());
/// assert!(Options::data_size(12).validate().is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Options(u32);

impl Options {
    const ROLE_MASK: u32 = 0x1;
    const LINES_POS: u32 = 1;
    const LINES_MASK: u32 = 0x3 << Self::LINES_POS;
    const CPOL_MASK: u32 = 1 << 3;
    const CPHA_MASK: u32 = 1 << 4;
    const DATA_SIZE_POS: u32 = 5;
    const DATA_SIZE_MASK: u32 = 0x3F << Self::DATA_SIZE_POS;
    const LSB_MASK: u32 = 1 << 11;
    const SS_POS: u32 = 12;
    const SS_MASK: u32 = 0x3 << Self::SS_POS;
    const TI_MASK: u32 = 1 << 15;
    const KNOWN: u32 = Self::ROLE_MASK
        | Self::LINES_MASK
        | Self::CPOL_MASK
        | Self::CPHA_MASK
        | Self::DATA_SIZE_MASK
        | Self::LSB_MASK
        | Self::SS_MASK
        | Self::TI_MASK;

    /// Drive the clock
    pub const MASTER: Options = Options(0);
    /// Follow an external clock
    pub const SLAVE: Options = Options(1);

    /// Two lines, full duplex
    pub const FULL_DUPLEX: Options = Options(0 << Self::LINES_POS);
    /// Two lines, receive only
    pub const RX_ONLY: Options = Options(1 << Self::LINES_POS);
    /// One bidirectional data line
    pub const BIDIRECTIONAL: Options = Options(2 << Self::LINES_POS);

    /// Clock idles low
    pub const CPOL_LOW: Options = Options(0);
    /// Clock idles high
    pub const CPOL_HIGH: Options = Options(Self::CPOL_MASK);
    /// Data captured on the first clock edge
    pub const CPHA_1EDGE: Options = Options(0);
    /// Data captured on the second clock edge
    pub const CPHA_2EDGE: Options = Options(Self::CPHA_MASK);

    /// Most significant bit first
    pub const MSB_FIRST: Options = Options(0);
    /// Least significant bit first
    pub const LSB_FIRST: Options = Options(Self::LSB_MASK);

    /// No slave select handling
    pub const SS_NONE: Options = Options(0 << Self::SS_POS);
    /// Slave select driven by software, e.g. a GPIO chip-select
    pub const SS_SOFT: Options = Options(1 << Self::SS_POS);
    /// Hardware slave select input
    pub const SS_HARD_INPUT: Options = Options(2 << Self::SS_POS);
    /// Hardware slave select output
    pub const SS_HARD_OUTPUT: Options = Options(3 << Self::SS_POS);

    /// Motorola frame format
    pub const MOTOROLA: Options = Options(0);
    /// TI frame format
    pub const TI: Options = Options(Self::TI_MASK);

    /// Frames of `bits` data bits
    pub const fn data_size(bits: u8) -> Options {
        Options(((bits as u32) << Self::DATA_SIZE_POS) & Self::DATA_SIZE_MASK)
    }

    /// Options from their raw value
    pub const fn from_bits(bits: u32) -> Options {
        Options(bits)
    }

    /// The raw value
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether the instance is the bus master
    pub fn is_master(self) -> bool {
        self.0 & Self::ROLE_MASK == 0
    }

    /// Data line configuration
    pub fn lines(self) -> Result<Lines, Error> {
        match (self.0 & Self::LINES_MASK) >> Self::LINES_POS {
            0 => Ok(Lines::FullDuplex),
            1 => Ok(Lines::RxOnly),
            2 => Ok(Lines::Bidirectional),
            _ => Err(Error::Unsupported),
        }
    }

    /// Clock polarity
    pub fn polarity(self) -> Polarity {
        if self.0 & Self::CPOL_MASK == 0 {
            Polarity::IdleLow
        } else {
            Polarity::IdleHigh
        }
    }

    /// Clock phase
    pub fn phase(self) -> Phase {
        if self.0 & Self::CPHA_MASK == 0 {
            Phase::CaptureOnFirstTransition
        } else {
            Phase::CaptureOnSecondTransition
        }
    }

    /// Bits per frame. `0` means the size was not set and defaults to 8.
    pub fn data_bits(self) -> u8 {
        match (self.0 & Self::DATA_SIZE_MASK) >> Self::DATA_SIZE_POS {
            0 => 8,
            // masked to six bits
            bits => bits as u8,
        }
    }

    /// Whether the least significant bit goes first
    pub fn lsb_first(self) -> bool {
        self.0 & Self::LSB_MASK != 0
    }

    /// Slave select handling
    pub fn slave_select(self) -> SlaveSelect {
        match (self.0 & Self::SS_MASK) >> Self::SS_POS {
            0 => SlaveSelect::None,
            1 => SlaveSelect::Soft,
            2 => SlaveSelect::HardInput,
            _ => SlaveSelect::HardOutput,
        }
    }

    /// Whether the TI frame format is used
    pub fn ti(self) -> bool {
        self.0 & Self::TI_MASK != 0
    }

    /// Width of a frame on the wire, rejecting what no family can do.
    pub fn validate(self) -> Result<FrameSize, Error> {
        if self.0 & !Self::KNOWN != 0 {
            return Err(Error::Unsupported);
        }
        self.lines()?;
        if self.ti() && self.slave_select() == SlaveSelect::Soft {
            // the TI format drives NSS itself
            return Err(Error::Unsupported);
        }
        match self.data_bits() {
            8 => Ok(FrameSize::Eight),
            16 => Ok(FrameSize::Sixteen),
            _ => Err(Error::Unsupported),
        }
    }
}

impl BitOr for Options {
    type Output = Options;

    fn bitor(self, rhs: Options) -> Options {
        Options(self.0 | rhs.0)
    }
}

impl BitOrAssign for Options {
    fn bitor_assign(&mut self, rhs: Options) {
        self.0 |= rhs.0;
    }
}

impl From<Mode> for Options {
    fn from(mode: Mode) -> Self {
        let mut options = Options::default();
        if mode.polarity == Polarity::IdleHigh {
            options |= Options::CPOL_HIGH;
        }
        if mode.phase == Phase::CaptureOnSecondTransition {
            options |= Options::CPHA_2EDGE;
        }
        options
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Options({:#06x})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Options {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Options({=u32:#06x})", self.0);
    }
}

/// Data line configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Lines {
    /// MOSI and MISO, full duplex
    FullDuplex,
    /// MOSI and MISO, receive only
    RxOnly,
    /// One line, half duplex
    Bidirectional,
}

/// Slave select handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlaveSelect {
    /// Not used
    None,
    /// Software managed
    Soft,
    /// Hardware input
    HardInput,
    /// Hardware output
    HardOutput,
}

/// Width of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameSize {
    /// 8 bit frames, one byte each
    Eight,
    /// 16 bit frames, two bytes each, least significant byte first in memory
    Sixteen,
}

impl FrameSize {
    /// Bytes per frame
    pub fn bytes(self) -> usize {
        match self {
            FrameSize::Eight => 1,
            FrameSize::Sixteen => 2,
        }
    }
}

/// Baud rate prescaler, `clock / 2^(br + 1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Prescaler {
    br: u8,
}

impl Prescaler {
    /// The smallest divider out of `/2 ..= /256` bringing `clock` down to at
    /// most `frequency`. Frequencies below `clock / 256` get `/256`.
    ///
    /// ```
    /// # use omni_hal::spi::config::Prescaler;
    /// # use omni_hal::time::rate::Hertz;
    /// let p = Prescaler::new(Hertz(72_000_000), Hertz(10_000_000)).unwrap();
    /// assert_eq!(p.divider(), 8);
    /// ```
    pub fn new(clock: Hertz, frequency: Hertz) -> Result<Self, Error> {
        if clock.0 == 0 || frequency.0 == 0 {
            return Err(Error::Unsupported);
        }
        let br = (0..7u8)
            .find(|br| u64::from(clock.0) <= u64::from(frequency.0) << (br + 1))
            .unwrap_or(7);
        Ok(Self { br })
    }

    /// The `BR` field value
    pub fn bits(self) -> u8 {
        self.br
    }

    /// The divider
    pub fn divider(self) -> u32 {
        2 << self.br
    }
}

/// Configuration struct for [`Spi`](super::Spi).
///
/// Defaults to a master in [`MODE_0`](crate::hal::spi::MODE_0) with 8 bit
/// frames, software slave select and a frequency of 1 MHz.
///
/// ```
/// # use omni_hal::spi::config::{Config, Options};
/// # use omni_hal::time::rate::Hertz;
/// let config = Config::default().frequency(Hertz(8_000_000));
///
/// assert_eq!(config.frequency, Hertz(8_000_000_u32));
/// assert!(config.options.is_master());
/// assert_eq!(config.options.data_bits(), 8);
/// ```
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct Config {
    /// Operating mode flags
    pub options: Options,
    /// Highest acceptable SCK frequency
    pub frequency: Hertz,
    /// Event callback, run from the instance's interrupt
    pub callback: Option<Callback<Event>>,
}

impl Config {
    /// Set the operating mode flags
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Set the operating frequency of the SPI
    pub fn frequency(mut self, frequency: impl Into<Hertz>) -> Self {
        self.frequency = frequency.into();
        self
    }

    /// Set the event callback
    pub fn callback(mut self, callback: Callback<Event>) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            options: Options::MASTER | Options::data_size(8) | Options::SS_SOFT,
            frequency: Hertz(1_000_000),
            callback: None,
        }
    }
}

impl From<Hertz> for Config {
    fn from(frequency: Hertz) -> Config {
        Config {
            frequency,
            ..Default::default()
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Config {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Config {{ options: {}, frequency: {} Hz }}",
            self.options,
            self.frequency.0,
        );
    }
}
