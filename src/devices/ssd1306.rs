//! SSD1306 128x64 OLED controller on I2C
//!
//! Every bus write starts with a control byte telling commands from display
//! data. Pixels are drawn into a local frame buffer and sent with
//! [`Ssd1306::flush`], one page (eight pixel rows) per bus write.

use embedded_hal::blocking::i2c::Write;

use crate::event::Callback;
use crate::i2c::{self, I2c, LowLevel};
use crate::status::{self, StatusCode};

/// Address with the D/C pin low
pub const DEFAULT_ADDRESS: u8 = 0x3C;
pub const WIDTH: usize = 128;
pub const HEIGHT: usize = 64;
const PAGES: usize = HEIGHT / 8;

/// Control byte of a command stream
pub const COMMAND_STREAM: u8 = 0x00;
/// Control byte of a data stream
pub const DATA_STREAM: u8 = 0x40;

/// Command opcodes
pub mod command {
    pub const SET_CONTRAST: u8 = 0x81;
    pub const ENTIRE_DISPLAY_RESUME: u8 = 0xA4;
    pub const NORMAL_DISPLAY: u8 = 0xA6;
    pub const INVERSE_DISPLAY: u8 = 0xA7;
    pub const DISPLAY_OFF: u8 = 0xAE;
    pub const DISPLAY_ON: u8 = 0xAF;
    pub const MEMORY_ADDR_MODE: u8 = 0x20;
    pub const HORIZONTAL_ADDRESSING: u8 = 0x00;
    pub const COLUMN_ADDR: u8 = 0x21;
    pub const PAGE_ADDR: u8 = 0x22;
    pub const START_LINE: u8 = 0x40;
    pub const SEGMENT_REMAP: u8 = 0xA1;
    pub const MULTIPLEX_RATIO: u8 = 0xA8;
    pub const COM_SCAN_REMAPPED: u8 = 0xC8;
    pub const DISPLAY_OFFSET: u8 = 0xD3;
    pub const COM_PINS: u8 = 0xDA;
    pub const COM_PINS_ALTERNATIVE: u8 = 0x12;
    pub const CHARGE_PUMP: u8 = 0x8D;
    pub const CHARGE_PUMP_ON: u8 = 0x14;
}

bitflags::bitflags! {
    /// Display events
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Event: u32 {
        /// The controller took the power-up sequence
        const INITIALIZED = 1 << 0;
    }
}

/// Display error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The bus failed
    Bus(i2c::Error),
    /// The display has not been opened
    NotOpen,
    /// The display is open already
    AlreadyOpen,
    /// A command sequence longer than one bus write
    TooLong,
}

impl StatusCode for Error {
    fn code(&self) -> i32 {
        match self {
            Error::Bus(e) => e.code(),
            _ => status::FAIL,
        }
    }
}

impl From<i2c::Error> for Error {
    fn from(e: i2c::Error) -> Self {
        Error::Bus(e)
    }
}

/// Display settings
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Contrast, 0 to 255
    pub contrast: u8,
    /// Light pixels on a dark background when `false`
    pub inverted: bool,
    /// Told about [`Event::INITIALIZED`]
    pub callback: Option<Callback<Event>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            contrast: 0x7F,
            inverted: false,
            callback: None,
        }
    }
}

/// Display state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// The power-up sequence went through
    pub initialized: bool,
    /// The panel is lit
    pub display_on: bool,
}

/// Sticky errors, cleared by the next open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorStatus {
    /// A bus write failed
    pub bus_error: bool,
}

/// Longest command sequence sent in one write, the control byte excluded
const MAX_COMMANDS: usize = 8;

/// An SSD1306 on an I2C bus
pub struct Ssd1306<'a, D> {
    i2c: &'a I2c<D>,
    address: u8,
    status: Status,
    error: ErrorStatus,
    frame: [[u8; WIDTH]; PAGES],
}

impl<'a, D: LowLevel> Ssd1306<'a, D> {
    /// A closed display at [`DEFAULT_ADDRESS`]
    pub fn new(i2c: &'a I2c<D>) -> Self {
        Self {
            i2c,
            address: DEFAULT_ADDRESS,
            status: Status::default(),
            error: ErrorStatus::default(),
            frame: [[0; WIDTH]; PAGES],
        }
    }

    /// Set the device address
    pub fn address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Run the power-up sequence, leaving the panel dark. Reports
    /// [`Event::INITIALIZED`] to `config.callback`.
    pub fn open(&mut self, config: Config) -> Result<(), Error> {
        use command::*;

        if self.status.initialized {
            return Err(Error::AlreadyOpen);
        }
        self.error = ErrorStatus::default();
        let normal = if config.inverted {
            INVERSE_DISPLAY
        } else {
            NORMAL_DISPLAY
        };
        let sequence: [&[u8]; 7] = [
            &[DISPLAY_OFF, MULTIPLEX_RATIO, HEIGHT as u8 - 1],
            &[DISPLAY_OFFSET, 0x00, START_LINE],
            &[SEGMENT_REMAP, COM_SCAN_REMAPPED],
            &[COM_PINS, COM_PINS_ALTERNATIVE],
            &[SET_CONTRAST, config.contrast],
            &[ENTIRE_DISPLAY_RESUME, normal],
            &[
                MEMORY_ADDR_MODE,
                HORIZONTAL_ADDRESSING,
                CHARGE_PUMP,
                CHARGE_PUMP_ON,
            ],
        ];
        for commands in sequence {
            self.send(COMMAND_STREAM, commands)?;
        }

        self.status = Status {
            initialized: true,
            display_on: false,
        };
        debug!("ssd1306: open at {=u8:#x}", self.address);
        if let Some(callback) = config.callback {
            callback(Event::INITIALIZED);
        }
        Ok(())
    }

    /// Switch the panel off and forget the open.
    pub fn close(&mut self) -> Result<(), Error> {
        self.stop()?;
        self.status = Status::default();
        Ok(())
    }

    /// Light the panel
    pub fn start(&mut self) -> Result<(), Error> {
        self.command(&[command::DISPLAY_ON])?;
        self.status.display_on = true;
        Ok(())
    }

    /// Dark panel, the display memory is kept
    pub fn stop(&mut self) -> Result<(), Error> {
        self.command(&[command::DISPLAY_OFF])?;
        self.status.display_on = false;
        Ok(())
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Errors seen since the last open
    pub fn error(&self) -> ErrorStatus {
        self.error
    }

    /// Send up to eight command bytes in one write
    pub fn command(&mut self, commands: &[u8]) -> Result<(), Error> {
        if !self.status.initialized {
            return Err(Error::NotOpen);
        }
        self.send(COMMAND_STREAM, commands)
    }

    /// Set pixel (`x`, `y`) in the frame buffer. Pixels off the panel are
    /// ignored.
    pub fn set_pixel(&mut self, x: usize, y: usize, on: bool) {
        if x >= WIDTH || y >= HEIGHT {
            return;
        }
        let bit = 1 << (y % 8);
        let byte = &mut self.frame[y / 8][x];
        if on {
            *byte |= bit;
        } else {
            *byte &= !bit;
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < WIDTH && y < HEIGHT && self.frame[y / 8][x] & 1 << (y % 8) != 0
    }

    /// Clear the frame buffer
    pub fn clear(&mut self) {
        self.frame = [[0; WIDTH]; PAGES];
    }

    /// Send the whole frame buffer to the display memory.
    pub fn flush(&mut self) -> Result<(), Error> {
        use command::*;

        self.command(&[
            COLUMN_ADDR,
            0,
            WIDTH as u8 - 1,
            PAGE_ADDR,
            0,
            PAGES as u8 - 1,
        ])?;
        let mut write = [0; WIDTH + 1];
        write[0] = DATA_STREAM;
        for page in 0..PAGES {
            write[1..].copy_from_slice(&self.frame[page]);
            self.write_bus(&write)?;
        }
        Ok(())
    }

    fn send(&mut self, control: u8, bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() > MAX_COMMANDS {
            return Err(Error::TooLong);
        }
        let mut write = [control; MAX_COMMANDS + 1];
        write[1..=bytes.len()].copy_from_slice(bytes);
        self.write_bus(&write[..=bytes.len()])
    }

    fn write_bus(&mut self, bytes: &[u8]) -> Result<(), Error> {
        // the inherent `I2c::write` is the asynchronous one
        Write::write(&mut self.i2c, self.address, bytes).map_err(|e| {
            self.error.bus_error = true;
            warn!("ssd1306: write failed: {}", e);
            Error::from(e)
        })
    }
}
