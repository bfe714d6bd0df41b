//! W25Qxx SPI NOR flash
//!
//! The chip select is a plain output pin driven around every command. Only
//! the standard single line commands with 24 bit addresses are used, which
//! reach the first 16 MiB of a part.

use crate::devices::eeprom::PageChunks;
use crate::hal::blocking::spi::{Transfer, Write};
use crate::hal::digital::v2::OutputPin;
use crate::spi::{self, LowLevel, Spi, DUMMY};
use crate::status::{self, StatusCode};

/// Read JEDEC ID
pub const JEDEC_ID: u8 = 0x9F;
/// Read manufacturer and device ID
pub const MANUFACTURER_ID: u8 = 0x90;
/// Write enable
pub const WRITE_ENABLE: u8 = 0x06;
/// Read status register 1
pub const READ_STATUS_1: u8 = 0x05;
/// Page program
pub const PAGE_PROGRAM: u8 = 0x02;
/// Read data
pub const READ_DATA: u8 = 0x03;
/// Erase a 4 KiB sector
pub const SECTOR_ERASE: u8 = 0x20;
/// Erase the whole chip
pub const CHIP_ERASE: u8 = 0xC7;

/// Status register 1: erase or program in progress
pub const SR1_BUSY: u8 = 0x01;
/// Status register 1: write enable latch
pub const SR1_WEL: u8 = 0x02;

/// Bytes per program operation
pub const PAGE_SIZE: u16 = 256;
/// Smallest erasable unit
pub const SECTOR_SIZE: u32 = 4 * 1024;

/// Highest address reachable with 24 bit addressing
const ADDRESS_LIMIT: u32 = 1 << 24;

const MIB: u32 = 1024 * 1024;

/// Flash error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The bus failed
    Spi(spi::Error),
    /// The chip select pin could not be driven
    ChipSelect,
    /// The manufacturer and device ID is not a known W25Qxx
    UnknownDevice(u16),
    /// Erase address not on a sector boundary
    Unaligned,
    /// The access runs past the end of the memory
    OutOfRange,
}

impl StatusCode for Error {
    fn code(&self) -> i32 {
        match self {
            Error::Spi(e) => e.code(),
            _ => status::FAIL,
        }
    }
}

impl From<spi::Error> for Error {
    fn from(e: spi::Error) -> Self {
        Error::Spi(e)
    }
}

/// Capacity of the part with manufacturer and device ID `id`
///
/// ```
/// # use omni_hal::devices::flash::capacity;
/// assert_eq!(capacity(0xEF17), Some(16 * 1024 * 1024));
/// assert_eq!(capacity(0xC213), None);
/// ```
pub fn capacity(id: u16) -> Option<u32> {
    match id {
        0xEF14 => Some(2 * MIB),
        0xEF15 => Some(4 * MIB),
        0xEF16 => Some(8 * MIB),
        0xEF17 => Some(16 * MIB),
        0xEF18 => Some(32 * MIB),
        _ => None,
    }
}

/// Identification of a detected chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Info {
    /// Manufacturer and device ID, e.g. `0xEF16` for a W25Q64
    pub device_id: u16,
    /// Size in bytes
    pub capacity: u32,
    /// Erase granularity in bytes
    pub sector_size: u32,
}

fn command_bytes(command: u8, address: u32) -> [u8; 4] {
    let [_, a2, a1, a0] = address.to_be_bytes();
    [command, a2, a1, a0]
}

/// A W25Qxx behind an SPI instance
pub struct W25q<'a, D, CS> {
    spi: &'a Spi<D>,
    cs: CS,
    info: Info,
}

impl<'a, D, CS> W25q<'a, D, CS>
where
    D: LowLevel,
    CS: OutputPin,
{
    /// Identify the chip behind `spi`, rejecting unknown parts.
    ///
    /// The SPI instance has to be open with 8 bit frames.
    pub fn new(spi: &'a Spi<D>, mut cs: CS) -> Result<Self, Error> {
        cs.set_high().map_err(|_| Error::ChipSelect)?;
        let mut flash = Self {
            spi,
            cs,
            info: Info {
                device_id: 0,
                capacity: 0,
                sector_size: SECTOR_SIZE,
            },
        };
        let device_id = flash.device_id()?;
        let capacity = capacity(device_id).ok_or(Error::UnknownDevice(device_id))?;
        flash.info = Info {
            device_id,
            capacity,
            sector_size: SECTOR_SIZE,
        };
        debug!("w25q: {=u16:#x}, {=u32} bytes", device_id, capacity);
        Ok(flash)
    }

    /// What [`W25q::new`] found
    pub fn info(&self) -> Info {
        self.info
    }

    /// Give back the chip select pin
    pub fn free(self) -> CS {
        self.cs
    }

    /// Run `f` with the chip selected
    fn command<R>(
        &mut self,
        f: impl FnOnce(&mut &'a Spi<D>) -> Result<R, spi::Error>,
    ) -> Result<R, Error> {
        self.cs.set_low().map_err(|_| Error::ChipSelect)?;
        let mut spi = self.spi;
        let result = f(&mut spi);
        self.cs.set_high().map_err(|_| Error::ChipSelect)?;
        Ok(result?)
    }

    /// Manufacturer, memory type and capacity code
    pub fn jedec_id(&mut self) -> Result<[u8; 3], Error> {
        let mut frame = [JEDEC_ID, DUMMY, DUMMY, DUMMY];
        self.command(|spi| spi.transfer(&mut frame).map(|_| ()))?;
        Ok([frame[1], frame[2], frame[3]])
    }

    /// Manufacturer and device ID
    pub fn device_id(&mut self) -> Result<u16, Error> {
        let mut frame = [MANUFACTURER_ID, 0, 0, 0, DUMMY, DUMMY];
        self.command(|spi| spi.transfer(&mut frame).map(|_| ()))?;
        Ok(u16::from_be_bytes([frame[4], frame[5]]))
    }

    /// Status register 1
    pub fn read_status(&mut self) -> Result<u8, Error> {
        let mut frame = [READ_STATUS_1, DUMMY];
        self.command(|spi| spi.transfer(&mut frame).map(|_| ()))?;
        Ok(frame[1])
    }

    /// Spin until the busy bit reads 0
    pub fn wait_ready(&mut self) -> Result<(), Error> {
        while self.read_status()? & SR1_BUSY != 0 {
            core::hint::spin_loop();
        }
        Ok(())
    }

    fn write_enable(&mut self) -> Result<(), Error> {
        self.command(|spi| spi.write(&[WRITE_ENABLE]))
    }

    fn check(&self, address: u32, len: usize) -> Result<(), Error> {
        let end = u64::from(address) + len as u64;
        if end > u64::from(self.info.capacity.min(ADDRESS_LIMIT)) {
            return Err(Error::OutOfRange);
        }
        Ok(())
    }

    /// Read `buffer.len()` bytes starting at `address`
    pub fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), Error> {
        self.check(address, buffer.len())?;
        if buffer.is_empty() {
            return Ok(());
        }
        buffer.fill(DUMMY);
        self.command(|spi| {
            spi.write(&command_bytes(READ_DATA, address))?;
            spi.transfer(buffer).map(|_| ())
        })
    }

    /// Program `data` at `address`, one page at a time.
    ///
    /// Programming only clears bits, the range has to be erased first.
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        self.check(address, data.len())?;
        for chunk in PageChunks::new(address, data.len(), PAGE_SIZE) {
            self.write_enable()?;
            self.command(|spi| {
                spi.write(&command_bytes(PAGE_PROGRAM, chunk.address))?;
                spi.write(&data[chunk.offset..chunk.offset + chunk.len])
            })?;
            self.wait_ready()?;
        }
        Ok(())
    }

    /// Erase the sector starting at `address`
    pub fn erase_sector(&mut self, address: u32) -> Result<(), Error> {
        if address % SECTOR_SIZE != 0 {
            return Err(Error::Unaligned);
        }
        self.check(address, SECTOR_SIZE as usize)?;
        self.write_enable()?;
        self.command(|spi| spi.write(&command_bytes(SECTOR_ERASE, address)))?;
        self.wait_ready()
    }

    /// Erase the whole chip
    pub fn erase_chip(&mut self) -> Result<(), Error> {
        self.write_enable()?;
        self.command(|spi| spi.write(&[CHIP_ERASE]))?;
        self.wait_ready()
    }
}
