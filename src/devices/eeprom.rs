//! AT24Cxx I2C EEPROM
//!
//! Writes are split at page boundaries: the chip wraps around inside the
//! current page instead of moving on to the next one. After every page the
//! chip is busy with its write cycle and does not acknowledge its address,
//! which is waited out with [`I2c::is_device_ready`].

use crate::i2c::{self, Address, Event, I2c, LowLevel, MemAddress};
use crate::status::{self, StatusCode};

/// Address of an AT24Cxx with all address pins low
pub const DEFAULT_ADDRESS: u8 = 0x50;
/// Page size of the AT24C32 and larger
pub const DEFAULT_PAGE_SIZE: u16 = 64;
/// Capacity of the AT24C256
pub const DEFAULT_CAPACITY: u32 = 32 * 1024;
/// Address pings spent on one write cycle
pub const MAX_TRIALS: u32 = 300;

/// Parts up to this size take one address byte plus block bits in the
/// device address
const ONE_BYTE_ADDRESSING: u32 = 2 * 1024;

/// EEPROM error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The bus failed, or the chip stayed busy
    Bus(i2c::Error),
    /// The access runs past the end of the memory
    OutOfRange,
}

impl StatusCode for Error {
    fn code(&self) -> i32 {
        match self {
            Error::Bus(e) => e.code(),
            Error::OutOfRange => status::FAIL,
        }
    }
}

impl From<i2c::Error> for Error {
    fn from(e: i2c::Error) -> Self {
        Error::Bus(e)
    }
}

/// One page-aligned piece of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Chunk {
    /// Memory address of the first byte
    pub address: u32,
    /// Offset of the first byte in the data
    pub offset: usize,
    /// Number of bytes
    pub len: usize,
}

/// Splits `len` bytes starting at `address` into pieces which do not cross
/// a page boundary.
///
/// ```
/// # use omni_hal::devices::eeprom::PageChunks;
/// let lens: Vec<_> = PageChunks::new(60, 140, 64).map(|c| c.len).collect();
/// assert_eq!(lens, [4, 64, 64, 8]);
/// ```
#[derive(Debug, Clone)]
pub struct PageChunks {
    address: u32,
    offset: usize,
    remaining: usize,
    page: u32,
}

impl PageChunks {
    /// Chunks of a write of `len` bytes at `address` to pages of `page` bytes
    pub fn new(address: u32, len: usize, page: u16) -> Self {
        Self {
            address,
            offset: 0,
            remaining: len,
            page: u32::from(page.max(1)),
        }
    }
}

impl Iterator for PageChunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.remaining == 0 {
            return None;
        }
        let room = (self.page - self.address % self.page) as usize;
        let len = self.remaining.min(room);
        let chunk = Chunk {
            address: self.address,
            offset: self.offset,
            len,
        };
        // `len` is at most one page
        self.address += len as u32;
        self.offset += len;
        self.remaining -= len;
        Some(chunk)
    }
}

/// An AT24Cxx on an I2C bus
pub struct At24c<'a, D> {
    i2c: &'a I2c<D>,
    address: u8,
    page_size: u16,
    capacity: u32,
}

impl<'a, D: LowLevel> At24c<'a, D> {
    /// An AT24C256 at [`DEFAULT_ADDRESS`]
    pub fn new(i2c: &'a I2c<D>) -> Self {
        Self {
            i2c,
            address: DEFAULT_ADDRESS,
            page_size: DEFAULT_PAGE_SIZE,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Set the device address
    pub fn address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Set the page size
    pub fn page_size(mut self, page_size: u16) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the memory size in bytes
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Memory size in bytes
    pub fn size(&self) -> u32 {
        self.capacity
    }

    fn check(&self, address: u32, len: usize) -> Result<(), Error> {
        let end = u64::from(address) + len as u64;
        if end > u64::from(self.capacity) {
            return Err(Error::OutOfRange);
        }
        Ok(())
    }

    /// Device and register address of memory `address`
    fn target(&self, address: u32) -> (Address, MemAddress) {
        if self.capacity <= ONE_BYTE_ADDRESSING {
            // bits 8..=10 select the block through the device address
            let block = ((address >> 8) & 0x7) as u8;
            (
                Address::SevenBit(self.address | block),
                MemAddress::U8(address as u8),
            )
        } else {
            (
                Address::SevenBit(self.address),
                MemAddress::U16(address as u16),
            )
        }
    }

    /// Write `data` at `address`, one page at a time
    pub fn write(&self, address: u32, data: &[u8]) -> Result<(), Error> {
        self.check(address, data.len())?;
        for chunk in PageChunks::new(address, data.len(), self.page_size) {
            let (device, register) = self.target(chunk.address);
            self.i2c
                .events()
                .clear(Event::TRANSFER_COMPLETE | Event::TRANSFER_INCOMPLETE);
            self.i2c.memory_write(
                device,
                register,
                &data[chunk.offset..chunk.offset + chunk.len],
            )?;
            self.i2c.is_device_ready(device, MAX_TRIALS)?;
        }
        Ok(())
    }

    /// Read `buffer.len()` bytes starting at `address`
    pub fn read(&self, address: u32, buffer: &mut [u8]) -> Result<(), Error> {
        self.check(address, buffer.len())?;
        if buffer.is_empty() {
            return Ok(());
        }
        let (device, register) = self.target(address);
        self.i2c
            .events()
            .clear(Event::TRANSFER_COMPLETE | Event::TRANSFER_INCOMPLETE);
        Ok(self.i2c.memory_read(device, register, buffer)?)
    }
}
