//! # Inter-Integrated Circuit (I2C) bus
//!
//! [`I2c`] is one statically allocated instance. Transfers are interrupt
//! driven: the master and slave calls return a [`Transfer`] right away and the
//! instance's interrupt handler has to call [`I2c::on_interrupt`].
//!
//! Transfer errors never come back from the call that started the transfer.
//! They finish the transfer as [`Outcome::Incomplete`] and post
//! `TRANSFER_COMPLETE | TRANSFER_INCOMPLETE` together with the reason.
//!
//! [`I2c::is_device_ready`] is the only synchronous bus access. It pings an
//! address until it is acknowledged, e.g. to wait out an EEPROM write cycle.

use embedded_dma::{ReadBuffer, WriteBuffer};

use crate::event::{EventCell, OpState, Outcome, Serviced, State, Ticket};
use crate::hal::blocking::i2c::{Read, Write, WriteRead};
use crate::instance::{Descriptor, Instance};
use crate::status::{self, Busy, NotOpen, StatusCode};
use crate::transfer::{Operation, RxBuf, Transfer, TxBuf};

pub mod config;
pub mod timing;

pub use config::{Address, BusSpeed, Config, Mode};

/// Polling rounds a low-level driver spends on one address ping
pub const PING_TIMEOUT: u32 = 1000;

bitflags::bitflags! {
    /// I2C events
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Event: u32 {
        /// The instance was opened
        const INITIALIZED = 1 << 0;
        /// A master or slave transfer finished
        const TRANSFER_COMPLETE = 1 << 1;
        /// The finished transfer did not move all data
        const TRANSFER_INCOMPLETE = 1 << 2;
        /// Addressed through the general call address
        const GENERAL_CALL = 1 << 3;
        /// Addressed as slave transmitter with no transmit armed
        const SLAVE_TRANSMIT = 1 << 4;
        /// Addressed as slave receiver with no receive armed
        const SLAVE_RECEIVE = 1 << 5;
        /// Misplaced START or STOP condition
        const BUS_ERROR = 1 << 6;
        /// Another master won the bus
        const ARBITRATION_LOST = 1 << 7;
        /// The addressed slave did not acknowledge
        const ADDRESS_NACK = 1 << 8;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Event {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "i2c::Event({=u32:#x})", self.bits());
    }
}

/// Flags which stay set in [`I2c::error`] until the next open
const STICKY: Event = Event::BUS_ERROR.union(Event::ARBITRATION_LOST);

/// I2C error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The instance has not been opened
    NotOpen,
    /// The instance is open already
    AlreadyOpen,
    /// A transfer is in flight
    Busy,
    /// Address does not fit its width
    InvalidAddress,
    /// Empty buffer, or one the peripheral cannot count
    InvalidLength,
    /// The configuration cannot be realized by this instance
    Unsupported,
    /// The device did not acknowledge within the given trials
    NotReady,
    /// A transfer finished without moving all data
    Incomplete,
}

impl StatusCode for Error {
    fn code(&self) -> i32 {
        match self {
            Error::Busy => status::BUSY,
            _ => status::FAIL,
        }
    }
}

impl From<NotOpen> for Error {
    fn from(_: NotOpen) -> Self {
        Error::NotOpen
    }
}

impl From<Busy> for Error {
    fn from(_: Busy) -> Self {
        Error::Busy
    }
}

impl From<Outcome> for Error {
    fn from(_: Outcome) -> Self {
        Error::Incomplete
    }
}

/// Register address inside a device, sent before the data of a memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MemAddress {
    /// One address byte
    U8(u8),
    /// Two address bytes, most significant first
    U16(u16),
}

impl MemAddress {
    /// The address bytes in bus order, and how many of them are used
    pub fn bytes(self) -> ([u8; 2], usize) {
        match self {
            MemAddress::U8(a) => ([a, 0], 1),
            MemAddress::U16(a) => (a.to_be_bytes(), 2),
        }
    }
}

/// A transfer for the low-level driver to run
#[derive(Debug)]
pub enum Request {
    /// Master write. Without `stop` the bus is held for a repeated start.
    Transmit {
        /// Slave address
        address: Address,
        /// Bytes to send
        data: TxBuf,
        /// Finish with a STOP condition
        stop: bool,
    },
    /// Master read. Without `stop` the bus is held for a repeated start.
    Receive {
        /// Slave address
        address: Address,
        /// Bytes to fill
        data: RxBuf,
        /// Finish with a STOP condition
        stop: bool,
    },
    /// Write the register address and then `data` in one transfer
    MemoryWrite {
        /// Slave address
        address: Address,
        /// Register address
        register: MemAddress,
        /// Bytes to send after the register address
        data: TxBuf,
    },
    /// Write the register address, repeated start, read `data`
    MemoryRead {
        /// Slave address
        address: Address,
        /// Register address
        register: MemAddress,
        /// Bytes to fill
        data: RxBuf,
    },
    /// Write `tx`, repeated start, read `rx`
    WriteRead {
        /// Slave address
        address: Address,
        /// Bytes to send
        tx: TxBuf,
        /// Bytes to fill
        rx: RxBuf,
    },
    /// Answer the next read of the own address with `data`
    SlaveTransmit {
        /// Bytes to send
        data: TxBuf,
    },
    /// Store the next write to the own address into `data`
    SlaveReceive {
        /// Bytes to fill
        data: RxBuf,
    },
}

impl Request {
    fn address(&self) -> Option<Address> {
        match self {
            Request::Transmit { address, .. }
            | Request::Receive { address, .. }
            | Request::MemoryWrite { address, .. }
            | Request::MemoryRead { address, .. }
            | Request::WriteRead { address, .. } => Some(*address),
            Request::SlaveTransmit { .. } | Request::SlaveReceive { .. } => None,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Request::Transmit { data, .. }
            | Request::MemoryWrite { data, .. }
            | Request::SlaveTransmit { data } => data.is_empty(),
            Request::Receive { data, .. }
            | Request::MemoryRead { data, .. }
            | Request::SlaveReceive { data } => data.is_empty(),
            Request::WriteRead { tx, rx, .. } => tx.is_empty() || rx.is_empty(),
        }
    }
}

/// Register level access to one I2C peripheral of a family
pub trait LowLevel: Send {
    /// Route pins, enable clocks, program timing and own address, enable the
    /// interrupt. The peripheral stays disabled.
    fn configure(&mut self, descriptor: &Descriptor, config: &Config) -> Result<(), Error>;

    /// Undo [`LowLevel::configure`]: disable interrupt, peripheral and clock.
    fn release(&mut self);

    /// Enable the peripheral
    fn enable(&mut self);

    /// Disable the peripheral
    fn disable(&mut self);

    /// Start `request`. Progress is reported through [`LowLevel::service`].
    fn start(&mut self, request: Request) -> Result<(), Error>;

    /// Send `address` and report whether it was acknowledged, giving up
    /// after [`PING_TIMEOUT`] polling rounds.
    fn ping(&mut self, address: Address) -> Result<bool, Error>;

    /// Stop the running transfer and drop its buffers.
    fn abort(&mut self);

    /// Service the interrupt.
    fn service(&mut self) -> Serviced<Event>;
}

/// Snapshot of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// Opened
    pub initialized: bool,
    /// A transfer is in flight
    pub busy: bool,
    /// Addressed through the general call address since the last open
    pub general_call: bool,
}

/// Sticky error flags, cleared by the next open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorStatus {
    /// A bus error occurred
    pub bus_error: bool,
    /// Arbitration was lost
    pub arbitration_lost: bool,
}

/// An I2C instance
pub struct I2c<D> {
    instance: Instance<D, Event>,
    op: OpState,
    sticky: EventCell<Event>,
}

impl<D> I2c<D> {
    /// A closed instance
    pub const fn new(descriptor: Descriptor) -> Self {
        Self {
            instance: Instance::new(descriptor),
            op: OpState::new(),
            sticky: EventCell::new(),
        }
    }

    /// The static description
    pub fn descriptor(&self) -> &Descriptor {
        self.instance.descriptor()
    }

    /// Events posted so far. Only cleared by the caller.
    pub fn events(&self) -> &EventCell<Event> {
        self.instance.events()
    }
}

impl<D: LowLevel> I2c<D> {
    /// Configure the instance with `ll` and install `config.callback`.
    ///
    /// Posts `INITIALIZED` on success. A rejected configuration leaves the
    /// instance closed.
    pub fn open(&self, mut ll: D, config: Config) -> Result<(), Error> {
        let number = self.descriptor().number;
        if self.instance.is_open() {
            return Err(Error::AlreadyOpen);
        }
        if let Err(e) = config
            .validate()
            .and_then(|_| ll.configure(self.descriptor(), &config))
        {
            warn!("i2c{=u8}: configuration rejected: {}", number, e);
            ll.release();
            return Err(e);
        }

        self.op.reset();
        self.sticky.take();
        if let Err(mut ll) = self.instance.install(ll, config.callback) {
            ll.release();
            return Err(Error::AlreadyOpen);
        }
        debug!("i2c{=u8}: open", number);
        self.instance.deliver(Event::INITIALIZED);
        Ok(())
    }

    /// Abort any transfer, release the hardware and hand back the driver.
    pub fn close(&self) -> Option<D> {
        self.abort_any();
        let mut ll = self.instance.remove()?;
        ll.release();
        debug!("i2c{=u8}: closed", self.descriptor().number);
        Some(ll)
    }

    /// Enable the peripheral
    pub fn start(&self) -> Result<(), Error> {
        Ok(self.instance.with_driver(|ll| ll.enable())?)
    }

    /// Disable the peripheral
    pub fn stop(&self) -> Result<(), Error> {
        Ok(self.instance.with_driver(|ll| ll.disable())?)
    }

    /// Snapshot of the instance
    pub fn status(&self) -> Status {
        Status {
            initialized: self.instance.is_open(),
            busy: self.op.is_busy(),
            general_call: self.sticky.contains(Event::GENERAL_CALL),
        }
    }

    /// Errors seen since the last open
    pub fn error(&self) -> ErrorStatus {
        let sticky = self.sticky.poll();
        ErrorStatus {
            bus_error: sticky.contains(Event::BUS_ERROR),
            arbitration_lost: sticky.contains(Event::ARBITRATION_LOST),
        }
    }

    fn submit(&self, request: Request) -> Result<Ticket, Error> {
        if let Some(address) = request.address() {
            address.validate()?;
        }
        if request.is_empty() {
            return Err(Error::InvalidLength);
        }
        self.instance.with_driver(|ll| {
            let ticket = self.op.begin()?;
            match ll.start(request) {
                Ok(()) => Ok(ticket),
                Err(e) => {
                    self.op.release(ticket);
                    Err(e)
                }
            }
        })?
    }

    /// Send `buffer` to `address`.
    ///
    /// With `pending` the bus is not released after the last byte, so the
    /// next transfer starts with a repeated START.
    pub fn master_transmit<B>(
        &self,
        address: impl Into<Address>,
        buffer: B,
        pending: bool,
    ) -> Result<Transfer<B, Op<'_, D>>, Error>
    where
        B: ReadBuffer<Word = u8> + 'static,
    {
        // NOTE(unsafe) the buffer moves into the transfer, which keeps it
        // alive until the operation has finished or was aborted
        let data = unsafe { TxBuf::new(&buffer) };
        let ticket = self.submit(Request::Transmit {
            address: address.into(),
            data,
            stop: !pending,
        })?;
        Ok(Transfer::new(buffer, Op { i2c: self, ticket }))
    }

    /// Fill `buffer` from `address`.
    ///
    /// See [`I2c::master_transmit`] for `pending`.
    pub fn master_receive<B>(
        &self,
        address: impl Into<Address>,
        mut buffer: B,
        pending: bool,
    ) -> Result<Transfer<B, Op<'_, D>>, Error>
    where
        B: WriteBuffer<Word = u8> + 'static,
    {
        // NOTE(unsafe) see `master_transmit`
        let data = unsafe { RxBuf::new(&mut buffer) };
        let ticket = self.submit(Request::Receive {
            address: address.into(),
            data,
            stop: !pending,
        })?;
        Ok(Transfer::new(buffer, Op { i2c: self, ticket }))
    }

    /// Answer the next read of the own address with `buffer`
    pub fn slave_transmit<B>(&self, buffer: B) -> Result<Transfer<B, Op<'_, D>>, Error>
    where
        B: ReadBuffer<Word = u8> + 'static,
    {
        // NOTE(unsafe) see `master_transmit`
        let data = unsafe { TxBuf::new(&buffer) };
        let ticket = self.submit(Request::SlaveTransmit { data })?;
        Ok(Transfer::new(buffer, Op { i2c: self, ticket }))
    }

    /// Store the next write to the own address into `buffer`
    pub fn slave_receive<B>(&self, mut buffer: B) -> Result<Transfer<B, Op<'_, D>>, Error>
    where
        B: WriteBuffer<Word = u8> + 'static,
    {
        // NOTE(unsafe) see `master_transmit`
        let data = unsafe { RxBuf::new(&mut buffer) };
        let ticket = self.submit(Request::SlaveReceive { data })?;
        Ok(Transfer::new(buffer, Op { i2c: self, ticket }))
    }

    /// Write `buffer` to register `register` of `address`
    pub fn write<B>(
        &self,
        address: impl Into<Address>,
        register: MemAddress,
        buffer: B,
    ) -> Result<Transfer<B, Op<'_, D>>, Error>
    where
        B: ReadBuffer<Word = u8> + 'static,
    {
        // NOTE(unsafe) see `master_transmit`
        let data = unsafe { TxBuf::new(&buffer) };
        let ticket = self.submit(Request::MemoryWrite {
            address: address.into(),
            register,
            data,
        })?;
        Ok(Transfer::new(buffer, Op { i2c: self, ticket }))
    }

    /// Read register `register` of `address` (and the following ones) into
    /// `buffer`
    pub fn read<B>(
        &self,
        address: impl Into<Address>,
        register: MemAddress,
        mut buffer: B,
    ) -> Result<Transfer<B, Op<'_, D>>, Error>
    where
        B: WriteBuffer<Word = u8> + 'static,
    {
        // NOTE(unsafe) see `master_transmit`
        let data = unsafe { RxBuf::new(&mut buffer) };
        let ticket = self.submit(Request::MemoryRead {
            address: address.into(),
            register,
            data,
        })?;
        Ok(Transfer::new(buffer, Op { i2c: self, ticket }))
    }

    /// Blocking [`I2c::write`] from a borrowed slice
    pub fn memory_write(
        &self,
        address: impl Into<Address>,
        register: MemAddress,
        data: &[u8],
    ) -> Result<(), Error> {
        // NOTE(unsafe) `transact` returns only after the transfer finished
        let data = unsafe { TxBuf::from_slice(data) };
        self.transact(Request::MemoryWrite {
            address: address.into(),
            register,
            data,
        })
    }

    /// Blocking [`I2c::read`] into a borrowed slice
    pub fn memory_read(
        &self,
        address: impl Into<Address>,
        register: MemAddress,
        buffer: &mut [u8],
    ) -> Result<(), Error> {
        // NOTE(unsafe) see `memory_write`
        let data = unsafe { RxBuf::from_slice(buffer) };
        self.transact(Request::MemoryRead {
            address: address.into(),
            register,
            data,
        })
    }

    /// Ping `address` up to `trials` times.
    ///
    /// Succeeds on the first acknowledge. Fails with [`Error::NotReady`] once
    /// the trials are used up, immediately for `trials == 0`.
    pub fn is_device_ready(&self, address: impl Into<Address>, trials: u32) -> Result<(), Error> {
        let address = address.into().validate()?;
        if !self.instance.is_open() {
            return Err(Error::NotOpen);
        }
        if self.op.current() != State::Idle {
            return Err(Error::Busy);
        }

        for trial in 0..trials {
            let acked = self.instance.with_driver(|ll| {
                if self.op.current() != State::Idle {
                    return Err(Error::Busy);
                }
                ll.ping(address)
            })??;
            if acked {
                return Ok(());
            }
            trace!("i2c: {=u16:#x} not ready, trial {=u32}", address.raw(), trial);
        }
        Err(Error::NotReady)
    }

    /// Interrupt entry, to be called from the instance's interrupt handler(s)
    pub fn on_interrupt(&self) {
        let Ok(serviced) = self.instance.with_driver(|ll| ll.service()) else {
            return;
        };

        let mut events = serviced.events;
        match serviced.outcome {
            Some(Outcome::Complete) => events |= Event::TRANSFER_COMPLETE,
            Some(_) => events |= Event::TRANSFER_COMPLETE | Event::TRANSFER_INCOMPLETE,
            None => {}
        }
        if let Some(outcome) = serviced.outcome {
            self.op.finish(outcome);
        }

        let sticky = events & (STICKY | Event::GENERAL_CALL);
        if !sticky.is_empty() {
            self.sticky.post(sticky);
        }
        if events.intersects(STICKY | Event::ADDRESS_NACK) {
            debug!("i2c{=u8}: {}", self.descriptor().number, events);
        }
        self.instance.deliver(events);
    }

    fn cancel(&self, ticket: Ticket) {
        let _ = self.instance.with_driver(|ll| {
            if self.op.owns(ticket) && self.op.is_busy() {
                ll.abort();
            }
        });
        self.op.release(ticket);
    }

    fn abort_any(&self) {
        let _ = self.instance.with_driver(|ll| {
            if self.op.is_busy() {
                ll.abort();
            }
        });
        self.op.reset();
    }

    /// Run `request` to completion, for the blocking traits
    fn transact(&self, request: Request) -> Result<(), Error> {
        let ticket = self.submit(request)?;
        let outcome = loop {
            if let Some(outcome) = self.op.state_of(ticket).outcome() {
                break outcome;
            }
            core::hint::spin_loop();
        };
        core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
        self.op.release(ticket);
        outcome.into_result().map_err(Error::from)
    }
}

/// The transfer a [`Transfer`] token of an [`I2c`] waits on
pub struct Op<'a, D: LowLevel> {
    ticket: Ticket,
    i2c: &'a I2c<D>,
}

impl<D: LowLevel> Operation for Op<'_, D> {
    fn state(&self) -> &OpState {
        &self.i2c.op
    }

    fn ticket(&self) -> Ticket {
        self.ticket
    }

    fn cancel(&self) {
        self.i2c.cancel(self.ticket);
    }
}

impl<D: LowLevel> Write for &I2c<D> {
    type Error = Error;

    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), Error> {
        // NOTE(unsafe) `transact` returns only after the transfer finished
        let data = unsafe { TxBuf::from_slice(bytes) };
        self.transact(Request::Transmit {
            address: Address::SevenBit(addr),
            data,
            stop: true,
        })
    }
}

impl<D: LowLevel> Read for &I2c<D> {
    type Error = Error;

    fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<(), Error> {
        // NOTE(unsafe) see `write`
        let data = unsafe { RxBuf::from_slice(buffer) };
        self.transact(Request::Receive {
            address: Address::SevenBit(addr),
            data,
            stop: true,
        })
    }
}

impl<D: LowLevel> WriteRead for &I2c<D> {
    type Error = Error;

    fn write_read(&mut self, addr: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Error> {
        // NOTE(unsafe) see `write`
        let (tx, rx) = unsafe { (TxBuf::from_slice(bytes), RxBuf::from_slice(buffer)) };
        self.transact(Request::WriteRead {
            address: Address::SevenBit(addr),
            tx,
            rx,
        })
    }
}
