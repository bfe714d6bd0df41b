//! # Serial Peripheral Interface
//!
//! [`Spi`] moves data by interrupt or DMA: [`Spi::send`], [`Spi::receive`] and
//! [`Spi::transfer`] return a [`Transfer`] right away and the instance's
//! interrupt handler has to call [`Spi::on_interrupt`].
//!
//! The façade knows nothing about the devices on the bus. Chip-select is the
//! application's business: select, transfer, wait, deselect.
//!
//! With 16 bit frames buffers stay byte buffers of even length, each frame
//! stored least significant byte first.

use core::sync::atomic::{AtomicU8, Ordering};

use embedded_dma::{ReadBuffer, WriteBuffer};

use crate::event::{EventCell, OpState, Outcome, Serviced, Ticket};
use crate::hal::blocking::spi::{Transfer as BlockingTransfer, Write};
use crate::instance::{Descriptor, Instance};
use crate::status::{self, Busy, NotOpen, StatusCode};
use crate::transfer::{Operation, RxBuf, Transfer, TxBuf};

pub mod config;

pub use config::{Config, FrameSize, Lines, Options, Prescaler, SlaveSelect};

/// Byte clocked out while only receiving
pub const DUMMY: u8 = 0xFF;

bitflags::bitflags! {
    /// SPI events
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Event: u32 {
        /// The instance was opened
        const INITIALIZED = 1 << 0;
        /// A transfer finished
        const TRANSFER_COMPLETE = 1 << 1;
        /// Receive overrun or transmit underrun
        const TRANSFER_LOST = 1 << 2;
        /// Master mode fault, NSS pulled low by another master
        const MODE_FAULT = 1 << 3;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Event {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "spi::Event({=u32:#x})", self.bits());
    }
}

const STICKY: Event = Event::TRANSFER_LOST.union(Event::MODE_FAULT);

/// SPI error
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
    /// The options or the frequency cannot be realized by this instance
    Unsupported,
    /// Empty buffer, or an odd length with 16 bit frames
    InvalidLength,
    /// Transmit and receive buffers differ in length
    LengthMismatch,
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

/// A transfer for the low-level driver to run
#[derive(Debug)]
pub enum Request {
    /// Transmit, discarding received data
    Send {
        /// Bytes to send
        data: TxBuf,
    },
    /// Receive while clocking out [`DUMMY`]
    Receive {
        /// Bytes to fill
        data: RxBuf,
    },
    /// Full duplex, `tx` and `rx` of equal length
    Transfer {
        /// Bytes to send
        tx: TxBuf,
        /// Bytes to fill
        rx: RxBuf,
    },
}

impl Request {
    fn len(&self) -> usize {
        match self {
            Request::Send { data } => data.len(),
            Request::Receive { data } => data.len(),
            Request::Transfer { tx, .. } => tx.len(),
        }
    }
}

/// Register level access to one SPI peripheral of a family
pub trait LowLevel: Send {
    /// Route pins, enable clocks, program mode and prescaler, enable the
    /// interrupt. The peripheral stays disabled.
    fn configure(&mut self, descriptor: &Descriptor, config: &Config) -> Result<(), Error>;

    /// Undo [`LowLevel::configure`]
    fn release(&mut self);

    /// Enable the peripheral
    fn enable(&mut self);

    /// Disable the peripheral
    fn disable(&mut self);

    /// Start `request`, frames already validated against the frame size
    fn start(&mut self, request: Request) -> Result<(), Error>;

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
}

/// Sticky error flags, cleared by the next open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorStatus {
    /// Data was lost to an overrun
    pub transfer_lost: bool,
    /// A mode fault occurred
    pub mode_fault: bool,
}

/// An SPI instance
pub struct Spi<D> {
    instance: Instance<D, Event>,
    op: OpState,
    sticky: EventCell<Event>,
    frame_bytes: AtomicU8,
}

impl<D> Spi<D> {
    /// A closed instance
    pub const fn new(descriptor: Descriptor) -> Self {
        Self {
            instance: Instance::new(descriptor),
            op: OpState::new(),
            sticky: EventCell::new(),
            frame_bytes: AtomicU8::new(1),
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

impl<D: LowLevel> Spi<D> {
    /// Configure the instance with `ll` and install `config.callback`.
    ///
    /// Posts `INITIALIZED` on success. Unrepresentable options fail with
    /// [`Error::Unsupported`] and leave the instance closed.
    pub fn open(&self, mut ll: D, config: Config) -> Result<(), Error> {
        let number = self.descriptor().number;
        if self.instance.is_open() {
            return Err(Error::AlreadyOpen);
        }
        let frame = match config
            .options
            .validate()
            .and_then(|frame| Prescaler::new(self.descriptor().clock, config.frequency).map(|_| frame))
            .and_then(|frame| ll.configure(self.descriptor(), &config).map(|_| frame))
        {
            Ok(frame) => frame,
            Err(e) => {
                warn!("spi{=u8}: configuration rejected: {}", number, e);
                ll.release();
                return Err(e);
            }
        };

        self.op.reset();
        self.sticky.take();
        // frame sizes are one or two bytes
        self.frame_bytes.store(frame.bytes() as u8, Ordering::Relaxed);
        if let Err(mut ll) = self.instance.install(ll, config.callback) {
            ll.release();
            return Err(Error::AlreadyOpen);
        }
        debug!("spi{=u8}: open, {}", number, config.options);
        self.instance.deliver(Event::INITIALIZED);
        Ok(())
    }

    /// Abort any transfer, release the hardware and hand back the driver.
    pub fn close(&self) -> Option<D> {
        self.abort_any();
        let mut ll = self.instance.remove()?;
        ll.release();
        debug!("spi{=u8}: closed", self.descriptor().number);
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
        }
    }

    /// Errors seen since the last open
    pub fn error(&self) -> ErrorStatus {
        let sticky = self.sticky.poll();
        ErrorStatus {
            transfer_lost: sticky.contains(Event::TRANSFER_LOST),
            mode_fault: sticky.contains(Event::MODE_FAULT),
        }
    }

    fn submit(&self, request: Request) -> Result<Ticket, Error> {
        let len = request.len();
        let frame = usize::from(self.frame_bytes.load(Ordering::Relaxed));
        if len == 0 || len % frame != 0 {
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

    /// Transmit `buffer`, discarding what is received
    pub fn send<B>(&self, buffer: B) -> Result<Transfer<B, Op<'_, D>>, Error>
    where
        B: ReadBuffer<Word = u8> + 'static,
    {
        // NOTE(unsafe) the buffer moves into the transfer, which keeps it
        // alive until the operation has finished or was aborted
        let data = unsafe { TxBuf::new(&buffer) };
        let ticket = self.submit(Request::Send { data })?;
        Ok(Transfer::new(buffer, Op { spi: self, ticket }))
    }

    /// Fill `buffer`, clocking out [`DUMMY`]
    pub fn receive<B>(&self, mut buffer: B) -> Result<Transfer<B, Op<'_, D>>, Error>
    where
        B: WriteBuffer<Word = u8> + 'static,
    {
        // NOTE(unsafe) see `send`
        let data = unsafe { RxBuf::new(&mut buffer) };
        let ticket = self.submit(Request::Receive { data })?;
        Ok(Transfer::new(buffer, Op { spi: self, ticket }))
    }

    /// Send `tx` while filling `rx`. Both must have the same length.
    pub fn transfer<TX, RX>(
        &self,
        tx: TX,
        mut rx: RX,
    ) -> Result<Transfer<(TX, RX), Op<'_, D>>, Error>
    where
        TX: ReadBuffer<Word = u8> + 'static,
        RX: WriteBuffer<Word = u8> + 'static,
    {
        // NOTE(unsafe) see `send`
        let (txb, rxb) = unsafe { (TxBuf::new(&tx), RxBuf::new(&mut rx)) };
        if txb.len() != rxb.len() {
            return Err(Error::LengthMismatch);
        }
        let ticket = self.submit(Request::Transfer { tx: txb, rx: rxb })?;
        Ok(Transfer::new((tx, rx), Op { spi: self, ticket }))
    }

    /// Interrupt entry, to be called from the instance's interrupt handler(s)
    pub fn on_interrupt(&self) {
        let Ok(serviced) = self.instance.with_driver(|ll| ll.service()) else {
            return;
        };

        let mut events = serviced.events;
        let outcome = if events.intersects(STICKY) {
            // errors end the transfer even if the driver did not say so
            self.sticky.post(events & STICKY);
            debug!("spi{=u8}: {}", self.descriptor().number, events);
            Some(Outcome::Incomplete)
        } else {
            serviced.outcome
        };
        if outcome == Some(Outcome::Complete) {
            events |= Event::TRANSFER_COMPLETE;
        }
        if let Some(outcome) = outcome {
            if !self.op.finish(outcome) {
                trace!("spi{=u8}: no transfer to finish", self.descriptor().number);
            }
            if outcome != Outcome::Complete {
                let _ = self.instance.with_driver(|ll| ll.abort());
            }
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

    fn transact(&self, request: Request) -> Result<(), Error> {
        let ticket = self.submit(request)?;
        let outcome = loop {
            if let Some(outcome) = self.op.state_of(ticket).outcome() {
                break outcome;
            }
            core::hint::spin_loop();
        };
        core::sync::atomic::compiler_fence(Ordering::SeqCst);
        self.op.release(ticket);
        outcome.into_result().map_err(Error::from)
    }
}

/// The transfer a [`Transfer`] token of an [`Spi`] waits on
pub struct Op<'a, D: LowLevel> {
    ticket: Ticket,
    spi: &'a Spi<D>,
}

impl<D: LowLevel> Operation for Op<'_, D> {
    fn state(&self) -> &OpState {
        &self.spi.op
    }

    fn ticket(&self) -> Ticket {
        self.ticket
    }

    fn cancel(&self) {
        self.spi.cancel(self.ticket);
    }
}

impl<D: LowLevel> BlockingTransfer<u8> for &Spi<D> {
    type Error = Error;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Self::Error> {
        // NOTE(unsafe) `transact` returns only after the transfer finished.
        // Frame `n` is sent before frame `n` is received, so the views may
        // share the memory.
        let (tx, rx) = unsafe {
            let rx = RxBuf::from_slice(words);
            (TxBuf::from_raw(rx.as_ptr(), rx.len()), rx)
        };
        self.transact(Request::Transfer { tx, rx })?;
        Ok(words)
    }
}

impl<D: LowLevel> Write<u8> for &Spi<D> {
    type Error = Error;

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        // NOTE(unsafe) see `transfer`
        let data = unsafe { TxBuf::from_slice(words) };
        self.transact(Request::Send { data })
    }
}
