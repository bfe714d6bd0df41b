//! # Serial
//!
//! Asynchronous USART with independent directions: one [`Serial::send`] and
//! one [`Serial::receive`] may be in flight at the same time. The instance's
//! interrupt handler has to call [`Serial::on_interrupt`], which moves the
//! data and decodes the status flags into [`Event`]s.
//!
//! The family driver only gives register access ([`LowLevel`]); the
//! interrupt decoding below is shared by all families.
//!
//! For simple polled I/O there are [`Serial::poll_send`] and
//! [`Serial::poll_receive`], bounded by a [`Timer`] deadline, and the
//! [`embedded_hal::serial`] traits.

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_dma::{ReadBuffer, WriteBuffer};

use crate::event::{EventCell, OpState, Outcome, Ticket};
use crate::hal::{blocking, serial};
use crate::instance::{Descriptor, Instance};
use crate::status::{self, Busy, NotOpen, StatusCode};
use crate::time::duration::Milliseconds;
use crate::timer::{self, Timer};
use crate::transfer::{Operation, RxBuf, Transfer, TxBuf};

pub mod config;

pub use config::{Config, DataBits, FlowControl, Mode, Parity, StopBits};

bitflags::bitflags! {
    /// USART events
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Event: u32 {
        /// The instance was opened
        const INITIALIZED = 1 << 0;
        /// The last byte of a send was handed to the transmitter
        const SEND_COMPLETE = 1 << 1;
        /// A receive buffer was filled
        const RECEIVE_COMPLETE = 1 << 2;
        /// The last byte left the transmitter
        const TX_COMPLETE = 1 << 3;
        /// A byte was lost, either to an overrun or with no receive armed
        const RX_OVERFLOW = 1 << 4;
        /// The line went idle during a receive
        const RX_TIMEOUT = 1 << 5;
        /// Break detected
        const RX_BREAK = 1 << 6;
        /// Framing error
        const RX_FRAMING_ERROR = 1 << 7;
        /// Parity error
        const RX_PARITY_ERROR = 1 << 8;
        /// CTS changed
        const CTS = 1 << 9;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Event {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "serial::Event({=u32:#x})", self.bits());
    }
}

const STICKY: Event = Event::RX_OVERFLOW
    .union(Event::RX_BREAK)
    .union(Event::RX_FRAMING_ERROR)
    .union(Event::RX_PARITY_ERROR);

bitflags::bitflags! {
    /// Status flags of the peripheral, as far as the driver needs them
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u32 {
        /// Receive data register not empty
        const RXNE = 1 << 0;
        /// Idle line
        const IDLE = 1 << 1;
        /// Transmit data register empty
        const TXE = 1 << 2;
        /// Transmission complete
        const TC = 1 << 3;
        /// Overrun
        const ORE = 1 << 4;
        /// Framing error
        const FE = 1 << 5;
        /// Parity error
        const PE = 1 << 6;
        /// Break (LIN break detection)
        const LBD = 1 << 7;
        /// CTS input changed
        const CTS = 1 << 8;
    }
}

const RX_ERRORS: Flags = Flags::ORE.union(Flags::FE).union(Flags::PE).union(Flags::LBD);

/// Serial error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The instance has not been opened
    NotOpen,
    /// The instance is open already
    AlreadyOpen,
    /// An operation in the same direction is in flight
    Busy,
    /// The configuration cannot be realized by this instance
    Unsupported,
    /// Empty buffer, or not a whole number of words
    InvalidLength,
    /// A polled operation ran out of time
    Timeout,
    /// RX buffer overrun
    Overrun,
    /// Framing error
    Framing,
    /// Parity check error
    Parity,
    /// A transfer finished without moving all data
    Incomplete,
    /// The deadline timer failed
    Timer(timer::Error),
}

impl StatusCode for Error {
    fn code(&self) -> i32 {
        match self {
            Error::Busy => status::BUSY,
            Error::Timeout => status::TIMEOUT,
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

impl From<timer::Error> for Error {
    fn from(e: timer::Error) -> Self {
        Error::Timer(e)
    }
}

impl From<Outcome> for Error {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Timeout => Error::Timeout,
            _ => Error::Incomplete,
        }
    }
}

/// Register level access to one USART of a family
pub trait LowLevel: Send {
    /// Route pins, enable clock, program frame format and baud rate, enable
    /// the interrupt. Transmitter and receiver stay disabled.
    fn configure(&mut self, descriptor: &Descriptor, config: &Config) -> Result<(), Error>;

    /// Undo [`LowLevel::configure`]
    fn release(&mut self);

    /// Enable transmitter and receiver
    fn enable(&mut self);

    /// Disable transmitter and receiver
    fn disable(&mut self);

    /// Current status flags
    fn flags(&self) -> Flags;

    /// Flags whose interrupt is enabled
    fn listening(&self) -> Flags;

    /// Enable the interrupts of `flags`
    fn listen(&mut self, flags: Flags);

    /// Disable the interrupts of `flags`
    fn unlisten(&mut self, flags: Flags);

    /// Clear `flags` which are cleared by software
    fn clear(&mut self, flags: Flags);

    /// Read the receive data register
    fn read_word(&mut self) -> u16;

    /// Write the transmit data register
    fn write_word(&mut self, word: u16);
}

/// Snapshot of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// Opened
    pub initialized: bool,
    /// A send is in flight
    pub tx_busy: bool,
    /// A receive is in flight
    pub rx_busy: bool,
}

/// Receive errors since the last receive was armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorStatus {
    /// Data was lost
    pub rx_overflow: bool,
    /// A break was detected
    pub rx_break: bool,
    /// A framing error occurred
    pub rx_framing_error: bool,
    /// A parity error occurred
    pub rx_parity_error: bool,
}

struct Progress<V> {
    data: V,
    pos: usize,
}

struct Channels {
    tx: Option<Progress<TxBuf>>,
    rx: Option<Progress<RxBuf>>,
    word_bytes: usize,
}

/// Both directions of one interrupt
struct Decoded {
    events: Event,
    tx: Option<Outcome>,
    rx: Option<Outcome>,
}

/// Which direction an [`Op`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Send
    Tx,
    /// Receive
    Rx,
}

/// A USART instance
pub struct Serial<D> {
    instance: Instance<D, Event>,
    tx: OpState,
    rx: OpState,
    sticky: EventCell<Event>,
    channels: Mutex<RefCell<Channels>>,
}

impl<D> Serial<D> {
    /// A closed instance
    pub const fn new(descriptor: Descriptor) -> Self {
        Self {
            instance: Instance::new(descriptor),
            tx: OpState::new(),
            rx: OpState::new(),
            sticky: EventCell::new(),
            channels: Mutex::new(RefCell::new(Channels {
                tx: None,
                rx: None,
                word_bytes: 1,
            })),
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

fn decode<D: LowLevel>(ll: &mut D, channels: &mut Channels) -> Decoded {
    let mut events = Event::empty();
    let (mut tx, mut rx) = (None, None);
    let word_bytes = channels.word_bytes;

    let pending = ll.flags() & ll.listening();

    if pending.contains(Flags::RXNE) {
        match channels.rx.as_mut() {
            None => {
                // nobody to take the byte
                ll.unlisten(Flags::RXNE);
                events |= Event::RX_OVERFLOW;
            }
            Some(progress) => {
                let word = ll.read_word().to_le_bytes();
                // NOTE(unsafe) the receive is armed, its buffer is alive
                let buffer = unsafe { progress.data.as_mut_slice() };
                let end = (progress.pos + word_bytes).min(buffer.len());
                buffer[progress.pos..end].copy_from_slice(&word[..end - progress.pos]);
                progress.pos = end;
                if progress.pos == buffer.len() {
                    ll.unlisten(Flags::RXNE | Flags::IDLE);
                    channels.rx = None;
                    events |= Event::RECEIVE_COMPLETE;
                    rx = Some(Outcome::Complete);
                }
            }
        }
    }

    let flags = ll.flags();
    if flags.contains(Flags::IDLE)
        && ll.listening().contains(Flags::IDLE)
        && !flags.contains(Flags::RXNE)
    {
        ll.clear(Flags::IDLE);
        events |= Event::RX_TIMEOUT;
        if channels.rx.take().is_some() {
            ll.unlisten(Flags::RXNE | Flags::IDLE);
            rx = Some(Outcome::Timeout);
        }
    }

    if pending.contains(Flags::TXE) {
        match channels.tx.as_mut() {
            None => ll.unlisten(Flags::TXE),
            Some(progress) => {
                // NOTE(unsafe) the send is armed, its buffer is alive
                let buffer = unsafe { progress.data.as_slice() };
                let end = (progress.pos + word_bytes).min(buffer.len());
                let mut word = [0; 2];
                word[..end - progress.pos].copy_from_slice(&buffer[progress.pos..end]);
                ll.write_word(u16::from_le_bytes(word));
                progress.pos = end;
                if progress.pos == buffer.len() {
                    ll.unlisten(Flags::TXE);
                    ll.listen(Flags::TC);
                    channels.tx = None;
                    events |= Event::SEND_COMPLETE;
                    tx = Some(Outcome::Complete);
                }
            }
        }
    }

    if pending.contains(Flags::TC) {
        ll.unlisten(Flags::TC);
        ll.clear(Flags::TC);
        events |= Event::TX_COMPLETE;
    }

    let errors = flags & (RX_ERRORS | Flags::CTS);
    if !errors.is_empty() {
        if errors.contains(Flags::ORE) {
            events |= Event::RX_OVERFLOW;
        }
        if errors.contains(Flags::FE) {
            events |= Event::RX_FRAMING_ERROR;
        }
        if errors.contains(Flags::PE) {
            events |= Event::RX_PARITY_ERROR;
        }
        if errors.contains(Flags::LBD) {
            events |= Event::RX_BREAK;
        }
        if errors.contains(Flags::CTS) {
            events |= Event::CTS;
        }
        ll.clear(errors);
    }

    Decoded { events, tx, rx }
}

impl<D: LowLevel> Serial<D> {
    /// Configure the instance with `ll` and install `config.callback`.
    ///
    /// Posts `INITIALIZED` on success. A rejected configuration leaves the
    /// instance closed.
    pub fn open(&self, mut ll: D, config: Config) -> Result<(), Error> {
        let number = self.descriptor().number;
        if self.instance.is_open() {
            return Err(Error::AlreadyOpen);
        }
        if config.baudrate.0 == 0 {
            return Err(Error::Unsupported);
        }
        if let Err(e) = ll.configure(self.descriptor(), &config) {
            warn!("usart{=u8}: configuration rejected: {}", number, e);
            ll.release();
            return Err(e);
        }

        self.tx.reset();
        self.rx.reset();
        self.sticky.take();
        critical_section::with(|cs| {
            let mut channels = self.channels.borrow_ref_mut(cs);
            channels.tx = None;
            channels.rx = None;
            channels.word_bytes = config.word_bytes();
        });
        if let Err(mut ll) = self.instance.install(ll, config.callback) {
            ll.release();
            return Err(Error::AlreadyOpen);
        }
        debug!("usart{=u8}: open at {=u32} Bd", number, config.baudrate.0);
        self.instance.deliver(Event::INITIALIZED);
        Ok(())
    }

    /// Abort both directions, release the hardware and hand back the driver.
    pub fn close(&self) -> Option<D> {
        self.cancel(Direction::Tx, None);
        self.cancel(Direction::Rx, None);
        let mut ll = self.instance.remove()?;
        ll.release();
        debug!("usart{=u8}: closed", self.descriptor().number);
        Some(ll)
    }

    /// Enable transmitter and receiver
    pub fn start(&self) -> Result<(), Error> {
        Ok(self.instance.with_driver(|ll| ll.enable())?)
    }

    /// Disable transmitter and receiver
    pub fn stop(&self) -> Result<(), Error> {
        Ok(self.instance.with_driver(|ll| ll.disable())?)
    }

    /// Snapshot of the instance
    pub fn status(&self) -> Status {
        Status {
            initialized: self.instance.is_open(),
            tx_busy: self.tx.is_busy(),
            rx_busy: self.rx.is_busy(),
        }
    }

    /// Receive errors since the last receive was armed
    pub fn error(&self) -> ErrorStatus {
        let sticky = self.sticky.poll();
        ErrorStatus {
            rx_overflow: sticky.contains(Event::RX_OVERFLOW),
            rx_break: sticky.contains(Event::RX_BREAK),
            rx_framing_error: sticky.contains(Event::RX_FRAMING_ERROR),
            rx_parity_error: sticky.contains(Event::RX_PARITY_ERROR),
        }
    }

    fn check_len(&self, len: usize) -> Result<usize, Error> {
        let word_bytes = critical_section::with(|cs| self.channels.borrow_ref(cs).word_bytes);
        if len == 0 || len % word_bytes != 0 {
            return Err(Error::InvalidLength);
        }
        Ok(word_bytes)
    }

    /// Transmit `buffer`
    pub fn send<B>(&self, buffer: B) -> Result<Transfer<B, Op<'_, D>>, Error>
    where
        B: ReadBuffer<Word = u8> + 'static,
    {
        // NOTE(unsafe) the buffer moves into the transfer, which keeps it
        // alive until the operation has finished or was aborted
        let data = unsafe { TxBuf::new(&buffer) };
        self.check_len(data.len())?;
        let ticket = critical_section::with(|cs| {
            let mut channels = self.channels.borrow_ref_mut(cs);
            self.instance.with_driver(|ll| {
                let ticket = self.tx.begin()?;
                channels.tx = Some(Progress { data, pos: 0 });
                ll.clear(Flags::TC);
                ll.listen(Flags::TXE);
                Ok::<_, Error>(ticket)
            })?
        })?;
        Ok(Transfer::new(
            buffer,
            Op {
                serial: self,
                direction: Direction::Tx,
                ticket,
            },
        ))
    }

    /// Fill `buffer`. An idle line ends the receive early with
    /// [`Outcome::Timeout`].
    pub fn receive<B>(&self, mut buffer: B) -> Result<Transfer<B, Op<'_, D>>, Error>
    where
        B: WriteBuffer<Word = u8> + 'static,
    {
        // NOTE(unsafe) see `send`
        let data = unsafe { RxBuf::new(&mut buffer) };
        self.check_len(data.len())?;
        let ticket = critical_section::with(|cs| {
            let mut channels = self.channels.borrow_ref_mut(cs);
            self.instance.with_driver(|ll| {
                let ticket = self.rx.begin()?;
                self.sticky.clear(STICKY);
                channels.rx = Some(Progress { data, pos: 0 });
                ll.clear(Flags::IDLE | RX_ERRORS);
                ll.listen(Flags::RXNE | Flags::IDLE);
                Ok::<_, Error>(ticket)
            })?
        })?;
        Ok(Transfer::new(
            buffer,
            Op {
                serial: self,
                direction: Direction::Rx,
                ticket,
            },
        ))
    }

    /// Interrupt entry, to be called from the instance's interrupt handler
    pub fn on_interrupt(&self) {
        let decoded = critical_section::with(|cs| {
            let mut channels = self.channels.borrow_ref_mut(cs);
            let decoded = self
                .instance
                .with_driver(|ll| decode(ll, &mut channels))
                .ok()?;
            if let Some(outcome) = decoded.rx {
                self.rx.finish(outcome);
            }
            if let Some(outcome) = decoded.tx {
                self.tx.finish(outcome);
            }
            Some(decoded)
        });
        let Some(Decoded { events, .. }) = decoded else {
            return;
        };

        let errors = events & STICKY;
        if !errors.is_empty() {
            self.sticky.post(errors);
            debug!("usart{=u8}: {}", self.descriptor().number, errors);
        }
        self.instance.deliver(events);
    }

    /// Abort the `direction` operation `ticket` started, or whatever runs
    /// in that direction for `None`.
    fn cancel(&self, direction: Direction, ticket: Option<Ticket>) {
        let (op, events) = match direction {
            Direction::Tx => (&self.tx, Flags::TXE | Flags::TC),
            Direction::Rx => (&self.rx, Flags::RXNE | Flags::IDLE),
        };
        critical_section::with(|cs| {
            if matches!(ticket, Some(ticket) if !op.owns(ticket)) {
                return;
            }
            if op.is_busy() {
                let _ = self.instance.with_driver(|ll| ll.unlisten(events));
            }
            let mut channels = self.channels.borrow_ref_mut(cs);
            match direction {
                Direction::Tx => channels.tx = None,
                Direction::Rx => channels.rx = None,
            }
            match ticket {
                Some(ticket) => {
                    op.release(ticket);
                }
                None => op.reset(),
            }
        });
    }

    fn wait_for<T: timer::LowLevel>(
        &self,
        flag: Flags,
        start: timer::Instant,
        timeout: Milliseconds,
        timer: &Timer<T>,
    ) -> Result<Flags, Error> {
        loop {
            let flags = self.instance.with_driver(|ll| ll.flags())?;
            if flags.contains(flag) {
                return Ok(flags);
            }
            if timer.has_elapsed(start, timeout)? {
                return Err(Error::Timeout);
            }
            core::hint::spin_loop();
        }
    }

    /// Transmit `data` by polling, giving up once `timeout` has passed.
    ///
    /// Returns after the last byte left the transmitter.
    pub fn poll_send<T: timer::LowLevel>(
        &self,
        data: &[u8],
        timeout: Milliseconds,
        timer: &Timer<T>,
    ) -> Result<(), Error> {
        let word_bytes = self.check_len(data.len())?;
        self.tx.begin()?;
        let result = (|| {
            let start = timer.now()?;
            for chunk in data.chunks(word_bytes) {
                self.wait_for(Flags::TXE, start, timeout, timer)?;
                let mut word = [0; 2];
                word[..chunk.len()].copy_from_slice(chunk);
                self.instance
                    .with_driver(|ll| ll.write_word(u16::from_le_bytes(word)))?;
            }
            self.wait_for(Flags::TC, start, timeout, timer).map(|_| ())
        })();
        self.tx.reset();
        result
    }

    /// Fill `buffer` by polling, giving up once `timeout` has passed.
    ///
    /// Receive errors are recorded in [`Serial::error`] and reception goes on.
    pub fn poll_receive<T: timer::LowLevel>(
        &self,
        buffer: &mut [u8],
        timeout: Milliseconds,
        timer: &Timer<T>,
    ) -> Result<(), Error> {
        let word_bytes = self.check_len(buffer.len())?;
        self.rx.begin()?;
        self.sticky.clear(STICKY);
        let result = (|| {
            let start = timer.now()?;
            for chunk in buffer.chunks_mut(word_bytes) {
                let flags = self.wait_for(Flags::RXNE, start, timeout, timer)?;
                let word = self.instance.with_driver(|ll| {
                    let errors = flags & RX_ERRORS;
                    if !errors.is_empty() {
                        ll.clear(errors);
                    }
                    ll.read_word()
                })?;
                self.record(flags);
                let len = chunk.len();
                chunk.copy_from_slice(&word.to_le_bytes()[..len]);
            }
            Ok(())
        })();
        self.rx.reset();
        result
    }

    fn record(&self, flags: Flags) {
        let mut errors = Event::empty();
        if flags.contains(Flags::ORE) {
            errors |= Event::RX_OVERFLOW;
        }
        if flags.contains(Flags::FE) {
            errors |= Event::RX_FRAMING_ERROR;
        }
        if flags.contains(Flags::PE) {
            errors |= Event::RX_PARITY_ERROR;
        }
        if flags.contains(Flags::LBD) {
            errors |= Event::RX_BREAK;
        }
        if !errors.is_empty() {
            self.sticky.post(errors);
        }
    }
}

/// The direction a [`Transfer`] token of a [`Serial`] waits on
pub struct Op<'a, D: LowLevel> {
    serial: &'a Serial<D>,
    direction: Direction,
    ticket: Ticket,
}

impl<D: LowLevel> Op<'_, D> {
    /// The direction
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl<D: LowLevel> Operation for Op<'_, D> {
    fn state(&self) -> &OpState {
        match self.direction {
            Direction::Tx => &self.serial.tx,
            Direction::Rx => &self.serial.rx,
        }
    }

    fn ticket(&self) -> Ticket {
        self.ticket
    }

    fn cancel(&self) {
        self.serial.cancel(self.direction, Some(self.ticket));
    }
}

impl<D: LowLevel> serial::Read<u8> for &Serial<D> {
    type Error = Error;

    fn read(&mut self) -> nb::Result<u8, Error> {
        if self.rx.is_busy() {
            return Err(nb::Error::WouldBlock);
        }
        self.instance
            .with_driver(|ll| {
                let flags = ll.flags();
                let error = if flags.contains(Flags::PE) {
                    Error::Parity
                } else if flags.contains(Flags::FE) {
                    Error::Framing
                } else if flags.contains(Flags::ORE) {
                    Error::Overrun
                } else if flags.contains(Flags::RXNE) {
                    // 8 bit reads of 9 bit words drop the ninth bit
                    return Ok(ll.read_word() as u8);
                } else {
                    return Err(nb::Error::WouldBlock);
                };
                ll.clear(flags & RX_ERRORS);
                Err(nb::Error::Other(error))
            })
            .map_err(|e| nb::Error::Other(Error::from(e)))?
    }
}

impl<D: LowLevel> serial::Write<u8> for &Serial<D> {
    type Error = Error;

    fn flush(&mut self) -> nb::Result<(), Error> {
        if self.tx.is_busy() {
            return Err(nb::Error::WouldBlock);
        }
        let flags = self
            .instance
            .with_driver(|ll| ll.flags())
            .map_err(|e| nb::Error::Other(Error::from(e)))?;
        if flags.contains(Flags::TC) {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn write(&mut self, byte: u8) -> nb::Result<(), Error> {
        if self.tx.is_busy() {
            return Err(nb::Error::WouldBlock);
        }
        self.instance
            .with_driver(|ll| {
                if ll.flags().contains(Flags::TXE) {
                    ll.write_word(u16::from(byte));
                    Ok(())
                } else {
                    Err(nb::Error::WouldBlock)
                }
            })
            .map_err(|e| nb::Error::Other(Error::from(e)))?
    }
}

impl<D: LowLevel> blocking::serial::write::Default<u8> for &Serial<D> {}
