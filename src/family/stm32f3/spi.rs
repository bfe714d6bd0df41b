//! SPI of the STM32F3
//!
//! Full duplex only. Transfers run from the `TXE` / `RXNE` interrupts, or by
//! DMA when the descriptor brings both a transmit and a receive channel. With
//! DMA the receive channel's interrupt has to call
//! [`Spi::on_interrupt`](crate::spi::Spi::on_interrupt) as well.

use core::ptr;

use crate::event::{Outcome, Serviced};
use crate::gpio::Pull;
use crate::instance::{Descriptor, Role};
use crate::pac::spi1::RegisterBlock;
use crate::spi::{Config, Error, Event, FrameSize, Lines, LowLevel, Prescaler, Request, SlaveSelect, DUMMY};
use crate::transfer::{RxBuf, TxBuf};

use super::gpio::{self, OutputType};
use super::mmio::{Bus, Gate};
use super::nvic;

// CR1
const CPHA: u32 = 1 << 0;
const CPOL: u32 = 1 << 1;
const MSTR: u32 = 1 << 2;
const BR_POS: u32 = 3;
const SPE: u32 = 1 << 6;
const LSBFIRST: u32 = 1 << 7;
const SSI: u32 = 1 << 8;
const SSM: u32 = 1 << 9;

// CR2
const RXDMAEN: u32 = 1 << 0;
const TXDMAEN: u32 = 1 << 1;
const SSOE: u32 = 1 << 2;
const FRF: u32 = 1 << 4;
const ERRIE: u32 = 1 << 5;
const RXNEIE: u32 = 1 << 6;
const TXEIE: u32 = 1 << 7;
const DS_POS: u32 = 8;
const FRXTH: u32 = 1 << 12;

// SR
const RXNE: u32 = 1 << 0;
const TXE: u32 = 1 << 1;
const MODF: u32 = 1 << 5;
const OVR: u32 = 1 << 6;

/// Frames the receive FIFO holds at most
const FIFO_DEPTH: usize = 4;

/// Read by the transmit channel while only receiving
static DUMMY_FRAME: [u8; 2] = [DUMMY; 2];

/// Base address and clock enable bit of SPI`number`
fn hardware(number: u8) -> Option<(usize, Gate)> {
    match number {
        1 => Some((0x4001_3000, Gate::new(Bus::Apb2, 12))),
        2 => Some((0x4000_3800, Gate::new(Bus::Apb1, 14))),
        3 => Some((0x4000_3C00, Gate::new(Bus::Apb1, 15))),
        #[cfg(feature = "gpio-f303e")]
        4 => Some((0x4001_3C00, Gate::new(Bus::Apb2, 15))),
        _ => None,
    }
}

/// Both DMA channels of an instance
#[cfg(feature = "stm32f303")]
struct DmaPair {
    tx: super::dma::Channel,
    rx: super::dma::Channel,
}

/// The transfer in flight
struct Job {
    tx: Option<TxBuf>,
    rx: Option<RxBuf>,
    len: usize,
    sent: usize,
    received: usize,
}

/// One SPI, bound to a number by [`LowLevel::configure`]
pub struct SpiPort {
    base: usize,
    gate: Option<Gate>,
    descriptor: Option<Descriptor>,
    frame: FrameSize,
    cr1: u32,
    #[cfg(feature = "stm32f303")]
    dma: Option<DmaPair>,
    /// written by the receive channel while only sending
    sink: u16,
    job: Option<Job>,
}

impl SpiPort {
    /// An unconfigured port
    pub const fn new() -> Self {
        Self {
            base: 0,
            gate: None,
            descriptor: None,
            frame: FrameSize::Eight,
            cr1: 0,
            #[cfg(feature = "stm32f303")]
            dma: None,
            sink: 0,
            job: None,
        }
    }

    fn regs(&self) -> &'static RegisterBlock {
        // NOTE(unsafe) `base` is set by `configure` before any register
        // access, and the peripheral is owned by this port
        unsafe { &*(self.base as *const RegisterBlock) }
    }

    fn write_cr2(&self, set: u32, clear: u32) {
        // NOTE(unsafe) only documented control bits are written
        self.regs()
            .cr2
            .modify(|r, w| unsafe { w.bits(r.bits() & !clear | set) });
    }

    fn dr(&self) -> *mut u8 {
        &self.regs().dr as *const _ as *mut u8
    }

    fn read_frame(&self) -> u16 {
        // NOTE(unsafe) the access width selects how many frames leave the
        // FIFO, so it has to match the frame size
        unsafe {
            match self.frame {
                FrameSize::Eight => u16::from(ptr::read_volatile(self.dr())),
                FrameSize::Sixteen => ptr::read_volatile(self.dr() as *const u16),
            }
        }
    }

    fn write_frame(&self, frame: u16) {
        // NOTE(unsafe) see `read_frame`
        unsafe {
            match self.frame {
                FrameSize::Eight => ptr::write_volatile(self.dr(), frame as u8),
                FrameSize::Sixteen => ptr::write_volatile(self.dr() as *mut u16, frame),
            }
        }
    }

    fn drain(&self) {
        for _ in 0..FIFO_DEPTH {
            if self.regs().sr.read().bits() & RXNE == 0 {
                break;
            }
            self.read_frame();
        }
    }

    #[cfg(feature = "stm32f303")]
    fn setup_dma(&mut self, descriptor: &Descriptor) -> Result<(), Error> {
        use crate::dma::{Alignment, Direction};

        let (Some(tx), Some(rx)) = (descriptor.dma_tx, descriptor.dma_rx) else {
            return Ok(());
        };
        let width = match self.frame {
            FrameSize::Eight => Alignment::Byte,
            FrameSize::Sixteen => Alignment::HalfWord,
        };
        if [tx, rx]
            .iter()
            .any(|d| d.memory_alignment != width || d.peripheral_alignment != width)
        {
            return Err(Error::Unsupported);
        }
        let dr = self.dr() as u32;
        let pair = DmaPair {
            tx: super::dma::Channel::new(&tx, Direction::MemoryToPeripheral, dr)
                .map_err(|_| Error::Unsupported)?,
            rx: super::dma::Channel::new(&rx, Direction::PeripheralToMemory, dr)
                .map_err(|_| Error::Unsupported)?,
        };
        if let Some(irq) = &rx.irq {
            nvic::bind(irq, 1);
        }
        self.dma = Some(pair);
        Ok(())
    }

    #[cfg(not(feature = "stm32f303"))]
    fn setup_dma(&mut self, descriptor: &Descriptor) -> Result<(), Error> {
        match (descriptor.dma_tx, descriptor.dma_rx) {
            (None, None) => Ok(()),
            _ => Err(Error::Unsupported),
        }
    }

    /// Hand `job` to the DMA, if the instance has channels
    #[cfg(feature = "stm32f303")]
    fn start_dma(&mut self, job: &mut Job) -> bool {
        let Some(pair) = &self.dma else {
            return false;
        };
        // at most 64 KiB, larger lengths are rejected in `start`
        let beats = (job.len / self.frame.bytes()) as u16;
        match &mut job.rx {
            Some(rx) => pair.rx.start(rx.as_mut_ptr() as u32, beats, true),
            None => pair.rx.start(&self.sink as *const u16 as u32, beats, false),
        }
        self.write_cr2(RXDMAEN, 0);
        match &job.tx {
            Some(tx) => pair.tx.start(tx.as_ptr() as u32, beats, true),
            None => pair.tx.start(DUMMY_FRAME.as_ptr() as u32, beats, false),
        }
        self.write_cr2(TXDMAEN, 0);
        true
    }

    #[cfg(not(feature = "stm32f303"))]
    fn start_dma(&mut self, _job: &mut Job) -> bool {
        false
    }

    #[cfg(feature = "stm32f303")]
    fn stop_dma(&mut self) {
        if let Some(pair) = &self.dma {
            pair.tx.stop();
            pair.rx.stop();
            self.write_cr2(0, RXDMAEN | TXDMAEN);
        }
    }

    #[cfg(not(feature = "stm32f303"))]
    fn stop_dma(&mut self) {}

    /// Finish state of the DMA channels, `None` while they run
    #[cfg(feature = "stm32f303")]
    fn dma_outcome(&self) -> Option<Option<Outcome>> {
        let pair = self.dma.as_ref()?;
        let (rx_done, rx_error) = pair.rx.status();
        let (_, tx_error) = pair.tx.status();
        Some(if rx_error || tx_error {
            Some(Outcome::Incomplete)
        } else if rx_done && pair.rx.remaining() == 0 {
            Some(Outcome::Complete)
        } else {
            None
        })
    }

    #[cfg(not(feature = "stm32f303"))]
    fn dma_outcome(&self) -> Option<Option<Outcome>> {
        None
    }
}

impl Default for SpiPort {
    fn default() -> Self {
        Self::new()
    }
}

impl LowLevel for SpiPort {
    fn configure(&mut self, descriptor: &Descriptor, config: &Config) -> Result<(), Error> {
        let options = config.options;
        let frame = options.validate()?;
        if options.lines()? != Lines::FullDuplex {
            return Err(Error::Unsupported);
        }
        let (base, gate) = hardware(descriptor.number).ok_or(Error::Unsupported)?;
        let prescaler = Prescaler::new(descriptor.clock, config.frequency)?;
        let sck = descriptor.binding(Role::Sck).ok_or(Error::Unsupported)?;
        let nss = match options.slave_select() {
            SlaveSelect::HardInput | SlaveSelect::HardOutput => {
                Some(descriptor.binding(Role::Nss).ok_or(Error::Unsupported)?)
            }
            SlaveSelect::None | SlaveSelect::Soft => None,
        };

        self.base = base;
        self.gate = Some(gate);
        self.descriptor = Some(*descriptor);
        self.frame = frame;
        let outputs = [
            Some(sck),
            descriptor.binding(Role::Mosi),
            descriptor.binding(Role::Miso),
            nss,
        ];
        for binding in outputs.iter().flatten() {
            gpio::route(binding, OutputType::PushPull, Pull::None).map_err(|_| Error::Unsupported)?;
        }

        gate.enable();
        gate.reset();

        let mut cr1 = u32::from(prescaler.bits()) << BR_POS;
        if options.is_master() {
            cr1 |= MSTR;
        }
        if options.polarity() == crate::hal::spi::Polarity::IdleHigh {
            cr1 |= CPOL;
        }
        if options.phase() == crate::hal::spi::Phase::CaptureOnSecondTransition {
            cr1 |= CPHA;
        }
        if options.lsb_first() {
            cr1 |= LSBFIRST;
        }
        let mut cr2 = u32::from(options.data_bits() - 1) << DS_POS | ERRIE;
        match options.slave_select() {
            SlaveSelect::None | SlaveSelect::Soft => {
                cr1 |= SSM;
                if options.is_master() {
                    cr1 |= SSI;
                }
            }
            SlaveSelect::HardOutput => cr2 |= SSOE,
            SlaveSelect::HardInput => {}
        }
        if options.ti() {
            cr2 |= FRF;
        }
        if frame == FrameSize::Eight {
            // RXNE on every byte
            cr2 |= FRXTH;
        }
        self.cr1 = cr1;

        let regs = self.regs();
        // NOTE(unsafe) the peripheral is disabled, every register is writable
        unsafe {
            regs.cr1.write(|w| w.bits(cr1));
            regs.cr2.write(|w| w.bits(cr2));
        }
        self.setup_dma(descriptor)?;

        if let Some(irq) = &descriptor.irq {
            nvic::bind(irq, 1);
        }
        debug!(
            "spi{=u8}: /{=u32}, {=u8} bit frames",
            descriptor.number,
            prescaler.divider(),
            options.data_bits()
        );
        Ok(())
    }

    fn release(&mut self) {
        let Some(descriptor) = self.descriptor.take() else {
            return;
        };
        if let Some(irq) = &descriptor.irq {
            nvic::unbind(irq, 1);
        }
        if let Some(irq) = descriptor.dma_rx.as_ref().and_then(|d| d.irq.as_ref()) {
            nvic::unbind(irq, 1);
        }
        self.stop_dma();
        #[cfg(feature = "stm32f303")]
        {
            self.dma = None;
        }
        if let Some(gate) = self.gate.take() {
            if gate.is_enabled() {
                // NOTE(unsafe) disables the peripheral
                self.regs().cr1.write(|w| unsafe { w.bits(0) });
            }
            gate.disable();
        }
        for binding in descriptor.bindings() {
            gpio::unroute(&binding);
        }
        self.job = None;
    }

    fn enable(&mut self) {
        self.cr1 |= SPE;
        let cr1 = self.cr1;
        // NOTE(unsafe) the configured control bits
        self.regs().cr1.write(|w| unsafe { w.bits(cr1) });
    }

    fn disable(&mut self) {
        self.cr1 &= !SPE;
        let cr1 = self.cr1;
        // NOTE(unsafe) the configured control bits
        self.regs().cr1.write(|w| unsafe { w.bits(cr1) });
    }

    fn start(&mut self, request: Request) -> Result<(), Error> {
        if self.cr1 & SPE == 0 {
            return Err(Error::NotOpen);
        }
        if self.job.is_some() {
            return Err(Error::Busy);
        }
        let (tx, rx) = match request {
            Request::Send { data } => (Some(data), None),
            Request::Receive { data } => (None, Some(data)),
            Request::Transfer { tx, rx } => (Some(tx), Some(rx)),
        };
        let len = tx
            .as_ref()
            .map(TxBuf::len)
            .or_else(|| rx.as_ref().map(RxBuf::len))
            .unwrap_or(0);
        let mut job = Job {
            tx,
            rx,
            len,
            sent: 0,
            received: 0,
        };

        self.drain();
        if len / self.frame.bytes() <= usize::from(u16::MAX) && self.start_dma(&mut job) {
            trace!("spi: {=usize} bytes by dma", len);
        } else {
            self.write_cr2(RXNEIE | TXEIE, 0);
        }
        self.job = Some(job);
        Ok(())
    }

    fn abort(&mut self) {
        self.write_cr2(0, RXNEIE | TXEIE);
        self.stop_dma();
        self.drain();
        self.job = None;
    }

    fn service(&mut self) -> Serviced<Event> {
        let regs = self.regs();
        let sr = regs.sr.read().bits();

        let mut events = Event::empty();
        if sr & OVR != 0 {
            // cleared by reading DR, then SR
            self.read_frame();
            regs.sr.read();
            events |= Event::TRANSFER_LOST;
        }
        if sr & MODF != 0 {
            // cleared by a write to CR1, which also restores MSTR and SPE
            let cr1 = self.cr1;
            // NOTE(unsafe) the configured control bits
            regs.cr1.write(|w| unsafe { w.bits(cr1) });
            events |= Event::MODE_FAULT;
        }
        if !events.is_empty() {
            return Serviced::events(events);
        }

        if let Some(outcome) = self.dma_outcome() {
            return match outcome {
                Some(outcome) => {
                    self.stop_dma();
                    self.job = None;
                    Serviced::finished(Event::empty(), outcome)
                }
                None => Serviced::none(),
            };
        }

        let Some(mut job) = self.job.take() else {
            self.write_cr2(0, RXNEIE | TXEIE);
            return Serviced::none();
        };
        let step = self.frame.bytes();

        if sr & RXNE != 0 && job.received < job.len {
            let frame = self.read_frame().to_le_bytes();
            if let Some(rx) = &mut job.rx {
                // NOTE(unsafe) the receive buffer stays alive while the job runs
                let buffer = unsafe { rx.as_mut_slice() };
                buffer[job.received..job.received + step].copy_from_slice(&frame[..step]);
            }
            job.received += step;
        }

        if sr & TXE != 0 && job.sent < job.len {
            let mut frame = [DUMMY; 2];
            if let Some(tx) = &job.tx {
                // NOTE(unsafe) see above
                let buffer = unsafe { tx.as_slice() };
                frame[..step].copy_from_slice(&buffer[job.sent..job.sent + step]);
            }
            self.write_frame(u16::from_le_bytes(frame));
            job.sent += step;
            if job.sent == job.len {
                self.write_cr2(0, TXEIE);
            }
        }

        if job.received == job.len {
            self.write_cr2(0, RXNEIE);
            return Serviced::finished(Event::empty(), Outcome::Complete);
        }
        self.job = Some(job);
        Serviced::none()
    }
}
