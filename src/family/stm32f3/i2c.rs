//! I2C v2 peripheral of the STM32F3
//!
//! Master transfers longer than 255 bytes are chained with `RELOAD`. A memory
//! read or write-read is a write phase ending in `TC` followed by a read
//! phase started with a repeated START.
//!
//! The instance's event and error interrupts are adjacent in the vector
//! table, both are bound from [`Descriptor::irq`].
//!
//! The kernel clock is left at its reset source (HSI, 8 MHz), which the
//! descriptor's clock has to state.

use crate::event::{Outcome, Serviced};
use crate::gpio::Pull;
use crate::i2c::{timing, Address, BusSpeed, Config, Error, Event, LowLevel, Request, PING_TIMEOUT};
use crate::instance::{Descriptor, Role};
use crate::pac::i2c1::RegisterBlock;
use crate::transfer::{RxBuf, TxBuf};

use super::gpio::{self, OutputType};
use super::mmio::{Bus, Gate};
use super::nvic;

// ISR
const TXIS: u32 = 1 << 1;
const RXNE: u32 = 1 << 2;
const ADDR: u32 = 1 << 3;
const NACKF: u32 = 1 << 4;
const STOPF: u32 = 1 << 5;
const TC: u32 = 1 << 6;
const TCR: u32 = 1 << 7;
const BERR: u32 = 1 << 8;
const ARLO: u32 = 1 << 9;
const OVR: u32 = 1 << 10;
const BUSY: u32 = 1 << 15;
const DIR: u32 = 1 << 16;
const ADDCODE_POS: u32 = 17;
/// Writing `TXE` flushes the transmit data register
const TXE: u32 = 1 << 0;

// CR1
const PE: u32 = 1 << 0;
const TXIE: u32 = 1 << 1;
const RXIE: u32 = 1 << 2;
const ADDRIE: u32 = 1 << 3;
const NACKIE: u32 = 1 << 4;
const STOPIE: u32 = 1 << 5;
const TCIE: u32 = 1 << 6;
const ERRIE: u32 = 1 << 7;
const GCEN: u32 = 1 << 19;
const TRANSFER_IRQS: u32 = TXIE | RXIE | NACKIE | STOPIE | TCIE;

// CR2
const RD_WRN: u32 = 1 << 10;
const ADD10: u32 = 1 << 11;
const START: u32 = 1 << 13;
const STOP: u32 = 1 << 14;
const NBYTES_POS: u32 = 16;
const RELOAD: u32 = 1 << 24;
const AUTOEND: u32 = 1 << 25;
const CHUNK_MASK: u32 = 0xFF << NBYTES_POS | RELOAD | AUTOEND;

// OAR1
const OA1MODE: u32 = 1 << 10;
const OA1EN: u32 = 1 << 15;

/// Largest `NBYTES`
const MAX_CHUNK: usize = 255;
/// Clocked out when a master reads past an armed slave buffer
const FILL: u8 = 0xFF;

/// Base address and clock enable bit of I2C`number`
fn hardware(number: u8) -> Option<(usize, Gate)> {
    match number {
        1 => Some((0x4000_5400, Gate::new(Bus::Apb1, 21))),
        #[cfg(not(feature = "gpio-f333"))]
        2 => Some((0x4000_5800, Gate::new(Bus::Apb1, 22))),
        #[cfg(any(feature = "gpio-f302", feature = "gpio-f303e"))]
        3 => Some((0x4000_7800, Gate::new(Bus::Apb1, 30))),
        _ => None,
    }
}

fn sadd(address: Address) -> u32 {
    match address {
        Address::SevenBit(a) => u32::from(a) << 1,
        Address::TenBit(a) => u32::from(a) | ADD10,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    MasterWrite,
    MasterRead,
    SlaveTransmit,
    SlaveReceive,
}

/// The transfer in flight
struct Job {
    phase: Phase,
    address: Address,
    /// register address sent ahead of `tx`
    prefix: [u8; 2],
    prefix_len: usize,
    tx: Option<TxBuf>,
    rx: Option<RxBuf>,
    /// bytes moved in the current phase
    pos: usize,
    /// bytes of the current phase
    len: usize,
    /// bytes covered by the `NBYTES` programmed so far
    programmed: usize,
    /// end the last phase with STOP
    stop: bool,
    failed: bool,
}

impl Job {
    const fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            address: Address::SevenBit(0),
            prefix: [0; 2],
            prefix_len: 0,
            tx: None,
            rx: None,
            pos: 0,
            len: 0,
            programmed: 0,
            stop: true,
            failed: false,
        }
    }

    fn is_master(&self) -> bool {
        matches!(self.phase, Phase::MasterWrite | Phase::MasterRead)
    }

    /// Whether no read phase follows
    fn is_last_phase(&self) -> bool {
        self.phase == Phase::MasterRead || self.rx.is_none()
    }

    fn next_tx(&mut self) -> u8 {
        let pos = self.pos;
        let byte = if pos < self.prefix_len {
            self.prefix[pos]
        } else {
            // NOTE(unsafe) the buffer stays alive while the job runs
            match &self.tx {
                Some(tx) => unsafe { tx.as_slice() }
                    .get(pos - self.prefix_len)
                    .copied()
                    .unwrap_or(FILL),
                None => FILL,
            }
        };
        if pos < self.len {
            self.pos += 1;
        }
        byte
    }

    fn store_rx(&mut self, byte: u8) {
        if let Some(rx) = &mut self.rx {
            // NOTE(unsafe) see `next_tx`
            if let Some(slot) = unsafe { rx.as_mut_slice() }.get_mut(self.pos) {
                *slot = byte;
                self.pos += 1;
            }
        }
    }

    fn is_done(&self) -> bool {
        self.pos == self.len
    }
}

/// One I2C peripheral, bound to a number by [`LowLevel::configure`]
pub struct I2cPort {
    base: usize,
    gate: Option<Gate>,
    descriptor: Option<Descriptor>,
    slave: bool,
    job: Job,
}

impl I2cPort {
    /// An unconfigured port
    pub const fn new() -> Self {
        Self {
            base: 0,
            gate: None,
            descriptor: None,
            slave: false,
            job: Job::idle(),
        }
    }

    fn regs(&self) -> &'static RegisterBlock {
        // NOTE(unsafe) `base` is set by `configure` before any register
        // access, and the peripheral is owned by this port
        unsafe { &*(self.base as *const RegisterBlock) }
    }

    /// Clear the `ISR` flags in `flags` through `ICR`, which shares their
    /// bit positions
    fn clear(&self, flags: u32) {
        // NOTE(unsafe) atomic write to a stateless register
        self.regs().icr.write(|w| unsafe { w.bits(flags) });
    }

    fn write_cr1(&self, set: u32, clear: u32) {
        // NOTE(unsafe) only documented control bits are written
        self.regs()
            .cr1
            .modify(|r, w| unsafe { w.bits(r.bits() & !clear | set) });
    }

    /// Program `NBYTES` for the next chunk of the current phase
    fn program(&mut self, start: bool) {
        let remaining = self.job.len - self.job.programmed;
        let chunk = remaining.min(MAX_CHUNK);
        self.job.programmed += chunk;

        let mut cr2 = (chunk as u32) << NBYTES_POS;
        if remaining > MAX_CHUNK {
            cr2 |= RELOAD;
        } else if self.job.stop && self.job.is_last_phase() {
            cr2 |= AUTOEND;
        }

        let regs = self.regs();
        if start {
            cr2 |= sadd(self.job.address) | START;
            if self.job.phase == Phase::MasterRead {
                cr2 |= RD_WRN;
            }
            // NOTE(unsafe) valid address and count encodings
            regs.cr2.write(|w| unsafe { w.bits(cr2) });
        } else {
            // NOTE(unsafe) see above
            regs.cr2
                .modify(|r, w| unsafe { w.bits(r.bits() & !CHUNK_MASK | cr2) });
        }
    }

    fn begin(&mut self, phase: Phase) {
        self.job.phase = phase;
        self.job.pos = 0;
        self.job.programmed = 0;
        self.job.len = match phase {
            Phase::MasterRead | Phase::SlaveReceive => self.job.rx.as_ref().map_or(0, |rx| rx.len()),
            _ => self.job.prefix_len + self.job.tx.as_ref().map_or(0, |tx| tx.len()),
        };
        if self.job.is_master() {
            self.program(true);
        }
    }

    /// Drop the job and mask its interrupts
    fn end(&mut self) {
        self.write_cr1(0, TRANSFER_IRQS);
        self.job = Job::idle();
        if self.slave {
            self.write_cr1(ADDRIE, 0);
        }
    }

    fn finish(&mut self, events: Event) -> Serviced<Event> {
        let outcome = if !self.job.failed && self.job.is_done() {
            Outcome::Complete
        } else {
            Outcome::Incomplete
        };
        self.end();
        Serviced::finished(events, outcome)
    }

    /// A master matched the own address, which stretches the clock until
    /// `ADDR` is cleared
    fn addressed(&mut self, isr: u32) -> Event {
        let regs = self.regs();
        let mut events = Event::empty();
        if (isr >> ADDCODE_POS) & 0x7F == 0 {
            events |= Event::GENERAL_CALL;
        }
        let transmitter = isr & DIR != 0;
        let armed = match self.job.phase {
            Phase::SlaveTransmit => transmitter,
            Phase::SlaveReceive => !transmitter,
            _ => false,
        };
        if !armed {
            // left pending until a matching buffer is armed
            self.write_cr1(0, ADDRIE);
            return events
                | if transmitter {
                    Event::SLAVE_TRANSMIT
                } else {
                    Event::SLAVE_RECEIVE
                };
        }

        if transmitter {
            // NOTE(unsafe) flushes stale data
            regs.isr.write(|w| unsafe { w.bits(TXE) });
            self.write_cr1(TXIE | NACKIE | STOPIE, 0);
        } else {
            self.write_cr1(RXIE | STOPIE, 0);
        }
        self.clear(ADDR);
        events
    }
}

impl Default for I2cPort {
    fn default() -> Self {
        Self::new()
    }
}

impl LowLevel for I2cPort {
    fn configure(&mut self, descriptor: &Descriptor, config: &Config) -> Result<(), Error> {
        if config.bus_speed == BusSpeed::High {
            return Err(Error::Unsupported);
        }
        let (base, gate) = hardware(descriptor.number).ok_or(Error::Unsupported)?;
        let timing = timing::compute(descriptor.clock, config.bus_speed.frequency())?;
        let scl = descriptor.binding(Role::Scl).ok_or(Error::Unsupported)?;
        let sda = descriptor.binding(Role::Sda).ok_or(Error::Unsupported)?;

        self.base = base;
        self.gate = Some(gate);
        self.descriptor = Some(*descriptor);
        gpio::route(&scl, OutputType::OpenDrain, Pull::None).map_err(|_| Error::Unsupported)?;
        gpio::route(&sda, OutputType::OpenDrain, Pull::None).map_err(|_| Error::Unsupported)?;

        gate.enable();
        gate.reset();

        let own = config.own_address.raw();
        self.slave = own != 0 || config.general_call;
        let oar1 = match config.own_address {
            _ if !self.slave => 0,
            Address::SevenBit(a) => OA1EN | u32::from(a) << 1,
            Address::TenBit(a) => OA1EN | OA1MODE | u32::from(a),
        };

        let regs = self.regs();
        // NOTE(unsafe) the peripheral is disabled, every register is writable
        unsafe {
            regs.cr1.write(|w| w.bits(0));
            regs.timingr.write(|w| w.bits(timing.bits()));
            regs.oar1.write(|w| w.bits(oar1));
            let mut cr1 = ERRIE;
            if self.slave {
                cr1 |= ADDRIE;
            }
            if config.general_call {
                cr1 |= GCEN;
            }
            regs.cr1.write(|w| w.bits(cr1));
        }

        // TODO: fast-mode plus also needs the pins' FM+ drive in SYSCFG_CFGR1
        if let Some(irq) = &descriptor.irq {
            nvic::bind(irq, 2);
        }
        debug!(
            "i2c{=u8}: timing {=u32:#010x}",
            descriptor.number,
            timing.bits()
        );
        Ok(())
    }

    fn release(&mut self) {
        let Some(descriptor) = self.descriptor.take() else {
            return;
        };
        if let Some(irq) = &descriptor.irq {
            nvic::unbind(irq, 2);
        }
        if let Some(gate) = self.gate.take() {
            if gate.is_enabled() {
                self.write_cr1(0, u32::MAX);
            }
            gate.disable();
        }
        for binding in descriptor.bindings() {
            gpio::unroute(&binding);
        }
        self.job = Job::idle();
    }

    fn enable(&mut self) {
        self.write_cr1(PE, 0);
    }

    fn disable(&mut self) {
        self.write_cr1(0, PE);
    }

    fn start(&mut self, request: Request) -> Result<(), Error> {
        if self.regs().cr1.read().bits() & PE == 0 {
            return Err(Error::NotOpen);
        }
        if self.job.phase != Phase::Idle {
            return Err(Error::Busy);
        }
        let mut job = Job::idle();
        let phase = match request {
            Request::Transmit { address, data, stop } => {
                job.address = address;
                job.tx = Some(data);
                job.stop = stop;
                Phase::MasterWrite
            }
            Request::Receive { address, data, stop } => {
                job.address = address;
                job.rx = Some(data);
                job.stop = stop;
                Phase::MasterRead
            }
            Request::MemoryWrite {
                address,
                register,
                data,
            } => {
                job.address = address;
                (job.prefix, job.prefix_len) = register.bytes();
                job.tx = Some(data);
                Phase::MasterWrite
            }
            Request::MemoryRead {
                address,
                register,
                data,
            } => {
                job.address = address;
                (job.prefix, job.prefix_len) = register.bytes();
                job.rx = Some(data);
                Phase::MasterWrite
            }
            Request::WriteRead { address, tx, rx } => {
                job.address = address;
                job.tx = Some(tx);
                job.rx = Some(rx);
                Phase::MasterWrite
            }
            Request::SlaveTransmit { data } => {
                job.tx = Some(data);
                Phase::SlaveTransmit
            }
            Request::SlaveReceive { data } => {
                job.rx = Some(data);
                Phase::SlaveReceive
            }
        };
        if matches!(phase, Phase::SlaveTransmit | Phase::SlaveReceive) && !self.slave {
            return Err(Error::Unsupported);
        }

        self.job = job;
        if self.job.is_master() {
            self.write_cr1(TRANSFER_IRQS, 0);
        }
        self.begin(phase);
        if !self.job.is_master() {
            // a pending address match is serviced right away
            self.write_cr1(ADDRIE, 0);
        }
        Ok(())
    }

    fn ping(&mut self, address: Address) -> Result<bool, Error> {
        let regs = self.regs();
        if regs.cr1.read().bits() & PE == 0 {
            return Err(Error::NotOpen);
        }
        let idle = (0..PING_TIMEOUT).any(|_| regs.isr.read().bits() & BUSY == 0);
        if !idle {
            return Err(Error::Busy);
        }

        // NOTE(unsafe) zero length write with automatic STOP
        regs.cr2
            .write(|w| unsafe { w.bits(sadd(address) | AUTOEND | START) });
        let mut isr = 0;
        for _ in 0..PING_TIMEOUT {
            isr = regs.isr.read().bits();
            if isr & STOPF != 0 {
                break;
            }
        }
        let acked = isr & STOPF != 0 && isr & NACKF == 0;
        if isr & STOPF == 0 {
            // NOTE(unsafe) see above
            regs.cr2.modify(|r, w| unsafe { w.bits(r.bits() | STOP) });
        }
        self.clear(NACKF | STOPF);
        Ok(acked)
    }

    fn abort(&mut self) {
        if self.job.phase == Phase::Idle {
            return;
        }
        let master = self.job.is_master();
        self.end();
        if master {
            // a software reset releases the lines
            self.write_cr1(0, PE);
            self.write_cr1(PE, 0);
        }
    }

    fn service(&mut self) -> Serviced<Event> {
        let regs = self.regs();
        let isr = regs.isr.read().bits();

        if isr & (BERR | ARLO | OVR) != 0 {
            let mut events = Event::empty();
            if isr & BERR != 0 {
                events |= Event::BUS_ERROR;
            }
            if isr & ARLO != 0 {
                events |= Event::ARBITRATION_LOST;
            }
            self.clear(BERR | ARLO | OVR);
            if self.job.phase == Phase::Idle {
                return Serviced::events(events);
            }
            self.job.failed = true;
            let master = self.job.is_master();
            let serviced = self.finish(events);
            if master {
                self.write_cr1(0, PE);
                self.write_cr1(PE, 0);
            }
            return serviced;
        }

        let mut events = Event::empty();
        if isr & ADDR != 0 && self.regs().cr1.read().bits() & ADDRIE != 0 {
            events |= self.addressed(isr);
        }

        if isr & NACKF != 0 {
            self.clear(NACKF);
            if self.job.is_master() {
                if self.job.pos == 0 {
                    events |= Event::ADDRESS_NACK;
                }
                self.job.failed = true;
                // without AUTOEND the STOP is ours to send
                if regs.cr2.read().bits() & AUTOEND == 0 {
                    // NOTE(unsafe) generates a STOP condition
                    regs.cr2.modify(|r, w| unsafe { w.bits(r.bits() | STOP) });
                }
            }
        }

        if isr & TXIS != 0 && matches!(self.job.phase, Phase::MasterWrite | Phase::SlaveTransmit) {
            let byte = self.job.next_tx();
            regs.txdr.write(|w| w.txdata().bits(byte));
        }

        if isr & RXNE != 0 {
            let byte = regs.rxdr.read().rxdata().bits();
            if matches!(self.job.phase, Phase::MasterRead | Phase::SlaveReceive) {
                self.job.store_rx(byte);
            }
        }

        if isr & TCR != 0 && self.job.is_master() {
            self.program(false);
        }

        if isr & TC != 0 && self.job.is_master() && !self.job.failed {
            if self.job.phase == Phase::MasterWrite && self.job.rx.is_some() {
                // repeated START into the read phase
                self.begin(Phase::MasterRead);
            } else {
                // bus held for the next transfer
                return self.finish(events);
            }
        }

        if isr & STOPF != 0 {
            self.clear(STOPF);
            if self.job.phase != Phase::Idle {
                return self.finish(events);
            }
        }

        Serviced::events(events)
    }
}

impl TryFrom<u8> for I2cPort {
    type Error = Error;

    /// A port for I2C`number`, if the part has it
    fn try_from(number: u8) -> Result<Self, Error> {
        hardware(number).map(|_| Self::new()).ok_or(Error::Unsupported)
    }
}
