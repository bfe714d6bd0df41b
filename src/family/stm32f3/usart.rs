//! USART of the STM32F3, interrupt driven
//!
//! Only the flag and data register plumbing lives here, transfers are run by
//! [`Serial`](crate::serial::Serial) itself.

use crate::gpio::Pull;
use crate::instance::{Descriptor, Role};
use crate::pac::usart1::RegisterBlock;
use crate::serial::{Config, DataBits, Error, Flags, LowLevel, Parity, StopBits};

use super::gpio::{self, OutputType};
use super::mmio::{Bus, Gate};
use super::nvic;

// CR1
const UE: u32 = 1 << 0;
const RE: u32 = 1 << 2;
const TE: u32 = 1 << 3;
const IDLEIE: u32 = 1 << 4;
const RXNEIE: u32 = 1 << 5;
const TCIE: u32 = 1 << 6;
const TXEIE: u32 = 1 << 7;
const PEIE: u32 = 1 << 8;
const PS: u32 = 1 << 9;
const PCE: u32 = 1 << 10;
const M0: u32 = 1 << 12;

// CR2
const STOP_POS: u32 = 12;

// CR3
const EIE: u32 = 1 << 0;
const RTSE: u32 = 1 << 8;
const CTSE: u32 = 1 << 9;
const CTSIE: u32 = 1 << 10;

// ISR, and the matching clear bits of ICR
const PE: u32 = 1 << 0;
const FE: u32 = 1 << 1;
const NF: u32 = 1 << 2;
const ORE: u32 = 1 << 3;
const IDLE: u32 = 1 << 4;
const RXNE: u32 = 1 << 5;
const TC: u32 = 1 << 6;
const TXE: u32 = 1 << 7;
const LBDF: u32 = 1 << 8;
const CTSIF: u32 = 1 << 9;

/// Smallest `BRR` with 16x oversampling
const MIN_BRR: u32 = 16;

/// Base address and clock enable bit of USART`number`
fn hardware(number: u8) -> Option<(usize, Gate)> {
    match number {
        1 => Some((0x4001_3800, Gate::new(Bus::Apb2, 14))),
        2 => Some((0x4000_4400, Gate::new(Bus::Apb1, 17))),
        3 => Some((0x4000_4800, Gate::new(Bus::Apb1, 18))),
        _ => None,
    }
}

/// `ISR` bits and the flags they stand for
const FLAG_BITS: [(u32, Flags); 9] = [
    (RXNE, Flags::RXNE),
    (IDLE, Flags::IDLE),
    (TXE, Flags::TXE),
    (TC, Flags::TC),
    (ORE, Flags::ORE),
    (FE, Flags::FE),
    (PE, Flags::PE),
    (LBDF, Flags::LBD),
    (CTSIF, Flags::CTS),
];

/// `CR1` interrupt enables and the flags they listen to
const LISTEN_BITS: [(u32, Flags); 4] = [
    (RXNEIE, Flags::RXNE),
    (IDLEIE, Flags::IDLE),
    (TXEIE, Flags::TXE),
    (TCIE, Flags::TC),
];

fn to_bits(table: &[(u32, Flags)], flags: Flags) -> u32 {
    table
        .iter()
        .filter(|(_, flag)| flags.contains(*flag))
        .fold(0, |bits, (bit, _)| bits | bit)
}

fn to_flags(table: &[(u32, Flags)], bits: u32) -> Flags {
    table
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .fold(Flags::empty(), |flags, (_, flag)| flags | *flag)
}

/// One USART, bound to a number by [`LowLevel::configure`]
pub struct UsartPort {
    base: usize,
    gate: Option<Gate>,
    descriptor: Option<Descriptor>,
    /// data bits of `RDR` / `TDR`
    mask: u16,
}

impl UsartPort {
    /// An unconfigured port
    pub const fn new() -> Self {
        Self {
            base: 0,
            gate: None,
            descriptor: None,
            mask: 0xFF,
        }
    }

    fn regs(&self) -> &'static RegisterBlock {
        // NOTE(unsafe) `base` is set by `configure` before any register
        // access, and the peripheral is owned by this port
        unsafe { &*(self.base as *const RegisterBlock) }
    }

    fn write_cr1(&self, set: u32, clear: u32) {
        // NOTE(unsafe) only documented control bits are written
        self.regs()
            .cr1
            .modify(|r, w| unsafe { w.bits(r.bits() & !clear | set) });
    }
}

impl Default for UsartPort {
    fn default() -> Self {
        Self::new()
    }
}

impl LowLevel for UsartPort {
    fn configure(&mut self, descriptor: &Descriptor, config: &Config) -> Result<(), Error> {
        let (base, gate) = hardware(descriptor.number).ok_or(Error::Unsupported)?;
        let brr = descriptor.clock.0 / config.baudrate.0;
        if brr < MIN_BRR {
            return Err(Error::Unsupported);
        }
        let tx = descriptor.binding(Role::Tx);
        let rx = descriptor.binding(Role::Rx);
        if tx.is_none() && rx.is_none() {
            return Err(Error::Unsupported);
        }
        let flow = config.flow_control;
        let rts = flow.rts().then(|| descriptor.binding(Role::Rts));
        let cts = flow.cts().then(|| descriptor.binding(Role::Cts));
        if matches!(rts, Some(None)) || matches!(cts, Some(None)) {
            return Err(Error::Unsupported);
        }

        self.base = base;
        self.gate = Some(gate);
        self.descriptor = Some(*descriptor);
        let push_pull = [tx, rts.flatten()];
        let pulled_up = [rx, cts.flatten()];
        for binding in push_pull.iter().flatten() {
            gpio::route(binding, OutputType::PushPull, Pull::None).map_err(|_| Error::Unsupported)?;
        }
        for binding in pulled_up.iter().flatten() {
            gpio::route(binding, OutputType::PushPull, Pull::Up).map_err(|_| Error::Unsupported)?;
        }

        gate.enable();
        gate.reset();

        let mut cr1 = PEIE;
        if tx.is_some() {
            cr1 |= TE;
        }
        if rx.is_some() {
            cr1 |= RE;
        }
        self.mask = match (config.data_bits, config.parity) {
            (DataBits::Eight, Parity::None) => 0xFF,
            (DataBits::Nine, Parity::None) => {
                cr1 |= M0;
                0x1FF
            }
            // the parity bit takes the place of the most significant data bit
            (DataBits::Eight, _) => 0x7F,
            (DataBits::Nine, _) => {
                cr1 |= M0;
                0xFF
            }
        };
        match config.parity {
            Parity::None => {}
            Parity::Even => cr1 |= PCE,
            Parity::Odd => cr1 |= PCE | PS,
        }
        let stop = match config.stop_bits {
            StopBits::One => 0b00,
            StopBits::Half => 0b01,
            StopBits::Two => 0b10,
            StopBits::OneAndHalf => 0b11,
        };
        let mut cr3 = EIE;
        if flow.rts() {
            cr3 |= RTSE;
        }
        if flow.cts() {
            cr3 |= CTSE | CTSIE;
        }

        let regs = self.regs();
        // NOTE(unsafe) the peripheral is disabled, every register is writable
        unsafe {
            regs.cr1.write(|w| w.bits(0));
            regs.brr.write(|w| w.bits(brr));
            regs.cr2.write(|w| w.bits(stop << STOP_POS));
            regs.cr3.write(|w| w.bits(cr3));
            regs.cr1.write(|w| w.bits(cr1));
        }

        if let Some(irq) = &descriptor.irq {
            nvic::bind(irq, 1);
        }
        debug!("usart{=u8}: brr {=u32}", descriptor.number, brr);
        Ok(())
    }

    fn release(&mut self) {
        let Some(descriptor) = self.descriptor.take() else {
            return;
        };
        if let Some(irq) = &descriptor.irq {
            nvic::unbind(irq, 1);
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
    }

    fn enable(&mut self) {
        self.write_cr1(UE, 0);
    }

    fn disable(&mut self) {
        self.write_cr1(0, UE);
    }

    fn flags(&self) -> Flags {
        to_flags(&FLAG_BITS, self.regs().isr.read().bits())
    }

    fn listening(&self) -> Flags {
        to_flags(&LISTEN_BITS, self.regs().cr1.read().bits())
    }

    fn listen(&mut self, flags: Flags) {
        self.write_cr1(to_bits(&LISTEN_BITS, flags), 0);
    }

    fn unlisten(&mut self, flags: Flags) {
        self.write_cr1(0, to_bits(&LISTEN_BITS, flags));
    }

    fn clear(&mut self, flags: Flags) {
        let mut bits = to_bits(&FLAG_BITS, flags) & !(RXNE | TXE);
        if flags.contains(Flags::ORE) {
            // noise has no flag of its own and goes with the overrun
            bits |= NF;
        }
        // NOTE(unsafe) atomic write to a stateless register
        self.regs().icr.write(|w| unsafe { w.bits(bits) });
    }

    fn read_word(&mut self) -> u16 {
        self.regs().rdr.read().bits() as u16 & self.mask
    }

    fn write_word(&mut self, word: u16) {
        let word = u32::from(word & self.mask);
        // NOTE(unsafe) any value fits the data field
        self.regs().tdr.write(|w| unsafe { w.bits(word) });
    }
}
