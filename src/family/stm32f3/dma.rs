//! DMA channels of the STM32F303
//!
//! A channel is set up once from its [`DmaDescriptor`] when the owning
//! instance opens. Every transfer then only programs memory address and count.

use crate::dma::{Alignment, Burst, Direction, DmaDescriptor, Error, Increment, Priority};
use crate::pac::{self, dma1::RegisterBlock};

use super::mmio::{Bus, Gate};

const DMA1_BASE: usize = 0x4002_0000;
#[cfg(any(
    feature = "stm32f303xb",
    feature = "stm32f303xc",
    feature = "stm32f303xd",
    feature = "stm32f303xe"
))]
const DMA2_BASE: usize = 0x4002_0400;

// CCR bits
const EN: u32 = 1 << 0;
const TCIE: u32 = 1 << 1;
const TEIE: u32 = 1 << 3;
const DIR: u32 = 1 << 4;
const PINC: u32 = 1 << 6;
const MINC: u32 = 1 << 7;
const PSIZE_POS: u32 = 8;
const MSIZE_POS: u32 = 10;
const PL_POS: u32 = 12;

// ISR / IFCR bits of channel 1, channel n is shifted by 4 * (n - 1)
const GIF: u32 = 1 << 0;
const TCIF: u32 = 1 << 1;
const TEIF: u32 = 1 << 3;

fn size(alignment: Alignment) -> u32 {
    match alignment {
        Alignment::Byte => 0b00,
        Alignment::HalfWord => 0b01,
        Alignment::Word => 0b10,
    }
}

fn level(priority: Priority) -> u32 {
    match priority {
        Priority::Low => 0b00,
        Priority::Medium => 0b01,
        Priority::High => 0b10,
        Priority::VeryHigh => 0b11,
    }
}

/// Controller registers, clock gate and channel count
fn controller(number: u8) -> Result<(usize, Gate, u8), Error> {
    let (base, bit, channels) = match number {
        1 => (DMA1_BASE, 0, 7),
        #[cfg(any(
            feature = "stm32f303xb",
            feature = "stm32f303xc",
            feature = "stm32f303xd",
            feature = "stm32f303xe"
        ))]
        2 => (DMA2_BASE, 1, 5),
        _ => return Err(Error::Channel),
    };
    Ok((base, Gate::new(Bus::Ahb, bit), channels))
}

/// One configured channel
pub(crate) struct Channel {
    base: usize,
    /// channel number - 1
    index: u8,
    ccr: u32,
}

impl Channel {
    /// Check `descriptor` against the hardware and program the channel for
    /// transfers from and to `peripheral`. The channel stays disabled.
    pub(crate) fn new(
        descriptor: &DmaDescriptor,
        expected: Direction,
        peripheral: u32,
    ) -> Result<Self, Error> {
        descriptor.validate(expected)?;
        if descriptor.burst != Burst::Single {
            return Err(Error::Unsupported);
        }
        let (base, gate, channels) = controller(descriptor.controller)?;
        if descriptor.channel > channels {
            return Err(Error::Channel);
        }
        gate.enable();

        let mut ccr = size(descriptor.peripheral_alignment) << PSIZE_POS
            | size(descriptor.memory_alignment) << MSIZE_POS
            | level(descriptor.priority) << PL_POS
            | TCIE
            | TEIE;
        if descriptor.direction == Direction::MemoryToPeripheral {
            ccr |= DIR;
        }
        if descriptor.memory_increment == Increment::Enable {
            ccr |= MINC;
        }
        if descriptor.peripheral_increment == Increment::Enable {
            ccr |= PINC;
        }

        let channel = Self {
            base,
            index: descriptor.channel - 1,
            ccr,
        };
        channel.stop();
        // NOTE(unsafe) any address is accepted by the register
        channel.ch().par.write(|w| unsafe { w.bits(peripheral) });
        Ok(channel)
    }

    fn dma(&self) -> &RegisterBlock {
        // NOTE(unsafe) DMA2 has the layout of DMA1. The channel's registers
        // are only touched by its owner, the shared flag registers are read
        // or written atomically.
        unsafe { &*(self.base as *const RegisterBlock) }
    }

    fn ch(&self) -> &pac::dma1::CH {
        let dma = self.dma();
        match self.index {
            0 => &dma.ch1,
            1 => &dma.ch2,
            2 => &dma.ch3,
            3 => &dma.ch4,
            4 => &dma.ch5,
            5 => &dma.ch6,
            _ => &dma.ch7,
        }
    }

    fn shift(&self) -> u32 {
        4 * u32::from(self.index)
    }

    /// Move `len` beats from or to `memory`.
    ///
    /// Without `increment` the memory address stays fixed, for dummy bytes.
    pub(crate) fn start(&self, memory: u32, len: u16, increment: bool) {
        self.clear();
        let ch = self.ch();
        let ccr = if increment { self.ccr } else { self.ccr & !MINC };
        // NOTE(unsafe) the channel is disabled, so all registers are writable
        unsafe {
            ch.mar.write(|w| w.bits(memory));
            ch.ndtr.write(|w| w.bits(u32::from(len)));
            ch.cr.write(|w| w.bits(ccr | EN));
        }
    }

    /// Disable the channel, abandoning what is left of the transfer
    pub(crate) fn stop(&self) {
        // NOTE(unsafe) disabled with the programmed configuration
        self.ch().cr.write(|w| unsafe { w.bits(self.ccr & !EN) });
        self.clear();
    }

    /// Whether the transfer finished, and whether it hit a bus error
    pub(crate) fn status(&self) -> (bool, bool) {
        let isr = self.dma().isr.read().bits() >> self.shift();
        (isr & TCIF != 0, isr & TEIF != 0)
    }

    /// Clear all flags of the channel
    pub(crate) fn clear(&self) {
        // NOTE(unsafe) atomic write to a stateless register
        self.dma()
            .ifcr
            .write(|w| unsafe { w.bits(GIF << self.shift()) });
    }

    /// Beats still to move
    pub(crate) fn remaining(&self) -> u16 {
        self.ch().ndtr.read().bits() as u16
    }
}
