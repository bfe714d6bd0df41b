//! NVIC of the Cortex-M4F, four priority bits

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::{NVIC, SCB};

use crate::instance::IrqBinding;
use crate::irq::{Controller, MAX_GROUPING};

/// `AIRCR` write key
const VECTKEY: u32 = 0x05FA << 16;
const PRIGROUP_POS: u32 = 8;
const PRIGROUP_MASK: u32 = 0b111 << PRIGROUP_POS;

/// A raw interrupt number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Line(u16);

// NOTE(unsafe) callers only pass numbers of the vendor vector table
unsafe impl InterruptNumber for Line {
    fn number(self) -> u16 {
        self.0
    }
}

fn grouping() -> u8 {
    // NOTE(unsafe) atomic read
    let aircr = unsafe { (*SCB::PTR).aircr.read() };
    let prigroup = ((aircr & PRIGROUP_MASK) >> PRIGROUP_POS) as u8;
    // PRIGROUP n leaves 7 - n group priority bits of 8
    (7 - prigroup).min(MAX_GROUPING)
}

fn write_priority(irq: u16, raw: u8) {
    // NOTE(unsafe) writes a single byte wide priority register
    unsafe { (*NVIC::PTR).ipr[usize::from(irq)].write(raw) }
}

/// Set the priority of `lines` consecutive interrupts starting at
/// `binding.number` and unmask them.
pub(crate) fn bind(binding: &IrqBinding, lines: u16) {
    debug_assert!(lines > 0);
    let priority = crate::irq::encode_priority(grouping(), binding.priority, 0, Nvic::PRIO_BITS);
    for irq in binding.number..binding.number + lines {
        write_priority(irq, priority << (8 - Nvic::PRIO_BITS));
        NVIC::unpend(Line(irq));
        // NOTE(unsafe) the owning instance is configured, its handler may run
        unsafe { NVIC::unmask(Line(irq)) };
    }
    trace!("nvic: {=u16} (+{=u16}) unmasked", binding.number, lines - 1);
}

/// Mask what [`bind`] unmasked
pub(crate) fn unbind(binding: &IrqBinding, lines: u16) {
    for irq in binding.number..binding.number + lines {
        NVIC::mask(Line(irq));
        NVIC::unpend(Line(irq));
    }
}

/// The NVIC as an interrupt [`Controller`]
pub struct Nvic {
    nvic: NVIC,
}

impl Nvic {
    /// Take over the NVIC
    pub fn new(nvic: NVIC) -> Self {
        Self { nvic }
    }

    /// Give the NVIC back
    pub fn free(self) -> NVIC {
        self.nvic
    }
}

impl Controller for Nvic {
    const PRIO_BITS: u8 = 4;

    fn enable(&mut self, irq: u16) {
        // NOTE(unsafe) unmasking is the caller's explicit request
        unsafe { NVIC::unmask(Line(irq)) }
    }

    fn disable(&mut self, irq: u16) {
        NVIC::mask(Line(irq));
    }

    fn is_enabled(&self, irq: u16) -> bool {
        NVIC::is_enabled(Line(irq))
    }

    fn set_pending(&mut self, irq: u16) {
        NVIC::pend(Line(irq));
    }

    fn clear_pending(&mut self, irq: u16) {
        NVIC::unpend(Line(irq));
    }

    fn is_pending(&self, irq: u16) -> bool {
        NVIC::is_pending(Line(irq))
    }

    fn write_priority(&mut self, irq: u16, raw: u8) {
        write_priority(irq, raw);
    }

    fn read_priority(&self, irq: u16) -> u8 {
        NVIC::get_priority(Line(irq))
    }

    fn grouping(&self) -> u8 {
        grouping()
    }

    fn write_grouping(&mut self, grouping: u8) {
        let prigroup = u32::from(7 - grouping) << PRIGROUP_POS;
        // NOTE(unsafe) keeps all other AIRCR bits, the key makes the write
        // take effect
        unsafe {
            let scb = &*SCB::PTR;
            let aircr = scb.aircr.read() & !(PRIGROUP_MASK | 0xFFFF_0000);
            scb.aircr.write(VECTKEY | aircr | prigroup);
        }
    }
}
