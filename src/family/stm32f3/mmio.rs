//! Register access helpers and RCC clock gates

use core::sync::atomic::{compiler_fence, Ordering};

use crate::pac::RCC;

/// Write `$value` into field `$index` of an array-like register with fields
/// of `$bitwidth` bits, e.g. `MODER`.
macro_rules! modify_at {
    ($reg:expr, $bitwidth:expr, $index:expr, $value:expr) => {
        $reg.modify(|r, w| {
            let mask = !(u32::MAX >> (32 - $bitwidth) << ($bitwidth * $index));
            let value = ($value as u32) << ($bitwidth * $index);
            w.bits(r.bits() & mask | value)
        })
    };
}
pub(crate) use modify_at;

/// `*register = *register & !mask | value`, retried until no other context
/// touched the register in between.
///
/// # Safety
///
/// `register` must point to a valid, word aligned peripheral register.
#[inline]
pub(crate) unsafe fn atomic_modify(register: *mut u32, mask: u32, value: u32) {
    let mut result: u32;
    loop {
        compiler_fence(Ordering::SeqCst);
        core::arch::asm!(
            "ldrex {0}, [{1}]",
            out(reg) result,
            in(reg) register,
            options(readonly, preserves_flags, nostack),
        );
        result = result & !mask | (value & mask);
        // `strex` writes 0 into `result` if the store went through
        core::arch::asm!(
            "strex {0}, {0}, [{1}]",
            inout(reg) result,
            in(reg) register,
            options(preserves_flags, nostack),
        );
        compiler_fence(Ordering::SeqCst);
        if result == 0 {
            break;
        }
    }
}

/// Clock bus of a peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Bus {
    Ahb,
    Apb1,
    Apb2,
}

/// Clock enable and reset bit of one peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Gate {
    pub(crate) bus: Bus,
    pub(crate) bit: u8,
}

impl Gate {
    pub(crate) const fn new(bus: Bus, bit: u8) -> Self {
        Self { bus, bit }
    }

    fn enr(self) -> *mut u32 {
        // NOTE(unsafe) only the address is taken
        let rcc = unsafe { &*RCC::ptr() };
        match self.bus {
            Bus::Ahb => &rcc.ahbenr as *const _ as *mut u32,
            Bus::Apb1 => &rcc.apb1enr as *const _ as *mut u32,
            Bus::Apb2 => &rcc.apb2enr as *const _ as *mut u32,
        }
    }

    fn rstr(self) -> *mut u32 {
        // NOTE(unsafe) only the address is taken
        let rcc = unsafe { &*RCC::ptr() };
        match self.bus {
            Bus::Ahb => &rcc.ahbrstr as *const _ as *mut u32,
            Bus::Apb1 => &rcc.apb1rstr as *const _ as *mut u32,
            Bus::Apb2 => &rcc.apb2rstr as *const _ as *mut u32,
        }
    }

    fn mask(self) -> u32 {
        1 << self.bit
    }

    /// Turn the clock on
    pub(crate) fn enable(self) {
        // NOTE(unsafe) RCC registers are shared by all drivers, hence the
        // exclusive access
        unsafe { atomic_modify(self.enr(), self.mask(), u32::MAX) }
    }

    /// Turn the clock off
    pub(crate) fn disable(self) {
        // NOTE(unsafe) see `enable`
        unsafe { atomic_modify(self.enr(), self.mask(), 0) }
    }

    /// Whether the clock is on
    pub(crate) fn is_enabled(self) -> bool {
        // NOTE(unsafe) plain read of a valid register
        unsafe { core::ptr::read_volatile(self.enr()) & self.mask() != 0 }
    }

    /// Pulse the reset line
    pub(crate) fn reset(self) {
        // NOTE(unsafe) see `enable`
        unsafe {
            atomic_modify(self.rstr(), self.mask(), u32::MAX);
            atomic_modify(self.rstr(), self.mask(), 0);
        }
    }
}
