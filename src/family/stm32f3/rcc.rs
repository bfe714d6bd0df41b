//! Clock tree bring-up through RCC and the flash wait states
//!
//! Fields are written as raw bits. `PLLSRC` is one bit on most parts and two
//! on the F303xD/E, but selecting `HSE/PREDIV` sets bit 16 on both.

use crate::clock::{Error, Limits, LowLevel, Plan, PllSource, Source, UsbPrescaler};
use crate::pac::{FLASH, RCC};

/// Polls of a ready flag before the oscillator counts as dead
const READY_SPINS: u32 = 100_000;

mod cr {
    pub const HSEON: u32 = 1 << 16;
    pub const HSERDY: u32 = 1 << 17;
    pub const HSEBYP: u32 = 1 << 18;
    pub const PLLON: u32 = 1 << 24;
    pub const PLLRDY: u32 = 1 << 25;
}

mod cfgr {
    pub const SW: u32 = 0b11;
    pub const SWS_SHIFT: u32 = 2;
    pub const HPRE_SHIFT: u32 = 4;
    pub const PPRE1_SHIFT: u32 = 8;
    pub const PPRE2_SHIFT: u32 = 11;
    pub const PLLSRC_HSE: u32 = 1 << 16;
    pub const PLLMUL_SHIFT: u32 = 18;
    pub const USBPRE: u32 = 1 << 22;
    /// PLLSRC, PLLXTPRE and PLLMUL
    pub const PLL_MASK: u32 = 0b11 << 15 | 1 << 17 | 0xF << 18;
    /// USBPRE, PPRE2, PPRE1 and HPRE
    pub const BUS_MASK: u32 = USBPRE | 0x3FF << HPRE_SHIFT;
}

const SW_HSI: u32 = 0b00;
const SW_HSE: u32 = 0b01;
const SW_PLL: u32 = 0b10;

const LATENCY_MASK: u32 = 0b111;

fn hpre_bits(div: u16) -> u32 {
    match div {
        2 => 0b1000,
        4 => 0b1001,
        8 => 0b1010,
        16 => 0b1011,
        64 => 0b1100,
        128 => 0b1101,
        256 => 0b1110,
        512 => 0b1111,
        _ => 0b0000,
    }
}

fn ppre_bits(div: u8) -> u32 {
    match div {
        2 => 0b100,
        4 => 0b101,
        8 => 0b110,
        16 => 0b111,
        _ => 0b000,
    }
}

/// The clock controller
pub struct ClockControl {
    rcc: RCC,
    flash: FLASH,
}

impl ClockControl {
    /// Take over RCC and the flash interface
    pub fn new(rcc: RCC, flash: FLASH) -> Self {
        Self { rcc, flash }
    }

    /// Give the peripherals back
    pub fn free(self) -> (RCC, FLASH) {
        (self.rcc, self.flash)
    }

    fn wait_for(&self, ready: impl Fn(&Self) -> bool) -> Result<(), Error> {
        if (0..READY_SPINS).any(|_| ready(self)) {
            Ok(())
        } else {
            Err(Error::NotReady)
        }
    }

    fn set_latency(&mut self, latency: u8) {
        // NOTE(unsafe) LATENCY takes 0..=2
        self.flash.acr.modify(|r, w| unsafe {
            w.bits(r.bits() & !LATENCY_MASK | u32::from(latency) & LATENCY_MASK)
        });
    }

    fn latency(&self) -> u8 {
        (self.flash.acr.read().bits() & LATENCY_MASK) as u8
    }

    fn switch(&mut self, sw: u32) -> Result<(), Error> {
        // NOTE(unsafe) SW takes any of the three sources
        self.rcc
            .cfgr
            .modify(|r, w| unsafe { w.bits(r.bits() & !cfgr::SW | sw) });
        self.wait_for(|c| (c.rcc.cfgr.read().bits() >> cfgr::SWS_SHIFT) & cfgr::SW == sw)
    }

    fn start_hse(&mut self, bypass: bool) -> Result<(), Error> {
        let bypass = if bypass { cr::HSEBYP } else { 0 };
        // NOTE(unsafe) HSEBYP may only change while the HSE is off
        self.rcc
            .cr
            .modify(|r, w| unsafe { w.bits(r.bits() & !cr::HSEBYP | bypass) });
        self.rcc
            .cr
            .modify(|r, w| unsafe { w.bits(r.bits() | cr::HSEON) });
        self.wait_for(|c| c.rcc.cr.read().bits() & cr::HSERDY != 0)
    }

    fn start_pll(&mut self, source: PllSource, mul: u8) -> Result<(), Error> {
        // the PLL can only be reconfigured while it is off and not driving
        // the system clock
        if (self.rcc.cfgr.read().bits() >> cfgr::SWS_SHIFT) & cfgr::SW == SW_PLL {
            self.switch(SW_HSI)?;
        }
        self.rcc
            .cr
            .modify(|r, w| unsafe { w.bits(r.bits() & !cr::PLLON) });
        self.wait_for(|c| c.rcc.cr.read().bits() & cr::PLLRDY == 0)?;

        let (src, prediv) = match source {
            PllSource::HsiDiv2 => (0, 1),
            PllSource::Hse { prediv } => (cfgr::PLLSRC_HSE, prediv),
        };
        // NOTE(unsafe) PREDIV takes 0..=15, PLLMUL 0..=14
        self.rcc
            .cfgr2
            .modify(|r, w| unsafe { w.bits(r.bits() & !0xF | u32::from(prediv - 1) & 0xF) });
        let fields = src | u32::from(mul - 2) << cfgr::PLLMUL_SHIFT;
        self.rcc
            .cfgr
            .modify(|r, w| unsafe { w.bits(r.bits() & !cfgr::PLL_MASK | fields) });

        self.rcc
            .cr
            .modify(|r, w| unsafe { w.bits(r.bits() | cr::PLLON) });
        self.wait_for(|c| c.rcc.cr.read().bits() & cr::PLLRDY != 0)
    }
}

impl LowLevel for ClockControl {
    fn limits(&self) -> Limits {
        Limits::STM32F3
    }

    fn apply(&mut self, plan: &Plan) -> Result<(), Error> {
        let slower = plan.latency < self.latency();
        if !slower {
            self.set_latency(plan.latency);
        }

        if let Source::Hse { bypass, .. } = plan.source {
            self.start_hse(bypass)?;
        }
        let sw = match (plan.pll, plan.source) {
            (Some(pll), _) => {
                self.start_pll(pll.source, pll.mul)?;
                SW_PLL
            }
            (None, Source::Hse { .. }) => SW_HSE,
            (None, Source::Hsi) => SW_HSI,
        };

        let usbpre = match plan.usb {
            Some(UsbPrescaler::Div1) => cfgr::USBPRE,
            _ => 0,
        };
        let bus = usbpre
            | ppre_bits(plan.apb2_div) << cfgr::PPRE2_SHIFT
            | ppre_bits(plan.apb1_div) << cfgr::PPRE1_SHIFT
            | hpre_bits(plan.ahb_div) << cfgr::HPRE_SHIFT;
        // NOTE(unsafe) every field gets a value from the tables above. The
        // dividers are in place before the faster clock is switched in.
        self.rcc
            .cfgr
            .modify(|r, w| unsafe { w.bits(r.bits() & !cfgr::BUS_MASK | bus) });
        self.switch(sw)?;

        if slower {
            self.set_latency(plan.latency);
        }
        debug!("rcc: switched to source {=u32}", sw);
        Ok(())
    }
}
