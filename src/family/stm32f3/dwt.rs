//! DWT cycle counter as tick source

use cortex_m::peripheral::{DCB, DWT};

use crate::time::rate::Hertz;
use crate::timer::{Error, LowLevel};

/// The core cycle counter, counting at the system clock
pub struct Dwt {
    dcb: DCB,
    dwt: DWT,
    sysclk: Hertz,
}

impl Dwt {
    /// Take over the trace blocks. `sysclk` is the core clock the counter
    /// runs at.
    pub fn new(dcb: DCB, dwt: DWT, sysclk: impl Into<Hertz>) -> Self {
        Self {
            dcb,
            dwt,
            sysclk: sysclk.into(),
        }
    }

    /// Give the trace blocks back
    pub fn free(self) -> (DCB, DWT) {
        (self.dcb, self.dwt)
    }
}

impl LowLevel for Dwt {
    fn configure(&mut self) -> Result<(), Error> {
        if !DWT::has_cycle_counter() {
            return Err(Error::Unsupported);
        }
        self.dcb.enable_trace();
        DWT::unlock();
        self.dwt.enable_cycle_counter();
        Ok(())
    }

    fn cycles(&self) -> u32 {
        DWT::cycle_count()
    }

    fn frequency(&self) -> Hertz {
        self.sysclk
    }
}
