//! Bus timing of the I2C v2 peripheral (`TIMINGR`).
//!
//! t_I2CCLK = 1 / I2CCLK
//! t_PRESC  = (PRESC + 1) * t_I2CCLK
//! t_SCLL   = (SCLL + 1) * t_PRESC
//! t_SCLH   = (SCLH + 1) * t_PRESC
//!
//! t_SYNC1 + t_SYNC2 > 4 * t_I2CCLK
//! t_SCL ~= t_SYNC1 + t_SYNC2 + t_SCLL + t_SCLH

use core::convert::TryFrom;

use crate::time::rate::Hertz;

use super::Error;

/// Field values of the `TIMINGR` register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    /// Prescaler, `0..16`
    pub presc: u8,
    /// SCL low period
    pub scll: u8,
    /// SCL high period
    pub sclh: u8,
    /// Data hold time, `0..16`
    pub sdadel: u8,
    /// Data setup time, `0..16`
    pub scldel: u8,
}

impl Timing {
    /// The register value
    pub fn bits(&self) -> u32 {
        u32::from(self.presc) << 28
            | u32::from(self.scldel) << 20
            | u32::from(self.sdadel) << 16
            | u32::from(self.sclh) << 8
            | u32::from(self.scll)
    }
}

/// Timing for an SCL frequency of `freq` out of a kernel clock of `i2cclk`.
///
/// Only standard, fast and fast-mode plus (up to 1 MHz) are reachable.
pub fn compute(i2cclk: Hertz, freq: Hertz) -> Result<Timing, Error> {
    let (i2cclk, freq) = (i2cclk.0, freq.0);
    if freq == 0 || freq > 1_000_000 {
        return Err(Error::Unsupported);
    }
    let ratio = (i2cclk / freq)
        .checked_sub(4)
        .ok_or(Error::Unsupported)?;

    let (presc, scll, sclh, sdadel, scldel) = if freq > 100_000 {
        // fast-mode or fast-mode plus
        // here we pick SCLL + 1 = 2 * (SCLH + 1)
        let presc = ratio / 387;

        let sclh = ((ratio / (presc + 1)).checked_sub(3).ok_or(Error::Unsupported)?) / 3;
        let scll = 2 * (sclh + 1) - 1;

        let (sdadel, scldel) = if freq > 400_000 {
            // fast-mode plus
            let sdadel = 0;
            let scldel = (i2cclk / 4_000_000 / (presc + 1))
                .checked_sub(1)
                .ok_or(Error::Unsupported)?;
            (sdadel, scldel)
        } else {
            // fast-mode
            let sdadel = i2cclk / 8_000_000 / (presc + 1);
            let scldel = (i2cclk / 2_000_000 / (presc + 1))
                .checked_sub(1)
                .ok_or(Error::Unsupported)?;
            (sdadel, scldel)
        };

        (presc, scll, sclh, sdadel, scldel)
    } else {
        // standard-mode
        // here we pick SCLL = SCLH
        let presc = ratio / 514;

        let sclh = ((ratio / (presc + 1)).checked_sub(2).ok_or(Error::Unsupported)?) / 2;
        let scll = sclh;

        let sdadel = i2cclk / 2_000_000 / (presc + 1);
        let scldel = (i2cclk / 800_000 / (presc + 1))
            .checked_sub(1)
            .ok_or(Error::Unsupported)?;

        (presc, scll, sclh, sdadel, scldel)
    };

    if presc >= 16 || scldel >= 16 || sdadel >= 16 {
        return Err(Error::Unsupported);
    }
    let narrow = |v: u32| u8::try_from(v).map_err(|_| Error::Unsupported);

    Ok(Timing {
        presc: narrow(presc)?,
        scll: narrow(scll)?,
        sclh: narrow(sclh)?,
        sdadel: narrow(sdadel)?,
        scldel: narrow(scldel)?,
    })
}
