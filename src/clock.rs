//! # Clock tree
//!
//! [`Config`] names an oscillator and the wanted core and bus frequencies.
//! [`Plan::new`] turns the request into PLL and prescaler settings within the
//! family's [`Limits`], and [`open`] has the family's [`LowLevel`] driver
//! program them. The resulting [`Clocks`] are what peripheral descriptors
//! should state as their bus clock.
//!
//! ```
//! use omni_hal::clock::{Config, Limits, Plan};
//! use omni_hal::time::rate::Hertz;
//!
//! let config = Config::new().use_hse(Hertz(8_000_000_u32)).sysclk(Hertz(72_000_000_u32));
//! let plan = Plan::new(&config, &Limits::STM32F3).unwrap();
//! assert_eq!(plan.clocks.pclk1(), Hertz(36_000_000_u32));
//! ```

use crate::status::{self, StatusCode};
use crate::time::rate::Hertz;

/// Clock error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The system clock cannot be derived from the oscillator
    Unsupported,
    /// A requested frequency is above the family's limit
    OutOfRange,
    /// No 48 MHz USB clock can be derived from this system clock
    UsbClock,
    /// The oscillator or the PLL did not report ready in time
    NotReady,
}

impl StatusCode for Error {
    fn code(&self) -> i32 {
        match self {
            Error::NotReady => status::TIMEOUT,
            _ => status::FAIL,
        }
    }
}

/// Oscillator feeding the system clock, directly or through the PLL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Internal RC oscillator
    Hsi,
    /// External crystal, or an external clock signal with `bypass`
    Hse { frequency: Hertz, bypass: bool },
}

/// Requested clock tree. Unset frequencies default to the fastest the
/// limits allow below the next faster clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct Config {
    pub source: Source,
    pub sysclk: Option<Hertz>,
    pub hclk: Option<Hertz>,
    pub pclk1: Option<Hertz>,
    pub pclk2: Option<Hertz>,
    /// Derive the 48 MHz USB clock
    pub usb: bool,
}

impl Config {
    /// HSI to the system clock, no PLL
    pub const fn new() -> Self {
        Self {
            source: Source::Hsi,
            sysclk: None,
            hclk: None,
            pclk1: None,
            pclk2: None,
            usb: false,
        }
    }

    /// Use a crystal of `frequency`
    pub fn use_hse(mut self, frequency: Hertz) -> Self {
        self.source = Source::Hse {
            frequency,
            bypass: false,
        };
        self
    }

    /// Take an external clock signal on OSC_IN instead of a crystal.
    ///
    /// Only meaningful after [`Config::use_hse`].
    pub fn bypass_hse(mut self) -> Self {
        if let Source::Hse { frequency, .. } = self.source {
            self.source = Source::Hse {
                frequency,
                bypass: true,
            };
        }
        self
    }

    /// Core clock
    pub fn sysclk(mut self, frequency: Hertz) -> Self {
        self.sysclk = Some(frequency);
        self
    }

    /// AHB clock
    pub fn hclk(mut self, frequency: Hertz) -> Self {
        self.hclk = Some(frequency);
        self
    }

    /// APB1 clock
    pub fn pclk1(mut self, frequency: Hertz) -> Self {
        self.pclk1 = Some(frequency);
        self
    }

    /// APB2 clock
    pub fn pclk2(mut self, frequency: Hertz) -> Self {
        self.pclk2 = Some(frequency);
        self
    }

    /// Ask for the USB clock
    pub fn usb(mut self, enable: bool) -> Self {
        self.usb = enable;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// What a family's clock tree can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Internal oscillator frequency
    pub hsi: Hertz,
    pub sysclk_max: Hertz,
    pub hclk_max: Hertz,
    pub pclk1_max: Hertz,
    pub pclk2_max: Hertz,
    /// PLL multiplication factors
    pub pll_mul: (u8, u8),
    /// Largest HSE divider in front of the PLL
    pub prediv_max: u8,
}

impl Limits {
    /// STM32F3 with the HSI reaching the PLL halved
    pub const STM32F3: Limits = Limits {
        hsi: Hertz(8_000_000),
        sysclk_max: Hertz(72_000_000),
        hclk_max: Hertz(72_000_000),
        pclk1_max: Hertz(36_000_000),
        pclk2_max: Hertz(72_000_000),
        pll_mul: (2, 16),
        prediv_max: 16,
    };
}

/// Input of the PLL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllSource {
    /// HSI divided by two
    HsiDiv2,
    /// HSE divided by `prediv`
    Hse { prediv: u8 },
}

/// PLL settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pll {
    pub source: PllSource,
    pub mul: u8,
}

/// Division of the PLL output down to the USB clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbPrescaler {
    /// 48 MHz PLL output
    Div1,
    /// 72 MHz PLL output
    Div1_5,
}

/// Frozen clock frequencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clocks {
    sysclk: Hertz,
    hclk: Hertz,
    pclk1: Hertz,
    pclk2: Hertz,
    usb: bool,
}

impl Clocks {
    /// The clocks after reset of a part whose buses run from the HSI
    pub const fn reset(limits: &Limits) -> Self {
        Self {
            sysclk: limits.hsi,
            hclk: limits.hsi,
            pclk1: limits.hsi,
            pclk2: limits.hsi,
            usb: false,
        }
    }

    /// Core clock
    pub fn sysclk(&self) -> Hertz {
        self.sysclk
    }

    /// AHB clock
    pub fn hclk(&self) -> Hertz {
        self.hclk
    }

    /// APB1 clock
    pub fn pclk1(&self) -> Hertz {
        self.pclk1
    }

    /// APB2 clock
    pub fn pclk2(&self) -> Hertz {
        self.pclk2
    }

    /// Whether the USB peripheral gets its 48 MHz
    pub fn usb_clock(&self) -> bool {
        self.usb
    }
}

/// Register-ready settings for one clock tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub source: Source,
    /// `None` runs the system clock straight from the oscillator
    pub pll: Option<Pll>,
    /// AHB divider, one of 1, 2, 4, 8, 16, 64, 128, 256, 512
    pub ahb_div: u16,
    /// APB1 divider, one of 1, 2, 4, 8, 16
    pub apb1_div: u8,
    /// APB2 divider, one of 1, 2, 4, 8, 16
    pub apb2_div: u8,
    pub usb: Option<UsbPrescaler>,
    /// Flash wait states for `clocks.hclk`
    pub latency: u8,
    pub clocks: Clocks,
}

const AHB_DIVS: [u16; 9] = [1, 2, 4, 8, 16, 64, 128, 256, 512];
const APB_DIVS: [u8; 5] = [1, 2, 4, 8, 16];

/// Smallest divider in `divs` bringing `input` to at most `target`
fn divider_for<T: Copy + Into<u32>>(divs: &[T], input: u32, target: u32) -> Option<T> {
    divs.iter().copied().find(|&div| input / div.into() <= target)
}

impl Plan {
    /// Compute the settings for `config`.
    pub fn new(config: &Config, limits: &Limits) -> Result<Self, Error> {
        let oscillator = match config.source {
            Source::Hsi => limits.hsi.0,
            Source::Hse { frequency, .. } => frequency.0,
        };
        let sysclk = config.sysclk.map_or(oscillator, |f| f.0);
        if sysclk > limits.sysclk_max.0 {
            return Err(Error::OutOfRange);
        }
        let pll = if sysclk == oscillator {
            None
        } else {
            Some(Self::pll(config.source, sysclk, limits)?)
        };

        let hclk_target = config.hclk.map_or(sysclk, |f| f.0);
        let pclk1_target = config.pclk1.map_or(limits.pclk1_max.0, |f| f.0);
        let pclk2_target = config.pclk2.map_or(limits.pclk2_max.0, |f| f.0);
        if hclk_target > limits.hclk_max.0
            || pclk1_target > limits.pclk1_max.0
            || pclk2_target > limits.pclk2_max.0
        {
            return Err(Error::OutOfRange);
        }

        let ahb_div = divider_for(&AHB_DIVS, sysclk, hclk_target).ok_or(Error::OutOfRange)?;
        let hclk = sysclk / u32::from(ahb_div);
        let apb1_div = divider_for(&APB_DIVS, hclk, pclk1_target).ok_or(Error::OutOfRange)?;
        let apb2_div = divider_for(&APB_DIVS, hclk, pclk2_target).ok_or(Error::OutOfRange)?;

        let usb = if config.usb {
            // the USB clock needs the accuracy of a crystal
            match (config.source, pll, sysclk) {
                (Source::Hse { .. }, Some(_), 72_000_000) => Some(UsbPrescaler::Div1_5),
                (Source::Hse { .. }, Some(_), 48_000_000) => Some(UsbPrescaler::Div1),
                _ => return Err(Error::UsbClock),
            }
        } else {
            None
        };

        let latency = match hclk {
            0..=24_000_000 => 0,
            24_000_001..=48_000_000 => 1,
            _ => 2,
        };

        Ok(Self {
            source: config.source,
            pll,
            ahb_div,
            apb1_div,
            apb2_div,
            usb,
            latency,
            clocks: Clocks {
                sysclk: Hertz(sysclk),
                hclk: Hertz(hclk),
                pclk1: Hertz(hclk / u32::from(apb1_div)),
                pclk2: Hertz(hclk / u32::from(apb2_div)),
                usb: usb.is_some(),
            },
        })
    }

    /// PLL settings hitting `sysclk` exactly
    fn pll(source: Source, sysclk: u32, limits: &Limits) -> Result<Pll, Error> {
        let (min, max) = limits.pll_mul;
        let fits = |input: u32| {
            (input != 0 && sysclk % input == 0)
                .then(|| sysclk / input)
                .filter(|mul| (u32::from(min)..=u32::from(max)).contains(mul))
                .map(|mul| mul as u8)
        };
        match source {
            Source::Hsi => fits(limits.hsi.0 / 2)
                .map(|mul| Pll {
                    source: PllSource::HsiDiv2,
                    mul,
                })
                .ok_or(Error::Unsupported),
            Source::Hse { frequency, .. } => (1..=limits.prediv_max)
                .find_map(|prediv| {
                    let input = frequency.0 / u32::from(prediv);
                    (frequency.0 % u32::from(prediv) == 0)
                        .then(|| fits(input))
                        .flatten()
                        .map(|mul| Pll {
                            source: PllSource::Hse { prediv },
                            mul,
                        })
                })
                .ok_or(Error::Unsupported),
        }
    }
}

/// Clock controller of a family
pub trait LowLevel {
    /// What the controller can do
    fn limits(&self) -> Limits;

    /// Start the oscillator and PLL of `plan`, set the flash latency and
    /// switch the system clock over.
    fn apply(&mut self, plan: &Plan) -> Result<(), Error>;
}

/// Bring up the clock tree of `config` and return the frozen frequencies.
///
/// A rejected configuration leaves the running clocks untouched.
pub fn open<C: LowLevel>(ll: &mut C, config: &Config) -> Result<Clocks, Error> {
    let plan = Plan::new(config, &ll.limits()).map_err(|e| {
        warn!("clock: configuration rejected: {}", e);
        e
    })?;
    ll.apply(&plan)?;
    debug!(
        "clock: sysclk {=u32} Hz, hclk {=u32} Hz",
        plan.clocks.sysclk.0,
        plan.clocks.hclk.0
    );
    Ok(plan.clocks)
}
