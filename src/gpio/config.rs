//! Types for configuring a pin.

/// Pin mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Push-pull output
    OutputPushPull,
    /// Open-drain output
    OutputOpenDrain,
    /// Floating or pulled input
    Input,
}

impl Mode {
    /// Whether the pin drives its output latch
    pub fn is_output(self) -> bool {
        matches!(self, Mode::OutputPushPull | Mode::OutputOpenDrain)
    }
}

/// Internal pull resistor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    /// Floating
    None,
    /// Pulled up
    Up,
    /// Pulled down
    Down,
}

/// Output slew rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Speed {
    /// Low speed
    Low,
    /// Medium speed
    Medium,
    /// High speed
    High,
    /// Very high speed. Parts with only three speed grades use high speed.
    VeryHigh,
}

/// Logic level of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// Driven or read low
    Low,
    /// Driven or read high
    High,
}

impl core::ops::Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level == Level::High
    }
}

/// Configuration of a single pin
///
/// ```
/// # use omni_hal::gpio::config::*;
/// let led = Config::output().level(Level::High);
///
/// assert_eq!(led.mode, Mode::OutputPushPull);
/// assert_eq!(led.pull, Pull::None);
/// assert_eq!(led.level, Level::High);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct Config {
    /// Pin mode
    pub mode: Mode,
    /// Pull resistor
    pub pull: Pull,
    /// Output speed, ignored for inputs
    pub speed: Speed,
    /// Initial output level, ignored for inputs
    pub level: Level,
}

impl Config {
    /// Low speed push-pull output, initially low
    pub fn output() -> Self {
        Self {
            mode: Mode::OutputPushPull,
            ..Default::default()
        }
    }

    /// Floating input
    pub fn input() -> Self {
        Self::default()
    }

    /// Sets the mode.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the pull resistor.
    pub fn pull(mut self, pull: Pull) -> Self {
        self.pull = pull;
        self
    }

    /// Sets the output speed.
    pub fn speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    /// Sets the initial output level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl Default for Config {
    /// Floating input, low speed, output latch low
    fn default() -> Self {
        Self {
            mode: Mode::Input,
            pull: Pull::None,
            speed: Speed::Low,
            level: Level::Low,
        }
    }
}
