//! GPIO ports of the STM32F3
//!
//! All ports share one register layout, so a port is found by address:
//! `GPIOx = 0x4800_0000 + x * 0x400`.

use crate::gpio::{Config, Error, Level, LowLevel, Mode, PinId, Port, Pull, Speed};
use crate::instance::PinBinding;
use crate::pac::gpioa::RegisterBlock;

use super::mmio::{modify_at, Bus, Gate};

const GPIO_BASE: usize = 0x4800_0000;
const PORT_STRIDE: usize = 0x400;

/// `IOPAEN` is bit 17 of `AHBENR`, except port H at bit 16
const fn gate(port: Port) -> Gate {
    match port {
        Port::H => Gate::new(Bus::Ahb, 16),
        port => Gate::new(Bus::Ahb, 17 + port.index()),
    }
}

/// Whether `port` is bonded out on the selected part
pub fn has_port(port: Port) -> bool {
    cfg_if::cfg_if! {
        if #[cfg(feature = "gpio-f303e")] {
            let _ = port;
            true
        } else if #[cfg(feature = "gpio-f303")] {
            !matches!(port, Port::G | Port::H)
        } else {
            // gpio-f302 and gpio-f333
            matches!(port, Port::A | Port::B | Port::C | Port::D | Port::F)
        }
    }
}

fn regs(port: Port) -> &'static RegisterBlock {
    let address = GPIO_BASE + usize::from(port.index()) * PORT_STRIDE;
    // NOTE(unsafe) every port has the layout of GPIOA. Writes go through
    // `BSRR` or happen with the port's driver borrowed mutably.
    unsafe { &*(address as *const RegisterBlock) }
}

/// Output driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputType {
    PushPull,
    OpenDrain,
}

const MODER_INPUT: u32 = 0b00;
const MODER_OUTPUT: u32 = 0b01;
const MODER_ALTERNATE: u32 = 0b10;

fn pupdr(pull: Pull) -> u32 {
    match pull {
        Pull::None => 0b00,
        Pull::Up => 0b01,
        Pull::Down => 0b10,
    }
}

fn ospeedr(speed: Speed) -> u32 {
    match speed {
        Speed::Low => 0b00,
        Speed::Medium => 0b01,
        Speed::High | Speed::VeryHigh => 0b11,
    }
}

fn set_output_type(gpio: &RegisterBlock, pin: u32, otype: OutputType) {
    let od = matches!(otype, OutputType::OpenDrain) as u32;
    // NOTE(unsafe) OTYPER accepts any bit pattern
    unsafe { modify_at!(gpio.otyper, 1, pin, od) };
}

/// Hand the pin of `binding` to its peripheral.
///
/// The pin's port clock is enabled first.
pub(crate) fn route(binding: &PinBinding, otype: OutputType, pull: Pull) -> Result<(), Error> {
    let port = binding.pin.port();
    if !has_port(port) {
        return Err(Error::InvalidPort);
    }
    if binding.af > 15 {
        return Err(Error::Unsupported);
    }
    gate(port).enable();

    let gpio = regs(port);
    let pin = u32::from(binding.pin.pin());
    let af = u32::from(binding.af);
    set_output_type(gpio, pin, otype);
    // NOTE(unsafe) all field encodings written here are valid
    unsafe {
        modify_at!(gpio.ospeedr, 2, pin, ospeedr(Speed::High));
        modify_at!(gpio.pupdr, 2, pin, pupdr(pull));
        if pin < 8 {
            modify_at!(gpio.afrl, 4, pin, af);
        } else {
            modify_at!(gpio.afrh, 4, pin - 8, af);
        }
        modify_at!(gpio.moder, 2, pin, MODER_ALTERNATE);
    }
    trace!("gpio: {=u8:#x} routed to AF{=u8}", binding.pin.raw(), binding.af);
    Ok(())
}

/// Return the pin of `binding` to floating input
pub(crate) fn unroute(binding: &PinBinding) {
    if has_port(binding.pin.port()) {
        reset_pin(binding.pin);
    }
}

/// Take `pin` from its peripheral and drive it low
pub(crate) fn drive_low(pin: PinId) {
    let gpio = regs(pin.port());
    let index = u32::from(pin.pin());
    set_output_type(gpio, index, OutputType::PushPull);
    // NOTE(unsafe) atomic write to a stateless register, then a valid mode
    unsafe {
        gpio.bsrr.write(|w| w.bits(u32::from(pin.mask()) << 16));
        modify_at!(gpio.moder, 2, index, MODER_OUTPUT);
    }
}

fn reset_pin(pin: PinId) {
    let gpio = regs(pin.port());
    let index = u32::from(pin.pin());
    // NOTE(unsafe) input, no pull and AF0 are valid encodings
    unsafe {
        modify_at!(gpio.moder, 2, index, MODER_INPUT);
        modify_at!(gpio.pupdr, 2, index, pupdr(Pull::None));
        if index < 8 {
            modify_at!(gpio.afrl, 4, index, 0u32);
        } else {
            modify_at!(gpio.afrh, 4, index - 8, 0u32);
        }
    }
}

/// All GPIO ports of the part
#[derive(Debug)]
pub struct GpioPort {
    _private: (),
}

impl GpioPort {
    /// Take over the GPIO ports.
    ///
    /// # Safety
    ///
    /// Only one `GpioPort` may be in use, and no other code may configure
    /// pins that are not routed to a peripheral instance.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl LowLevel for GpioPort {
    fn enable_port(&mut self, port: Port) -> Result<(), Error> {
        if !has_port(port) {
            return Err(Error::InvalidPort);
        }
        let gate = gate(port);
        if !gate.is_enabled() {
            gate.enable();
            debug!("gpio: port {} clock on", port);
        }
        Ok(())
    }

    fn configure(&mut self, pin: PinId, config: &Config) -> Result<(), Error> {
        let gpio = regs(pin.port());
        let index = u32::from(pin.pin());
        let moder = match config.mode {
            Mode::OutputPushPull => {
                set_output_type(gpio, index, OutputType::PushPull);
                MODER_OUTPUT
            }
            Mode::OutputOpenDrain => {
                set_output_type(gpio, index, OutputType::OpenDrain);
                MODER_OUTPUT
            }
            Mode::Input => MODER_INPUT,
        };
        // NOTE(unsafe) all field encodings written here are valid
        unsafe {
            modify_at!(gpio.ospeedr, 2, index, ospeedr(config.speed));
            modify_at!(gpio.pupdr, 2, index, pupdr(config.pull));
            modify_at!(gpio.moder, 2, index, moder);
        }
        Ok(())
    }

    fn reset(&mut self, pin: PinId) {
        reset_pin(pin);
    }

    fn write(&mut self, pin: PinId, level: Level) {
        let bit = match level {
            Level::High => u32::from(pin.mask()),
            Level::Low => u32::from(pin.mask()) << 16,
        };
        // NOTE(unsafe) atomic write to a stateless register
        regs(pin.port()).bsrr.write(|w| unsafe { w.bits(bit) });
    }

    fn read(&self, pin: PinId) -> Level {
        let idr = regs(pin.port()).idr.read().bits();
        Level::from(idr & u32::from(pin.mask()) != 0)
    }

    fn output(&self, pin: PinId) -> Level {
        let odr = regs(pin.port()).odr.read().bits();
        Level::from(odr & u32::from(pin.mask()) != 0)
    }
}
