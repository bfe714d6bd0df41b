//! USB device controller of the STM32F303
//!
//! Only the xB/xC and xD/xE parts have the controller. The device object
//! returned by [`UsbPort`] implements [`stm32_usbd::UsbPeripheral`] and is
//! handed to [`UsbBus`].

use crate::instance::{Descriptor, Role};
use crate::usb::{Config, Error, LowLevel, Mode};

use super::gpio::{self, OutputType};
use super::mmio::{Bus, Gate};
use super::nvic;

#[cfg(feature = "stm32-usbd")]
pub use stm32_usbd::UsbBus;

/// Alternate function of D- and D+
const AF_USB: u8 = 14;

/// `USBEN` of `APB1ENR`
const USB_GATE: Gate = Gate::new(Bus::Apb1, 23);

/// Whether the part has the USB controller
const fn has_usb() -> bool {
    cfg!(all(
        feature = "stm32f303",
        any(
            feature = "stm32f303xb",
            feature = "stm32f303xc",
            feature = "stm32f303xd",
            feature = "stm32f303xe"
        )
    ))
}

/// The USB controller as seen by the USB device stack
#[derive(Debug)]
pub struct Peripheral {
    _private: (),
}

// NOTE(unsafe) the controller registers are only accessed by the device stack
// which owns the single `Peripheral`
unsafe impl Sync for Peripheral {}

#[cfg(all(
    feature = "stm32-usbd",
    any(
        feature = "stm32f303xb",
        feature = "stm32f303xc",
        feature = "stm32f303xd",
        feature = "stm32f303xe"
    )
))]
unsafe impl stm32_usbd::UsbPeripheral for Peripheral {
    const REGISTERS: *const () = crate::pac::USB::ptr() as *const ();
    const DP_PULL_UP_FEATURE: bool = false;
    const EP_MEMORY: *const () = 0x4000_6000 as _;
    #[cfg(any(feature = "stm32f303xb", feature = "stm32f303xc"))]
    const EP_MEMORY_SIZE: usize = 512;
    #[cfg(any(feature = "stm32f303xd", feature = "stm32f303xe"))]
    const EP_MEMORY_SIZE: usize = 1024;
    #[cfg(any(feature = "stm32f303xb", feature = "stm32f303xc"))]
    const EP_MEMORY_ACCESS_2X16: bool = false;
    #[cfg(any(feature = "stm32f303xd", feature = "stm32f303xe"))]
    const EP_MEMORY_ACCESS_2X16: bool = true;

    fn enable() {
        USB_GATE.enable();
        USB_GATE.reset();
    }

    fn startup_delay() {
        // at least 1 µs at the highest core clock of 72 MHz
        cortex_m::asm::delay(72);
    }
}

/// The bus type of the USB device stack
#[cfg(all(
    feature = "stm32-usbd",
    any(
        feature = "stm32f303xb",
        feature = "stm32f303xc",
        feature = "stm32f303xd",
        feature = "stm32f303xe"
    )
))]
pub type UsbBusType = UsbBus<Peripheral>;

/// The USB controller
#[derive(Debug, Default)]
pub struct UsbPort {
    descriptor: Option<Descriptor>,
    taken: bool,
}

impl UsbPort {
    /// An unconfigured port
    pub const fn new() -> Self {
        Self {
            descriptor: None,
            taken: false,
        }
    }
}

impl LowLevel for UsbPort {
    type Device = Peripheral;

    fn configure(&mut self, descriptor: &Descriptor, config: &Config) -> Result<(), Error> {
        if !has_usb() || config.mode != Mode::Device || descriptor.number != 1 {
            return Err(Error::Unsupported);
        }
        if descriptor.binding(Role::Dm).is_none() || descriptor.binding(Role::Dp).is_none() {
            return Err(Error::Unsupported);
        }
        self.descriptor = Some(*descriptor);
        self.taken = false;
        USB_GATE.enable();
        USB_GATE.reset();
        if let Some(irq) = &descriptor.irq {
            nvic::bind(irq, 1);
        }
        Ok(())
    }

    fn release(&mut self) {
        let Some(descriptor) = self.descriptor.take() else {
            return;
        };
        if let Some(irq) = &descriptor.irq {
            nvic::unbind(irq, 1);
        }
        USB_GATE.disable();
        for binding in descriptor.bindings() {
            gpio::unroute(&binding);
        }
    }

    fn connect(&mut self) {
        let Some(descriptor) = &self.descriptor else {
            return;
        };
        for role in [Role::Dm, Role::Dp] {
            if let Some(mut binding) = descriptor.binding(role) {
                binding.af = AF_USB;
                if gpio::route(&binding, OutputType::PushPull, crate::gpio::Pull::None).is_err() {
                    warn!("usb: D-/D+ not routable");
                }
            }
        }
    }

    fn disconnect(&mut self) {
        // a low D+ looks like a detached device to the host
        if let Some(dp) = self.descriptor.as_ref().and_then(|d| d.binding(Role::Dp)) {
            gpio::drive_low(dp.pin);
        }
    }

    fn device(&mut self) -> Option<Peripheral> {
        if self.descriptor.is_none() || self.taken {
            return None;
        }
        self.taken = true;
        Some(Peripheral { _private: () })
    }
}
