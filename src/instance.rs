//! # Peripheral instances
//!
//! A [`Descriptor`] is the static description of one hardware peripheral: its
//! number, interrupt binding, bus clock, pins and DMA channels. It is const
//! constructible so the application can declare every enabled instance as a
//! `static`:
//!
//! ```
//! use omni_hal::gpio::{PinId, Port};
//! use omni_hal::instance::{Descriptor, PinBinding, Role};
//! use omni_hal::time::rate::Hertz;
//!
//! const I2C1: Descriptor = Descriptor::new(1, Hertz(8_000_000))
//!     .irq(31, 2)
//!     .pin(PinBinding::new(Role::Scl, PinId::new(Port::B, 6), 4))
//!     .pin(PinBinding::new(Role::Sda, PinId::new(Port::B, 7), 4));
//!
//! assert_eq!(I2C1.binding(Role::Sda).map(|b| b.pin.pin()), Some(7));
//! ```
//!
//! [`Instance`] is the runtime side: it owns the descriptor, the event cell,
//! the single callback and the low-level driver once opened. Instances live
//! for the whole program and are never destroyed.

use core::cell::{Cell, RefCell};

use bitflags::Flags;
use critical_section::Mutex;

use crate::dma::DmaDescriptor;
use crate::event::{Callback, EventCell};
use crate::gpio::PinId;
use crate::status::NotOpen;
use crate::time::rate::Hertz;

/// Maximum number of pins bound to one instance
pub const MAX_PINS: usize = 4;

/// Interrupt line and priority of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqBinding {
    /// Interrupt number as defined by the vendor's vector table
    pub number: u16,
    /// Preemption priority, lower is more urgent
    pub priority: u8,
}

/// The function a pin has for its peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// I2C clock
    Scl,
    /// I2C data
    Sda,
    /// SPI clock
    Sck,
    /// SPI master in
    Miso,
    /// SPI master out
    Mosi,
    /// SPI hardware slave select
    Nss,
    /// USART transmit
    Tx,
    /// USART receive
    Rx,
    /// USART request to send
    Rts,
    /// USART clear to send
    Cts,
    /// USB D-
    Dm,
    /// USB D+
    Dp,
}

impl Role {
    /// Slot of this role in [`Descriptor::pins`]
    pub const fn slot(self) -> usize {
        match self {
            Role::Scl | Role::Sck | Role::Tx | Role::Dm => 0,
            Role::Sda | Role::Miso | Role::Rx | Role::Dp => 1,
            Role::Mosi | Role::Rts => 2,
            Role::Nss | Role::Cts => 3,
        }
    }
}

/// A pin routed to a peripheral through an alternate function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinBinding {
    /// What the pin does
    pub role: Role,
    /// Which pin
    pub pin: PinId,
    /// Alternate function number
    pub af: u8,
}

impl PinBinding {
    /// Bind `pin` to `role` using alternate function `af`
    pub const fn new(role: Role, pin: PinId, af: u8) -> Self {
        Self { role, pin, af }
    }
}

/// Static description of one peripheral instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    /// Peripheral number, e.g. `1` for I2C1
    pub number: u8,
    /// Interrupt binding, if interrupts are used
    pub irq: Option<IrqBinding>,
    /// Kernel clock feeding the peripheral
    pub clock: Hertz,
    /// Pin bindings, indexed by [`Role::slot`]
    pub pins: [Option<PinBinding>; MAX_PINS],
    /// Transmit DMA channel
    pub dma_tx: Option<DmaDescriptor>,
    /// Receive DMA channel
    pub dma_rx: Option<DmaDescriptor>,
}

impl Descriptor {
    /// Peripheral `number` clocked at `clock`, with no pins, interrupt or DMA
    pub const fn new(number: u8, clock: Hertz) -> Self {
        Self {
            number,
            irq: None,
            clock,
            pins: [None; MAX_PINS],
            dma_tx: None,
            dma_rx: None,
        }
    }

    /// Bind the interrupt line
    pub const fn irq(mut self, number: u16, priority: u8) -> Self {
        self.irq = Some(IrqBinding { number, priority });
        self
    }

    /// Bind a pin. A second binding for the same slot replaces the first.
    pub const fn pin(mut self, binding: PinBinding) -> Self {
        self.pins[binding.role.slot()] = Some(binding);
        self
    }

    /// Attach the transmit DMA channel
    pub const fn dma_tx(mut self, dma: DmaDescriptor) -> Self {
        self.dma_tx = Some(dma);
        self
    }

    /// Attach the receive DMA channel
    pub const fn dma_rx(mut self, dma: DmaDescriptor) -> Self {
        self.dma_rx = Some(dma);
        self
    }

    /// The pin bound to `role`, if any
    pub fn binding(&self, role: Role) -> Option<PinBinding> {
        self.pins[role.slot()].filter(|b| b.role == role)
    }

    /// All bound pins
    pub fn bindings(&self) -> impl Iterator<Item = PinBinding> + '_ {
        self.pins.iter().flatten().copied()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Descriptor {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Descriptor {{ number: {}, irq: {}, clock: {} Hz, dma_tx: {}, dma_rx: {} }}",
            self.number,
            self.irq,
            self.clock.0,
            self.dma_tx,
            self.dma_rx,
        );
    }
}

/// Runtime state of one peripheral instance.
///
/// `D` is the family's low-level driver, `E` the peripheral's event flags.
pub struct Instance<D, E> {
    descriptor: Descriptor,
    events: EventCell<E>,
    callback: Mutex<Cell<Option<Callback<E>>>>,
    driver: Mutex<RefCell<Option<D>>>,
}

impl<D, E> Instance<D, E> {
    /// A closed instance described by `descriptor`
    pub const fn new(descriptor: Descriptor) -> Self {
        Self {
            descriptor,
            events: EventCell::new(),
            callback: Mutex::new(Cell::new(None)),
            driver: Mutex::new(RefCell::new(None)),
        }
    }

    /// The static description
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// The event cell interrupts post into
    pub fn events(&self) -> &EventCell<E> {
        &self.events
    }

    /// Whether a driver is installed
    pub fn is_open(&self) -> bool {
        critical_section::with(|cs| self.driver.borrow_ref(cs).is_some())
    }

    /// Install a configured driver and its callback.
    ///
    /// Hands the driver back if the instance is already open.
    pub(crate) fn install(&self, driver: D, callback: Option<Callback<E>>) -> Result<(), D> {
        critical_section::with(|cs| {
            let mut slot = self.driver.borrow_ref_mut(cs);
            if slot.is_some() {
                return Err(driver);
            }
            *slot = Some(driver);
            self.callback.borrow(cs).set(callback);
            Ok(())
        })
    }

    /// Take the driver out and forget the callback.
    pub(crate) fn remove(&self) -> Option<D> {
        critical_section::with(|cs| {
            self.callback.borrow(cs).set(None);
            self.driver.borrow_ref_mut(cs).take()
        })
    }

    /// Run `f` on the installed driver inside a critical section.
    pub(crate) fn with_driver<R>(&self, f: impl FnOnce(&mut D) -> R) -> Result<R, NotOpen> {
        critical_section::with(|cs| {
            let mut slot = self.driver.borrow_ref_mut(cs);
            slot.as_mut().map(f).ok_or(NotOpen)
        })
    }
}

impl<D, E> Instance<D, E>
where
    E: Flags<Bits = u32> + Copy,
{
    /// Post `events` and hand them to the callback.
    ///
    /// Runs in the context of the caller, which for hardware events is the
    /// interrupt handler. Empty sets are dropped.
    pub(crate) fn deliver(&self, events: E) {
        if events.is_empty() {
            return;
        }
        self.events.post(events);
        let callback = critical_section::with(|cs| self.callback.borrow(cs).get());
        if let Some(callback) = callback {
            callback(events);
        }
    }
}
