//! # USB PHY
//!
//! The PHY only brings the USB peripheral up and down. Enumeration and class
//! handling belong to a USB device stack, which takes over the object returned
//! by [`UsbPhy::device`]. On STM32F3 that object implements
//! `stm32_usbd::UsbPeripheral` and is handed to `stm32_usbd::UsbBus`.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::event::Callback;
use crate::instance::{Descriptor, Instance};
use crate::status::{self, NotOpen, StatusCode};

bitflags::bitflags! {
    /// USB PHY events
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Event: u32 {
        /// The PHY was initialized
        const INITIALIZED = 1 << 0;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Event {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "usb::Event({=u32:#x})", self.bits());
    }
}

/// Role of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Device
    Device,
    /// Host
    Host,
    /// On-the-go, role decided at runtime
    Otg,
}

/// Configuration of a [`UsbPhy`]
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct Config {
    /// Role
    pub mode: Mode,
    /// Event callback
    pub callback: Option<Callback<Event>>,
}

impl Config {
    /// Set the role
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the event callback
    pub fn callback(mut self, callback: Callback<Event>) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Device,
            callback: None,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Config {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Config {{ mode: {} }}", self.mode);
    }
}

/// USB PHY error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The PHY has not been initialized
    NotOpen,
    /// The PHY is initialized already
    AlreadyOpen,
    /// The role is not available on this controller
    Unsupported,
    /// The device object was handed out already
    Taken,
}

impl StatusCode for Error {
    fn code(&self) -> i32 {
        status::FAIL
    }
}

impl From<NotOpen> for Error {
    fn from(_: NotOpen) -> Self {
        Error::NotOpen
    }
}

/// Register level access to a USB controller
pub trait LowLevel: Send {
    /// What the USB device stack is built on
    type Device;

    /// Route D-/D+, enable and reset the peripheral
    fn configure(&mut self, descriptor: &Descriptor, config: &Config) -> Result<(), Error>;

    /// Undo [`LowLevel::configure`]
    fn release(&mut self);

    /// Make the device visible to the host
    fn connect(&mut self);

    /// Detach from the bus
    fn disconnect(&mut self);

    /// Hand out the device object, at most once per configuration
    fn device(&mut self) -> Option<Self::Device>;
}

/// Snapshot of a PHY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// Initialized
    pub initialized: bool,
    /// Connected to the bus
    pub connected: bool,
}

/// A USB PHY instance
pub struct UsbPhy<D> {
    instance: Instance<D, Event>,
    connected: AtomicBool,
}

impl<D> UsbPhy<D> {
    /// A PHY which is not initialized
    pub const fn new(descriptor: Descriptor) -> Self {
        Self {
            instance: Instance::new(descriptor),
            connected: AtomicBool::new(false),
        }
    }

    /// The static description
    pub fn descriptor(&self) -> &Descriptor {
        self.instance.descriptor()
    }

    /// Events posted so far
    pub fn events(&self) -> &crate::event::EventCell<Event> {
        self.instance.events()
    }
}

impl<D: LowLevel> UsbPhy<D> {
    /// Bring the controller up and post `INITIALIZED`
    pub fn init(&self, mut ll: D, config: Config) -> Result<(), Error> {
        let number = self.descriptor().number;
        if self.instance.is_open() {
            return Err(Error::AlreadyOpen);
        }
        if let Err(e) = ll.configure(self.descriptor(), &config) {
            warn!("usb{=u8}: configuration rejected: {}", number, e);
            ll.release();
            return Err(e);
        }
        if let Err(mut ll) = self.instance.install(ll, config.callback) {
            ll.release();
            return Err(Error::AlreadyOpen);
        }
        self.connected.store(false, Ordering::Release);
        debug!("usb{=u8}: initialized as {}", number, config.mode);
        self.instance.deliver(Event::INITIALIZED);
        Ok(())
    }

    /// Detach, shut the controller down and hand the driver back
    pub fn deinit(&self) -> Option<D> {
        let _ = self.stop();
        let mut ll = self.instance.remove()?;
        ll.release();
        debug!("usb{=u8}: deinitialized", self.descriptor().number);
        Some(ll)
    }

    /// Connect to the bus
    pub fn start(&self) -> Result<(), Error> {
        self.instance.with_driver(|ll| ll.connect())?;
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Disconnect from the bus
    pub fn stop(&self) -> Result<(), Error> {
        self.instance.with_driver(|ll| ll.disconnect())?;
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    /// The object the USB device stack runs on
    pub fn device(&self) -> Result<D::Device, Error> {
        self.instance.with_driver(|ll| ll.device())?.ok_or(Error::Taken)
    }

    /// Snapshot of the PHY
    pub fn status(&self) -> Status {
        Status {
            initialized: self.instance.is_open(),
            connected: self.connected.load(Ordering::Acquire),
        }
    }
}
