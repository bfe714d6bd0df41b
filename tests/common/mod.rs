//! Mock low-level drivers for running the portable core on the host.
//!
//! Every mock shares its state with the test through an `Arc<Mutex<_>>`, so
//! the test can script the "hardware" and look at what the driver did while
//! the mock is installed in a façade.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use omni_hal::event::{Outcome, Serviced};
use omni_hal::gpio::{self, Level, PinId, Port};
use omni_hal::i2c::{self, Address, MemAddress};
use omni_hal::instance::Descriptor;
use omni_hal::registry::Family;
use omni_hal::serial::{self, Flags};
use omni_hal::spi::{self, DUMMY};
use omni_hal::time::rate::Hertz;
use omni_hal::timer;
use omni_hal::usb;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn lock<T>(shared: &Shared<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap()
}

/// A `'static` buffer holding `data`
pub fn leak(data: &[u8]) -> &'static mut [u8] {
    Box::leak(data.to_vec().into_boxed_slice())
}

/// Calls an interrupt entry from a second thread until dropped, standing in
/// for the interrupt preempting the main flow.
pub struct Pump {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Pump {
    pub fn start(isr: impl Fn() + Send + 'static) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                isr();
                thread::yield_now();
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

// GPIO

#[derive(Debug, Default)]
pub struct GpioState {
    /// Ports the "part" has, bit n for port n
    pub ports: u8,
    pub enabled: u8,
    pub latch: [u16; 8],
    pub input: [u16; 8],
    pub modes: Vec<(PinId, gpio::Config)>,
    /// Operations in call order
    pub ops: Vec<(&'static str, PinId)>,
}

pub struct MockGpio(pub Shared<GpioState>);

impl MockGpio {
    /// Ports A to F
    pub fn new() -> (Self, Shared<GpioState>) {
        let state = Arc::new(Mutex::new(GpioState {
            ports: 0b0011_1111,
            ..Default::default()
        }));
        (Self(state.clone()), state)
    }
}

impl gpio::LowLevel for MockGpio {
    fn enable_port(&mut self, port: Port) -> Result<(), gpio::Error> {
        let mut s = lock(&self.0);
        let bit = 1 << port.index();
        if s.ports & bit == 0 {
            return Err(gpio::Error::InvalidPort);
        }
        s.enabled |= bit;
        Ok(())
    }

    fn configure(&mut self, pin: PinId, config: &gpio::Config) -> Result<(), gpio::Error> {
        let mut s = lock(&self.0);
        s.ops.push(("configure", pin));
        s.modes.push((pin, *config));
        Ok(())
    }

    fn reset(&mut self, pin: PinId) {
        lock(&self.0).ops.push(("reset", pin));
    }

    fn write(&mut self, pin: PinId, level: Level) {
        let mut s = lock(&self.0);
        s.ops.push(("write", pin));
        let port = usize::from(pin.port().index());
        match level {
            Level::High => s.latch[port] |= pin.mask(),
            Level::Low => s.latch[port] &= !pin.mask(),
        }
    }

    fn read(&self, pin: PinId) -> Level {
        let s = lock(&self.0);
        Level::from(s.input[usize::from(pin.port().index())] & pin.mask() != 0)
    }

    fn output(&self, pin: PinId) -> Level {
        let s = lock(&self.0);
        Level::from(s.latch[usize::from(pin.port().index())] & pin.mask() != 0)
    }
}

// I2C

/// What the I2C mock was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I2cOp {
    Transmit { address: u16, data: Vec<u8>, stop: bool },
    Receive { address: u16, len: usize, stop: bool },
    MemoryWrite { address: u16, register: usize, data: Vec<u8> },
    MemoryRead { address: u16, register: usize, len: usize },
    WriteRead { address: u16, tx: Vec<u8>, len: usize },
    SlaveTransmit { data: Vec<u8> },
    SlaveReceive { len: usize },
}

#[derive(Debug, Default)]
pub struct I2cState {
    pub configured: bool,
    pub released: bool,
    pub enabled: bool,
    pub reject: Option<i2c::Error>,
    pub pending: Option<i2c::Request>,
    pub log: Vec<I2cOp>,
    /// Device memory, indexed by block bits of the address and register
    pub memory: Vec<u8>,
    /// Pings left to answer with NACK
    pub nack_pings: u32,
    /// `nack_pings` after every memory write, the "write cycle"
    pub write_cycle: u32,
    pub pings: u32,
    pub aborts: u32,
    /// Finish the next transfer as incomplete with these events
    pub fail_next: Option<i2c::Event>,
    /// Returned by the next service call instead of running the transfer
    pub inject: Option<Serviced<i2c::Event>>,
}

pub struct MockI2c(pub Shared<I2cState>);

impl MockI2c {
    pub fn new() -> (Self, Shared<I2cState>) {
        let state = Arc::new(Mutex::new(I2cState::default()));
        (Self(state.clone()), state)
    }

    /// A mock fronting `size` bytes of device memory erased to `0xFF`
    pub fn with_memory(size: usize) -> (Self, Shared<I2cState>) {
        let (mock, state) = Self::new();
        lock(&state).memory = vec![0xFF; size];
        (mock, state)
    }
}

fn memory_index(address: Address, register: MemAddress) -> usize {
    match register {
        MemAddress::U8(r) => (usize::from(address.raw() & 0x7) << 8) | usize::from(r),
        MemAddress::U16(r) => usize::from(r),
    }
}

impl I2cState {
    fn run(&mut self, request: i2c::Request) {
        use i2c::Request::*;
        // NOTE(unsafe) the façade keeps the buffers alive until the request
        // finished
        unsafe {
            match request {
                MemoryWrite {
                    address,
                    register,
                    data,
                } => {
                    let index = memory_index(address, register);
                    self.memory[index..index + data.len()].copy_from_slice(data.as_slice());
                    self.nack_pings = self.write_cycle;
                }
                MemoryRead {
                    address,
                    register,
                    mut data,
                } => {
                    let index = memory_index(address, register);
                    let len = data.len();
                    data.as_mut_slice()
                        .copy_from_slice(&self.memory[index..index + len]);
                }
                Receive { mut data, .. } | SlaveReceive { mut data } => {
                    for (i, byte) in data.as_mut_slice().iter_mut().enumerate() {
                        *byte = i as u8;
                    }
                }
                WriteRead { tx, mut rx, .. } => {
                    let first = tx.as_slice()[0];
                    for (i, byte) in rx.as_mut_slice().iter_mut().enumerate() {
                        *byte = first.wrapping_add(i as u8);
                    }
                }
                Transmit { .. } | SlaveTransmit { .. } => {}
            }
        }
    }
}

impl i2c::LowLevel for MockI2c {
    fn configure(&mut self, _: &Descriptor, _: &i2c::Config) -> Result<(), i2c::Error> {
        let mut s = lock(&self.0);
        if let Some(e) = s.reject {
            return Err(e);
        }
        s.configured = true;
        s.released = false;
        Ok(())
    }

    fn release(&mut self) {
        let mut s = lock(&self.0);
        s.configured = false;
        s.released = true;
    }

    fn enable(&mut self) {
        lock(&self.0).enabled = true;
    }

    fn disable(&mut self) {
        lock(&self.0).enabled = false;
    }

    fn start(&mut self, request: i2c::Request) -> Result<(), i2c::Error> {
        use i2c::Request::*;
        let mut s = lock(&self.0);
        // NOTE(unsafe) see `I2cState::run`
        let op = unsafe {
            match &request {
                Transmit {
                    address,
                    data,
                    stop,
                } => I2cOp::Transmit {
                    address: address.raw(),
                    data: data.as_slice().to_vec(),
                    stop: *stop,
                },
                Receive {
                    address,
                    data,
                    stop,
                } => I2cOp::Receive {
                    address: address.raw(),
                    len: data.len(),
                    stop: *stop,
                },
                MemoryWrite {
                    address,
                    register,
                    data,
                } => I2cOp::MemoryWrite {
                    address: address.raw(),
                    register: memory_index(*address, *register),
                    data: data.as_slice().to_vec(),
                },
                MemoryRead {
                    address,
                    register,
                    data,
                } => I2cOp::MemoryRead {
                    address: address.raw(),
                    register: memory_index(*address, *register),
                    len: data.len(),
                },
                WriteRead { address, tx, rx } => I2cOp::WriteRead {
                    address: address.raw(),
                    tx: tx.as_slice().to_vec(),
                    len: rx.len(),
                },
                SlaveTransmit { data } => I2cOp::SlaveTransmit {
                    data: data.as_slice().to_vec(),
                },
                SlaveReceive { data } => I2cOp::SlaveReceive { len: data.len() },
            }
        };
        s.log.push(op);
        s.pending = Some(request);
        Ok(())
    }

    fn ping(&mut self, _: Address) -> Result<bool, i2c::Error> {
        let mut s = lock(&self.0);
        s.pings += 1;
        if s.nack_pings > 0 {
            s.nack_pings -= 1;
            Ok(false)
        } else {
            Ok(true)
        }
    }

    fn abort(&mut self) {
        let mut s = lock(&self.0);
        s.aborts += 1;
        s.pending = None;
    }

    fn service(&mut self) -> Serviced<i2c::Event> {
        let mut s = lock(&self.0);
        if let Some(serviced) = s.inject.take() {
            return serviced;
        }
        let Some(request) = s.pending.take() else {
            return Serviced::none();
        };
        if let Some(events) = s.fail_next.take() {
            return Serviced::finished(events, Outcome::Incomplete);
        }
        s.run(request);
        Serviced::finished(i2c::Event::empty(), Outcome::Complete)
    }
}

// SPI

pub type Exchange = Box<dyn FnMut(u8) -> u8 + Send>;

#[derive(Default)]
pub struct SpiState {
    pub configured: bool,
    pub released: bool,
    pub enabled: bool,
    pub reject: Option<spi::Error>,
    pub pending: Option<spi::Request>,
    /// Every byte clocked out
    pub sent: Vec<u8>,
    /// The device on the bus, a loopback if unset
    pub slave: Option<Exchange>,
    pub aborts: u32,
    /// Returned by the next service call while a request is pending
    pub inject: Option<Serviced<spi::Event>>,
}

pub struct MockSpi(pub Shared<SpiState>);

impl MockSpi {
    pub fn new() -> (Self, Shared<SpiState>) {
        let state = Arc::new(Mutex::new(SpiState::default()));
        (Self(state.clone()), state)
    }
}

impl SpiState {
    fn exchange(&mut self, byte: u8) -> u8 {
        self.sent.push(byte);
        match self.slave.as_mut() {
            Some(slave) => slave(byte),
            None => byte,
        }
    }

    fn run(&mut self, request: spi::Request) {
        use spi::Request::*;
        // NOTE(unsafe) the façade keeps the buffers alive until the request
        // finished
        unsafe {
            match request {
                Send { data } => {
                    for &byte in data.as_slice() {
                        self.exchange(byte);
                    }
                }
                Receive { mut data } => {
                    for byte in data.as_mut_slice() {
                        *byte = self.exchange(DUMMY);
                    }
                }
                Transfer { tx, mut rx } => {
                    // the views may share memory, frame by frame
                    for i in 0..tx.len() {
                        let out = *tx.as_ptr().add(i);
                        *rx.as_mut_ptr().add(i) = self.exchange(out);
                    }
                }
            }
        }
    }
}

impl spi::LowLevel for MockSpi {
    fn configure(&mut self, _: &Descriptor, _: &spi::Config) -> Result<(), spi::Error> {
        let mut s = lock(&self.0);
        if let Some(e) = s.reject {
            return Err(e);
        }
        s.configured = true;
        Ok(())
    }

    fn release(&mut self) {
        let mut s = lock(&self.0);
        s.configured = false;
        s.released = true;
    }

    fn enable(&mut self) {
        lock(&self.0).enabled = true;
    }

    fn disable(&mut self) {
        lock(&self.0).enabled = false;
    }

    fn start(&mut self, request: spi::Request) -> Result<(), spi::Error> {
        lock(&self.0).pending = Some(request);
        Ok(())
    }

    fn abort(&mut self) {
        let mut s = lock(&self.0);
        s.aborts += 1;
        s.pending = None;
    }

    fn service(&mut self) -> Serviced<spi::Event> {
        let mut s = lock(&self.0);
        if s.pending.is_some() {
            if let Some(serviced) = s.inject.take() {
                return serviced;
            }
        }
        match s.pending.take() {
            Some(request) => {
                s.run(request);
                Serviced::finished(spi::Event::empty(), Outcome::Complete)
            }
            None => Serviced::none(),
        }
    }
}

// USART

#[derive(Debug)]
pub struct SerialState {
    pub configured: bool,
    pub released: bool,
    pub enabled: bool,
    pub reject: Option<serial::Error>,
    /// Words waiting in the receive data register
    pub rx: VecDeque<u16>,
    /// Words written to the transmit data register
    pub tx: Vec<u16>,
    pub listening: Flags,
    /// Pending error and CTS flags
    pub errors: Flags,
    pub idle: bool,
    pub tc: bool,
}

pub struct MockSerial(pub Shared<SerialState>);

impl MockSerial {
    pub fn new() -> (Self, Shared<SerialState>) {
        let state = Arc::new(Mutex::new(SerialState {
            configured: false,
            released: false,
            enabled: false,
            reject: None,
            rx: VecDeque::new(),
            tx: Vec::new(),
            listening: Flags::empty(),
            errors: Flags::empty(),
            idle: false,
            tc: false,
        }));
        (Self(state.clone()), state)
    }
}

impl serial::LowLevel for MockSerial {
    fn configure(&mut self, _: &Descriptor, _: &serial::Config) -> Result<(), serial::Error> {
        let mut s = lock(&self.0);
        if let Some(e) = s.reject {
            return Err(e);
        }
        s.configured = true;
        Ok(())
    }

    fn release(&mut self) {
        let mut s = lock(&self.0);
        s.configured = false;
        s.released = true;
    }

    fn enable(&mut self) {
        lock(&self.0).enabled = true;
    }

    fn disable(&mut self) {
        lock(&self.0).enabled = false;
    }

    fn flags(&self) -> Flags {
        let s = lock(&self.0);
        let mut flags = s.errors | Flags::TXE;
        if !s.rx.is_empty() {
            flags |= Flags::RXNE;
        }
        if s.idle {
            flags |= Flags::IDLE;
        }
        if s.tc {
            flags |= Flags::TC;
        }
        flags
    }

    fn listening(&self) -> Flags {
        lock(&self.0).listening
    }

    fn listen(&mut self, flags: Flags) {
        lock(&self.0).listening |= flags;
    }

    fn unlisten(&mut self, flags: Flags) {
        lock(&self.0).listening &= !flags;
    }

    fn clear(&mut self, flags: Flags) {
        let mut s = lock(&self.0);
        s.errors &= !flags;
        if flags.contains(Flags::IDLE) {
            s.idle = false;
        }
        if flags.contains(Flags::TC) {
            s.tc = false;
        }
    }

    fn read_word(&mut self) -> u16 {
        lock(&self.0).rx.pop_front().unwrap_or(0)
    }

    fn write_word(&mut self, word: u16) {
        let mut s = lock(&self.0);
        s.tx.push(word);
        s.tc = true;
    }
}

// Timer

/// A counter advancing by `step` on every read
pub struct MockTimer {
    pub counter: AtomicU32,
    pub step: u32,
    pub frequency: Hertz,
    pub fail: bool,
}

impl MockTimer {
    pub fn new(start: u32, step: u32, frequency: Hertz) -> Self {
        Self {
            counter: AtomicU32::new(start),
            step,
            frequency,
            fail: false,
        }
    }

    /// 1 MHz, one millisecond per read
    pub fn millis() -> Self {
        Self::new(0, 1_000, Hertz(1_000_000))
    }
}

impl timer::LowLevel for MockTimer {
    fn configure(&mut self) -> Result<(), timer::Error> {
        if self.fail {
            return Err(timer::Error::Unsupported);
        }
        Ok(())
    }

    fn cycles(&self) -> u32 {
        self.counter.fetch_add(self.step, Ordering::Relaxed)
    }

    fn frequency(&self) -> Hertz {
        self.frequency
    }
}

// USB

#[derive(Debug, Default)]
pub struct UsbState {
    pub configured: bool,
    pub released: bool,
    pub connected: bool,
    pub handed_out: u32,
}

pub struct MockUsb(pub Shared<UsbState>);

impl MockUsb {
    pub fn new() -> (Self, Shared<UsbState>) {
        let state = Arc::new(Mutex::new(UsbState::default()));
        (Self(state.clone()), state)
    }
}

/// The device object the mock hands out
#[derive(Debug, PartialEq, Eq)]
pub struct MockDevice(pub u32);

impl usb::LowLevel for MockUsb {
    type Device = MockDevice;

    fn configure(&mut self, _: &Descriptor, config: &usb::Config) -> Result<(), usb::Error> {
        if config.mode != usb::Mode::Device {
            return Err(usb::Error::Unsupported);
        }
        let mut s = lock(&self.0);
        s.configured = true;
        s.handed_out = 0;
        Ok(())
    }

    fn release(&mut self) {
        let mut s = lock(&self.0);
        s.configured = false;
        s.released = true;
    }

    fn connect(&mut self) {
        lock(&self.0).connected = true;
    }

    fn disconnect(&mut self) {
        lock(&self.0).connected = false;
    }

    fn device(&mut self) -> Option<MockDevice> {
        let mut s = lock(&self.0);
        if s.handed_out > 0 {
            return None;
        }
        s.handed_out += 1;
        Some(MockDevice(s.handed_out))
    }
}

/// All mocks as one family
pub struct MockFamily;

impl Family for MockFamily {
    type Gpio = MockGpio;
    type I2c = MockI2c;
    type Spi = MockSpi;
    type Usart = MockSerial;
    type Timer = MockTimer;
    type Usb = MockUsb;
}
