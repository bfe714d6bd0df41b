mod common;

use std::sync::atomic::{AtomicU32, Ordering};

use common::{lock, I2cOp, MockI2c, Pump};
use omni_hal::devices::ssd1306::{
    command, Config, Error, Event, Ssd1306, COMMAND_STREAM, DATA_STREAM, DEFAULT_ADDRESS, WIDTH,
};
use omni_hal::i2c::{self, I2c};
use omni_hal::instance::Descriptor;
use omni_hal::time::rate::Hertz;

const DESC: Descriptor = Descriptor::new(1, Hertz(8_000_000));

/// Payloads of every write to the display, control byte first
fn writes(log: &[I2cOp]) -> Vec<Vec<u8>> {
    log.iter()
        .map(|op| match op {
            I2cOp::Transmit {
                address,
                data,
                stop: true,
            } => {
                assert_eq!(*address, u16::from(DEFAULT_ADDRESS));
                data.clone()
            }
            other => panic!("unexpected {:?}", other),
        })
        .collect()
}

#[test]
fn open_sends_the_power_up_sequence() {
    static I2C: I2c<MockI2c> = I2c::new(DESC);
    static SEEN: AtomicU32 = AtomicU32::new(0);
    fn on_event(events: Event) {
        SEEN.fetch_or(events.bits(), Ordering::SeqCst);
    }

    let (ll, state) = MockI2c::new();
    I2C.open(ll, i2c::Config::default()).unwrap();
    let _pump = Pump::start(|| I2C.on_interrupt());

    let mut display = Ssd1306::new(&I2C);
    let config = Config {
        contrast: 0x20,
        callback: Some(on_event),
        ..Config::default()
    };
    display.open(config).unwrap();

    let writes = writes(&lock(&state).log);
    assert!(writes.iter().all(|w| w[0] == COMMAND_STREAM));
    assert_eq!(writes[0][1], command::DISPLAY_OFF);
    assert!(writes
        .iter()
        .any(|w| w[1..] == [command::SET_CONTRAST, 0x20]));
    assert!(writes
        .iter()
        .any(|w| w[1..] == [command::ENTIRE_DISPLAY_RESUME, command::NORMAL_DISPLAY]));
    assert!(!writes.iter().flatten().any(|&b| b == command::DISPLAY_ON));

    assert!(display.status().initialized);
    assert!(!display.status().display_on);
    assert_eq!(SEEN.load(Ordering::SeqCst), Event::INITIALIZED.bits());
    assert_eq!(display.open(Config::default()), Err(Error::AlreadyOpen));
}

#[test]
fn start_and_stop_switch_the_panel() {
    static I2C: I2c<MockI2c> = I2c::new(DESC);

    let (ll, state) = MockI2c::new();
    I2C.open(ll, i2c::Config::default()).unwrap();
    let _pump = Pump::start(|| I2C.on_interrupt());

    let mut display = Ssd1306::new(&I2C);
    assert_eq!(display.start(), Err(Error::NotOpen));
    assert!(lock(&state).log.is_empty());

    display.open(Config::default()).unwrap();
    lock(&state).log.clear();
    display.start().unwrap();
    assert!(display.status().display_on);
    display.close().unwrap();
    assert!(!display.status().initialized);

    assert_eq!(
        writes(&lock(&state).log),
        [
            vec![COMMAND_STREAM, command::DISPLAY_ON],
            vec![COMMAND_STREAM, command::DISPLAY_OFF],
        ]
    );
}

#[test]
fn flush_sends_one_page_per_write() {
    static I2C: I2c<MockI2c> = I2c::new(DESC);

    let (ll, state) = MockI2c::new();
    I2C.open(ll, i2c::Config::default()).unwrap();
    let _pump = Pump::start(|| I2C.on_interrupt());

    let mut display = Ssd1306::new(&I2C);
    display.open(Config::default()).unwrap();
    lock(&state).log.clear();

    display.set_pixel(0, 0, true);
    display.set_pixel(5, 9, true);
    display.set_pixel(127, 63, true);
    // off the panel
    display.set_pixel(128, 0, true);
    assert!(display.pixel(5, 9));
    assert!(!display.pixel(5, 8));
    display.flush().unwrap();

    let writes = writes(&lock(&state).log);
    assert_eq!(writes.len(), 9);
    assert_eq!(
        writes[0],
        [
            COMMAND_STREAM,
            command::COLUMN_ADDR,
            0,
            127,
            command::PAGE_ADDR,
            0,
            7
        ]
    );
    for page in &writes[1..] {
        assert_eq!(page.len(), WIDTH + 1);
        assert_eq!(page[0], DATA_STREAM);
    }
    assert_eq!(writes[1][1], 0b0000_0001);
    // row 9 is bit 1 of page 1
    assert_eq!(writes[2][1 + 5], 0b0000_0010);
    assert_eq!(writes[8][WIDTH], 0b1000_0000);

    display.clear();
    assert!(!display.pixel(0, 0));
}

#[test]
fn bus_errors_are_sticky() {
    static I2C: I2c<MockI2c> = I2c::new(DESC);

    let (ll, state) = MockI2c::new();
    I2C.open(ll, i2c::Config::default()).unwrap();
    let _pump = Pump::start(|| I2C.on_interrupt());

    let mut display = Ssd1306::new(&I2C);
    lock(&state).fail_next = Some(i2c::Event::ADDRESS_NACK);
    assert!(matches!(
        display.open(Config::default()),
        Err(Error::Bus(_))
    ));
    assert!(display.error().bus_error);
    assert!(!display.status().initialized);

    display.open(Config::default()).unwrap();
    assert!(!display.error().bus_error);
    assert_eq!(display.command(&[0; 9]), Err(Error::TooLong));
}
