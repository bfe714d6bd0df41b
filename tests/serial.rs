mod common;

use common::{leak, lock, MockSerial, MockTimer};
use embedded_hal::serial::{Read, Write};
use omni_hal::event::Outcome;
use omni_hal::instance::Descriptor;
use omni_hal::serial::{Config, DataBits, Error, Event, Flags, Parity, Serial};
use omni_hal::status::{self, StatusCode};
use omni_hal::time::duration::Milliseconds;
use omni_hal::time::rate::{Baud, Hertz};
use omni_hal::timer::Timer;

const DESC: Descriptor = Descriptor::new(2, Hertz(8_000_000)).irq(38, 4);

#[test]
fn open_and_close() {
    static SERIAL: Serial<MockSerial> = Serial::new(DESC);

    let (ll, state) = MockSerial::new();
    assert_eq!(
        SERIAL.open(ll, Config::default().baudrate(Baud(0))),
        Err(Error::Unsupported)
    );
    assert!(!lock(&state).configured);

    let (ll, state) = MockSerial::new();
    lock(&state).reject = Some(Error::Unsupported);
    assert_eq!(SERIAL.open(ll, Config::default()), Err(Error::Unsupported));
    assert!(lock(&state).released);

    let (ll, state) = MockSerial::new();
    SERIAL.open(ll, Config::default()).unwrap();
    SERIAL.start().unwrap();
    assert!(lock(&state).enabled);
    assert!(SERIAL.events().contains(Event::INITIALIZED));
    assert!(SERIAL.status().initialized);

    assert!(SERIAL.close().is_some());
    assert!(lock(&state).released);
    assert!(!SERIAL.status().initialized);
    assert_eq!(SERIAL.start(), Err(Error::NotOpen));
}

#[test]
fn send_moves_one_word_per_interrupt() {
    static SERIAL: Serial<MockSerial> = Serial::new(DESC);

    let (ll, state) = MockSerial::new();
    SERIAL.open(ll, Config::default()).unwrap();
    SERIAL.events().take();

    let transfer = SERIAL.send(&b"abc"[..]).unwrap();
    assert!(SERIAL.status().tx_busy);
    assert!(lock(&state).listening.contains(Flags::TXE));

    SERIAL.on_interrupt();
    SERIAL.on_interrupt();
    assert!(!transfer.is_complete());
    SERIAL.on_interrupt();
    assert_eq!(transfer.outcome(), Some(Outcome::Complete));
    assert_eq!(SERIAL.events().take(), Event::SEND_COMPLETE);

    // the last byte still has to leave the shift register
    assert!(lock(&state).listening.contains(Flags::TC));
    SERIAL.on_interrupt();
    assert_eq!(SERIAL.events().take(), Event::TX_COMPLETE);
    assert!(lock(&state).listening.is_empty());

    assert_eq!(transfer.wait().1, Outcome::Complete);
    assert_eq!(lock(&state).tx, [b'a' as u16, b'b' as u16, b'c' as u16]);
}

#[test]
fn receive_completes_when_full() {
    static SERIAL: Serial<MockSerial> = Serial::new(DESC);

    let (ll, state) = MockSerial::new();
    SERIAL.open(ll, Config::default()).unwrap();
    SERIAL.events().take();

    let transfer = SERIAL.receive(leak(&[0; 2])).unwrap();
    assert!(SERIAL.status().rx_busy);
    lock(&state).rx.extend([0x31, 0x32]);
    SERIAL.on_interrupt();
    SERIAL.on_interrupt();

    let (buffer, outcome) = transfer.wait();
    assert_eq!(outcome, Outcome::Complete);
    assert_eq!(buffer, b"12");
    assert_eq!(SERIAL.events().take(), Event::RECEIVE_COMPLETE);
    assert!(!lock(&state).listening.contains(Flags::RXNE));
}

#[test]
fn idle_line_ends_a_receive_early() {
    static SERIAL: Serial<MockSerial> = Serial::new(DESC);

    let (ll, state) = MockSerial::new();
    SERIAL.open(ll, Config::default()).unwrap();
    SERIAL.events().take();

    let transfer = SERIAL.receive(leak(&[0; 8])).unwrap();
    lock(&state).rx.push_back(0x41);
    SERIAL.on_interrupt();
    lock(&state).idle = true;
    SERIAL.on_interrupt();

    assert_eq!(transfer.outcome(), Some(Outcome::Timeout));
    let (buffer, _) = transfer.wait();
    assert_eq!(buffer[0], 0x41);
    assert_eq!(SERIAL.events().take(), Event::RX_TIMEOUT);
    assert!(!lock(&state).idle);
}

#[test]
fn both_directions_run_at_once() {
    static SERIAL: Serial<MockSerial> = Serial::new(DESC);

    let (ll, state) = MockSerial::new();
    SERIAL.open(ll, Config::default()).unwrap();

    let rx = SERIAL.receive(leak(&[0; 1])).unwrap();
    let tx = SERIAL.send(&b"x"[..]).unwrap();
    assert!(matches!(SERIAL.send(&b"y"[..]), Err(Error::Busy)));
    assert!(matches!(SERIAL.receive(leak(&[0; 1])), Err(Error::Busy)));

    lock(&state).rx.push_back(u16::from(b'z'));
    SERIAL.on_interrupt();
    assert!(tx.is_complete());
    assert!(rx.is_complete());
    assert_eq!(rx.wait().0, b"z");
    assert_eq!(tx.wait().1, Outcome::Complete);
}

#[test]
fn receive_errors_are_recorded() {
    static SERIAL: Serial<MockSerial> = Serial::new(DESC);

    let (ll, state) = MockSerial::new();
    SERIAL.open(ll, Config::default()).unwrap();
    SERIAL.events().take();

    let transfer = SERIAL.receive(leak(&[0; 4])).unwrap();
    {
        let mut s = lock(&state);
        s.rx.push_back(0x55);
        s.errors = Flags::FE | Flags::ORE;
    }
    SERIAL.on_interrupt();

    let events = SERIAL.events().take();
    assert!(events.contains(Event::RX_FRAMING_ERROR | Event::RX_OVERFLOW));
    let error = SERIAL.error();
    assert!(error.rx_framing_error);
    assert!(error.rx_overflow);
    assert!(!error.rx_parity_error);
    assert!(lock(&state).errors.is_empty());
    // the receive goes on
    assert!(!transfer.is_complete());
    drop(transfer);
    assert!(!SERIAL.status().rx_busy);

    // arming the next receive starts a fresh error record
    let _transfer = SERIAL.receive(leak(&[0; 4])).unwrap();
    assert_eq!(SERIAL.error(), Default::default());
}

#[test]
fn cts_and_break_events() {
    static SERIAL: Serial<MockSerial> = Serial::new(DESC);

    let (ll, state) = MockSerial::new();
    SERIAL.open(ll, Config::default()).unwrap();
    SERIAL.events().take();

    lock(&state).errors = Flags::CTS | Flags::LBD;
    SERIAL.on_interrupt();
    assert_eq!(SERIAL.events().take(), Event::CTS | Event::RX_BREAK);
    assert!(SERIAL.error().rx_break);
}

#[test]
fn nine_bit_words_take_two_bytes() {
    static SERIAL: Serial<MockSerial> = Serial::new(DESC);

    let config = Config::default().data_bits(DataBits::Nine);
    assert_eq!(config.word_bytes(), 2);
    assert_eq!(config.parity(Parity::Even).word_bytes(), 1);

    let (ll, state) = MockSerial::new();
    SERIAL.open(ll, config).unwrap();

    assert!(matches!(SERIAL.send(&b"abc"[..]), Err(Error::InvalidLength)));
    assert!(matches!(SERIAL.send(&b""[..]), Err(Error::InvalidLength)));

    let transfer = SERIAL.send(&b"\x01\x01\xFF\x00"[..]).unwrap();
    SERIAL.on_interrupt();
    SERIAL.on_interrupt();
    assert_eq!(transfer.wait().1, Outcome::Complete);
    assert_eq!(lock(&state).tx, [0x0101, 0x00FF]);

    let transfer = SERIAL.receive(leak(&[0; 2])).unwrap();
    lock(&state).rx.push_back(0x01AB);
    SERIAL.on_interrupt();
    assert_eq!(transfer.wait().0, [0xAB, 0x01]);
}

#[test]
fn polled_io_with_a_deadline() {
    static SERIAL: Serial<MockSerial> = Serial::new(DESC);

    let timer = Timer::new();
    timer.open(MockTimer::millis()).unwrap();
    let (ll, state) = MockSerial::new();
    SERIAL.open(ll, Config::default()).unwrap();

    SERIAL
        .poll_send(b"ok", Milliseconds(10), &timer)
        .unwrap();
    assert_eq!(lock(&state).tx, [u16::from(b'o'), u16::from(b'k')]);
    assert!(!SERIAL.status().tx_busy);

    lock(&state).rx.extend([0x68, 0x69]);
    let mut buffer = [0; 2];
    SERIAL
        .poll_receive(&mut buffer, Milliseconds(10), &timer)
        .unwrap();
    assert_eq!(&buffer, b"hi");

    let result = SERIAL.poll_receive(&mut buffer, Milliseconds(5), &timer);
    assert_eq!(result, Err(Error::Timeout));
    assert_eq!(result.unwrap_err().code(), status::TIMEOUT);
    assert!(!SERIAL.status().rx_busy);
}

#[test]
fn polled_receive_keeps_going_after_errors() {
    static SERIAL: Serial<MockSerial> = Serial::new(DESC);

    let timer = Timer::new();
    timer.open(MockTimer::millis()).unwrap();
    let (ll, state) = MockSerial::new();
    SERIAL.open(ll, Config::default()).unwrap();

    {
        let mut s = lock(&state);
        s.rx.push_back(0x10);
        s.errors = Flags::PE;
    }
    let mut buffer = [0; 1];
    SERIAL
        .poll_receive(&mut buffer, Milliseconds(10), &timer)
        .unwrap();
    assert_eq!(buffer, [0x10]);
    assert!(SERIAL.error().rx_parity_error);
}

#[test]
fn polling_needs_an_open_timer() {
    static SERIAL: Serial<MockSerial> = Serial::new(DESC);

    let timer: Timer<MockTimer> = Timer::new();
    SERIAL.open(MockSerial::new().0, Config::default()).unwrap();
    assert!(matches!(
        SERIAL.poll_send(b"x", Milliseconds(1), &timer),
        Err(Error::Timer(_))
    ));
    assert!(!SERIAL.status().tx_busy);
}

#[test]
fn embedded_hal_traits() {
    static SERIAL: Serial<MockSerial> = Serial::new(DESC);

    let (ll, state) = MockSerial::new();
    SERIAL.open(ll, Config::default()).unwrap();
    let mut port = &SERIAL;

    assert!(matches!(port.read(), Err(nb::Error::WouldBlock)));
    lock(&state).rx.push_back(0x1FF);
    assert!(matches!(port.read(), Ok(0xFF)));

    {
        let mut s = lock(&state);
        s.rx.push_back(0x20);
        s.errors = Flags::FE;
    }
    assert!(matches!(port.read(), Err(nb::Error::Other(Error::Framing))));
    assert!(matches!(port.read(), Ok(0x20)));

    port.write(b'!').unwrap();
    assert!(port.flush().is_ok());
    assert_eq!(lock(&state).tx, [u16::from(b'!')]);

    // a running receive owns the data register
    let _transfer = SERIAL.receive(leak(&[0; 1])).unwrap();
    assert!(matches!(port.read(), Err(nb::Error::WouldBlock)));
}

#[test]
fn a_token_from_before_a_reopen_leaves_the_next_receive_alone() {
    static SERIAL: Serial<MockSerial> = Serial::new(DESC);

    SERIAL.open(MockSerial::new().0, Config::default()).unwrap();
    let old = SERIAL.receive(leak(&[0; 1])).unwrap();
    assert!(SERIAL.close().is_some());
    assert_eq!(old.outcome(), Some(Outcome::Incomplete));

    let (ll, state) = MockSerial::new();
    SERIAL.open(ll, Config::default()).unwrap();
    let new = SERIAL.receive(leak(&[0; 1])).unwrap();
    drop(old);
    assert!(SERIAL.status().rx_busy);
    assert!(lock(&state).listening.contains(Flags::RXNE));

    lock(&state).rx.push_back(0x42);
    SERIAL.on_interrupt();
    let (buffer, outcome) = new.wait();
    assert_eq!(outcome, Outcome::Complete);
    assert_eq!(buffer, b"\x42");
}
