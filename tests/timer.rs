mod common;

use std::sync::atomic::Ordering;

use common::MockTimer;
use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use omni_hal::status::{self, StatusCode};
use omni_hal::time::duration::{Microseconds, Milliseconds};
use omni_hal::time::rate::Hertz;
use omni_hal::timer::{Error, TickFrequency, Timer};

fn counter(timer: &Timer<MockTimer>) -> u32 {
    match timer.close() {
        Some(driver) => driver.counter.load(Ordering::Relaxed),
        None => panic!("timer was not open"),
    }
}

#[test]
fn open_and_close() {
    let timer: Timer<MockTimer> = Timer::new();
    assert_eq!(timer.now(), Err(Error::NotOpen));
    assert_eq!(timer.get_tick(TickFrequency::KHz1), Err(Error::NotOpen));

    let mut broken = MockTimer::millis();
    broken.fail = true;
    assert_eq!(timer.open(broken), Err(Error::Unsupported));
    assert_eq!(timer.frequency(), Err(Error::NotOpen));

    timer.open(MockTimer::millis()).unwrap();
    assert_eq!(timer.open(MockTimer::millis()), Err(Error::AlreadyOpen));
    // an open timer is reported before the new driver is touched
    let mut second = MockTimer::millis();
    second.fail = true;
    assert_eq!(timer.open(second), Err(Error::AlreadyOpen));
    assert_eq!(timer.frequency(), Ok(Hertz(1_000_000_u32)));
    assert!(timer.close().is_some());
    assert_eq!(Error::AlreadyOpen.code(), status::FAIL);
}

#[test]
fn ticks_scale_the_counter() {
    let timer: Timer<MockTimer> = Timer::new();
    timer.open(MockTimer::new(123_456, 0, Hertz(72_000_000))).unwrap();
    assert_eq!(timer.get_tick(TickFrequency::MHz1), Ok(123_456 / 72));
    assert_eq!(timer.get_tick(TickFrequency::KHz1), Ok(123_456 / 72_000));

    let slow: Timer<MockTimer> = Timer::new();
    slow.open(MockTimer::new(0, 0, Hertz(500_000))).unwrap();
    assert_eq!(slow.get_tick(TickFrequency::MHz1), Err(Error::Unsupported));
    assert_eq!(slow.get_tick(TickFrequency::KHz1), Ok(0));
}

#[test]
fn deadlines_survive_a_counter_wrap() {
    let timer: Timer<MockTimer> = Timer::new();
    timer.open(MockTimer::new(u32::MAX - 49, 100, Hertz(1_000_000))).unwrap();

    let start = timer.now().unwrap();
    assert_eq!(start.cycles(), u32::MAX - 49);
    let mut reads = 0;
    while !timer.has_elapsed(start, Milliseconds(1)).unwrap() {
        reads += 1;
    }
    // 100 cycles per read, 1000 cycles per millisecond
    assert_eq!(reads, 9);
    assert!(counter(&timer) < 2_000);

    let later = start;
    assert_eq!(start.cycles_until(later), 0);
}

#[test]
fn delays_spin_for_the_requested_time() {
    let timer: Timer<MockTimer> = Timer::new();
    timer.open(MockTimer::millis()).unwrap();
    timer.delay_ms(Milliseconds(5)).unwrap();
    // one read for the start, five until 5000 cycles passed
    assert_eq!(counter(&timer), 6_000);

    timer.open(MockTimer::millis()).unwrap();
    timer.delay_ms(Milliseconds(1_500)).unwrap();
    // split into a 1000 ms and a 500 ms wait
    assert_eq!(counter(&timer), (1_001 + 501) * 1_000);

    timer.open(MockTimer::new(0, 1, Hertz(1_000_000))).unwrap();
    timer.delay_us(Microseconds(3)).unwrap();
    assert_eq!(counter(&timer), 4);

    timer.open(MockTimer::millis()).unwrap();
    timer.delay_ms(Milliseconds(0)).unwrap();
    assert_eq!(counter(&timer), 0);
}

#[test]
fn embedded_hal_delays() {
    let timer: Timer<MockTimer> = Timer::new();
    timer.open(MockTimer::new(0, 1, Hertz(1_000_000))).unwrap();

    let mut delay = &timer;
    DelayUs::<u32>::delay_us(&mut delay, 10);
    DelayMs::<u8>::delay_ms(&mut delay, 1);
    DelayMs::<u16>::delay_ms(&mut delay, 1);
    assert!(counter(&timer) >= 2_010);

    // a closed timer does not block
    DelayMs::<u32>::delay_ms(&mut delay, 1_000);
    assert_eq!(timer.delay_us(Microseconds(1)), Err(Error::NotOpen));
}
