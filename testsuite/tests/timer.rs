#![no_std]
#![no_main]

use testsuite as _;

use omni_hal::family::stm32f3::Dwt;
use omni_hal::timer::Timer;

static TIMER: Timer<Dwt> = Timer::new();

#[defmt_test::tests]
mod tests {
    use super::TIMER;
    use cortex_m::peripheral::DWT;
    use defmt::{self, assert, assert_eq, unwrap};
    use omni_hal::family::stm32f3::{pins::HSI, Dwt};
    use omni_hal::hal::blocking::delay::DelayMs;
    use omni_hal::pac;
    use omni_hal::time::duration::{Microseconds, Milliseconds};
    use omni_hal::timer::{Error, TickFrequency};

    #[init]
    fn init() {
        let cp = unwrap!(pac::CorePeripherals::take());
        unwrap!(TIMER.open(Dwt::new(cp.DCB, cp.DWT, HSI)));
        assert_eq!(unwrap!(TIMER.frequency()), HSI);
    }

    #[test]
    fn ticks_advance() {
        let first = unwrap!(TIMER.get_tick(TickFrequency::MHz1));
        unwrap!(TIMER.delay_us(Microseconds(50)));
        let second = unwrap!(TIMER.get_tick(TickFrequency::MHz1));
        assert!(second.wrapping_sub(first) >= 50);
    }

    #[test]
    fn test_delay() {
        let freqcyc = HSI.0;
        let start = DWT::cycle_count();
        unwrap!(TIMER.delay_ms(Milliseconds(1_000)));
        let elapsed = DWT::cycle_count().wrapping_sub(start);

        defmt::info!("elapsed: {}", elapsed);
        // Differentiate between release and debug build.
        #[cfg(not(debug_assertions))]
        assert!(((freqcyc - 500)..(freqcyc + 500)).contains(&elapsed));
        #[cfg(debug_assertions)]
        assert!(((freqcyc - 2000)..(freqcyc + 2000)).contains(&elapsed));
    }

    #[test]
    fn deadlines() {
        let start = unwrap!(TIMER.now());
        assert!(!unwrap!(TIMER.has_elapsed(start, Milliseconds(5))));
        let mut delay = &TIMER;
        DelayMs::<u32>::delay_ms(&mut delay, 6);
        assert!(unwrap!(TIMER.has_elapsed(start, Milliseconds(5))));
    }

    #[test]
    fn close_and_reopen() {
        let driver = unwrap!(TIMER.close());
        assert_eq!(TIMER.now(), Err(Error::NotOpen));
        unwrap!(TIMER.open(driver));
        let (dcb, dwt) = unwrap!(TIMER.close()).free();
        unwrap!(TIMER.open(Dwt::new(dcb, dwt, HSI)));
    }
}
