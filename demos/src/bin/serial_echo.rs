//! Echoes every byte received on USART2 (PA2 TX, PA3 RX) at 115200 Bd.
//! Instances are looked up through the registry.
//! Target board: STM32F3DISCOVERY

#![no_std]
#![no_main]

use panic_semihosting as _;

use cortex_m::singleton;
use cortex_m_rt::entry;

use omni_hal::event::Outcome;
use omni_hal::family::stm32f3::{pins, Dwt, Stm32f3, UsartPort};
use omni_hal::interrupt;
use omni_hal::pac;
use omni_hal::registry::Registry;
use omni_hal::serial::{Config, Serial};
use omni_hal::time::duration::Milliseconds;
use omni_hal::time::rate::Baud;
use omni_hal::timer::Timer;

static USART2: Serial<UsartPort> = Serial::new(pins::USART2);
static TIMER: Timer<Dwt> = Timer::new();

#[interrupt]
fn USART2_EXTI26() {
    USART2.on_interrupt();
}

#[entry]
fn main() -> ! {
    let cp = pac::CorePeripherals::take().unwrap();

    let registry = Registry::<Stm32f3>::builder()
        .usart(&USART2)
        .timer(&TIMER)
        .build()
        .ok()
        .unwrap();
    registry
        .timer()
        .unwrap()
        .open(Dwt::new(cp.DCB, cp.DWT, pins::HSI))
        .unwrap();

    let serial = registry.usart(2).unwrap();
    serial
        .open(UsartPort::new(), Config::default().baudrate(Baud(115_200)))
        .unwrap();
    serial.start().unwrap();

    let mut buffer = singleton!(: [u8; 1] = [0; 1]).unwrap();
    loop {
        let (rx, outcome) = serial.receive(buffer).unwrap().wait();
        // a pause on the line ends a receive without data
        if outcome == Outcome::Complete {
            serial
                .poll_send(&rx[..], Milliseconds(10), registry.timer().unwrap())
                .unwrap();
        }
        buffer = rx;
    }
}
