//! Command console on USART2 (PA2 TX, PA3 RX) at 115200 Bd, with the core
//! running at 64 MHz from the HSI PLL. Both APB buses stay at 8 MHz, so the
//! board descriptors keep matching the clock tree.
//! Target board: STM32F3DISCOVERY

#![no_std]
#![no_main]

use core::fmt::{self, Write};

use panic_semihosting as _;

use cortex_m_rt::entry;

use omni_hal::clock::{self, Clocks};
use omni_hal::devices::console::{Command, Config, Console};
use omni_hal::family::stm32f3::{pins, ClockControl, Dwt, UsartPort};
use omni_hal::pac;
use omni_hal::serial::{self, Serial};
use omni_hal::time::duration::Milliseconds;
use omni_hal::time::rate::{Baud, Hertz};
use omni_hal::timer::{TickFrequency, Timer};

static USART2: Serial<UsartPort> = Serial::new(pins::USART2);
static TIMER: Timer<Dwt> = Timer::new();

fn uptime(_: &[&str], out: &mut dyn Write) -> fmt::Result {
    let ms = TIMER.get_tick(TickFrequency::KHz1).unwrap_or(0);
    writeln!(out, "{} ms", ms)
}

fn sleep(args: &[&str], out: &mut dyn Write) -> fmt::Result {
    match args.get(1).and_then(|ms| ms.parse::<u32>().ok()) {
        Some(ms) => {
            TIMER.delay_ms(Milliseconds(ms)).ok();
            Ok(())
        }
        None => writeln!(out, "usage: sleep <ms>"),
    }
}

static COMMANDS: [Command; 2] = [
    Command::new("uptime", "milliseconds since start", uptime),
    Command::new("sleep", "sleep <ms>", sleep),
];

fn clocks(rcc: pac::RCC, flash: pac::FLASH) -> Clocks {
    let config = clock::Config::new()
        .sysclk(Hertz(64_000_000))
        .pclk1(pins::HSI)
        .pclk2(pins::HSI);
    clock::open(&mut ClockControl::new(rcc, flash), &config).unwrap()
}

#[entry]
fn main() -> ! {
    let cp = pac::CorePeripherals::take().unwrap();
    let dp = pac::Peripherals::take().unwrap();

    let clocks = clocks(dp.RCC, dp.FLASH);
    TIMER
        .open(Dwt::new(cp.DCB, cp.DWT, clocks.sysclk()))
        .unwrap();

    USART2
        .open(
            UsartPort::new(),
            serial::Config::default().baudrate(Baud(115_200)),
        )
        .unwrap();
    USART2.start().unwrap();

    let mut console: Console<_> = Console::new(&USART2, &COMMANDS);
    console.open(Config::default()).unwrap();
    match console.start() {
        Ok(never) => match never {},
        Err(_) => loop {
            cortex_m::asm::wfi();
        },
    }
}
