//! Example of using I2C.
//! Scans available I2C devices on bus and print the result.
//! Appropriate pull-up registers should be installed on I2C bus.
//! Target board: STM32F3DISCOVERY

#![no_std]
#![no_main]

use core::ops::Range;

use panic_semihosting as _;

use cortex_m::asm;
use cortex_m_rt::entry;
use cortex_m_semihosting::{hprint, hprintln};

use omni_hal::family::stm32f3::{pins, I2cPort};
use omni_hal::i2c::{Config, I2c};
use omni_hal::interrupt;

const VALID_ADDR_RANGE: Range<u8> = 0x08..0x78;

static I2C1: I2c<I2cPort> = I2c::new(pins::I2C1);

#[interrupt]
fn I2C1_EV_EXTI23() {
    I2C1.on_interrupt();
}

#[interrupt]
fn I2C1_ER() {
    I2C1.on_interrupt();
}

#[entry]
fn main() -> ! {
    I2C1.open(I2cPort::new(), Config::default()).unwrap();
    I2C1.start().unwrap();

    hprintln!("Start i2c scanning...");
    hprintln!();

    for addr in 0x00_u8..0x80 {
        // A single ping, answered by an acknowledge
        if VALID_ADDR_RANGE.contains(&addr) && I2C1.is_device_ready(addr, 1).is_ok() {
            hprint!("{:02x}", addr);
        } else {
            hprint!("..");
        }
        if addr % 0x10 == 0x0F {
            hprintln!();
        } else {
            hprint!(" ");
        }
    }

    hprintln!();
    hprintln!("Done!");

    loop {
        asm::wfi();
    }
}
