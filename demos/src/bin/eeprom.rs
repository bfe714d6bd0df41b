//! Writes a message across two pages of an AT24C256 and reads it back.
//! The EEPROM sits on I2C1 (PB6/PB7) with all address pins low.
//! Target board: STM32F3DISCOVERY

#![no_std]
#![no_main]

use panic_semihosting as _;

use cortex_m::asm;
use cortex_m_rt::entry;
use cortex_m_semihosting::hprintln;

use omni_hal::devices::eeprom::At24c;
use omni_hal::family::stm32f3::{pins, I2cPort};
use omni_hal::i2c::{BusSpeed, Config, Event, I2c};
use omni_hal::interrupt;

static I2C1: I2c<I2cPort> = I2c::new(pins::I2C1);

#[interrupt]
fn I2C1_EV_EXTI23() {
    I2C1.on_interrupt();
}

#[interrupt]
fn I2C1_ER() {
    I2C1.on_interrupt();
}

fn on_event(events: Event) {
    if events.intersects(Event::BUS_ERROR | Event::ARBITRATION_LOST) {
        asm::bkpt();
    }
}

const MESSAGE: &[u8] = b"written by omni-hal, split at the page boundary";

#[entry]
fn main() -> ! {
    let config = Config::from(BusSpeed::Fast).callback(on_event);
    I2C1.open(I2cPort::new(), config).unwrap();
    I2C1.start().unwrap();

    let eeprom = At24c::new(&I2C1);
    // 40 bytes before the end of the first page
    let address = 24;
    eeprom.write(address, MESSAGE).unwrap();

    let mut buffer = [0; MESSAGE.len()];
    eeprom.read(address, &mut buffer).unwrap();
    if buffer == MESSAGE {
        hprintln!("read back {} bytes", buffer.len());
    } else {
        hprintln!("mismatch: {:?}", buffer);
    }

    loop {
        asm::wfi();
    }
}
