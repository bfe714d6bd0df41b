//! Identifies a W25Q flash, erases its first sector and programs it.
//! The flash is wired to SPI1 (PA5 SCK, PA6 MISO, PA7 MOSI) with chip select on PA4.
//! Target board: STM32F3DISCOVERY

#![no_std]
#![no_main]

use panic_semihosting as _;

use cortex_m::asm;
use cortex_m_rt::entry;
use cortex_m_semihosting::hprintln;

use omni_hal::devices::flash::W25q;
use omni_hal::family::stm32f3::{pins, GpioPort, SpiPort};
use omni_hal::gpio::{Config as PinConfig, Gpio, Level};
use omni_hal::interrupt;
use omni_hal::pin;
use omni_hal::spi::{Config, Spi};
use omni_hal::time::rate::Extensions;

static GPIO: Gpio<GpioPort> = Gpio::new();
static FLASH_BUS: Spi<SpiPort> = Spi::new(pins::SPI1);

#[interrupt]
fn SPI1() {
    FLASH_BUS.on_interrupt();
}

#[entry]
fn main() -> ! {
    // NOTE(unsafe) the only user of the GPIO ports
    GPIO.open(unsafe { GpioPort::steal() }).unwrap();
    let cs = pin!(A, 4);
    GPIO.init(cs, PinConfig::output().level(Level::High)).unwrap();

    FLASH_BUS
        .open(SpiPort::new(), Config::default().frequency(4.MHz()))
        .unwrap();
    FLASH_BUS.start().unwrap();

    let mut flash = W25q::new(&FLASH_BUS, GPIO.pin(cs)).unwrap();
    let info = flash.info();
    hprintln!(
        "W25Q {:04x}: {} KiB, {} byte sectors",
        info.device_id,
        info.capacity / 1024,
        info.sector_size
    );

    flash.erase_sector(0).unwrap();
    let data: [u8; 300] = core::array::from_fn(|i| i as u8);
    flash.write(0, &data).unwrap();

    let mut back = [0; 300];
    flash.read(0, &mut back).unwrap();
    hprintln!("programmed and verified: {}", back == data);

    loop {
        asm::wfi();
    }
}
