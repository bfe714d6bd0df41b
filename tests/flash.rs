mod common;

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use common::{lock, MockSpi, Pump, Shared};
use embedded_hal::digital::v2::OutputPin;
use omni_hal::devices::flash::{self, Error, W25q, PAGE_SIZE, SECTOR_SIZE};
use omni_hal::instance::Descriptor;
use omni_hal::spi::{Config, Spi};
use omni_hal::time::rate::Hertz;

const DESC: Descriptor = Descriptor::new(1, Hertz(72_000_000));

/// A W25Q16 answering the standard commands
struct Chip {
    id: u16,
    memory: Vec<u8>,
    selected: bool,
    /// Bytes clocked in since select
    command: Vec<u8>,
    wel: bool,
    /// Status reads left with BUSY set
    busy: u32,
    /// Set on deselect after program or erase
    busy_after: u32,
    erases: u32,
}

impl Chip {
    fn new(id: u16) -> Self {
        Self {
            id,
            memory: vec![0xFF; 2 * 1024 * 1024],
            selected: false,
            command: Vec::new(),
            wel: false,
            busy: 0,
            busy_after: 2,
            erases: 0,
        }
    }

    fn address(&self) -> usize {
        usize::from(self.command[1]) << 16
            | usize::from(self.command[2]) << 8
            | usize::from(self.command[3])
    }

    fn exchange(&mut self, byte: u8) -> u8 {
        assert!(self.selected, "clocked while deselected");
        self.command.push(byte);
        let pos = self.command.len() - 1;
        match self.command[0] {
            flash::JEDEC_ID => match pos {
                1 => 0xEF,
                2 => 0x40,
                3 => (self.id & 0xFF) as u8 + 1,
                _ => 0xFF,
            },
            flash::MANUFACTURER_ID => match pos {
                4 => (self.id >> 8) as u8,
                5 => self.id as u8,
                _ => 0xFF,
            },
            flash::READ_STATUS_1 if pos >= 1 => {
                let mut status = 0;
                if self.busy > 0 {
                    self.busy -= 1;
                    status |= flash::SR1_BUSY;
                }
                if self.wel {
                    status |= flash::SR1_WEL;
                }
                status
            }
            flash::READ_DATA if pos >= 4 => self.memory[self.address() + pos - 4],
            flash::PAGE_PROGRAM if pos >= 4 => {
                assert!(self.wel, "program without write enable");
                let start = self.address();
                let page = start & !0xFF;
                let at = page + ((start + pos - 4) & 0xFF);
                self.memory[at] &= byte;
                0xFF
            }
            _ => 0xFF,
        }
    }

    fn deselect(&mut self) {
        self.selected = false;
        let Some(&command) = self.command.first() else {
            return;
        };
        match command {
            flash::WRITE_ENABLE => self.wel = true,
            flash::PAGE_PROGRAM => self.finish_write(),
            flash::SECTOR_ERASE => {
                assert!(self.wel, "erase without write enable");
                let start = self.address();
                self.memory[start..start + SECTOR_SIZE as usize].fill(0xFF);
                self.erases += 1;
                self.finish_write();
            }
            flash::CHIP_ERASE => {
                assert!(self.wel, "erase without write enable");
                self.memory.fill(0xFF);
                self.erases += 1;
                self.finish_write();
            }
            _ => {}
        }
        self.command.clear();
    }

    fn finish_write(&mut self) {
        self.wel = false;
        self.busy = self.busy_after;
    }
}

struct ChipSelect(Shared<Chip>);

impl OutputPin for ChipSelect {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        let mut chip = lock(&self.0);
        chip.selected = true;
        chip.command.clear();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        let mut chip = lock(&self.0);
        if chip.selected {
            chip.deselect();
        }
        Ok(())
    }
}

fn attach(spi: &'static Spi<MockSpi>, id: u16) -> (Shared<Chip>, Pump) {
    let chip = Arc::new(Mutex::new(Chip::new(id)));
    let (ll, state) = MockSpi::new();
    let bus_side = chip.clone();
    lock(&state).slave = Some(Box::new(move |byte| lock(&bus_side).exchange(byte)));
    spi.open(ll, Config::default()).unwrap();
    (chip, Pump::start(move || spi.on_interrupt()))
}

#[test]
fn identifies_the_chip() {
    static SPI: Spi<MockSpi> = Spi::new(DESC);
    let (chip, _pump) = attach(&SPI, 0xEF14);

    let mut flash = W25q::new(&SPI, ChipSelect(chip.clone())).unwrap();
    let info = flash.info();
    assert_eq!(info.device_id, 0xEF14);
    assert_eq!(info.capacity, 2 * 1024 * 1024);
    assert_eq!(info.sector_size, SECTOR_SIZE);
    assert_eq!(flash.jedec_id().unwrap(), [0xEF, 0x40, 0x15]);
    assert_eq!(flash.read_status().unwrap(), 0);
    assert!(!lock(&chip).selected);
}

#[test]
fn unknown_parts_are_rejected() {
    static SPI: Spi<MockSpi> = Spi::new(DESC);
    let (chip, _pump) = attach(&SPI, 0xC213);

    match W25q::new(&SPI, ChipSelect(chip)) {
        Err(e) => assert_eq!(e, Error::UnknownDevice(0xC213)),
        Ok(_) => panic!("accepted an unknown part"),
    }
    assert_eq!(flash::capacity(0xEF16), Some(8 * 1024 * 1024));
    assert_eq!(flash::capacity(0xEF18), Some(32 * 1024 * 1024));
}

#[test]
fn program_across_pages_and_read_back() {
    static SPI: Spi<MockSpi> = Spi::new(DESC);
    let (chip, _pump) = attach(&SPI, 0xEF14);
    let mut flash = W25q::new(&SPI, ChipSelect(chip.clone())).unwrap();

    let data: Vec<u8> = (0..600).map(|i| (i * 7) as u8).collect();
    flash.write(0x1F0, &data).unwrap();

    {
        let chip = lock(&chip);
        assert_eq!(&chip.memory[0x1F0..0x1F0 + 600], &data[..]);
        assert_eq!(chip.memory[0x1EF], 0xFF);
        assert_eq!(chip.memory[0x1F0 + 600], 0xFF);
        assert!(!chip.wel);
    }

    let mut back = vec![0; 600];
    flash.read(0x1F0, &mut back).unwrap();
    assert_eq!(back, data);
    assert_eq!(usize::from(PAGE_SIZE), 256);
}

#[test]
fn erase_restores_ones() {
    static SPI: Spi<MockSpi> = Spi::new(DESC);
    let (chip, _pump) = attach(&SPI, 0xEF14);
    let mut flash = W25q::new(&SPI, ChipSelect(chip.clone())).unwrap();

    flash.write(SECTOR_SIZE, &[0x00; 16]).unwrap();
    flash.write(2 * SECTOR_SIZE, &[0x00; 16]).unwrap();
    assert_eq!(flash.erase_sector(SECTOR_SIZE + 1), Err(Error::Unaligned));
    flash.erase_sector(SECTOR_SIZE).unwrap();

    let mut back = [0; 16];
    flash.read(SECTOR_SIZE, &mut back).unwrap();
    assert_eq!(back, [0xFF; 16]);
    flash.read(2 * SECTOR_SIZE, &mut back).unwrap();
    assert_eq!(back, [0x00; 16]);

    flash.erase_chip().unwrap();
    flash.read(2 * SECTOR_SIZE, &mut back).unwrap();
    assert_eq!(back, [0xFF; 16]);
    assert_eq!(lock(&chip).erases, 2);
}

#[test]
fn accesses_past_the_end_are_rejected() {
    static SPI: Spi<MockSpi> = Spi::new(DESC);
    let (chip, _pump) = attach(&SPI, 0xEF14);
    let mut flash = W25q::new(&SPI, ChipSelect(chip)).unwrap();
    let end = flash.info().capacity;

    let mut buffer = [0; 4];
    assert_eq!(flash.read(end - 2, &mut buffer), Err(Error::OutOfRange));
    assert_eq!(flash.write(end, &[1]), Err(Error::OutOfRange));
    assert_eq!(flash.erase_sector(end), Err(Error::OutOfRange));
    assert_eq!(flash.read(end, &mut []), Ok(()));

    let _cs: ChipSelect = flash.free();
}
