use omni_hal::clock::{
    self, Clocks, Config, Error, Limits, LowLevel, Plan, Pll, PllSource, Source, UsbPrescaler,
};
use omni_hal::status::{self, StatusCode};
use omni_hal::time::rate::Hertz;

const MHZ: u32 = 1_000_000;

fn mhz(n: u32) -> Hertz {
    Hertz(n * MHZ)
}

fn plan_for(config: Config) -> Result<Plan, Error> {
    Plan::new(&config, &Limits::STM32F3)
}

#[test]
fn reset_clocks_run_from_the_hsi() {
    let plan = plan_for(Config::new()).unwrap();
    assert_eq!(plan.pll, None);
    assert_eq!((plan.ahb_div, plan.apb1_div, plan.apb2_div), (1, 1, 1));
    assert_eq!(plan.latency, 0);
    assert_eq!(plan.clocks, Clocks::reset(&Limits::STM32F3));
    assert!(!plan.clocks.usb_clock());
}

#[test]
fn crystal_to_72_mhz() {
    let plan = plan_for(Config::new().use_hse(mhz(8)).sysclk(mhz(72)).usb(true)).unwrap();
    assert_eq!(
        plan.pll,
        Some(Pll {
            source: PllSource::Hse { prediv: 1 },
            mul: 9,
        })
    );
    assert_eq!(plan.clocks.sysclk(), mhz(72));
    assert_eq!(plan.clocks.hclk(), mhz(72));
    // APB1 tops out at 36 MHz
    assert_eq!(plan.apb1_div, 2);
    assert_eq!(plan.clocks.pclk1(), mhz(36));
    assert_eq!(plan.clocks.pclk2(), mhz(72));
    assert_eq!(plan.latency, 2);
    assert_eq!(plan.usb, Some(UsbPrescaler::Div1_5));
    assert!(plan.clocks.usb_clock());
}

#[test]
fn hsi_through_the_pll() {
    let plan = plan_for(Config::new().sysclk(mhz(64))).unwrap();
    assert_eq!(
        plan.pll,
        Some(Pll {
            source: PllSource::HsiDiv2,
            mul: 16,
        })
    );
    assert_eq!(plan.clocks.pclk1(), mhz(32));

    let plan = plan_for(Config::new().sysclk(mhz(36))).unwrap();
    assert_eq!(plan.latency, 1);
    assert_eq!(plan.clocks.pclk1(), mhz(36));
}

#[test]
fn large_crystals_are_divided_first() {
    // 36 MHz is no integer multiple of 24 MHz
    let plan = plan_for(Config::new().use_hse(mhz(24)).sysclk(mhz(36))).unwrap();
    assert_eq!(
        plan.pll,
        Some(Pll {
            source: PllSource::Hse { prediv: 2 },
            mul: 3,
        })
    );
}

#[test]
fn crystal_without_pll() {
    let plan = plan_for(Config::new().use_hse(mhz(8)).bypass_hse()).unwrap();
    assert_eq!(plan.pll, None);
    assert_eq!(
        plan.source,
        Source::Hse {
            frequency: mhz(8),
            bypass: true
        }
    );
    assert_eq!(plan.clocks.sysclk(), mhz(8));
}

#[test]
fn bus_dividers_follow_the_request() {
    let plan = plan_for(
        Config::new()
            .use_hse(mhz(8))
            .sysclk(mhz(48))
            .hclk(mhz(24))
            .pclk1(mhz(6))
            .pclk2(mhz(12)),
    )
    .unwrap();
    assert_eq!(plan.ahb_div, 2);
    assert_eq!(plan.apb1_div, 4);
    assert_eq!(plan.apb2_div, 2);
    assert_eq!(plan.latency, 0);
    assert_eq!(plan.clocks.pclk1(), mhz(6));

    // no divider lands exactly on 5 MHz, the next slower one is taken
    let plan = plan_for(Config::new().use_hse(mhz(8)).sysclk(mhz(72)).pclk2(mhz(5))).unwrap();
    assert_eq!(plan.apb2_div, 16);
    assert_eq!(plan.clocks.pclk2(), Hertz(4_500_000_u32));
}

#[test]
fn impossible_requests_are_rejected() {
    assert_eq!(plan_for(Config::new().sysclk(mhz(80))).err(), Some(Error::OutOfRange));
    assert_eq!(
        plan_for(Config::new().sysclk(mhz(48)).pclk1(mhz(48))).err(),
        Some(Error::OutOfRange)
    );
    // 4 MHz steps only from the halved HSI
    assert_eq!(plan_for(Config::new().sysclk(mhz(70))).err(), Some(Error::Unsupported));
    // USB needs a crystal
    assert_eq!(
        plan_for(Config::new().sysclk(mhz(48)).usb(true)).err(),
        Some(Error::UsbClock)
    );
    // and a PLL output of 48 or 72 MHz
    assert_eq!(
        plan_for(Config::new().use_hse(mhz(8)).sysclk(mhz(64)).usb(true)).err(),
        Some(Error::UsbClock)
    );
    assert_eq!(Error::NotReady.code(), status::TIMEOUT);
    assert_eq!(Error::UsbClock.code(), status::FAIL);
}

#[derive(Default)]
struct MockRcc {
    applied: Vec<Plan>,
    stuck: bool,
}

impl LowLevel for MockRcc {
    fn limits(&self) -> Limits {
        Limits::STM32F3
    }

    fn apply(&mut self, plan: &Plan) -> Result<(), Error> {
        if self.stuck {
            return Err(Error::NotReady);
        }
        self.applied.push(*plan);
        Ok(())
    }
}

#[test]
fn open_applies_the_plan() {
    let mut rcc = MockRcc::default();
    let config = Config::new().use_hse(mhz(8)).sysclk(mhz(48)).usb(true);
    let clocks = clock::open(&mut rcc, &config).unwrap();
    assert_eq!(clocks.sysclk(), mhz(48));
    assert_eq!(rcc.applied.len(), 1);
    assert_eq!(rcc.applied[0].usb, Some(UsbPrescaler::Div1));
}

#[test]
fn open_leaves_the_clocks_alone_on_errors() {
    let mut rcc = MockRcc::default();
    assert_eq!(
        clock::open(&mut rcc, &Config::new().sysclk(mhz(100))),
        Err(Error::OutOfRange)
    );
    assert!(rcc.applied.is_empty());

    rcc.stuck = true;
    assert_eq!(
        clock::open(&mut rcc, &Config::new().use_hse(mhz(8))),
        Err(Error::NotReady)
    );
}
