mod common;

use std::sync::atomic::{AtomicU32, Ordering};

use common::{lock, MockDevice, MockUsb};
use omni_hal::instance::Descriptor;
use omni_hal::status::{self, StatusCode};
use omni_hal::time::rate::Hertz;
use omni_hal::usb::{Config, Error, Event, Mode, UsbPhy};

const DESC: Descriptor = Descriptor::new(1, Hertz(48_000_000)).irq(20, 1);

#[test]
fn init_posts_initialized() {
    static USB: UsbPhy<MockUsb> = UsbPhy::new(DESC);
    static CALLS: AtomicU32 = AtomicU32::new(0);

    fn on_event(events: Event) {
        if events.contains(Event::INITIALIZED) {
            CALLS.fetch_add(1, Ordering::Relaxed);
        }
    }

    let (ll, state) = MockUsb::new();
    USB.init(ll, Config::default().callback(on_event)).unwrap();
    assert!(lock(&state).configured);
    assert!(USB.events().contains(Event::INITIALIZED));
    assert_eq!(CALLS.load(Ordering::Relaxed), 1);
    assert!(USB.status().initialized);
    assert!(!USB.status().connected);

    assert_eq!(USB.init(MockUsb::new().0, Config::default()), Err(Error::AlreadyOpen));
}

#[test]
fn the_device_object_is_handed_out_once() {
    static USB: UsbPhy<MockUsb> = UsbPhy::new(DESC);

    USB.init(MockUsb::new().0, Config::default()).unwrap();
    assert_eq!(USB.device(), Ok(MockDevice(1)));
    assert_eq!(USB.device(), Err(Error::Taken));
}

#[test]
fn start_and_stop_follow_the_bus() {
    static USB: UsbPhy<MockUsb> = UsbPhy::new(DESC);

    let (ll, state) = MockUsb::new();
    USB.init(ll, Config::default()).unwrap();
    USB.start().unwrap();
    assert!(lock(&state).connected);
    assert!(USB.status().connected);
    USB.stop().unwrap();
    assert!(!lock(&state).connected);
    assert!(!USB.status().connected);
}

#[test]
fn host_mode_is_unsupported() {
    static USB: UsbPhy<MockUsb> = UsbPhy::new(DESC);

    let (ll, state) = MockUsb::new();
    assert_eq!(
        USB.init(ll, Config::default().mode(Mode::Host)),
        Err(Error::Unsupported)
    );
    assert!(lock(&state).released);
    assert!(!USB.status().initialized);
    assert!(USB.events().poll().is_empty());
    assert_eq!(Error::Unsupported.code(), status::FAIL);
}

#[test]
fn deinit_disconnects_and_releases() {
    static USB: UsbPhy<MockUsb> = UsbPhy::new(DESC);

    let (ll, state) = MockUsb::new();
    USB.init(ll, Config::default()).unwrap();
    USB.start().unwrap();

    assert!(USB.deinit().is_some());
    {
        let s = lock(&state);
        assert!(!s.connected);
        assert!(s.released);
    }
    assert!(USB.deinit().is_none());
    assert_eq!(USB.start(), Err(Error::NotOpen));
    assert_eq!(USB.device(), Err(Error::NotOpen));
    assert_eq!(USB.status(), Default::default());
}
