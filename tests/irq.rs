use std::sync::atomic::{AtomicU32, Ordering};

use omni_hal::irq::{decode_priority, encode_priority, Controller, Error, IrqTable, MAX_GROUPING};
use omni_hal::status::{self, StatusCode};

/// A 4 bit NVIC in memory
struct Nvic {
    enabled: [bool; 64],
    pending: [bool; 64],
    priorities: Vec<u8>,
    grouping: u8,
}

impl Nvic {
    fn new() -> Self {
        Self {
            enabled: [false; 64],
            pending: [false; 64],
            priorities: vec![0; 64],
            grouping: 0,
        }
    }
}

impl Controller for Nvic {
    const PRIO_BITS: u8 = 4;

    fn enable(&mut self, irq: u16) {
        self.enabled[usize::from(irq)] = true;
    }

    fn disable(&mut self, irq: u16) {
        self.enabled[usize::from(irq)] = false;
    }

    fn is_enabled(&self, irq: u16) -> bool {
        self.enabled[usize::from(irq)]
    }

    fn set_pending(&mut self, irq: u16) {
        self.pending[usize::from(irq)] = true;
    }

    fn clear_pending(&mut self, irq: u16) {
        self.pending[usize::from(irq)] = false;
    }

    fn is_pending(&self, irq: u16) -> bool {
        self.pending[usize::from(irq)]
    }

    fn write_priority(&mut self, irq: u16, raw: u8) {
        self.priorities[usize::from(irq)] = raw;
    }

    fn read_priority(&self, irq: u16) -> u8 {
        self.priorities[usize::from(irq)]
    }

    fn grouping(&self) -> u8 {
        self.grouping
    }

    fn write_grouping(&mut self, grouping: u8) {
        self.grouping = grouping;
    }
}

#[test]
fn priority_fields_follow_the_grouping() {
    assert_eq!(encode_priority(2, 1, 2, 4), 0b0110);
    assert_eq!(decode_priority(2, 0b0110, 4), (1, 2));
    // no preemption bits
    assert_eq!(encode_priority(0, 3, 5, 4), 5);
    assert_eq!(decode_priority(0, 5, 4), (0, 5));
    // groupings past the implemented bits give every bit to preemption
    assert_eq!(encode_priority(4, 9, 1, 3), 1);
    assert_eq!(decode_priority(4, 0b101, 3), (5, 0));
    // fields are truncated
    assert_eq!(encode_priority(2, 7, 7, 4), 0b1111);
}

#[test]
fn controller_shifts_into_the_implemented_bits() {
    let mut nvic = Nvic::new();
    assert_eq!(
        nvic.set_priority_grouping(MAX_GROUPING + 1),
        Err(Error::InvalidGrouping)
    );
    assert_eq!(nvic.grouping, 0);

    nvic.set_priority_grouping(3).unwrap();
    nvic.set_priority(38, 5, 1);
    assert_eq!(nvic.priorities[38], 0b1011_0000);
    assert_eq!(nvic.priority(38), (5, 1));

    nvic.enable(38);
    nvic.set_pending(38);
    assert!(nvic.is_enabled(38) && nvic.is_pending(38));
    nvic.clear_pending(38);
    nvic.disable(38);
    assert!(!nvic.is_enabled(38) && !nvic.is_pending(38));
}

static DISPATCHED: AtomicU32 = AtomicU32::new(0);
static DEFAULTED: AtomicU32 = AtomicU32::new(0);

fn on_line_3() {
    DISPATCHED.fetch_add(1, Ordering::Relaxed);
}

fn fallback() {
    DEFAULTED.fetch_add(1, Ordering::Relaxed);
}

#[test]
fn table_dispatches_registered_handlers() {
    static TABLE: IrqTable<8> = IrqTable::with_default(fallback);

    TABLE.register_handler(3, on_line_3).unwrap();
    assert_eq!(TABLE.register_handler(8, on_line_3), Err(Error::OutOfRange));
    assert!(TABLE.handler(3).is_some());
    assert!(TABLE.handler(100).is_none());

    TABLE.dispatch(3);
    TABLE.dispatch(4);
    assert_eq!(DISPATCHED.load(Ordering::Relaxed), 1);
    assert_eq!(DEFAULTED.load(Ordering::Relaxed), 1);

    assert!(TABLE.unregister(3).unwrap().is_some());
    assert!(TABLE.unregister(3).unwrap().is_none());
    assert!(matches!(TABLE.unregister(9), Err(Error::OutOfRange)));
    TABLE.dispatch(3);
    assert_eq!(DEFAULTED.load(Ordering::Relaxed), 2);
    assert_eq!(Error::OutOfRange.code(), status::FAIL);
}
