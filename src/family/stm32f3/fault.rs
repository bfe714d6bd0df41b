//! Spinning fault handlers

use core::sync::atomic::{compiler_fence, Ordering};

use cortex_m_rt::{exception, ExceptionFrame};

#[exception]
unsafe fn HardFault(frame: &ExceptionFrame) -> ! {
    error!("hard fault at {=u32:#010x}", frame.pc());
    loop {
        compiler_fence(Ordering::SeqCst);
    }
}

#[exception]
unsafe fn DefaultHandler(irqn: i16) {
    // kept alive for the debugger
    let vector = core::hint::black_box(irqn);
    error!("unhandled exception {=i16}", vector);
    loop {
        compiler_fence(Ordering::SeqCst);
    }
}
