#![cfg_attr(not(test), no_std)]

//! tickos: a minimal preemptive kernel core.
//!
//! Two-plus kernel tasks round-robin scheduled from the PIT timer interrupt.
//! Everything hardware-specific sits behind [`hal::Hardware`]; the rest of
//! the crate builds and tests on the host.

#[macro_use]
pub mod vga_buffer;
#[macro_use]
pub mod serial;

pub mod error;
pub mod hal;
pub mod interrupts;
pub mod memory;
pub mod pic;
pub mod task;
pub mod timer;

/// Bring the machine into the ticking steady state.
///
/// The scheduler must already hold the boot task and the rest of the boot
/// task set: the first timer interrupt can fire the moment the final step
/// of the interrupt bring-up sets the interrupt flag.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init() {
    let mut bus = unsafe { hal::X86::new() };

    timer::configure(&mut bus, timer::TICK_HZ).expect("PIT rejected the boot tick rate");
    serial_println!("timer: {} Hz tick", timer::TICK_HZ);

    // IDT構築 → PICリマップ → ゲート設置 → lidt → sti の順。ここから先は
    // 割り込み駆動
    interrupts::init();
    serial_println!("interrupts: vector {:#x} live", interrupts::InterruptIndex::Timer.as_u8());
}

/// Idle forever; every wakeup is an interrupt having been serviced.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn hlt_loop() -> ! {
    loop {
        hal::halt();
    }
}
