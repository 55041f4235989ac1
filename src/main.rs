#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

//! Kernel entry point: wire the subsystems together, then idle.

#[cfg(all(target_arch = "x86", target_os = "none"))]
use core::panic::PanicInfo;

/// Stack the stage-2 loader runs us on; adopted as task 0.
#[cfg(all(target_arch = "x86", target_os = "none"))]
const BOOT_STACK_TOP: usize = 0x9_0000;
#[cfg(all(target_arch = "x86", target_os = "none"))]
const BOOT_STACK_SIZE: usize = 0x4000;

/// Stack carved out of the kernel heap for the second task.
#[cfg(all(target_arch = "x86", target_os = "none"))]
const TASK_STACK_SIZE: usize = 4096;

/// The second schedulable context. Runs between ticks of the boot task and
/// reports that it is alive once in a while.
#[cfg(all(target_arch = "x86", target_os = "none"))]
extern "C" fn demo_task() -> ! {
    let mut wakeups: u64 = 0;
    loop {
        wakeups += 1;
        if wakeups % 500 == 0 {
            tickos::println!("task B alive ({} wakeups)", wakeups);
        }
        tickos::hal::halt();
    }
}

/// Register the boot task set. Must complete before interrupts are enabled;
/// the first tick already performs a switch.
#[cfg(all(target_arch = "x86", target_os = "none"))]
fn init_tasks() {
    use tickos::memory::{ALLOCATOR, DEFAULT_ALIGN};
    use tickos::task::scheduler::SCHEDULER;
    use tickos::task::Task;

    let mut sched = SCHEDULER.lock();

    let boot = Task::from_boot_context(BOOT_STACK_TOP - BOOT_STACK_SIZE, BOOT_STACK_SIZE)
        .expect("boot stack region is invalid");
    sched.adopt_boot_task(boot).expect("boot task already installed");

    // スタック確保に失敗したらブート続行不可
    let stack_base = ALLOCATOR
        .lock()
        .allocate(TASK_STACK_SIZE, DEFAULT_ALIGN)
        .expect("out of memory for the demo task stack");
    let task = unsafe { Task::new(stack_base, TASK_STACK_SIZE, demo_task) }
        .expect("demo task stack rejected");
    sched.add_task(task).expect("task arena full at boot");
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
#[unsafe(no_mangle)]
pub extern "C" fn kernel_main() -> ! {
    tickos::vga_buffer::clear_screen();
    tickos::println!("tickos {}", env!("CARGO_PKG_VERSION"));

    init_tasks();
    tickos::init();

    tickos::println!("steady state: ticking at {} Hz", tickos::timer::TICK_HZ);
    tickos::hlt_loop();
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    use tickos::hal::Hardware;

    tickos::println!("{}", info);
    tickos::serial_println!("{}", info);

    // これ以上スケジュールさせない
    let mut bus = unsafe { tickos::hal::X86::new() };
    bus.disable_interrupts();
    tickos::hlt_loop();
}

#[cfg(not(target_os = "none"))]
fn main() {
    // The kernel only runs on bare metal; building the binary for a hosted
    // target is a compile check.
}
