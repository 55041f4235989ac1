//! Interrupt descriptor table and timer interrupt wiring.
//!
//! The table maps each of the 256 interrupt vectors to a gate descriptor.
//! Only the remapped timer vector gets a real handler; every other entry
//! stays the all-zero "not present" sentinel so a stray interrupt faults
//! instead of jumping into garbage.

use crate::hal::Hardware;
use crate::pic::ChainedPics;

pub const IDT_ENTRIES: usize = 256;

/// Hardware IRQs start right above the 32 processor-reserved vectors.
pub const PIC_1_OFFSET: u8 = 0x20;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

/// Flat kernel code segment installed by the stage-2 loader.
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;

/// 32-bit interrupt gate (clears IF on entry).
const GATE_INTERRUPT: u8 = 0x0E;
/// Present bit; DPL bits stay zero (ring 0 only).
const GATE_PRESENT: u8 = 0x80;
/// Gate flags used for every handler this kernel installs.
pub const INTERRUPT_GATE_FLAGS: u8 = GATE_PRESENT | GATE_INTERRUPT;

/// The controller pair, remapped to `0x20..0x30`.
///
/// Not behind a lock: the offsets are immutable after construction and the
/// interrupt path must be able to acknowledge without waiting on anyone.
pub static PICS: ChainedPics = ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET);

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_usize(self) -> usize {
        usize::from(self.as_u8())
    }
}

/// One protected-mode gate descriptor.
///
/// Layout contract: the handler address is split into 16-bit low/high
/// halves around the selector and attribute bytes, exactly as the processor
/// reads it. Do not reorder fields.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    /// The not-present sentinel: address 0, selector 0, flags 0.
    pub const fn missing() -> Self {
        IdtEntry {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn new(handler: u32, selector: u16, flags: u8) -> Self {
        IdtEntry {
            offset_low: (handler & 0xFFFF) as u16,
            selector,
            zero: 0,
            type_attr: flags,
            offset_high: (handler >> 16) as u16,
        }
    }

    /// Recombine the stored address halves.
    pub fn handler_addr(&self) -> u32 {
        let low = self.offset_low;
        let high = self.offset_high;
        (high as u32) << 16 | low as u32
    }

    pub fn selector(&self) -> u16 {
        self.selector
    }

    pub fn flags(&self) -> u8 {
        self.type_attr
    }

    pub fn is_present(&self) -> bool {
        self.type_attr & GATE_PRESENT != 0
    }

    /// Still the untouched sentinel?
    pub fn is_missing(&self) -> bool {
        let IdtEntry {
            offset_low,
            selector,
            zero,
            type_attr,
            offset_high,
        } = *self;
        offset_low == 0 && selector == 0 && zero == 0 && type_attr == 0 && offset_high == 0
    }
}

/// The full 256-entry table.
pub struct InterruptDescriptorTable {
    entries: [IdtEntry; IDT_ENTRIES],
}

impl InterruptDescriptorTable {
    pub const fn new() -> Self {
        InterruptDescriptorTable {
            entries: [IdtEntry::missing(); IDT_ENTRIES],
        }
    }

    /// Install one gate, overwriting whatever was at that vector.
    ///
    /// The `u8` vector makes out-of-range indices unrepresentable. Must not
    /// be called concurrently with the table being loaded.
    pub fn set_gate(&mut self, vector: u8, handler: u32, selector: u16, flags: u8) {
        self.entries[vector as usize] = IdtEntry::new(handler, selector, flags);
    }

    /// Zero every entry back to the not-present sentinel.
    pub fn reset(&mut self) {
        self.entries = [IdtEntry::missing(); IDT_ENTRIES];
    }

    pub fn entry(&self, vector: u8) -> IdtEntry {
        self.entries[vector as usize]
    }

    /// Publish the table to the processor.
    ///
    /// The byte limit is `entry size * 256 - 1` per the descriptor-table
    /// pointer convention. The table must stay at this address for as long
    /// as it is installed; the kernel's instance lives in a static.
    pub fn load<B: Hardware>(&self, bus: &mut B) {
        let limit = (core::mem::size_of::<IdtEntry>() * IDT_ENTRIES - 1) as u16;
        let base = self.entries.as_ptr() as usize;
        bus.load_idt(limit, base);
    }
}

/// Bring up interrupt delivery, in the only safe order.
///
/// Zero the whole table, remap the controllers, install the timer gate,
/// load the table, and only then set the interrupt flag. Any permutation
/// risks dispatching through a half-built table. Callers must have the
/// scheduler initialized before this returns: the first tick can preempt
/// immediately after the final step.
pub fn install<B: Hardware>(
    bus: &mut B,
    idt: &mut InterruptDescriptorTable,
    pics: &ChainedPics,
    timer_handler: u32,
) {
    idt.reset();
    pics.initialize(bus);
    idt.set_gate(
        InterruptIndex::Timer.as_u8(),
        timer_handler,
        KERNEL_CODE_SELECTOR,
        INTERRUPT_GATE_FLAGS,
    );
    idt.load(bus);
    bus.enable_interrupts();
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
static IDT: spin::Mutex<InterruptDescriptorTable> =
    spin::Mutex::new(InterruptDescriptorTable::new());

/// Build and install the kernel's IDT, then enable interrupts.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init() {
    let mut bus = unsafe { crate::hal::X86::new() };
    let mut idt = IDT.lock();
    // タイマーハンドラはIDTをロックしない。stiの直後にティックが来ても
    // このガードとは競合しない
    install(
        &mut bus,
        &mut idt,
        &PICS,
        timer_interrupt_trampoline as *const () as u32,
    );
}

/// Timer interrupt entry.
///
/// Saves the full register set onto the interrupted task's stack, hands the
/// resulting stack pointer to the Rust tick handler, and restores whatever
/// stack pointer it returns. Switching stacks here is what switches tasks;
/// the pop/iret path is identical whether or not a switch happened.
#[cfg(all(target_arch = "x86", target_os = "none"))]
#[unsafe(naked)]
pub unsafe extern "C" fn timer_interrupt_trampoline() {
    core::arch::naked_asm!(
        // CPUは既にEFLAGS/CS/EIPを積んでいる。残りの汎用レジスタを積む
        "pushad",
        // 引数: 保存し終えたスタックのトップ
        "push esp",
        "call {tick}",
        "add esp, 4",
        // 返り値 = 次のタスクの保存スタックポインタ
        "mov esp, eax",
        "popad",
        "iretd",
        tick = sym crate::task::handle_timer_tick,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::recording::{Event, Recorder};
    use crate::pic::{PIC_1_DATA, PIC_2_DATA};

    #[test]
    fn gate_descriptors_are_eight_bytes() {
        assert_eq!(core::mem::size_of::<IdtEntry>(), 8);
    }

    #[test]
    fn a_new_table_is_all_sentinels() {
        let idt = InterruptDescriptorTable::new();
        for vector in 0..=255u8 {
            assert!(idt.entry(vector).is_missing(), "vector {}", vector);
        }
    }

    #[test]
    fn gate_addresses_round_trip() {
        let mut idt = InterruptDescriptorTable::new();
        for &addr in &[0u32, 0x0000_FFFF, 0xFFFF_0000, 0x1234_5678, 0xFFFF_FFFF] {
            idt.set_gate(0x20, addr, KERNEL_CODE_SELECTOR, INTERRUPT_GATE_FLAGS);
            let entry = idt.entry(0x20);
            assert_eq!(entry.handler_addr(), addr);
            assert_eq!(entry.selector(), KERNEL_CODE_SELECTOR);
            assert_eq!(entry.flags(), INTERRUPT_GATE_FLAGS);
        }
    }

    #[test]
    fn set_gate_overwrites_the_previous_descriptor() {
        let mut idt = InterruptDescriptorTable::new();
        idt.set_gate(0x21, 0x1111_1111, 0x08, INTERRUPT_GATE_FLAGS);
        idt.set_gate(0x21, 0x2222_2222, 0x10, INTERRUPT_GATE_FLAGS);
        let entry = idt.entry(0x21);
        assert_eq!(entry.handler_addr(), 0x2222_2222);
        assert_eq!(entry.selector(), 0x10);
    }

    #[test]
    fn reset_restores_every_sentinel() {
        let mut idt = InterruptDescriptorTable::new();
        idt.set_gate(0x00, 0xdead_beef, 0x08, INTERRUPT_GATE_FLAGS);
        idt.set_gate(0xFF, 0xdead_beef, 0x08, INTERRUPT_GATE_FLAGS);
        idt.reset();
        assert!(idt.entry(0x00).is_missing());
        assert!(idt.entry(0xFF).is_missing());
    }

    #[test]
    fn load_publishes_limit_and_base() {
        let idt = InterruptDescriptorTable::new();
        let mut bus = Recorder::new();
        idt.load(&mut bus);

        assert_eq!(
            bus.events,
            vec![Event::LoadIdt {
                limit: 8 * 256 - 1,
                base: &idt.entries as *const _ as usize,
            }]
        );
    }

    #[test]
    fn bring_up_leaves_only_the_timer_gate_installed() {
        let mut bus = Recorder::new();
        let mut idt = InterruptDescriptorTable::new();
        let pics = ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET);

        install(&mut bus, &mut idt, &pics, 0x0010_2030);
        crate::timer::configure(&mut bus, 100).unwrap();

        for vector in 0..=255u8 {
            if vector == InterruptIndex::Timer.as_u8() {
                assert!(idt.entry(vector).is_present());
            } else {
                assert!(idt.entry(vector).is_missing(), "vector {}", vector);
            }
        }
        let gate = idt.entry(InterruptIndex::Timer.as_u8());
        assert_eq!(gate.handler_addr(), 0x0010_2030);
        assert_eq!(gate.selector(), KERNEL_CODE_SELECTOR);
        assert_eq!(gate.flags(), INTERRUPT_GATE_FLAGS);

        // Both controllers got their vector offsets (ICW2 is the write to
        // each data port right after the init command).
        let writes = bus.port_writes();
        assert_eq!(writes[2], (PIC_1_DATA, PIC_1_OFFSET));
        assert_eq!(writes[3], (PIC_2_DATA, PIC_2_OFFSET));
    }

    #[test]
    fn interrupts_are_enabled_strictly_last() {
        let mut bus = Recorder::new();
        let mut idt = InterruptDescriptorTable::new();
        let pics = ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET);

        install(&mut bus, &mut idt, &pics, 0xCAFE_0000);

        assert_eq!(bus.events.last(), Some(&Event::EnableInterrupts));
        let enable_at = bus.events.len() - 1;
        let load_at = bus
            .events
            .iter()
            .position(|e| matches!(e, Event::LoadIdt { .. }))
            .expect("table was never loaded");
        assert!(load_at < enable_at);
        assert!(
            bus.events[..enable_at]
                .iter()
                .all(|e| !matches!(e, Event::EnableInterrupts)),
            "interrupts were enabled mid-sequence"
        );
    }
}
