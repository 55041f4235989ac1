//! 8259 Programmable Interrupt Controller pair.
//!
//! The two cascaded controllers power up mapped over the processor's
//! reserved exception vectors, so before interrupts can be enabled they are
//! reprogrammed to a free vector range. The initialization command words
//! must be issued in the exact order the chips' internal state machine
//! expects; per stage the master is written before the slave.

use crate::hal::Hardware;

pub const PIC_1_COMMAND: u16 = 0x20;
pub const PIC_1_DATA: u16 = 0x21;
pub const PIC_2_COMMAND: u16 = 0xA0;
pub const PIC_2_DATA: u16 = 0xA1;

/// ICW1: begin initialization, ICW4 will follow.
const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;
/// ICW3 (master): bitmask of the line the slave is cascaded on (IRQ2).
const ICW3_MASTER_CASCADE: u8 = 0x04;
/// ICW3 (slave): its cascade identity.
const ICW3_SLAVE_IDENTITY: u8 = 0x02;
/// ICW4: 8086/88 mode.
const ICW4_8086: u8 = 0x01;
/// OCW2: non-specific end of interrupt.
const CMD_END_OF_INTERRUPT: u8 = 0x20;

/// Each controller serves eight lines.
const LINES_PER_PIC: u8 = 8;

/// The cascaded master/slave controller pair.
///
/// Holds nothing but the two vector offsets, fixed at construction; every
/// method takes `&self` plus the bus, so acknowledging an interrupt from the
/// handler never has to take a lock.
pub struct ChainedPics {
    master_offset: u8,
    slave_offset: u8,
}

impl ChainedPics {
    pub const fn new(master_offset: u8, slave_offset: u8) -> Self {
        ChainedPics {
            master_offset,
            slave_offset,
        }
    }

    /// Remap both controllers to their configured vector offsets and unmask
    /// every line.
    ///
    /// Must run before the interrupt flag is ever set; the sequence leaves
    /// the chips briefly in an inconsistent state.
    pub fn initialize<B: Hardware>(&self, bus: &mut B) {
        // ICW1: 初期化開始、ICW4あり
        bus.write_port8(PIC_1_COMMAND, ICW1_INIT | ICW1_ICW4);
        bus.write_port8(PIC_2_COMMAND, ICW1_INIT | ICW1_ICW4);

        // ICW2: ベクタオフセット
        bus.write_port8(PIC_1_DATA, self.master_offset);
        bus.write_port8(PIC_2_DATA, self.slave_offset);

        // ICW3: カスケード配線
        bus.write_port8(PIC_1_DATA, ICW3_MASTER_CASCADE);
        bus.write_port8(PIC_2_DATA, ICW3_SLAVE_IDENTITY);

        // ICW4: 8086モード
        bus.write_port8(PIC_1_DATA, ICW4_8086);
        bus.write_port8(PIC_2_DATA, ICW4_8086);

        // 全ラインのマスクを外す
        bus.write_port8(PIC_1_DATA, 0x00);
        bus.write_port8(PIC_2_DATA, 0x00);
    }

    /// Does the given interrupt vector belong to one of the two controllers?
    pub fn handles_interrupt(&self, vector: u8) -> bool {
        self.master_handles(vector) || self.slave_handles(vector)
    }

    /// Acknowledge a serviced interrupt.
    ///
    /// Must be sent exactly once per serviced hardware interrupt or the
    /// controller stops delivering that line. A slave-originated interrupt
    /// is acknowledged on both chips; the master sees it as cascade traffic
    /// on IRQ2.
    pub fn notify_end_of_interrupt<B: Hardware>(&self, bus: &mut B, vector: u8) {
        if self.slave_handles(vector) {
            bus.write_port8(PIC_2_COMMAND, CMD_END_OF_INTERRUPT);
        }
        bus.write_port8(PIC_1_COMMAND, CMD_END_OF_INTERRUPT);
    }

    fn master_handles(&self, vector: u8) -> bool {
        vector >= self.master_offset && vector < self.master_offset + LINES_PER_PIC
    }

    fn slave_handles(&self, vector: u8) -> bool {
        vector >= self.slave_offset && vector < self.slave_offset + LINES_PER_PIC
    }
}
