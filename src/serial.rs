//! Serial port driver for debug output.
//!
//! A minimal 16550 driver on top of the hardware bus. Under QEMU, pass
//! `-serial stdio` to see the kernel's log lines on the host.

use core::fmt;

use crate::hal::Hardware;

/// Standard COM1 base port address.
pub const COM1_PORT: u16 = 0x3F8;

/// Register offsets from the base port.
const DATA_REGISTER: u16 = 0;
const INTERRUPT_ENABLE: u16 = 1;
const FIFO_CONTROL: u16 = 2;
const LINE_CONTROL: u16 = 3;
const MODEM_CONTROL: u16 = 4;
const LINE_STATUS: u16 = 5;

/// Line status: transmitter holding register empty.
const LINE_STATUS_THRE: u8 = 0x20;

/// A UART behind some hardware bus.
pub struct SerialPort<B: Hardware> {
    bus: B,
    base: u16,
}

impl<B: Hardware> SerialPort<B> {
    /// # Safety
    ///
    /// `base` must be the base address of a real serial device; the driver
    /// programs the seven registers above it unchecked.
    pub const unsafe fn new(bus: B, base: u16) -> Self {
        SerialPort { bus, base }
    }

    /// Configure 115200 baud, 8 data bits, no parity, one stop bit.
    pub fn init(&mut self) {
        // 割り込みは使わない。ポーリングのみ
        self.bus.write_port8(self.base + INTERRUPT_ENABLE, 0x00);
        // DLABを立てて分周比をセット (1 = 115200baud)
        self.bus.write_port8(self.base + LINE_CONTROL, 0x80);
        self.bus.write_port8(self.base + DATA_REGISTER, 0x01);
        self.bus.write_port8(self.base + INTERRUPT_ENABLE, 0x00);
        // 8N1、DLABクリア
        self.bus.write_port8(self.base + LINE_CONTROL, 0x03);
        // FIFO有効化・クリア、しきい値14バイト
        self.bus.write_port8(self.base + FIFO_CONTROL, 0xC7);
        // RTS/DSR
        self.bus.write_port8(self.base + MODEM_CONTROL, 0x0B);
    }

    fn is_transmit_empty(&mut self) -> bool {
        self.bus.read_port8(self.base + LINE_STATUS) & LINE_STATUS_THRE != 0
    }

    /// Write one byte, spinning until the transmitter has room.
    pub fn write_byte(&mut self, byte: u8) {
        while !self.is_transmit_empty() {
            core::hint::spin_loop();
        }
        self.bus.write_port8(self.base + DATA_REGISTER, byte);
    }
}

impl<B: Hardware> fmt::Write for SerialPort<B> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            // LFはCRLFにしてログファイルでも行が揃うように
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
lazy_static::lazy_static! {
    pub static ref SERIAL1: spin::Mutex<SerialPort<crate::hal::X86>> = {
        let mut serial_port =
            unsafe { SerialPort::new(crate::hal::X86::new(), COM1_PORT) };
        serial_port.init();
        spin::Mutex::new(serial_port)
    };
}

#[doc(hidden)]
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;

    crate::hal::without_interrupts(|| {
        SERIAL1
            .lock()
            .write_fmt(args)
            .expect("Printing to serial failed");
    });
}

/// Prints to the host through the serial interface.
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*));
    };
}

/// Prints to the host through the serial interface, adding a newline.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => {
        $crate::serial_print!(
            concat!($fmt, "\n"),
            $($arg)*
        )
    };
}
