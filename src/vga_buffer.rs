//! VGA text-mode driver.
//!
//! An 80x25 character sink over the memory-mapped text buffer. The cursor
//! walks down the screen and the whole buffer scrolls up one row when it
//! runs past the bottom. All buffer accesses are volatile; the display
//! hardware reads this memory behind the compiler's back.

use core::fmt;

use volatile::Volatile;

const BUFFER_HEIGHT: usize = 25;
const BUFFER_WIDTH: usize = 80;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

/// Foreground/background pair packed into the attribute byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ColorCode(u8);

impl ColorCode {
    pub const fn new(foreground: Color, background: Color) -> ColorCode {
        ColorCode((background as u8) << 4 | (foreground as u8))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ScreenChar {
    pub ascii_character: u8,
    pub color_code: ColorCode,
}

#[repr(transparent)]
pub struct Buffer {
    chars: [[Volatile<ScreenChar>; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

/// Character sink over a text buffer.
pub struct Writer {
    column_position: usize,
    row_position: usize,
    color_code: ColorCode,
    buffer: &'static mut Buffer,
}

impl Writer {
    pub fn new(buffer: &'static mut Buffer) -> Writer {
        Writer {
            column_position: 0,
            row_position: 0,
            color_code: ColorCode::new(Color::LightGray, Color::Black),
            buffer,
        }
    }

    /// Write one byte at the cursor, advancing and scrolling as needed.
    pub fn write_byte(&mut self, byte: u8) {
        if byte == b'\n' {
            self.column_position = 0;
            self.row_position += 1;
        } else {
            self.buffer.chars[self.row_position][self.column_position].write(ScreenChar {
                ascii_character: byte,
                color_code: self.color_code,
            });
            self.column_position += 1;
        }

        if self.column_position >= BUFFER_WIDTH {
            self.column_position = 0;
            self.row_position += 1;
        }

        if self.row_position >= BUFFER_HEIGHT {
            self.scroll_up();
            self.row_position = BUFFER_HEIGHT - 1;
        }
    }

    pub fn write_string(&mut self, s: &str) {
        for byte in s.bytes() {
            match byte {
                // 印字可能なASCIIか改行
                0x20..=0x7e | b'\n' => self.write_byte(byte),
                _ => self.write_byte(0xfe),
            }
        }
    }

    /// Blank the whole screen and park the cursor at the top left.
    pub fn clear_screen(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            self.blank_row(row);
        }
        self.column_position = 0;
        self.row_position = 0;
    }

    /// Move every row up by one and blank the last row.
    fn scroll_up(&mut self) {
        for row in 1..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                let character = self.buffer.chars[row][col].read();
                self.buffer.chars[row - 1][col].write(character);
            }
        }
        self.blank_row(BUFFER_HEIGHT - 1);
    }

    fn blank_row(&mut self, row: usize) {
        let blank = ScreenChar {
            ascii_character: b' ',
            color_code: self.color_code,
        };
        for col in 0..BUFFER_WIDTH {
            self.buffer.chars[row][col].write(blank);
        }
    }

    #[cfg(test)]
    fn char_at(&self, row: usize, col: usize) -> ScreenChar {
        self.buffer.chars[row][col].read()
    }
}

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s);
        Ok(())
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
lazy_static::lazy_static! {
    /// The screen, as a global character sink.
    pub static ref WRITER: spin::Mutex<Writer> =
        spin::Mutex::new(Writer::new(unsafe { &mut *(0xb8000 as *mut Buffer) }));
}

/// Prints to the VGA text buffer.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::vga_buffer::_print(format_args!($($arg)*)));
}

/// Prints to the VGA text buffer, adding a newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

#[doc(hidden)]
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;

    // ロック保持中にタイマーハンドラへ飛ばないように
    crate::hal::without_interrupts(|| {
        WRITER
            .lock()
            .write_fmt(args)
            .expect("Printing to the VGA buffer failed");
    });
}

/// Blank the screen via the global writer.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn clear_screen() {
    crate::hal::without_interrupts(|| {
        WRITER.lock().clear_screen();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    fn test_writer() -> Writer {
        let buffer = Box::leak(Box::new(unsafe { core::mem::zeroed::<Buffer>() }));
        Writer::new(buffer)
    }

    #[test]
    fn bytes_land_at_the_cursor() {
        let mut writer = test_writer();
        writer.write_byte(b'A');
        writer.write_byte(b'B');

        assert_eq!(writer.char_at(0, 0).ascii_character, b'A');
        assert_eq!(writer.char_at(0, 1).ascii_character, b'B');
    }

    #[test]
    fn newline_moves_to_the_next_row() {
        let mut writer = test_writer();
        writer.write_string("ab\ncd");

        assert_eq!(writer.char_at(0, 0).ascii_character, b'a');
        assert_eq!(writer.char_at(1, 0).ascii_character, b'c');
        assert_eq!(writer.char_at(1, 1).ascii_character, b'd');
    }

    #[test]
    fn long_lines_wrap_at_the_right_edge() {
        let mut writer = test_writer();
        for _ in 0..BUFFER_WIDTH {
            writer.write_byte(b'x');
        }
        writer.write_byte(b'y');

        assert_eq!(writer.char_at(0, BUFFER_WIDTH - 1).ascii_character, b'x');
        assert_eq!(writer.char_at(1, 0).ascii_character, b'y');
    }

    #[test]
    fn writing_past_the_bottom_scrolls_the_screen() {
        let mut writer = test_writer();
        for i in 0..BUFFER_HEIGHT {
            writer.write_string("line");
            writer.write_byte(b'0' + (i % 10) as u8);
            writer.write_byte(b'\n');
        }

        // Row 0 ("line0") scrolled off; row 0 now holds "line1".
        assert_eq!(writer.char_at(0, 4).ascii_character, b'1');
        // The freed bottom row is blank.
        for col in 0..BUFFER_WIDTH {
            assert_eq!(
                writer.char_at(BUFFER_HEIGHT - 1, col).ascii_character,
                b' '
            );
        }
    }

    #[test]
    fn clear_screen_blanks_everything_and_resets_the_cursor() {
        let mut writer = test_writer();
        writer.write_string("some text\nmore text");
        writer.clear_screen();

        for row in 0..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                assert_eq!(writer.char_at(row, col).ascii_character, b' ');
            }
        }

        writer.write_byte(b'Z');
        assert_eq!(writer.char_at(0, 0).ascii_character, b'Z');
    }

    #[test]
    fn formatted_output_goes_through_fmt_write() {
        let mut writer = test_writer();
        write!(writer, "tick {}", 42).unwrap();

        let expected = b"tick 42";
        for (i, &byte) in expected.iter().enumerate() {
            assert_eq!(writer.char_at(0, i).ascii_character, byte);
        }
    }

    #[test]
    fn unprintable_bytes_are_replaced() {
        let mut writer = test_writer();
        writer.write_string("\u{7}");
        assert_eq!(writer.char_at(0, 0).ascii_character, 0xfe);
    }
}
