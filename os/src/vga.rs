//! VGA text-mode console (80x25 at 0xB8000)
//!
//! Backs the `print!`/`println!` macros and the trap report line.
//! Formatting goes through `core::fmt`, so characters, strings, decimal
//! and `{:#x}` hexadecimal integers all work.

use core::fmt;
use core::ptr::write_volatile;

use spin::Mutex;

const BUFFER_ADDR: usize = 0xB8000;
const WIDTH: usize = 80;
const HEIGHT: usize = 25;

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

const fn attribute(foreground: Color, background: Color) -> u8 {
    (background as u8) << 4 | foreground as u8
}

/// Cursor state over the memory-mapped text buffer
pub struct Console {
    row: usize,
    column: usize,
    attribute: u8,
}

impl Console {
    pub const fn new() -> Self {
        Self {
            row: 0,
            column: 0,
            attribute: attribute(Color::LightGray, Color::Black),
        }
    }

    pub fn set_color(&mut self, foreground: Color, background: Color) {
        self.attribute = attribute(foreground, background);
    }

    fn put(&self, row: usize, column: usize, byte: u8) {
        let cell = (self.attribute as u16) << 8 | byte as u16;
        let buffer = BUFFER_ADDR as *mut u16;
        // SAFETY: row < HEIGHT and column < WIDTH keep the write inside
        // the identity-mapped text buffer.
        unsafe { write_volatile(buffer.add(row * WIDTH + column), cell) };
    }

    fn copy_row(&self, from: usize, to: usize) {
        let buffer = BUFFER_ADDR as *mut u16;
        for column in 0..WIDTH {
            // SAFETY: both rows are inside the text buffer.
            unsafe {
                let cell = buffer.add(from * WIDTH + column).read_volatile();
                write_volatile(buffer.add(to * WIDTH + column), cell);
            }
        }
    }

    fn clear_row(&self, row: usize) {
        for column in 0..WIDTH {
            self.put(row, column, b' ');
        }
    }

    pub fn clear(&mut self) {
        for row in 0..HEIGHT {
            self.clear_row(row);
        }
        self.row = 0;
        self.column = 0;
    }

    fn new_line(&mut self) {
        self.column = 0;
        if self.row + 1 < HEIGHT {
            self.row += 1;
            return;
        }
        for row in 1..HEIGHT {
            self.copy_row(row, row - 1);
        }
        self.clear_row(HEIGHT - 1);
    }

    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            b'\r' => self.column = 0,
            byte => {
                if self.column >= WIDTH {
                    self.new_line();
                }
                // Outside printable ASCII the code page would show garbage.
                let byte = if (0x20..0x7F).contains(&byte) { byte } else { 0xFE };
                self.put(self.row, self.column, byte);
                self.column += 1;
            }
        }
    }
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}

pub static CONSOLE: Mutex<Console> = Mutex::new(Console::new());

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    use fmt::Write;
    let _ = CONSOLE.lock().write_fmt(args);
}

/// Report-line sink for the trap path
///
/// A trap can land while the console is locked; the line is dropped
/// rather than spinning on a lock nobody will release.
pub fn print_from_trap(args: fmt::Arguments<'_>) {
    use fmt::Write;
    if let Some(mut console) = CONSOLE.try_lock() {
        let _ = console.write_fmt(args);
    }
}

/// Write from the panic handler, whoever held the console
///
/// # Safety
/// Interrupts must be disabled and no other code may run afterwards.
pub unsafe fn print_panicking(args: fmt::Arguments<'_>) {
    use fmt::Write;
    // SAFETY: the caller guarantees the previous holder never resumes.
    unsafe { CONSOLE.force_unlock() };
    let mut console = CONSOLE.lock();
    console.set_color(Color::White, Color::Red);
    let _ = console.write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::vga::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n")
    };
    ($($arg:tt)*) => {
        $crate::print!("{}\n", format_args!($($arg)*))
    };
}
