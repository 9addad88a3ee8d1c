//! 16550 UART driver for the kernel log (COM1 by default)

use core::arch::asm;
use core::fmt;

use spin::Mutex;

use crate::config::SERIAL_PORT;

// === Register offsets ===
const DATA: u16 = 0;
const INTERRUPT_ENABLE: u16 = 1;
const FIFO_CONTROL: u16 = 2;
const LINE_CONTROL: u16 = 3;
const MODEM_CONTROL: u16 = 4;
const LINE_STATUS: u16 = 5;

const LCR_DLAB: u8 = 0x80;
const LCR_8N1: u8 = 0x03;
const FCR_ENABLE_CLEAR_14: u8 = 0xC7;
const MCR_DTR_RTS_OUT2: u8 = 0x0B;
const LSR_THR_EMPTY: u8 = 0x20;

/// 115200 / 3 = 38400 baud
const DIVISOR: u16 = 3;

unsafe fn outb(port: u16, value: u8) {
    unsafe {
        asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
    }
}

unsafe fn inb(port: u16) -> u8 {
    let value: u8;
    unsafe {
        asm!("in al, dx", in("dx") port, out("al") value, options(nomem, nostack, preserves_flags));
    }
    value
}

/// One UART, addressed by its I/O base
pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    pub const fn new(base: u16) -> Self {
        Self { base }
    }

    /// Program 38400 baud, 8N1, FIFOs on, UART interrupts off
    pub fn init(&mut self) {
        // SAFETY: writes only to the UART's own register block.
        unsafe {
            outb(self.base + INTERRUPT_ENABLE, 0x00);
            outb(self.base + LINE_CONTROL, LCR_DLAB);
            outb(self.base + DATA, (DIVISOR & 0xFF) as u8);
            outb(self.base + INTERRUPT_ENABLE, (DIVISOR >> 8) as u8);
            outb(self.base + LINE_CONTROL, LCR_8N1);
            outb(self.base + FIFO_CONTROL, FCR_ENABLE_CLEAR_14);
            outb(self.base + MODEM_CONTROL, MCR_DTR_RTS_OUT2);
        }
    }

    fn transmit_empty(&self) -> bool {
        // SAFETY: reading the line status register has no side effects.
        unsafe { inb(self.base + LINE_STATUS) & LSR_THR_EMPTY != 0 }
    }

    /// Send one byte, spinning until the holding register is free
    pub fn write_byte(&mut self, byte: u8) {
        while !self.transmit_empty() {
            core::hint::spin_loop();
        }
        // SAFETY: the holding register is empty.
        unsafe { outb(self.base + DATA, byte) }
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

/// The log port
pub static COM1: Mutex<SerialPort> = Mutex::new(SerialPort::new(SERIAL_PORT));

/// Initialise the log port. Call once at boot, before the logger.
pub fn init() {
    COM1.lock().init();
}

/// Write from the panic handler, whoever held the port
///
/// # Safety
/// Interrupts must be disabled and no other code may run afterwards.
pub unsafe fn write_fmt_panicking(args: fmt::Arguments<'_>) {
    use fmt::Write;
    // SAFETY: the caller guarantees the previous holder never resumes.
    unsafe { COM1.force_unlock() };
    let _ = COM1.lock().write_fmt(args);
}
