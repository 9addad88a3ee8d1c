//! `log` backend writing to the serial port
//!
//! Records are also emitted from the trap path, which can interrupt code
//! that is in the middle of writing one. The logger therefore never waits
//! for the port: a record that finds it busy is dropped and counted.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU32, Ordering};

use log::{Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

use crate::config;
use crate::serial::{SerialPort, COM1};

/// Logger over any text port guarded by a spin lock
pub struct PortLogger<W: 'static> {
    port: &'static Mutex<W>,
    dropped: AtomicU32,
}

impl<W: 'static> PortLogger<W> {
    pub const fn new(port: &'static Mutex<W>) -> Self {
        Self {
            port,
            dropped: AtomicU32::new(0),
        }
    }

    /// Records lost because the port was held when they arrived
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<W: Write + Send + 'static> Log for PortLogger<W> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(mut port) = self.port.try_lock() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let _ = write_record(&mut *port, record);
        drop(port);

        if config::MIRROR_LOG_TO_CONSOLE {
            crate::vga::print_from_trap(format_args!("[{}] {}\n", record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}

fn write_record(out: &mut dyn Write, record: &Record) -> fmt::Result {
    writeln!(
        out,
        "[{:<5}] {}: {}",
        record.level(),
        record.target(),
        record.args()
    )
}

static LOGGER: PortLogger<SerialPort> = PortLogger::new(&COM1);

/// Install the serial logger at the configured level
pub fn init() -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(config::LOG_LEVEL);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpu::frame::GeneralRegisters;
    use cpu::{TrapFrame, TrapOutcome};
    use log::Level;

    static PORT: Mutex<String> = Mutex::new(String::new());
    static TEST_LOGGER: PortLogger<String> = PortLogger::new(&PORT);

    fn nmi_frame() -> TrapFrame {
        TrapFrame {
            ds: 0x10,
            regs: GeneralRegisters::default(),
            vector: 2,
            error_code: 0,
            eip: 0x0010_2000,
            cs: 0x08,
            eflags: 0x202,
            user_esp: 0,
            user_ss: 0,
        }
    }

    #[test]
    fn record_format() {
        let mut out = String::new();
        write_record(
            &mut out,
            &Record::builder()
                .args(format_args!("GDT loaded"))
                .level(Level::Info)
                .target("cpu::gdt")
                .build(),
        )
        .unwrap();
        assert_eq!(out, "[INFO ] cpu::gdt: GDT loaded\n");
    }

    #[test]
    fn trap_while_port_is_held_drops_instead_of_spinning() {
        log::set_logger(&TEST_LOGGER).unwrap();
        log::set_max_level(log::LevelFilter::Trace);

        let held = PORT.lock();
        // Reporting an NMI logs; it must come back with the port still held.
        assert_eq!(cpu::report::report_trap(&mut nmi_frame()), TrapOutcome::Resume);
        assert!(TEST_LOGGER.dropped() > 0);
        drop(held);

        let dropped = TEST_LOGGER.dropped();
        assert_eq!(cpu::report::report_trap(&mut nmi_frame()), TrapOutcome::Resume);
        assert_eq!(TEST_LOGGER.dropped(), dropped);
        assert!(PORT.lock().contains("Non-Maskable Interrupt (NMI)"));
    }
}
