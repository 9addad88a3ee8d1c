//! Default trap handler: report the vector and decide from the catalogue
//!
//! The report line goes to a text sink installed by the kernel with
//! [`set_output`]. Everything beyond that line (names, decoded error
//! codes, the register dump) goes through `log`.

use core::fmt::{self, Write};

use spin::Once;

use crate::dispatch::TrapOutcome;
use crate::frame::TrapFrame;

/// Text sink for report lines, typically the console's `print!` backend
pub type OutputFn = fn(fmt::Arguments<'_>);

static OUTPUT: Once<OutputFn> = Once::new();

/// Install the sink for report lines
///
/// Only the first call takes effect; returns whether this one did.
pub fn set_output(sink: OutputFn) -> bool {
    let mut installed = false;
    OUTPUT.call_once(|| {
        installed = true;
        sink
    });
    installed
}

/// Adapts an [`OutputFn`] to `fmt::Write`
struct Sink(OutputFn);

impl Write for Sink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        (self.0)(format_args!("{}", s));
        Ok(())
    }
}

/// Write the report line for `frame`
pub fn write_report(frame: &TrapFrame, out: &mut dyn Write) -> fmt::Result {
    writeln!(out, "Received interrupt {:#x}", frame.vector)
}

/// The handler every vector starts out with
pub fn report_trap(frame: &mut TrapFrame) -> TrapOutcome {
    if let Some(&sink) = OUTPUT.get() {
        // A failing sink has nowhere to report to.
        let _ = write_report(frame, &mut Sink(sink));
    }

    let Some(info) = frame.exception() else {
        log::error!("trap on vector {:#x} outside the exception range", frame.vector);
        return TrapOutcome::Halt;
    };

    log::warn!(
        "{} ({}) vector={} error_code={:#x} eip={:#010x}",
        info.name,
        info.mnemonic,
        info.vector,
        frame.error_code,
        frame.eip
    );
    if let Some(code) = frame.selector_error() {
        if !code.is_null() {
            log::debug!("  {:?}", code);
        }
    }
    if let Some(cause) = frame.page_fault_cause() {
        log::debug!("  {:?} at {:#010x}", cause, fault_address());
    }
    log::debug!("{:?}", frame);

    info.default_outcome()
}

/// Linear address of the last page fault
#[cfg(target_arch = "x86")]
fn fault_address() -> u32 {
    crate::instructions::read_cr2()
}

#[cfg(not(target_arch = "x86"))]
fn fault_address() -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::GeneralRegisters;
    use spin::Mutex;

    fn frame(vector: u32, error_code: u32) -> TrapFrame {
        TrapFrame {
            ds: 0x10,
            regs: GeneralRegisters::default(),
            vector,
            error_code,
            eip: 0x0010_0000,
            cs: 0x08,
            eflags: 0x202,
            user_esp: 0,
            user_ss: 0,
        }
    }

    #[test]
    fn report_line_is_hex_vector() {
        let mut out = String::new();
        write_report(&frame(13, 0x10), &mut out).unwrap();
        assert_eq!(out, "Received interrupt 0xd\n");

        out.clear();
        write_report(&frame(0, 0), &mut out).unwrap();
        assert_eq!(out, "Received interrupt 0x0\n");
    }

    #[test]
    fn reporter_goes_through_installed_sink() {
        static CAPTURED: Mutex<String> = Mutex::new(String::new());
        fn capture(args: fmt::Arguments<'_>) {
            CAPTURED.lock().write_fmt(args).unwrap();
        }

        assert!(set_output(capture));
        assert!(!set_output(capture));

        assert_eq!(report_trap(&mut frame(3, 0)), TrapOutcome::Resume);
        assert_eq!(report_trap(&mut frame(14, 0b10)), TrapOutcome::Halt);

        let captured = CAPTURED.lock();
        assert!(captured.contains("Received interrupt 0x3\n"));
        assert!(captured.contains("Received interrupt 0xe\n"));
    }

    #[test]
    fn non_exception_vector_halts() {
        assert_eq!(report_trap(&mut frame(0x30, 0)), TrapOutcome::Halt);
    }
}
