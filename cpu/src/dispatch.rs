//! Common dispatch stub and the per-vector handler table
//!
//! Every vector stub jumps to [`common_dispatch`], which completes the
//! [`TrapFrame`] on the stack, switches to kernel data segments and calls
//! `trap_entry`. From there the frame is routed through [`HANDLERS`]: one
//! slot per exception vector, each defaulting to the reporter.

use core::sync::atomic::{AtomicU64, Ordering};

use spin::RwLock;

use crate::error::DispatchError;
use crate::exception::EXCEPTION_VECTORS;
use crate::frame::TrapFrame;
use crate::report;

/// What the trap path does once a handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// Restore the (possibly modified) frame and `iretd`
    Resume,
    /// Log the frame and stop the machine
    Halt,
}

/// Handler for one exception vector
///
/// Runs with interrupts disabled, on the stack of the interrupted code.
/// Writes to the frame take effect when the trap returns.
pub type TrapHandler = fn(&mut TrapFrame) -> TrapOutcome;

// === Handler table ===

/// Vector-indexed handlers plus per-vector trap counters
pub struct HandlerTable {
    handlers: RwLock<[TrapHandler; EXCEPTION_VECTORS]>,
    counts: [AtomicU64; EXCEPTION_VECTORS],
}

impl HandlerTable {
    /// Table with the reporter installed on every vector
    pub const fn new() -> Self {
        Self {
            handlers: RwLock::new([report::report_trap as TrapHandler; EXCEPTION_VECTORS]),
            counts: [const { AtomicU64::new(0) }; EXCEPTION_VECTORS],
        }
    }

    fn check(vector: usize) -> Result<(), DispatchError> {
        if vector < EXCEPTION_VECTORS {
            Ok(())
        } else {
            Err(DispatchError::VectorOutOfRange { vector })
        }
    }

    /// Install `handler` for `vector`, returning the one it replaces
    pub fn register(
        &self,
        vector: usize,
        handler: TrapHandler,
    ) -> Result<TrapHandler, DispatchError> {
        Self::check(vector)?;
        let previous = core::mem::replace(&mut self.handlers.write()[vector], handler);
        log::debug!("handler registered for vector {}", vector);
        Ok(previous)
    }

    /// Put the reporter back on `vector`
    pub fn reset(&self, vector: usize) -> Result<(), DispatchError> {
        self.register(vector, report::report_trap).map(|_| ())
    }

    /// Handler currently installed for `vector`
    ///
    /// Never blocks: while a registration holds the write lock the
    /// reporter is returned instead.
    pub fn handler(&self, vector: usize) -> Option<TrapHandler> {
        if vector >= EXCEPTION_VECTORS {
            return None;
        }
        match self.handlers.try_read() {
            Some(handlers) => Some(handlers[vector]),
            None => Some(report::report_trap),
        }
    }

    /// Number of traps seen on `vector` so far
    pub fn count(&self, vector: usize) -> u64 {
        self.counts
            .get(vector)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }

    /// Count the trap and run the handler for its vector
    ///
    /// A vector outside 0–31 cannot come from the stubs; it means the
    /// frame is corrupt, so the outcome is [`TrapOutcome::Halt`].
    pub fn dispatch(&self, frame: &mut TrapFrame) -> TrapOutcome {
        let vector = frame.vector as usize;
        let Some(handler) = self.handler(vector) else {
            log::error!("trap frame carries invalid vector {:#x}", frame.vector);
            return TrapOutcome::Halt;
        };
        self.counts[vector].fetch_add(1, Ordering::Relaxed);
        handler(frame)
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The table consulted by the trap path
pub static HANDLERS: HandlerTable = HandlerTable::new();

/// Install `handler` for `vector` in the live table
pub fn register(vector: usize, handler: TrapHandler) -> Result<TrapHandler, DispatchError> {
    HANDLERS.register(vector, handler)
}

/// Number of traps the live table has dispatched on `vector`
pub fn trap_count(vector: usize) -> u64 {
    HANDLERS.count(vector)
}

// === Trap path ===

/// Shared tail of every vector stub
///
/// Entered by `jmp` with the vector and error code on top of the stack.
/// `ebx` holds the frame address across the call; it is callee-saved, so
/// the Rust side hands it back intact.
#[cfg(target_arch = "x86")]
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn common_dispatch() {
    core::arch::naked_asm!(
        "pushad",
        "xor eax, eax",
        "mov ax, ds",
        "push eax",
        "mov ax, {kernel_data}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "cld",
        "mov ebx, esp",
        "and esp, -16",
        "sub esp, 12",
        "push ebx",
        "call {entry}",
        "mov esp, ebx",
        "pop eax",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "popad",
        "add esp, 8",
        "iretd",
        kernel_data = const crate::gdt::KERNEL_DATA_SELECTOR.0,
        entry = sym trap_entry,
    );
}

/// First Rust code on the trap path
#[cfg(target_arch = "x86")]
extern "C" fn trap_entry(frame: &mut TrapFrame) {
    if HANDLERS.dispatch(frame) == TrapOutcome::Halt {
        halt_on(frame);
    }
}

/// Fatal end of the trap path; the kernel panic handler stops the CPU
#[cfg(target_arch = "x86")]
fn halt_on(frame: &TrapFrame) -> ! {
    log::error!("unrecoverable trap, halting\n{:?}", frame);
    match frame.exception() {
        Some(info) => panic!(
            "{} ({}) at eip={:#010x}, error code {:#x}",
            info.name, info.mnemonic, frame.eip, frame.error_code
        ),
        None => panic!("trap on vector {:#x} at eip={:#010x}", frame.vector, frame.eip),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::GeneralRegisters;
    use core::sync::atomic::AtomicU32;

    fn frame(vector: u32) -> TrapFrame {
        TrapFrame {
            ds: 0x10,
            regs: GeneralRegisters::default(),
            vector,
            error_code: 0,
            eip: 0x0010_0400,
            cs: 0x08,
            eflags: 0x202,
            user_esp: 0,
            user_ss: 0,
        }
    }

    fn skip_two_bytes(frame: &mut TrapFrame) -> TrapOutcome {
        frame.eip += 2;
        TrapOutcome::Resume
    }

    fn always_halt(_frame: &mut TrapFrame) -> TrapOutcome {
        TrapOutcome::Halt
    }

    #[test]
    fn defaults_follow_the_catalogue() {
        let table = HandlerTable::new();
        assert_eq!(table.dispatch(&mut frame(3)), TrapOutcome::Resume);
        assert_eq!(table.dispatch(&mut frame(2)), TrapOutcome::Resume);
        assert_eq!(table.dispatch(&mut frame(0)), TrapOutcome::Halt);
        assert_eq!(table.dispatch(&mut frame(13)), TrapOutcome::Halt);
        assert_eq!(table.dispatch(&mut frame(31)), TrapOutcome::Halt);
    }

    #[test]
    fn registered_handler_can_edit_the_frame() {
        let table = HandlerTable::new();
        table.register(0, skip_two_bytes).unwrap();

        let mut divide = frame(0);
        assert_eq!(table.dispatch(&mut divide), TrapOutcome::Resume);
        assert_eq!(divide.eip, 0x0010_0402);
    }

    #[test]
    fn register_returns_previous_handler() {
        let table = HandlerTable::new();
        let first = table.register(3, always_halt).unwrap();
        assert_eq!(first as usize, report::report_trap as TrapHandler as usize);

        let second = table.register(3, skip_two_bytes).unwrap();
        assert_eq!(second as usize, always_halt as TrapHandler as usize);
    }

    #[test]
    fn reset_restores_the_reporter() {
        let table = HandlerTable::new();
        table.register(3, always_halt).unwrap();
        assert_eq!(table.dispatch(&mut frame(3)), TrapOutcome::Halt);

        table.reset(3).unwrap();
        assert_eq!(table.dispatch(&mut frame(3)), TrapOutcome::Resume);
    }

    #[test]
    fn out_of_range_vectors_are_rejected() {
        let table = HandlerTable::new();
        assert_eq!(
            table.register(32, skip_two_bytes),
            Err(DispatchError::VectorOutOfRange { vector: 32 })
        );
        assert_eq!(
            table.reset(255),
            Err(DispatchError::VectorOutOfRange { vector: 255 })
        );
        assert!(table.handler(32).is_none());
    }

    #[test]
    fn corrupt_vector_halts_without_counting() {
        let table = HandlerTable::new();
        assert_eq!(table.dispatch(&mut frame(0x80)), TrapOutcome::Halt);
        assert_eq!(table.count(0x80), 0);
    }

    #[test]
    fn counters_track_each_vector() {
        let table = HandlerTable::new();
        table.register(3, skip_two_bytes).unwrap();
        for _ in 0..3 {
            table.dispatch(&mut frame(3));
        }
        table.dispatch(&mut frame(1));

        assert_eq!(table.count(3), 3);
        assert_eq!(table.count(1), 1);
        assert_eq!(table.count(0), 0);
    }

    #[test]
    fn lookup_while_registering_falls_back_to_reporter() {
        static CALLS: AtomicU32 = AtomicU32::new(0);
        fn counted(_frame: &mut TrapFrame) -> TrapOutcome {
            CALLS.fetch_add(1, Ordering::Relaxed);
            TrapOutcome::Halt
        }

        let table = HandlerTable::new();
        table.register(3, counted).unwrap();

        let guard = table.handlers.write();
        // Reporter answers for #BP with Resume; `counted` is not reached.
        assert_eq!(table.dispatch(&mut frame(3)), TrapOutcome::Resume);
        drop(guard);

        assert_eq!(table.dispatch(&mut frame(3)), TrapOutcome::Halt);
        assert_eq!(CALLS.load(Ordering::Relaxed), 1);
        assert_eq!(table.count(3), 2);
    }
}
