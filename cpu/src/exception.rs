//! Catalogue of the 32 architecturally defined exception vectors

use crate::dispatch::TrapOutcome;

/// Number of vectors reserved by the CPU for exceptions
pub const EXCEPTION_VECTORS: usize = 32;

/// How the CPU reports an exception and where it resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionClass {
    /// Reported before the faulting instruction; `iretd` retries it
    Fault,
    /// Reported after the trapping instruction; `iretd` continues past it
    Trap,
    /// Cannot be resumed reliably
    Abort,
    /// Non-maskable external interrupt
    Interrupt,
    /// Vector reserved by Intel, never raised by current CPUs
    Reserved,
}

/// Static description of one exception vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub vector: u8,
    pub name: &'static str,
    pub mnemonic: &'static str,
    /// Whether the CPU pushes an error code before entering the handler
    pub has_error_code: bool,
    pub class: ExceptionClass,
}

impl ExceptionInfo {
    const fn new(
        vector: u8,
        name: &'static str,
        mnemonic: &'static str,
        has_error_code: bool,
        class: ExceptionClass,
    ) -> Self {
        Self {
            vector,
            name,
            mnemonic,
            has_error_code,
            class,
        }
    }

    const fn reserved(vector: u8) -> Self {
        Self::new(vector, "Reserved", "-", false, ExceptionClass::Reserved)
    }

    /// Look up a vector. Returns `None` above 31.
    pub fn lookup(vector: usize) -> Option<&'static ExceptionInfo> {
        EXCEPTIONS.get(vector)
    }

    /// What the default handler does after reporting this exception
    ///
    /// Traps and NMIs return to the interrupted code. Faults would re-run
    /// the faulting instruction forever, aborts leave no usable context,
    /// and reserved vectors should never fire, so all of those halt.
    pub const fn default_outcome(&self) -> TrapOutcome {
        match self.class {
            ExceptionClass::Trap | ExceptionClass::Interrupt => TrapOutcome::Resume,
            ExceptionClass::Fault | ExceptionClass::Abort | ExceptionClass::Reserved => {
                TrapOutcome::Halt
            }
        }
    }

    /// Error code carries a segment selector index (#TS, #NP, #SS, #GP)
    pub const fn has_selector_error_code(&self) -> bool {
        matches!(self.vector, 10..=13)
    }
}

use ExceptionClass::{Abort, Fault, Interrupt, Trap};

/// Exceptions indexed by vector number
///
/// Only vectors 8, 10, 11, 12, 13, 14 and 17 push an error code in this
/// design; every other stub supplies a zero in its place.
pub static EXCEPTIONS: [ExceptionInfo; EXCEPTION_VECTORS] = [
    ExceptionInfo::new(0, "Divide Error", "#DE", false, Fault),
    ExceptionInfo::new(1, "Debug", "#DB", false, Trap),
    ExceptionInfo::new(2, "Non-Maskable Interrupt", "NMI", false, Interrupt),
    ExceptionInfo::new(3, "Breakpoint", "#BP", false, Trap),
    ExceptionInfo::new(4, "Overflow", "#OF", false, Trap),
    ExceptionInfo::new(5, "BOUND Range Exceeded", "#BR", false, Fault),
    ExceptionInfo::new(6, "Invalid Opcode", "#UD", false, Fault),
    ExceptionInfo::new(7, "Device Not Available", "#NM", false, Fault),
    ExceptionInfo::new(8, "Double Fault", "#DF", true, Abort),
    ExceptionInfo::new(9, "Coprocessor Segment Overrun", "-", false, Abort),
    ExceptionInfo::new(10, "Invalid TSS", "#TS", true, Fault),
    ExceptionInfo::new(11, "Segment Not Present", "#NP", true, Fault),
    ExceptionInfo::new(12, "Stack-Segment Fault", "#SS", true, Fault),
    ExceptionInfo::new(13, "General Protection", "#GP", true, Fault),
    ExceptionInfo::new(14, "Page Fault", "#PF", true, Fault),
    ExceptionInfo::reserved(15),
    ExceptionInfo::new(16, "x87 Floating-Point Error", "#MF", false, Fault),
    ExceptionInfo::new(17, "Alignment Check", "#AC", true, Fault),
    ExceptionInfo::new(18, "Machine Check", "#MC", false, Abort),
    ExceptionInfo::new(19, "SIMD Floating-Point", "#XM", false, Fault),
    ExceptionInfo::new(20, "Virtualization", "#VE", false, Fault),
    ExceptionInfo::new(21, "Control Protection", "#CP", false, Fault),
    ExceptionInfo::reserved(22),
    ExceptionInfo::reserved(23),
    ExceptionInfo::reserved(24),
    ExceptionInfo::reserved(25),
    ExceptionInfo::reserved(26),
    ExceptionInfo::reserved(27),
    ExceptionInfo::new(28, "Hypervisor Injection", "#HV", false, Fault),
    ExceptionInfo::new(29, "VMM Communication", "#VC", false, Fault),
    ExceptionInfo::new(30, "Security", "#SX", false, Fault),
    ExceptionInfo::reserved(31),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_is_indexed_by_vector() {
        for (index, info) in EXCEPTIONS.iter().enumerate() {
            assert_eq!(info.vector as usize, index);
        }
    }

    #[test]
    fn error_code_vectors_are_the_fixed_subset() {
        let with_code: Vec<u8> = EXCEPTIONS
            .iter()
            .filter(|info| info.has_error_code)
            .map(|info| info.vector)
            .collect();
        assert_eq!(with_code, [8, 10, 11, 12, 13, 14, 17]);
    }

    #[test]
    fn default_outcomes() {
        assert_eq!(EXCEPTIONS[3].default_outcome(), TrapOutcome::Resume);
        assert_eq!(EXCEPTIONS[2].default_outcome(), TrapOutcome::Resume);
        assert_eq!(EXCEPTIONS[0].default_outcome(), TrapOutcome::Halt);
        assert_eq!(EXCEPTIONS[8].default_outcome(), TrapOutcome::Halt);
        assert_eq!(EXCEPTIONS[15].default_outcome(), TrapOutcome::Halt);
    }

    #[test]
    fn lookup_rejects_non_exception_vectors() {
        assert_eq!(ExceptionInfo::lookup(14).map(|i| i.mnemonic), Some("#PF"));
        assert!(ExceptionInfo::lookup(32).is_none());
    }
}
