//! Register snapshot built on the stack by the trap path
//!
//! Memory layout, lowest address first, as left by the common dispatch stub:
//!
//! ```text
//!  +0   ds                      pushed by the dispatch stub
//!  +4   edi esi ebp esp ebx edx ecx eax   pushad
//!  +36  vector                  pushed by the vector stub
//!  +40  error_code              CPU, or a 0 placeholder from the stub
//!  +44  eip cs eflags           CPU
//!  +56  esp ss                  CPU, only on a ring change
//! ```

use core::fmt;
use core::mem::{offset_of, size_of};

use x86_64::PrivilegeLevel;

use crate::exception::ExceptionInfo;

/// General-purpose registers in `pushad` order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct GeneralRegisters {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// ESP at the start of `pushad`; ignored by `popad`
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
}

/// State of the interrupted context at trap time
///
/// The pointer handed to a handler is only valid for the duration of that
/// call; the memory is the dispatch stub's stack frame. Writes to it are
/// picked up by `popad`/`iretd` on the way out.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    /// Data segment selector of the interrupted code (zero-extended)
    pub ds: u32,
    pub regs: GeneralRegisters,
    /// Vector number pushed by the entry stub
    pub vector: u32,
    /// Hardware error code, or 0 for vectors that have none
    pub error_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    /// Interrupted stack pointer, see [`TrapFrame::interrupted_stack`]
    ///
    /// Only pushed on a ring change. After a same-ring trap this word is
    /// the interrupted code's own stack: write it only when
    /// [`TrapFrame::changed_privilege`] is true, or use
    /// [`TrapFrame::set_interrupted_stack`].
    pub user_esp: u32,
    /// Interrupted stack segment; same write rule as `user_esp`
    pub user_ss: u32,
}

const _: () = {
    assert!(offset_of!(TrapFrame, ds) == 0);
    assert!(offset_of!(TrapFrame, regs) == 4);
    assert!(offset_of!(TrapFrame, vector) == 36);
    assert!(offset_of!(TrapFrame, error_code) == 40);
    assert!(offset_of!(TrapFrame, eip) == 44);
    assert!(offset_of!(TrapFrame, user_esp) == 56);
    assert!(size_of::<GeneralRegisters>() == 32);
    assert!(size_of::<TrapFrame>() == 64);
};

/// Bytes the CPU pushes when the trap does not change privilege level
pub const SAME_RING_FRAME_SIZE: usize = offset_of!(TrapFrame, user_esp);

impl TrapFrame {
    /// Exception description for this frame's vector
    pub fn exception(&self) -> Option<&'static ExceptionInfo> {
        ExceptionInfo::lookup(self.vector as usize)
    }

    /// Privilege level the trap came from (RPL of the saved CS)
    pub fn interrupted_privilege(&self) -> PrivilegeLevel {
        PrivilegeLevel::from_u16((self.cs & 0b11) as u16)
    }

    /// Whether the CPU switched stacks and pushed ESP/SS
    pub fn changed_privilege(&self) -> bool {
        self.cs & 0b11 != 0
    }

    /// ESP and SS of the interrupted context, when the CPU saved them
    ///
    /// A trap taken in ring 0 does not push them; `user_esp`/`user_ss`
    /// then overlap whatever the interrupted code had on its stack.
    pub fn interrupted_stack(&self) -> Option<(u32, u16)> {
        self.changed_privilege()
            .then_some((self.user_esp, self.user_ss as u16))
    }

    /// Replace the stack `iretd` returns to, if the CPU saved one
    ///
    /// Returns `false` and leaves memory untouched after a same-ring trap.
    pub fn set_interrupted_stack(&mut self, esp: u32, ss: u16) -> bool {
        if !self.changed_privilege() {
            return false;
        }
        self.user_esp = esp;
        self.user_ss = ss as u32;
        true
    }

    /// Error code decoded as a selector reference, for #TS/#NP/#SS/#GP
    pub fn selector_error(&self) -> Option<SelectorErrorCode> {
        self.exception()
            .filter(|info| info.has_selector_error_code())
            .map(|_| SelectorErrorCode(self.error_code))
    }

    /// Error code decoded as page-fault cause bits, for #PF
    pub fn page_fault_cause(&self) -> Option<PageFaultCause> {
        (self.vector == 14).then(|| PageFaultCause::from_bits_truncate(self.error_code))
    }
}

impl fmt::Debug for TrapFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.regs;
        writeln!(f, "vector={} error_code={:#x}", self.vector, self.error_code)?;
        writeln!(
            f,
            "eip={:#010x} cs={:#06x} eflags={:#010x} ds={:#06x}",
            self.eip, self.cs, self.eflags, self.ds
        )?;
        writeln!(
            f,
            "eax={:#010x} ebx={:#010x} ecx={:#010x} edx={:#010x}",
            r.eax, r.ebx, r.ecx, r.edx
        )?;
        write!(
            f,
            "esi={:#010x} edi={:#010x} ebp={:#010x} esp={:#010x}",
            r.esi, r.edi, r.ebp, r.esp
        )?;
        if let Some((esp, ss)) = self.interrupted_stack() {
            write!(f, "\nuser esp={:#010x} ss={:#06x}", esp, ss)?;
        }
        Ok(())
    }
}

/// Descriptor table a selector error code points into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorTable {
    Gdt,
    Idt,
    Ldt,
}

/// Error code of #TS, #NP, #SS and #GP
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SelectorErrorCode(pub u32);

impl SelectorErrorCode {
    /// Fault was caused by an event external to the program
    pub const fn external(self) -> bool {
        self.0 & 0b1 != 0
    }

    pub const fn table(self) -> DescriptorTable {
        if self.0 & 0b10 != 0 {
            DescriptorTable::Idt
        } else if self.0 & 0b100 != 0 {
            DescriptorTable::Ldt
        } else {
            DescriptorTable::Gdt
        }
    }

    /// Descriptor index (IDT: vector number)
    pub const fn index(self) -> u16 {
        ((self.0 >> 3) & 0x1FFF) as u16
    }

    /// Error code of zero: the fault is not tied to a selector
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for SelectorErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorErrorCode")
            .field("table", &self.table())
            .field("index", &self.index())
            .field("external", &self.external())
            .finish()
    }
}

bitflags::bitflags! {
    /// Error code of #PF
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFaultCause: u32 {
        /// Protection violation (clear: page not present)
        const PROTECTION_VIOLATION = 1 << 0;
        const CAUSED_BY_WRITE = 1 << 1;
        const USER_MODE = 1 << 2;
        const MALFORMED_TABLE = 1 << 3;
        const INSTRUCTION_FETCH = 1 << 4;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(vector: u32, error_code: u32, cs: u32) -> TrapFrame {
        TrapFrame {
            ds: 0x10,
            regs: GeneralRegisters::default(),
            vector,
            error_code,
            eip: 0x0010_0000,
            cs,
            eflags: 0x202,
            user_esp: 0x0040_0000,
            user_ss: 0x23,
        }
    }

    #[test]
    fn user_stack_only_after_ring_change() {
        assert_eq!(frame(3, 0, 0x08).interrupted_stack(), None);
        assert_eq!(frame(3, 0, 0x1B).interrupted_stack(), Some((0x0040_0000, 0x23)));
        assert_eq!(frame(3, 0, 0x1B).interrupted_privilege(), PrivilegeLevel::Ring3);
    }

    #[test]
    fn stack_switch_only_after_ring_change() {
        let mut same_ring = frame(3, 0, 0x08);
        assert!(!same_ring.set_interrupted_stack(0x0050_0000, 0x2B));
        assert_eq!((same_ring.user_esp, same_ring.user_ss), (0x0040_0000, 0x23));

        let mut from_user = frame(3, 0, 0x1B);
        assert!(from_user.set_interrupted_stack(0x0050_0000, 0x23));
        assert_eq!(from_user.interrupted_stack(), Some((0x0050_0000, 0x23)));
    }

    #[test]
    fn general_protection_names_a_selector() {
        let gp = frame(13, 0x10, 0x08);
        let code = gp.selector_error().unwrap();
        assert_eq!(code.table(), DescriptorTable::Gdt);
        assert_eq!(code.index(), 2);
        assert!(!code.external());
    }

    #[test]
    fn missing_idt_gate_decodes_to_its_vector() {
        // #NP raised by delivering through not-present IDT slot 0x30
        let np = frame(11, (0x30 << 3) | 0b10, 0x08);
        let code = np.selector_error().unwrap();
        assert_eq!(code.table(), DescriptorTable::Idt);
        assert_eq!(code.index(), 0x30);
    }

    #[test]
    fn only_page_faults_decode_cause_bits() {
        let pf = frame(14, 0b110, 0x08);
        assert_eq!(
            pf.page_fault_cause(),
            Some(PageFaultCause::CAUSED_BY_WRITE | PageFaultCause::USER_MODE)
        );
        assert!(pf.selector_error().is_none());
        assert!(frame(13, 0, 0x08).page_fault_cause().is_none());
    }

    #[test]
    fn debug_dump_lists_registers() {
        let dump = format!("{:?}", frame(0, 0, 0x08));
        assert!(dump.contains("vector=0"));
        assert!(dump.contains("eip=0x00100000"));
        assert!(!dump.contains("user esp"));
    }
}
