//! Per-vector exception entry stubs
//!
//! The CPU pushes an error code for some exceptions and not for others.
//! Each stub evens this out so the dispatch stub always sees
//!
//! ```text
//!  esp+0  vector
//!  esp+4  error code (hardware value or 0)
//!  esp+8  eip, cs, eflags [, esp, ss]
//! ```
//!
//! All 32 stubs are expanded from one template. The same invocation also
//! produces [`STUB_KINDS`], a data mirror of what each stub pushes, so the
//! choice made in assembly can be checked without running it.

use crate::exception::EXCEPTION_VECTORS;

/// How a stub fills the error-code slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubKind {
    /// The CPU already pushed an error code
    HardwareErrorCode,
    /// The stub pushes a zero in its place
    PlaceholderErrorCode,
}

impl StubKind {
    /// Dwords the stub pushes, in push order
    pub fn pushed(self, vector: u32) -> impl Iterator<Item = u32> {
        let placeholder = match self {
            Self::HardwareErrorCode => None,
            Self::PlaceholderErrorCode => Some(0),
        };
        placeholder.into_iter().chain(core::iter::once(vector))
    }
}

#[cfg_attr(not(target_arch = "x86"), allow(unused_macros))]
macro_rules! error_code_slot {
    (hardware) => {
        ""
    };
    (placeholder) => {
        "push 0\n"
    };
}

macro_rules! stub_kind {
    (hardware) => {
        StubKind::HardwareErrorCode
    };
    (placeholder) => {
        StubKind::PlaceholderErrorCode
    };
}

macro_rules! exception_stubs {
    ($($vector:literal => $name:ident: $slot:ident),* $(,)?) => {
        /// Vector number each stub pushes, in table order
        pub const STUB_VECTORS: [u32; EXCEPTION_VECTORS] = [$($vector),*];

        /// Error-code handling of each stub, indexed by vector
        pub const STUB_KINDS: [StubKind; EXCEPTION_VECTORS] = [$(stub_kind!($slot)),*];

        $(
            #[cfg(target_arch = "x86")]
            #[unsafe(naked)]
            unsafe extern "C" fn $name() {
                core::arch::naked_asm!(
                    concat!(error_code_slot!($slot), "push {vector}\n", "jmp {dispatch}\n"),
                    vector = const $vector,
                    dispatch = sym crate::dispatch::common_dispatch,
                );
            }
        )*

        /// Entry address of every stub, indexed by vector
        #[cfg(target_arch = "x86")]
        pub fn stub_addresses() -> [u32; EXCEPTION_VECTORS] {
            [$($name as unsafe extern "C" fn() as usize as u32),*]
        }
    };
}

exception_stubs! {
    0 => divide_error: placeholder,
    1 => debug: placeholder,
    2 => non_maskable_interrupt: placeholder,
    3 => breakpoint: placeholder,
    4 => overflow: placeholder,
    5 => bound_range_exceeded: placeholder,
    6 => invalid_opcode: placeholder,
    7 => device_not_available: placeholder,
    8 => double_fault: hardware,
    9 => coprocessor_segment_overrun: placeholder,
    10 => invalid_tss: hardware,
    11 => segment_not_present: hardware,
    12 => stack_segment_fault: hardware,
    13 => general_protection: hardware,
    14 => page_fault: hardware,
    15 => reserved_15: placeholder,
    16 => x87_floating_point: placeholder,
    17 => alignment_check: hardware,
    18 => machine_check: placeholder,
    19 => simd_floating_point: placeholder,
    20 => virtualization: placeholder,
    21 => control_protection: placeholder,
    22 => reserved_22: placeholder,
    23 => reserved_23: placeholder,
    24 => reserved_24: placeholder,
    25 => reserved_25: placeholder,
    26 => reserved_26: placeholder,
    27 => reserved_27: placeholder,
    28 => hypervisor_injection: placeholder,
    29 => vmm_communication: placeholder,
    30 => security: placeholder,
    31 => reserved_31: placeholder,
}
