//! Multiboot entry: header, boot stack and `_start`
//!
//! The loader enters `_start` in 32-bit protected mode with paging off,
//! interrupts disabled, EAX holding [`BOOTLOADER_MAGIC`] and EBX the
//! physical address of the multiboot information structure. Its GDT and
//! segment registers are only good enough to reach our own.

use core::mem::size_of;

use crate::config::STACK_SIZE;

const HEADER_MAGIC: u32 = 0x1BAD_B002;
/// Page-align modules, provide memory information
const HEADER_FLAGS: u32 = 1 << 0 | 1 << 1;

/// Value a compliant loader leaves in EAX
pub const BOOTLOADER_MAGIC: u32 = 0x2BAD_B002;

#[repr(C, align(4))]
struct MultibootHeader {
    magic: u32,
    flags: u32,
    checksum: u32,
}

const _: () = assert!(size_of::<MultibootHeader>() == 12);

#[used]
#[link_section = ".multiboot"]
static MULTIBOOT_HEADER: MultibootHeader = MultibootHeader {
    magic: HEADER_MAGIC,
    flags: HEADER_FLAGS,
    checksum: 0u32.wrapping_sub(HEADER_MAGIC).wrapping_sub(HEADER_FLAGS),
};

// === Boot stack ===

/// Stack memory, 16-byte aligned, growing down from the end
#[repr(C, align(16))]
pub struct Stack([u8; STACK_SIZE]);

impl Stack {
    /// Lowest and one-past-highest address
    pub fn bounds(&self) -> (u32, u32) {
        let base = self.0.as_ptr() as usize as u32;
        (base, base + STACK_SIZE as u32)
    }
}

/// Stack `kernel_main` and every trap run on
static mut BOOT_STACK: Stack = Stack([0; STACK_SIZE]);

/// Address range of the boot stack
pub fn boot_stack_bounds() -> (u32, u32) {
    // SAFETY: only the address is taken; nothing reads the contents.
    unsafe { (*(&raw const BOOT_STACK)).bounds() }
}

/// Log where the boot stack lives
pub fn log_stack_info() {
    let (bottom, top) = boot_stack_bounds();
    log::info!(
        "boot stack: {:#010x} - {:#010x} ({} KiB)",
        bottom,
        top,
        STACK_SIZE / 1024
    );
}

// Reserve 8 bytes so ESP is 16-byte aligned at the call after two pushes.
core::arch::global_asm!(
    ".section .text._start, \"ax\"",
    ".global _start",
    "_start:",
    "cli",
    "lea esp, [{stack} + {size}]",
    "xor ebp, ebp",
    "sub esp, 8",
    "push ebx",
    "push eax",
    "call {main}",
    "2:",
    "cli",
    "hlt",
    "jmp 2b",
    stack = sym BOOT_STACK,
    size = const STACK_SIZE,
    main = sym crate::kernel_main,
);
