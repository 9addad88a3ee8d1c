//! Privileged i386 instructions used by the table and trap code

use core::arch::asm;

use x86_64::registers::segmentation::SegmentSelector;

use crate::pointer::DescriptorTablePointer;

/// Load GDTR
///
/// # Safety
/// `pointer` must describe a valid GDT that outlives its use by the CPU.
#[inline]
pub unsafe fn lgdt(pointer: &DescriptorTablePointer) {
    unsafe {
        asm!("lgdt [{}]", in(reg) pointer, options(readonly, nostack, preserves_flags));
    }
}

/// Load IDTR
///
/// # Safety
/// `pointer` must describe a valid IDT that outlives its use by the CPU.
#[inline]
pub unsafe fn lidt(pointer: &DescriptorTablePointer) {
    unsafe {
        asm!("lidt [{}]", in(reg) pointer, options(readonly, nostack, preserves_flags));
    }
}

/// Current GDTR contents
pub fn sgdt() -> DescriptorTablePointer {
    let mut pointer = DescriptorTablePointer { limit: 0, base: 0 };
    unsafe {
        asm!("sgdt [{}]", in(reg) &mut pointer, options(nostack, preserves_flags));
    }
    pointer
}

/// Current IDTR contents
pub fn sidt() -> DescriptorTablePointer {
    let mut pointer = DescriptorTablePointer { limit: 0, base: 0 };
    unsafe {
        asm!("sidt [{}]", in(reg) &mut pointer, options(nostack, preserves_flags));
    }
    pointer
}

/// Reload CS through a far return, then DS, ES, FS, GS and SS
///
/// # Safety
/// Both selectors must reference present descriptors of the loaded GDT,
/// `code` an executable one and `data` a writable one.
#[inline]
pub unsafe fn reload_segments(code: SegmentSelector, data: SegmentSelector) {
    unsafe {
        asm!(
            "push {code}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            "mov ds, {data:x}",
            "mov es, {data:x}",
            "mov fs, {data:x}",
            "mov gs, {data:x}",
            "mov ss, {data:x}",
            code = in(reg) code.0 as u32,
            data = in(reg) data.0 as u32,
            tmp = out(reg) _,
            options(preserves_flags),
        );
    }
}

macro_rules! segment_readers {
    ($($name:ident => $register:literal),* $(,)?) => {
        $(
            /// Current selector in the named segment register
            pub fn $name() -> SegmentSelector {
                let value: u16;
                unsafe {
                    asm!(
                        concat!("mov {0:x}, ", $register),
                        out(reg) value,
                        options(nomem, nostack, preserves_flags),
                    );
                }
                SegmentSelector(value)
            }
        )*
    };
}

segment_readers! {
    read_cs => "cs",
    read_ds => "ds",
    read_es => "es",
    read_fs => "fs",
    read_gs => "gs",
    read_ss => "ss",
}

/// CR2: linear address of the most recent page fault
pub fn read_cr2() -> u32 {
    let value: u32;
    unsafe {
        asm!("mov {}, cr2", out(reg) value, options(nomem, nostack, preserves_flags));
    }
    value
}

/// Mask maskable interrupts
#[inline]
pub fn disable_interrupts() {
    unsafe {
        asm!("cli", options(nomem, nostack));
    }
}

/// Wait for the next interrupt
#[inline]
pub fn hlt() {
    unsafe {
        asm!("hlt", options(nomem, nostack, preserves_flags));
    }
}

/// Stop the CPU for good
pub fn halt_forever() -> ! {
    disable_interrupts();
    loop {
        hlt();
    }
}
