//! Global Descriptor Table (GDT) subsystem
//!
//! The kernel runs a flat memory model: every segment starts at 0 and
//! spans 4 GiB, so segmentation only carries privilege and code/data type.
//!
//! # Layout
//!
//! | index | selector | segment |
//! |-------|----------|-------------------|
//! | 0     | -        | null (required)   |
//! | 1     | `0x08`   | kernel code, ring 0 |
//! | 2     | `0x10`   | kernel data, ring 0 |
//! | 3     | `0x1B`   | user code, ring 3   |
//! | 4     | `0x23`   | user data, ring 3   |
//!
//! # Safety
//!
//! The CPU does not validate descriptors when the table is loaded; a wrong
//! bit shows up later as a protection fault with a misleading address.
//! The encodings are therefore built by `const fn`s and pinned by tests.

pub mod descriptor;

#[cfg(test)]
mod tests;

use spin::Once;
use x86_64::registers::segmentation::SegmentSelector;
use x86_64::PrivilegeLevel;

use crate::pointer::DescriptorTablePointer;

pub use descriptor::{SegmentAccess, SegmentDescriptor, SegmentFlags, SegmentKind};

/// Number of descriptors in the table
pub const GDT_ENTRIES: usize = 5;

/// Fixed slots of the flat-model GDT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SegmentIndex {
    Null = 0,
    KernelCode = 1,
    KernelData = 2,
    UserCode = 3,
    UserData = 4,
}

impl SegmentIndex {
    pub const ALL: [SegmentIndex; GDT_ENTRIES] = [
        Self::Null,
        Self::KernelCode,
        Self::KernelData,
        Self::UserCode,
        Self::UserData,
    ];

    /// Ring the segment belongs to, also used as the selector's RPL
    pub const fn privilege(self) -> PrivilegeLevel {
        match self {
            Self::UserCode | Self::UserData => PrivilegeLevel::Ring3,
            _ => PrivilegeLevel::Ring0,
        }
    }

    /// Selector referencing this slot with matching RPL
    pub const fn selector(self) -> SegmentSelector {
        SegmentSelector::new(self as u16, self.privilege())
    }
}

/// Kernel code selector (`0x08`), used by every IDT gate
pub const KERNEL_CODE_SELECTOR: SegmentSelector = SegmentIndex::KernelCode.selector();

/// Kernel data selector (`0x10`), loaded into DS/ES/FS/GS/SS and by the trap stub
pub const KERNEL_DATA_SELECTOR: SegmentSelector = SegmentIndex::KernelData.selector();

/// User code selector (`0x1B`)
pub const USER_CODE_SELECTOR: SegmentSelector = SegmentIndex::UserCode.selector();

/// User data selector (`0x23`)
pub const USER_DATA_SELECTOR: SegmentSelector = SegmentIndex::UserData.selector();

/// The five-entry flat-model GDT
#[derive(Debug, Clone)]
#[repr(C, align(8))]
pub struct GlobalDescriptorTable {
    entries: [SegmentDescriptor; GDT_ENTRIES],
}

impl GlobalDescriptorTable {
    /// Build the null, kernel and user segments
    pub const fn flat() -> Self {
        Self {
            entries: [
                SegmentDescriptor::NULL,
                SegmentDescriptor::flat(PrivilegeLevel::Ring0, SegmentKind::Code),
                SegmentDescriptor::flat(PrivilegeLevel::Ring0, SegmentKind::Data),
                SegmentDescriptor::flat(PrivilegeLevel::Ring3, SegmentKind::Code),
                SegmentDescriptor::flat(PrivilegeLevel::Ring3, SegmentKind::Data),
            ],
        }
    }

    pub const fn entry(&self, index: SegmentIndex) -> &SegmentDescriptor {
        &self.entries[index as usize]
    }

    pub fn entries(&self) -> &[SegmentDescriptor] {
        &self.entries
    }

    /// `lgdt` operand for this table at its current address
    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer::for_entries(self.entries.as_ptr() as usize as u32, GDT_ENTRIES)
    }

    /// Load the table and reload all six segment registers
    ///
    /// CS only changes through a far control transfer, so the reload is
    /// part of installation rather than a separate step a caller could skip.
    ///
    /// # Safety
    /// The table must stay at this address for as long as it is loaded,
    /// which `&'static` guarantees.
    #[cfg(target_arch = "x86")]
    pub unsafe fn load(&'static self) {
        use crate::instructions::{lgdt, reload_segments};

        lgdt(&self.pointer());
        reload_segments(KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR);
    }
}

/// The live GDT, built and installed exactly once
static GDT: Once<GlobalDescriptorTable> = Once::new();

/// Installed table, if [`init`] has run
pub fn table() -> Option<&'static GlobalDescriptorTable> {
    GDT.get()
}

/// Build, load and activate the GDT
///
/// Must be called once, early, on the boot stack and with interrupts
/// disabled. A second call returns [`InitError::AlreadyInitialized`]
/// without touching the CPU.
///
/// [`InitError::AlreadyInitialized`]: crate::InitError::AlreadyInitialized
#[cfg(target_arch = "x86")]
pub fn init() -> Result<(), crate::InitError> {
    log::info!("=== GDT Initialization ===");

    let mut fresh = false;
    let gdt = GDT.call_once(|| {
        fresh = true;
        GlobalDescriptorTable::flat()
    });
    if !fresh {
        return Err(crate::InitError::AlreadyInitialized {
            table: crate::error::Table::Gdt,
        });
    }

    // SAFETY: the table lives in a static and every selector we load
    // references one of its present entries.
    unsafe { gdt.load() };

    log_gdt_info(gdt);
    Ok(())
}

/// Log the loaded table and the selectors now in use
#[cfg(target_arch = "x86")]
fn log_gdt_info(gdt: &GlobalDescriptorTable) {
    let pointer = gdt.pointer();
    log::info!(
        "GDT loaded: base={:#010x} limit={:#x}",
        { pointer.base },
        { pointer.limit }
    );
    for index in SegmentIndex::ALL {
        log::debug!("  [{}] {:?}", index as u16, gdt.entry(index));
    }
    log::info!(
        "Selectors: code={:#06x} data={:#06x} user code={:#06x} user data={:#06x}",
        KERNEL_CODE_SELECTOR.0,
        KERNEL_DATA_SELECTOR.0,
        USER_CODE_SELECTOR.0,
        USER_DATA_SELECTOR.0
    );
}
