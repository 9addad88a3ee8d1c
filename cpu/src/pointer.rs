//! Operand of `lgdt`/`lidt`/`sgdt`/`sidt`

use core::mem::size_of;

/// Size and location of a descriptor table
///
/// In protected mode the CPU reads exactly six bytes: a 16-bit limit
/// (table size in bytes minus one) followed by a 32-bit linear base
/// address, with no padding in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, packed(2))]
pub struct DescriptorTablePointer {
    /// Size of the table in bytes, minus one
    pub limit: u16,
    /// Linear address of the first descriptor
    pub base: u32,
}

const _: () = assert!(size_of::<DescriptorTablePointer>() == 6);

impl DescriptorTablePointer {
    /// Pointer describing `count` contiguous 8-byte descriptors at `base`
    pub const fn for_entries(base: u32, count: usize) -> Self {
        Self {
            limit: (count * 8 - 1) as u16,
            base,
        }
    }

    /// Number of 8-byte descriptors covered by the limit
    pub const fn entries(&self) -> usize {
        (self.limit as usize + 1) / 8
    }
}
