//! Segment descriptor encoding
//!
//! A protected-mode segment descriptor is eight bytes whose fields are
//! scattered across the record for historical reasons:
//!
//! ```text
//!  byte  0-1   limit[15:0]
//!  byte  2-3   base[15:0]
//!  byte  4     base[23:16]
//!  byte  5     access: P | DPL(2) | S | E | DC | RW | A
//!  byte  6     flags: G | DB | L | AVL   (high nibble)
//!              limit[19:16]              (low nibble)
//!  byte  7     base[31:24]
//! ```

use core::mem::size_of;

use x86_64::PrivilegeLevel;

use crate::error::DescriptorError;

bitflags::bitflags! {
    /// Access byte of a code or data segment, without the DPL bits
    ///
    /// The privilege level occupies bits 5-6 and is carried separately as a
    /// [`PrivilegeLevel`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentAccess: u8 {
        /// Set by the CPU on first use of the segment
        const ACCESSED = 1 << 0;
        /// Code: readable. Data: writable.
        const READ_WRITE = 1 << 1;
        /// Code: conforming. Data: grows down.
        const DIRECTION_CONFORMING = 1 << 2;
        /// Code segment when set, data segment otherwise
        const EXECUTABLE = 1 << 3;
        /// Code/data segment when set, system segment (TSS, gate) otherwise
        const CODE_DATA = 1 << 4;
        /// Segment is present in memory
        const PRESENT = 1 << 7;
    }
}

bitflags::bitflags! {
    /// Flags nibble, kept at its in-byte position (bits 4-7)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u8 {
        /// Free for system software
        const AVAILABLE = 1 << 4;
        /// 64-bit code segment (must be clear in protected mode)
        const LONG_MODE = 1 << 5;
        /// 32-bit default operand size
        const SIZE_32 = 1 << 6;
        /// Limit is counted in 4 KiB pages instead of bytes
        const GRANULARITY_4K = 1 << 7;
    }
}

const DPL_SHIFT: u8 = 5;
const DPL_MASK: u8 = 0b11 << DPL_SHIFT;

/// Largest value of the raw 20-bit limit field
pub const MAX_RAW_LIMIT: u32 = 0xF_FFFF;

/// What a flat segment is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Execute/read code
    Code,
    /// Read/write data
    Data,
}

/// One 8-byte GDT entry, field for field as the CPU reads it
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SegmentDescriptor {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    limit_high_flags: u8,
    base_high: u8,
}

const _: () = assert!(size_of::<SegmentDescriptor>() == 8);

impl SegmentDescriptor {
    /// Mandatory first entry of every GDT
    pub const NULL: Self = Self {
        limit_low: 0,
        base_low: 0,
        base_mid: 0,
        access: 0,
        limit_high_flags: 0,
        base_high: 0,
    };

    /// Encode a descriptor from its fields
    ///
    /// `limit` is the raw limit field: only its low 20 bits are stored. With
    /// [`SegmentFlags::GRANULARITY_4K`] the CPU scales it to pages, so a raw
    /// limit of `0xFFFFF` (or any value with those bits set, such as
    /// `0xFFFF_FFFF`) spans the full 4 GiB.
    pub const fn new(
        base: u32,
        limit: u32,
        access: SegmentAccess,
        privilege: PrivilegeLevel,
        flags: SegmentFlags,
    ) -> Self {
        Self {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access: access.bits() | ((privilege as u8) << DPL_SHIFT),
            limit_high_flags: (flags.bits() & 0xF0) | ((limit >> 16) & 0x0F) as u8,
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }

    /// Present, 32-bit, page-granular segment covering 0..4 GiB
    pub const fn flat(privilege: PrivilegeLevel, kind: SegmentKind) -> Self {
        let common = SegmentAccess::PRESENT
            .union(SegmentAccess::CODE_DATA)
            .union(SegmentAccess::READ_WRITE);
        let access = match kind {
            SegmentKind::Code => common.union(SegmentAccess::EXECUTABLE),
            SegmentKind::Data => common,
        };
        Self::new(
            0,
            MAX_RAW_LIMIT,
            access,
            privilege,
            SegmentFlags::GRANULARITY_4K.union(SegmentFlags::SIZE_32),
        )
    }

    /// Encode a descriptor whose limit is given in bytes
    ///
    /// Byte granularity is used when the limit fits in 20 bits; otherwise the
    /// limit must be expressible in whole 4 KiB pages.
    pub fn with_byte_limit(
        base: u32,
        limit: u32,
        access: SegmentAccess,
        privilege: PrivilegeLevel,
        flags: SegmentFlags,
    ) -> Result<Self, DescriptorError> {
        let flags = flags.difference(SegmentFlags::GRANULARITY_4K);
        if limit <= MAX_RAW_LIMIT {
            return Ok(Self::new(base, limit, access, privilege, flags));
        }
        if limit & 0xFFF != 0xFFF {
            return Err(DescriptorError::UnalignedPageLimit { limit });
        }
        Ok(Self::new(
            base,
            limit >> 12,
            access,
            privilege,
            flags.union(SegmentFlags::GRANULARITY_4K),
        ))
    }

    pub const fn base(&self) -> u32 {
        self.base_low as u32 | (self.base_mid as u32) << 16 | (self.base_high as u32) << 24
    }

    /// Raw 20-bit limit field
    pub const fn limit(&self) -> u32 {
        self.limit_low as u32 | ((self.limit_high_flags & 0x0F) as u32) << 16
    }

    /// Offset of the last addressable byte, granularity applied
    pub const fn byte_limit(&self) -> u32 {
        if self.flags().contains(SegmentFlags::GRANULARITY_4K) {
            (self.limit() << 12) | 0xFFF
        } else {
            self.limit()
        }
    }

    pub const fn access(&self) -> SegmentAccess {
        SegmentAccess::from_bits_truncate(self.access & !DPL_MASK)
    }

    /// Descriptor privilege level
    pub fn privilege(&self) -> PrivilegeLevel {
        PrivilegeLevel::from_u16(((self.access & DPL_MASK) >> DPL_SHIFT) as u16)
    }

    pub const fn flags(&self) -> SegmentFlags {
        SegmentFlags::from_bits_truncate(self.limit_high_flags & 0xF0)
    }

    pub const fn is_present(&self) -> bool {
        self.access().contains(SegmentAccess::PRESENT)
    }

    pub const fn is_code(&self) -> bool {
        self.access().contains(SegmentAccess::EXECUTABLE)
    }

    /// The descriptor as the little-endian quadword stored in memory
    pub const fn to_bits(&self) -> u64 {
        self.limit_low as u64
            | (self.base_low as u64) << 16
            | (self.base_mid as u64) << 32
            | (self.access as u64) << 40
            | (self.limit_high_flags as u64) << 48
            | (self.base_high as u64) << 56
    }
}

impl core::fmt::Debug for SegmentDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SegmentDescriptor")
            .field("base", &format_args!("{:#010x}", self.base()))
            .field("limit", &format_args!("{:#07x}", self.limit()))
            .field("privilege", &self.privilege())
            .field("access", &self.access())
            .field("flags", &self.flags())
            .finish()
    }
}
