//! Interrupt gate encoding
//!
//! ```text
//!  byte  0-1   offset[15:0]
//!  byte  2-3   code segment selector
//!  byte  4     reserved, must be zero
//!  byte  5     attributes: P | DPL(2) | 0 | type(4)
//!  byte  6-7   offset[31:16]
//! ```

use core::mem::size_of;

use x86_64::registers::segmentation::SegmentSelector;
use x86_64::PrivilegeLevel;

use crate::gdt::KERNEL_CODE_SELECTOR;

/// Gate type nibble of the attribute byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateType {
    Task = 0x5,
    Interrupt16 = 0x6,
    Trap16 = 0x7,
    /// Clears IF on entry, so no further maskable interrupt nests
    Interrupt32 = 0xE,
    /// Leaves IF untouched
    Trap32 = 0xF,
}

impl GateType {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x0F {
            0x5 => Some(Self::Task),
            0x6 => Some(Self::Interrupt16),
            0x7 => Some(Self::Trap16),
            0xE => Some(Self::Interrupt32),
            0xF => Some(Self::Trap32),
            _ => None,
        }
    }
}

/// Attribute byte of a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct GateAttributes(u8);

impl GateAttributes {
    const PRESENT: u8 = 1 << 7;

    /// Present gate of the given type, callable from `privilege` and above
    pub const fn new(privilege: PrivilegeLevel, gate_type: GateType) -> Self {
        Self(Self::PRESENT | (privilege as u8) << 5 | gate_type as u8)
    }

    /// Present, ring 0, 32-bit interrupt gate (`0x8E`)
    pub const KERNEL_INTERRUPT: Self = Self::new(PrivilegeLevel::Ring0, GateType::Interrupt32);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_present(self) -> bool {
        self.0 & Self::PRESENT != 0
    }

    pub fn privilege(self) -> PrivilegeLevel {
        PrivilegeLevel::from_u16(((self.0 >> 5) & 0b11) as u16)
    }

    pub const fn gate_type(self) -> Option<GateType> {
        GateType::from_bits(self.0)
    }
}

/// One 8-byte IDT entry
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    reserved: u8,
    attributes: GateAttributes,
    offset_high: u16,
}

const _: () = assert!(size_of::<GateDescriptor>() == 8);

impl GateDescriptor {
    /// Not-present entry; any delivery through it is a fault
    pub const MISSING: Self = Self {
        offset_low: 0,
        selector: 0,
        reserved: 0,
        attributes: GateAttributes(0),
        offset_high: 0,
    };

    pub const fn new(offset: u32, selector: SegmentSelector, attributes: GateAttributes) -> Self {
        Self {
            offset_low: (offset & 0xFFFF) as u16,
            selector: selector.0,
            reserved: 0,
            attributes,
            offset_high: (offset >> 16) as u16,
        }
    }

    /// Kernel interrupt gate to `offset` through the kernel code segment
    pub const fn interrupt(offset: u32) -> Self {
        Self::new(offset, KERNEL_CODE_SELECTOR, GateAttributes::KERNEL_INTERRUPT)
    }

    /// Handler entry address
    pub const fn offset(&self) -> u32 {
        self.offset_low as u32 | (self.offset_high as u32) << 16
    }

    pub const fn selector(&self) -> SegmentSelector {
        SegmentSelector(self.selector)
    }

    pub const fn attributes(&self) -> GateAttributes {
        self.attributes
    }

    pub const fn reserved(&self) -> u8 {
        self.reserved
    }

    pub const fn is_present(&self) -> bool {
        self.attributes.is_present()
    }

    pub const fn gate_type(&self) -> Option<GateType> {
        self.attributes.gate_type()
    }

    pub fn privilege(&self) -> PrivilegeLevel {
        self.attributes.privilege()
    }

    /// The gate as the little-endian quadword stored in memory
    pub const fn to_bits(&self) -> u64 {
        self.offset_low as u64
            | (self.selector as u64) << 16
            | (self.reserved as u64) << 32
            | (self.attributes.0 as u64) << 40
            | (self.offset_high as u64) << 48
    }
}

impl core::fmt::Debug for GateDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GateDescriptor")
            .field("offset", &format_args!("{:#010x}", self.offset()))
            .field("selector", &format_args!("{:#06x}", self.selector))
            .field("attributes", &format_args!("{:#04x}", self.attributes.0))
            .finish()
    }
}
