//! GDT subsystem tests
//!
//! These pin the descriptor encodings to the values the CPU expects; a
//! wrong bit here is invisible until a protection fault much later.

use super::*;
use crate::error::DescriptorError;

#[test]
fn flat_table_matches_reference_encodings() {
    let gdt = GlobalDescriptorTable::flat();
    let bits: Vec<u64> = gdt.entries().iter().map(SegmentDescriptor::to_bits).collect();
    assert_eq!(
        bits,
        [
            0x0000_0000_0000_0000,
            0x00CF_9A00_0000_FFFF,
            0x00CF_9200_0000_FFFF,
            0x00CF_FA00_0000_FFFF,
            0x00CF_F200_0000_FFFF,
        ]
    );
}

#[test]
fn every_slot_decodes_to_its_inputs() {
    let gdt = GlobalDescriptorTable::flat();
    let expected = [
        (SegmentIndex::KernelCode, PrivilegeLevel::Ring0, true),
        (SegmentIndex::KernelData, PrivilegeLevel::Ring0, false),
        (SegmentIndex::UserCode, PrivilegeLevel::Ring3, true),
        (SegmentIndex::UserData, PrivilegeLevel::Ring3, false),
    ];

    for (index, privilege, code) in expected {
        let entry = gdt.entry(index);
        assert_eq!(entry.base(), 0, "{:?}", index);
        assert_eq!(entry.limit(), 0xF_FFFF, "{:?}", index);
        assert_eq!(entry.byte_limit(), 0xFFFF_FFFF, "{:?}", index);
        assert_eq!(entry.privilege(), privilege, "{:?}", index);
        assert_eq!(entry.is_code(), code, "{:?}", index);
        assert!(entry.is_present());
        assert!(entry.access().contains(SegmentAccess::CODE_DATA | SegmentAccess::READ_WRITE));
        assert_eq!(entry.flags(), SegmentFlags::GRANULARITY_4K | SegmentFlags::SIZE_32);
    }

    let null = gdt.entry(SegmentIndex::Null);
    assert_eq!(*null, SegmentDescriptor::NULL);
    assert!(!null.is_present());
}

#[test]
fn kernel_code_from_full_byte_limit() {
    let entry = SegmentDescriptor::new(
        0,
        0xFFFF_FFFF,
        SegmentAccess::PRESENT
            | SegmentAccess::CODE_DATA
            | SegmentAccess::EXECUTABLE
            | SegmentAccess::READ_WRITE,
        PrivilegeLevel::Ring0,
        SegmentFlags::GRANULARITY_4K | SegmentFlags::SIZE_32,
    );

    assert_eq!(entry.base(), 0);
    assert_eq!(entry.byte_limit(), 0xFFFF_FFFF);
    assert_eq!(entry.privilege(), PrivilegeLevel::Ring0);
    assert_eq!(entry, *GlobalDescriptorTable::flat().entry(SegmentIndex::KernelCode));
}

#[test]
fn scattered_base_and_limit_fields() {
    let access = SegmentAccess::PRESENT | SegmentAccess::CODE_DATA | SegmentAccess::READ_WRITE;
    let entry = SegmentDescriptor::new(
        0x1234_5678,
        0x000A_BCDE,
        access,
        PrivilegeLevel::Ring2,
        SegmentFlags::SIZE_32 | SegmentFlags::AVAILABLE,
    );

    assert_eq!(entry.to_bits(), 0x125A_D234_5678_BCDE);
    assert_eq!(entry.base(), 0x1234_5678);
    assert_eq!(entry.limit(), 0xA_BCDE);
    assert_eq!(entry.byte_limit(), 0xA_BCDE);
    assert_eq!(entry.access(), access);
    assert_eq!(entry.privilege(), PrivilegeLevel::Ring2);
    assert_eq!(entry.flags(), SegmentFlags::SIZE_32 | SegmentFlags::AVAILABLE);
}

#[test]
fn limit_above_twenty_bits_is_truncated() {
    let entry = SegmentDescriptor::new(
        0,
        0x0123_4567,
        SegmentAccess::PRESENT,
        PrivilegeLevel::Ring0,
        SegmentFlags::empty(),
    );
    assert_eq!(entry.limit(), 0x3_4567);
    assert!(entry.flags().is_empty());
}

#[test]
fn byte_limit_picks_granularity() {
    let access = SegmentAccess::PRESENT | SegmentAccess::CODE_DATA | SegmentAccess::READ_WRITE;

    let small =
        SegmentDescriptor::with_byte_limit(0x1000, 0xFFFF, access, PrivilegeLevel::Ring0, SegmentFlags::SIZE_32)
            .unwrap();
    assert!(!small.flags().contains(SegmentFlags::GRANULARITY_4K));
    assert_eq!(small.byte_limit(), 0xFFFF);

    let full = SegmentDescriptor::with_byte_limit(
        0,
        0xFFFF_FFFF,
        access,
        PrivilegeLevel::Ring0,
        SegmentFlags::SIZE_32,
    )
    .unwrap();
    assert_eq!(full, *GlobalDescriptorTable::flat().entry(SegmentIndex::KernelData));

    let err = SegmentDescriptor::with_byte_limit(
        0,
        0x0020_0000,
        access,
        PrivilegeLevel::Ring0,
        SegmentFlags::SIZE_32,
    );
    assert_eq!(err, Err(DescriptorError::UnalignedPageLimit { limit: 0x0020_0000 }));
}

#[test]
fn selectors_carry_index_and_rpl() {
    assert_eq!(KERNEL_CODE_SELECTOR.0, 0x08);
    assert_eq!(KERNEL_DATA_SELECTOR.0, 0x10);
    assert_eq!(USER_CODE_SELECTOR.0, 0x1B);
    assert_eq!(USER_DATA_SELECTOR.0, 0x23);

    for index in SegmentIndex::ALL {
        let selector = index.selector();
        assert_eq!(selector.index(), index as u16);
        assert_eq!(selector.rpl(), index.privilege());
    }
}

#[test]
fn pointer_covers_five_entries() {
    let gdt = GlobalDescriptorTable::flat();
    let pointer = gdt.pointer();
    assert_eq!({ pointer.limit }, 39);
    assert_eq!(pointer.entries(), GDT_ENTRIES);
    assert_eq!(core::mem::size_of::<GlobalDescriptorTable>(), 40);
}

#[test]
fn nothing_installed_on_the_host() {
    assert!(table().is_none());
}
