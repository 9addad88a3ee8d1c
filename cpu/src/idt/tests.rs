//! IDT subsystem tests

use super::*;
use crate::gdt::KERNEL_CODE_SELECTOR;
use x86_64::PrivilegeLevel;

/// Stand-in stub addresses with distinct low and high halves
fn fake_stubs() -> [u32; EXCEPTION_VECTORS] {
    core::array::from_fn(|vector| 0x0010_0000 + 0x0001_0010 * vector as u32)
}

#[test]
fn gate_encoding_matches_reference() {
    let gate = GateDescriptor::interrupt(0x0010_1234);
    assert_eq!(gate.to_bits(), 0x0010_8E00_0008_1234);
    assert_eq!(GateAttributes::KERNEL_INTERRUPT.bits(), 0x8E);
}

#[test]
fn gate_fields_round_trip() {
    let attributes = GateAttributes::new(PrivilegeLevel::Ring3, GateType::Trap32);
    let gate = GateDescriptor::new(0xDEAD_BEEF, KERNEL_CODE_SELECTOR, attributes);

    assert_eq!(gate.offset(), 0xDEAD_BEEF);
    assert_eq!(gate.selector(), KERNEL_CODE_SELECTOR);
    assert_eq!(gate.reserved(), 0);
    assert!(gate.is_present());
    assert_eq!(gate.privilege(), PrivilegeLevel::Ring3);
    assert_eq!(gate.gate_type(), Some(GateType::Trap32));
    assert_eq!(attributes.bits(), 0xEF);
}

#[test]
fn every_exception_vector_points_at_its_own_stub() {
    let stubs = fake_stubs();
    let mut idt = InterruptDescriptorTable::new();
    idt.populate_exceptions(&stubs);

    for vector in 0..EXCEPTION_VECTORS as u8 {
        let gate = idt.gate(vector);
        assert_eq!(gate.offset(), stubs[vector as usize], "vector {}", vector);
        assert_eq!(gate.selector(), KERNEL_CODE_SELECTOR);
        assert_eq!(gate.attributes(), GateAttributes::KERNEL_INTERRUPT);
        assert_eq!(gate.reserved(), 0);
    }

    // Vector 0x13 must not share vector 0x1D's stub.
    assert_ne!(idt.gate(0x13).offset(), idt.gate(0x1D).offset());
    let mut offsets: Vec<u32> = (0..32).map(|v| idt.gate(v).offset()).collect();
    offsets.sort_unstable();
    offsets.dedup();
    assert_eq!(offsets.len(), EXCEPTION_VECTORS);
}

#[test]
fn vectors_above_exceptions_stay_missing() {
    let mut idt = InterruptDescriptorTable::new();
    idt.populate_exceptions(&fake_stubs());

    for vector in EXCEPTION_VECTORS..IDT_ENTRIES {
        let gate = idt.gate(vector as u8);
        assert_eq!(*gate, GateDescriptor::MISSING);
        assert_eq!(gate.to_bits(), 0);
    }
    assert!(idt.present_vectors().eq(0..32u8));
}

#[test]
fn pointer_covers_all_gates() {
    let idt = InterruptDescriptorTable::new();
    let pointer = idt.pointer();
    assert_eq!({ pointer.limit }, 2047);
    assert_eq!(core::mem::size_of::<InterruptDescriptorTable>(), 2048);
}

#[test]
fn unknown_gate_types_decode_to_none() {
    assert_eq!(GateType::from_bits(0x8E), Some(GateType::Interrupt32));
    assert_eq!(GateType::from_bits(0x0C), None);
    assert_eq!(GateDescriptor::MISSING.gate_type(), None);
}
