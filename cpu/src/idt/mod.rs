//! Interrupt Descriptor Table (IDT)
//!
//! All 256 vectors are present in memory, but only the 32 CPU exception
//! vectors point at a stub. The remaining gates are left not-present:
//! delivering one of them raises #NP (vector 11) with an error code that
//! names the offending IDT slot, which the vector 11 stub then reports.

pub mod descriptor;

#[cfg(test)]
mod tests;

use spin::Once;

use crate::exception::EXCEPTION_VECTORS;
use crate::pointer::DescriptorTablePointer;

pub use descriptor::{GateAttributes, GateDescriptor, GateType};

/// Number of vectors in the table
pub const IDT_ENTRIES: usize = 256;

/// The 256-gate interrupt table
#[derive(Clone)]
#[repr(C, align(8))]
pub struct InterruptDescriptorTable {
    gates: [GateDescriptor; IDT_ENTRIES],
}

impl InterruptDescriptorTable {
    /// Table with every gate missing
    pub const fn new() -> Self {
        Self {
            gates: [GateDescriptor::MISSING; IDT_ENTRIES],
        }
    }

    pub fn set_gate(&mut self, vector: u8, gate: GateDescriptor) {
        self.gates[vector as usize] = gate;
    }

    pub fn gate(&self, vector: u8) -> &GateDescriptor {
        &self.gates[vector as usize]
    }

    /// Point vectors 0–31 at their stubs through kernel interrupt gates
    ///
    /// `stubs[v]` must be the entry address of the stub for vector `v`.
    pub fn populate_exceptions(&mut self, stubs: &[u32; EXCEPTION_VECTORS]) {
        for (vector, &offset) in stubs.iter().enumerate() {
            self.gates[vector] = GateDescriptor::interrupt(offset);
        }
    }

    /// Vectors whose gate is present
    pub fn present_vectors(&self) -> impl Iterator<Item = u8> + '_ {
        self.gates
            .iter()
            .enumerate()
            .filter(|(_, gate)| gate.is_present())
            .map(|(vector, _)| vector as u8)
    }

    /// `lidt` operand for this table at its current address
    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer::for_entries(self.gates.as_ptr() as usize as u32, IDT_ENTRIES)
    }

    /// Load the table into IDTR
    ///
    /// # Safety
    /// Every present gate must point at a valid entry stub.
    #[cfg(target_arch = "x86")]
    pub unsafe fn load(&'static self) {
        crate::instructions::lidt(&self.pointer());
    }
}

impl Default for InterruptDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The live IDT, built and installed exactly once
static IDT: Once<InterruptDescriptorTable> = Once::new();

/// Installed table, if [`init`] has run
pub fn table() -> Option<&'static InterruptDescriptorTable> {
    IDT.get()
}

/// Build the IDT from the exception stubs and load it
///
/// Requires the GDT to be installed first, since every gate references the
/// kernel code selector. A second call returns
/// [`InitError::AlreadyInitialized`](crate::InitError::AlreadyInitialized).
/// After this returns, exceptions 0–31 are delivered to their stubs until
/// another table is loaded.
#[cfg(target_arch = "x86")]
pub fn init() -> Result<(), crate::InitError> {
    log::info!("=== IDT Initialization ===");

    let mut fresh = false;
    let idt = IDT.call_once(|| {
        fresh = true;
        let mut idt = InterruptDescriptorTable::new();
        idt.populate_exceptions(&crate::stubs::stub_addresses());
        idt
    });
    if !fresh {
        return Err(crate::InitError::AlreadyInitialized {
            table: crate::error::Table::Idt,
        });
    }

    // SAFETY: only vectors 0–31 are present and each points at the stub
    // generated for that vector.
    unsafe { idt.load() };

    let pointer = idt.pointer();
    log::info!(
        "IDT loaded: base={:#010x} limit={:#x} gates={}",
        { pointer.base },
        { pointer.limit },
        idt.present_vectors().count()
    );
    for vector in idt.present_vectors() {
        log::trace!("  [{:2}] {:?}", vector, idt.gate(vector));
    }
    Ok(())
}
