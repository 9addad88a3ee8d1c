//! Boot-time checks run against the live tables
//!
//! These need the real CPU, so they run from `early_init` rather than
//! under `cargo test`. Any failed check panics.

use core::arch::asm;
use core::sync::atomic::{AtomicU32, Ordering};

use cpu::dispatch;
use cpu::gdt::{self, GDT_ENTRIES, KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR};
use cpu::idt::{self, GateAttributes, IDT_ENTRIES};
use cpu::instructions::{read_cs, read_ds, read_es, read_fs, read_gs, read_ss, sgdt, sidt};
use cpu::stubs::stub_addresses;
use cpu::{TrapFrame, TrapOutcome, EXCEPTION_VECTORS};

/// Run every check in order
pub fn run_all() {
    log::info!("=== Self Tests ===");
    verify_gdt();
    verify_idt();
    breakpoint_resumes_with_registers_intact();
    divide_error_handler_edits_the_frame();
    log::info!("self tests passed");
}

/// GDTR points at the live table and all segment registers use it
pub fn verify_gdt() {
    let Some(table) = gdt::table() else {
        panic!("selftest: GDT not initialized");
    };
    let gdtr = sgdt();
    let expected = table.pointer();

    assert_eq!({ gdtr.base }, { expected.base }, "GDTR base");
    assert_eq!({ gdtr.limit }, (GDT_ENTRIES * 8 - 1) as u16, "GDTR limit");
    assert_eq!(read_cs(), KERNEL_CODE_SELECTOR, "CS");
    assert_eq!(read_ds(), KERNEL_DATA_SELECTOR, "DS");
    assert_eq!(read_ss(), KERNEL_DATA_SELECTOR, "SS");

    log::info!(
        "GDT ok: base={:#010x} cs={:#06x} ds={:#06x}",
        { gdtr.base },
        read_cs().0,
        read_ds().0
    );
}

/// IDTR points at the live table and each exception gate at its own stub
pub fn verify_idt() {
    let Some(table) = idt::table() else {
        panic!("selftest: IDT not initialized");
    };
    let idtr = sidt();
    assert_eq!({ idtr.base }, { table.pointer().base }, "IDTR base");
    assert_eq!({ idtr.limit }, (IDT_ENTRIES * 8 - 1) as u16, "IDTR limit");

    let stubs = stub_addresses();
    for (vector, &stub) in stubs.iter().enumerate() {
        let gate = table.gate(vector as u8);
        assert_eq!(gate.offset(), stub, "gate {} offset", vector);
        assert_eq!(gate.selector(), KERNEL_CODE_SELECTOR, "gate {} selector", vector);
        assert_eq!(gate.attributes(), GateAttributes::KERNEL_INTERRUPT, "gate {} type", vector);
    }
    assert_eq!(table.present_vectors().count(), EXCEPTION_VECTORS);

    log::info!("IDT ok: {} exception gates", EXCEPTION_VECTORS);
}

const EAX: u32 = 0x1111_1111;
const ECX: u32 = 0x2222_2222;
const EDX: u32 = 0x3333_3333;
const EDI: u32 = 0x4444_4444;
const EBX: u32 = 0x5555_5555;
const ESI: u32 = 0x6666_6666;
const EBP: u32 = 0x7777_7777;

/// XOR of EBX/ESI/EBP against their loaded values, written after `int3`
static CALLEE_SAVED_MISMATCH: AtomicU32 = AtomicU32::new(u32::MAX);

/// `int3` goes through the default reporter and resumes after the int
///
/// EBX, ESI and EBP cannot be asm operands here, so the block saves them,
/// loads test values and folds any difference into one word in memory.
pub fn breakpoint_resumes_with_registers_intact() {
    let before = dispatch::trap_count(3);
    let (eax, ecx, edx, edi): (u32, u32, u32, u32);

    // SAFETY: vector 3 resumes by default and the stub path restores
    // every general-purpose and data segment register. EBX, ESI and EBP
    // are restored from the stack before the block ends.
    unsafe {
        asm!(
            "push ebx",
            "push esi",
            "push ebp",
            "mov ebx, {ebx_value}",
            "mov esi, {esi_value}",
            "mov ebp, {ebp_value}",
            "int3",
            "xor ebx, {ebx_value}",
            "xor esi, {esi_value}",
            "xor ebp, {ebp_value}",
            "or ebx, esi",
            "or ebx, ebp",
            "mov dword ptr [{mismatch}], ebx",
            "pop ebp",
            "pop esi",
            "pop ebx",
            ebx_value = const EBX,
            esi_value = const ESI,
            ebp_value = const EBP,
            mismatch = sym CALLEE_SAVED_MISMATCH,
            inout("eax") EAX => eax,
            inout("ecx") ECX => ecx,
            inout("edx") EDX => edx,
            inout("edi") EDI => edi,
        );
    }

    assert_eq!((eax, ecx, edx, edi), (EAX, ECX, EDX, EDI), "registers after int3");
    assert_eq!(
        CALLEE_SAVED_MISMATCH.load(Ordering::Relaxed),
        0,
        "ebx/esi/ebp after int3"
    );
    for (name, selector) in [
        ("DS", read_ds()),
        ("ES", read_es()),
        ("FS", read_fs()),
        ("GS", read_gs()),
        ("SS", read_ss()),
    ] {
        assert_eq!(selector, KERNEL_DATA_SELECTOR, "{} after int3", name);
    }
    assert_eq!(read_cs(), KERNEL_CODE_SELECTOR, "CS after int3");
    assert_eq!(dispatch::trap_count(3), before + 1, "breakpoint count");
    log::info!("breakpoint ok");
}

static SEEN_VECTOR: AtomicU32 = AtomicU32::new(u32::MAX);
static SEEN_ERROR_CODE: AtomicU32 = AtomicU32::new(u32::MAX);

/// Quotient the handler substitutes for the failed division
const SUBSTITUTE: u32 = 0x5A5A_5A5A;

/// Machine code of `div ecx`
const DIV_ECX: [u8; 2] = [0xF7, 0xF1];

/// Skip a faulting `div ecx` and make it return [`SUBSTITUTE`]
fn skip_division(frame: &mut TrapFrame) -> TrapOutcome {
    SEEN_VECTOR.store(frame.vector, Ordering::Relaxed);
    SEEN_ERROR_CODE.store(frame.error_code, Ordering::Relaxed);

    // SAFETY: EIP of a #DE points at the faulting instruction in mapped
    // kernel text.
    let code = unsafe { (frame.eip as usize as *const [u8; 2]).read() };
    if code != DIV_ECX {
        return TrapOutcome::Halt;
    }
    frame.eip += DIV_ECX.len() as u32;
    frame.regs.eax = SUBSTITUTE;
    TrapOutcome::Resume
}

/// A custom handler on vector 0 sees the frame and its edits stick
pub fn divide_error_handler_edits_the_frame() {
    let previous = match dispatch::register(0, skip_division) {
        Ok(previous) => previous,
        Err(err) => panic!("selftest: {}", err),
    };

    let (eax, ecx, edi): (u32, u32, u32);
    // SAFETY: the handler installed above skips the division.
    unsafe {
        asm!(
            "xor edx, edx",
            "div ecx",
            inout("eax") 100u32 => eax,
            inout("ecx") 0u32 => ecx,
            inout("edi") EDI => edi,
            out("edx") _,
        );
    }

    if let Err(err) = dispatch::register(0, previous) {
        panic!("selftest: {}", err);
    }

    assert_eq!(SEEN_VECTOR.load(Ordering::Relaxed), 0, "vector in frame");
    assert_eq!(SEEN_ERROR_CODE.load(Ordering::Relaxed), 0, "placeholder error code");
    assert_eq!(eax, SUBSTITUTE, "handler write to eax");
    assert_eq!((ecx, edi), (0, EDI), "untouched registers");
    assert_eq!(read_ds(), KERNEL_DATA_SELECTOR, "DS after #DE");
    log::info!("divide error ok");
}
