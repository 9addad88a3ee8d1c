//! Protected-mode kernel: installs the descriptor tables and traps
//! CPU exceptions.
//!
//! Only the i386 build boots. On the host, `cargo test -p os` exercises
//! the target-independent parts (logger, config).

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![allow(dead_code)]

#[cfg(target_arch = "x86")]
mod boot;
mod config;
#[cfg(target_arch = "x86")]
mod kernel;
mod logger;
mod serial;
mod vga;

/// Entered once from `_start` with the loader's EAX and EBX
#[cfg(target_arch = "x86")]
extern "C" fn kernel_main(magic: u32, multiboot_info: u32) -> ! {
    match kernel::early_init(magic, multiboot_info) {
        Ok(state) => kernel::kernel_loop(state),
        Err(err) => panic!("kernel init failed: {}", err),
    }
}

#[cfg(all(not(test), target_arch = "x86"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    cpu::instructions::disable_interrupts();
    // SAFETY: interrupts are off and this CPU never leaves the handler.
    unsafe {
        serial::write_fmt_panicking(format_args!("\n[PANIC] {}\n", info));
        vga::print_panicking(format_args!("\nKERNEL PANIC: {}\n", info));
    }
    cpu::instructions::halt_forever()
}
