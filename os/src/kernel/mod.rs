//! Kernel bring-up sequence

pub mod selftest;

use core::fmt;

use cpu::InitError;

use crate::{boot, config, logger, serial, vga};

/// Errors that stop the kernel before it reaches its idle loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelInitError {
    /// EAX at entry did not hold the multiboot loader magic
    BadBootMagic(u32),
    Gdt(InitError),
    Idt(InitError),
    /// A logger was already installed
    Logger,
}

impl KernelInitError {
    pub const fn description(&self) -> &'static str {
        match self {
            Self::BadBootMagic(_) => "not loaded by a multiboot loader",
            Self::Gdt(_) => "GDT initialization failed",
            Self::Idt(_) => "IDT initialization failed",
            Self::Logger => "logger initialization failed",
        }
    }
}

impl fmt::Display for KernelInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadBootMagic(magic) => write!(f, "{} (eax={:#010x})", self.description(), magic),
            Self::Gdt(err) | Self::Idt(err) => write!(f, "{}: {}", self.description(), err),
            Self::Logger => f.write_str(self.description()),
        }
    }
}

/// What early init hands to the idle loop
pub struct KernelState {
    /// Physical address of the multiboot information structure
    pub multiboot_info: u32,
}

/// Bring up the log, then the descriptor tables
///
/// Runs once, on the boot stack, with interrupts disabled. Nothing before
/// `idt::init` may fault: until then an exception resets the machine.
pub fn early_init(magic: u32, multiboot_info: u32) -> Result<KernelState, KernelInitError> {
    serial::init();
    vga::CONSOLE.lock().clear();
    logger::init().map_err(|_| KernelInitError::Logger)?;

    log::info!("kernel entered in 32-bit protected mode");
    if magic != boot::BOOTLOADER_MAGIC {
        return Err(KernelInitError::BadBootMagic(magic));
    }
    log::debug!("multiboot info at {:#010x}", multiboot_info);
    boot::log_stack_info();

    cpu::gdt::init().map_err(KernelInitError::Gdt)?;
    cpu::idt::init().map_err(KernelInitError::Idt)?;
    cpu::report::set_output(vga::print_from_trap);

    crate::println!("GDT and IDT installed, exceptions 0-31 armed");

    if config::RUN_SELFTESTS {
        selftest::run_all();
    }

    Ok(KernelState { multiboot_info })
}

/// Idle forever; with no IRQ sources only an NMI wakes the CPU
pub fn kernel_loop(state: KernelState) -> ! {
    log::info!(
        "init complete (multiboot info {:#010x}), idling",
        state.multiboot_info
    );
    loop {
        cpu::instructions::hlt();
    }
}
