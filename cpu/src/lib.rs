//! i386 protected-mode CPU tables and trap plumbing.
//!
//! This crate owns everything between the hardware and the first line of
//! kernel Rust code that runs on a trap:
//!
//! - [`gdt`]: the flat-model Global Descriptor Table
//! - [`idt`]: the Interrupt Descriptor Table for exception vectors 0–31
//! - [`stubs`]: one entry trampoline per exception vector
//! - [`dispatch`]: the shared register-save stub and the handler table
//! - [`report`]: the default diagnostic handler
//!
//! Descriptor encoding, the exception catalogue and the dispatch logic are
//! plain Rust and are unit tested on the host. The privileged parts
//! (table loads, segment reloads, the assembly stubs) only exist when
//! building for `target_arch = "x86"`.

#![cfg_attr(not(test), no_std)]

pub mod dispatch;
pub mod error;
pub mod exception;
pub mod frame;
pub mod gdt;
pub mod idt;
#[cfg(target_arch = "x86")]
pub mod instructions;
pub mod pointer;
pub mod report;
pub mod stubs;

pub use dispatch::{HandlerTable, TrapHandler, TrapOutcome};
pub use error::{DescriptorError, DispatchError, InitError, Table};
pub use exception::{ExceptionClass, ExceptionInfo, EXCEPTIONS, EXCEPTION_VECTORS};
pub use frame::TrapFrame;
pub use x86_64::PrivilegeLevel;
