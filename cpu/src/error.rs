//! Error types for table construction, installation and handler registration

use core::fmt;

/// Which descriptor table an operation refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// Global Descriptor Table
    Gdt,
    /// Interrupt Descriptor Table
    Idt,
}

impl Table {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gdt => "GDT",
            Self::Idt => "IDT",
        }
    }
}

/// Errors returned by the one-shot table initialisers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// The table was already built and loaded
    ///
    /// Both tables follow a construct-once, install-once contract. A second
    /// call leaves the live table and the CPU registers untouched.
    AlreadyInitialized {
        /// The table that was initialised twice
        table: Table,
    },
}

impl InitError {
    pub const fn description(&self) -> &'static str {
        match self {
            Self::AlreadyInitialized { .. } => "descriptor table already initialized",
        }
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized { table } => {
                write!(f, "{}: {}", self.description(), table.name())
            }
        }
    }
}

/// Errors from building a segment descriptor out of a byte-sized limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorError {
    /// Limit does not fit in 20 bits and cannot be page-granular
    ///
    /// Page granularity scales the 20-bit field by 4 KiB and fills the low
    /// 12 bits with ones, so only limits of the form `n * 4096 + 0xFFF`
    /// above 1 MiB are representable.
    UnalignedPageLimit {
        /// Requested limit in bytes
        limit: u32,
    },
}

impl DescriptorError {
    pub const fn description(&self) -> &'static str {
        match self {
            Self::UnalignedPageLimit { .. } => "segment limit is not representable",
        }
    }
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnalignedPageLimit { limit } => write!(
                f,
                "{}: 0x{:x} exceeds 0xfffff and its low 12 bits are not all set",
                self.description(),
                limit
            ),
        }
    }
}

/// Errors from the trap handler table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// Only the 32 CPU exception vectors have stubs and handlers
    VectorOutOfRange {
        /// The rejected vector number
        vector: usize,
    },
}

impl DispatchError {
    pub const fn description(&self) -> &'static str {
        match self {
            Self::VectorOutOfRange { .. } => "vector has no exception stub",
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VectorOutOfRange { vector } => {
                write!(f, "{}: {} (valid range 0-31)", self.description(), vector)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_table() {
        let err = InitError::AlreadyInitialized { table: Table::Idt };
        assert_eq!(err.to_string(), "descriptor table already initialized: IDT");
    }

    #[test]
    fn display_includes_rejected_values() {
        let err = DescriptorError::UnalignedPageLimit { limit: 0x1234_5678 };
        assert!(err.to_string().contains("0x12345678"));

        let err = DispatchError::VectorOutOfRange { vector: 40 };
        assert!(err.to_string().contains("40"));
    }
}
