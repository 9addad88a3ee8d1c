//! Compile-time kernel configuration

use log::LevelFilter;

/// I/O base of the serial port carrying the log (COM1)
pub const SERIAL_PORT: u16 = 0x3F8;

/// Size of the boot stack set up by `_start`
pub const STACK_SIZE: usize = 16 * 1024;

/// Echo every log record on the VGA console as well
pub const MIRROR_LOG_TO_CONSOLE: bool = false;

/// Run the boot self tests once the tables are installed
pub const RUN_SELFTESTS: bool = cfg!(feature = "selftest");

/// Maximum log level, taken from `KERNEL_LOG` at build time
pub const LOG_LEVEL: LevelFilter = parse_level(option_env!("KERNEL_LOG"));

const fn parse_level(value: Option<&str>) -> LevelFilter {
    let Some(value) = value else {
        return LevelFilter::Info;
    };
    match value.as_bytes() {
        b"off" => LevelFilter::Off,
        b"error" => LevelFilter::Error,
        b"warn" => LevelFilter::Warn,
        b"info" => LevelFilter::Info,
        b"debug" => LevelFilter::Debug,
        b"trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_names() {
        assert_eq!(parse_level(Some("trace")), LevelFilter::Trace);
        assert_eq!(parse_level(Some("off")), LevelFilter::Off);
        assert_eq!(parse_level(Some("verbose")), LevelFilter::Info);
        assert_eq!(parse_level(None), LevelFilter::Info);
    }
}
