//! Logging utilities and structured logging support

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system with a default level.
///
/// `RUST_LOG` still takes precedence when set. Calling this more than once is
/// harmless; later calls are ignored.
pub fn init_with_level(level: &str) {
    let filter = parse_level(level);
    let _ = env_logger::Builder::from_default_env()
        .filter_level(filter)
        .parse_env("RUST_LOG")
        .try_init();
}

/// Parse a textual level, falling back to `Info` for unknown input
pub fn parse_level(level: &str) -> log::LevelFilter {
    level.parse().unwrap_or(log::LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), log::LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), log::LevelFilter::Warn);
        assert_eq!(parse_level("chatty"), log::LevelFilter::Info);
    }

    #[test]
    fn test_repeated_init_is_harmless() {
        init_with_level("debug");
        init_with_level("warn");
        log::info!("logging initialized twice");
    }
}
