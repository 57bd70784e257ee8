//! Process-wide tracing setup.

pub mod logging;

pub use logging::{LogFormat, UnknownLogFormat};

/// Initialize tracing/logging for the process from `LOG_FORMAT` and `RUST_LOG`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    let format = match std::env::var("LOG_FORMAT") {
        Ok(raw) => raw.parse().unwrap_or_else(|e: UnknownLogFormat| {
            eprintln!("{e}; falling back to json");
            LogFormat::Json
        }),
        Err(_) => LogFormat::Json,
    };
    logging::init_with(format);
}
