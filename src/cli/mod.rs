//! Command-line interface.

mod commands;

pub use commands::{run, Cli};

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}
