//! Chaser-CDP: Chrome DevTools Protocol session core
//!
//! This library multiplexes request/response calls and event notifications over
//! a single CDP WebSocket connection, with typed wrappers for common domains.

pub mod error;
pub mod config;

pub mod cdp;
pub mod domains;

// Re-exports
pub use error::{Error, Result};

/// Chaser-CDP library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
