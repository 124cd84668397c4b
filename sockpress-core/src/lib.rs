//! Sockpress Core - errors, logging and configuration shared by the sockpress crates

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
pub use logging::*;

// Re-export commonly used external types
pub use tracing;
