//! Tracing setup for hosting binaries
//!
//! Library code only emits events through the `tracing` macros; binaries
//! call [`init::init_tracing`] once at startup to install a subscriber.

pub mod config;
pub mod init;

pub use config::InstrumentationConfig;
pub use init::init_tracing;
