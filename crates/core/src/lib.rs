//! Portal session core types and utilities
//!
//! Shared by the authenticated HTTP client and the idle session controller:
//! the identity capability they both call into, configuration and the
//! tracing setup used by hosting binaries.

pub mod config;
pub mod error;
pub mod identity;
#[cfg(feature = "tracing")]
pub mod tracing;

pub use config::{ApiConfig, IdentityConfig, IdleConfig, PortalConfig};
pub use error::{CoreError, CoreResult};
pub use identity::{FileTokenSession, IdentityError, IdentitySession, StaticTokenSession};
