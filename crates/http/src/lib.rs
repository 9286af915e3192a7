//! Authenticated HTTP access to the portal REST API
//!
//! Every data request goes through [`AuthenticatedFetchClient`], which attaches
//! the caller's identity token and recovers once from an expired session by
//! silently signing in again.

pub mod client;

pub use client::error::ClientError;
pub use client::refresh::RefreshGate;
pub use client::request::RequestInit;
pub use client::{AuthenticatedFetchClient, AuthenticatedFetchClientBuilder, MAX_ATTEMPTS};
