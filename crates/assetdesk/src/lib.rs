//! assetdesk HTTP front.
//!
//! Wires the admission core into an axum application:
//!
//! - admission middleware on every route group (allow-list, ban, rate limit)
//! - cookie based login sessions with CSRF protection
//! - LAN-only administration endpoint
//! - periodic maintenance of the admission state

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub use assetdesk_core as admission;
pub use assetdesk_types::error;

pub mod app;
pub mod auth;
pub mod extract;
pub mod prelude;
pub mod routes;

pub use app::{App, AppBuilder, AppBuilderOpts, AppState};
pub use auth::{CredentialVerifier, StaticCredentials};

// vim: ts=4
