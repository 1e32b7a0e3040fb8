//! Request admission and session control for assetdesk.
//!
//! Every inbound request passes through the same checks: an optional CIDR
//! allow-list, the ban list and a per-address token bucket. Authenticated
//! routes additionally validate the client's session. All state lives in
//! memory; nothing in this crate performs I/O.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod allow_list;
pub mod ban;
pub mod config;
pub mod extensions;
pub mod prelude;
pub mod rate_limit;
pub mod session;
pub mod state;

// Re-export commonly used types
pub use allow_list::{AllowLists, AllowScope, IpAllowList};
pub use ban::BanList;
pub use config::{AdmissionConfig, ServerMode};
pub use rate_limit::{AdmissionError, AdmissionLayer, ClientIp, PoolKind};
pub use session::{AuthSession, SessionStore, SessionValidation};
pub use state::{AdmissionState, SharedState};

// vim: ts=4
