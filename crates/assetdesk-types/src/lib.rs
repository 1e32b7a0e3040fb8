//! Shared types for the assetdesk admission core.
//!
//! Holds the error type used across the workspace plus the two capabilities the
//! core consumes from the outside world: a clock and a source of secure random
//! bytes. Keeping them here lets the core and the HTTP crate agree on one
//! definition without depending on each other.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod error;
pub mod prelude;
pub mod random;

// vim: ts=4
