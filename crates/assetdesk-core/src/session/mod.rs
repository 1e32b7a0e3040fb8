//! Authenticated sessions

pub mod store;
pub mod token;

pub use store::SessionStore;
pub use token::{AuthSession, SessionToken, SessionValidation};

// vim: ts=4
