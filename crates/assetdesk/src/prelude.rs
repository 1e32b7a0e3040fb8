pub use assetdesk_core::prelude::*;

pub use crate::app::{App, AppState};

// vim: ts=4
