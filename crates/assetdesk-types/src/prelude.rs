pub use crate::clock::Clock;
pub use crate::error::{AdResult, Error};
pub use crate::random::RandomSource;

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
