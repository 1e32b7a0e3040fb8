pub use assetdesk_types::clock::Clock;
pub use assetdesk_types::error::{AdResult, Error};
pub use assetdesk_types::random::RandomSource;

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
