//! Rate Limiting System
//!
//! Per-address token buckets in four pools (web, file, api, auth), the
//! admission denial type and the tower middleware that applies allow-list, ban
//! and rate limit checks to routes.

mod config;
mod error;
mod extractors;
mod limiter;
mod middleware;

pub use config::{PoolConfig, PoolKind, RateLimitConfig};
pub use error::AdmissionError;
pub use extractors::extract_client_ip;
pub use limiter::{PoolStats, RateLimitManager, RateLimiterPool, TokenBucket};
pub use middleware::{AdmissionLayer, AdmissionService, ClientIp};

// vim: ts=4
