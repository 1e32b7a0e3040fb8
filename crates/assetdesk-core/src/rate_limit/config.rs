//! Rate Limiting Configuration
//!
//! One base rate/burst pair is configured; the four pools derive their own
//! quotas from it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Purpose a rate limiter pool serves
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
	/// Page and asset requests
	Web,
	/// File downloads and uploads
	File,
	/// JSON API calls
	Api,
	/// Login and credential endpoints
	Auth,
}

impl PoolKind {
	pub const ALL: [PoolKind; 4] = [PoolKind::Web, PoolKind::File, PoolKind::Api, PoolKind::Auth];

	pub fn name(&self) -> &'static str {
		match self {
			PoolKind::Web => "web",
			PoolKind::File => "file",
			PoolKind::Api => "api",
			PoolKind::Auth => "auth",
		}
	}

	/// Divisor applied to the base rate and burst
	fn divisor(&self) -> f64 {
		match self {
			PoolKind::Web | PoolKind::Api => 1.0,
			// Large files are costlier
			PoolKind::File => 4.0,
			// Slows down credential guessing
			PoolKind::Auth => 10.0,
		}
	}
}

impl std::fmt::Display for PoolKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}

/// Quota of a single pool
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoolConfig {
	/// Tokens added per second
	pub refill_rate: f64,
	/// Bucket capacity
	pub burst: f64,
}

impl PoolConfig {
	/// Rates below this are treated as this value so refill math never divides by zero
	pub const MIN_RATE: f64 = 0.001;

	pub fn new(refill_rate: f64, burst: f64) -> Self {
		let refill_rate =
			if refill_rate.is_finite() { refill_rate.max(Self::MIN_RATE) } else { Self::MIN_RATE };
		// A bucket that can never hold one token would deny everything
		let burst = if burst.is_finite() { burst.max(1.0) } else { 1.0 };
		Self { refill_rate, burst }
	}
}

/// Base rate limit configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
	/// Base refill rate (tokens per second)
	pub rate: f64,
	/// Base burst capacity
	pub burst: f64,
	/// Entries untouched this long become candidates for eviction
	pub idle_ttl_secs: u64,
}

impl RateLimitConfig {
	pub fn new(rate: f64, burst: f64) -> Self {
		Self { rate, burst, ..Self::default() }
	}

	/// Derive the quota of one pool from the base values
	pub fn pool(&self, kind: PoolKind) -> PoolConfig {
		PoolConfig::new(self.rate / kind.divisor(), self.burst / kind.divisor())
	}

	pub fn idle_ttl(&self) -> Duration {
		Duration::from_secs(self.idle_ttl_secs)
	}
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			rate: 20.0,
			burst: 40.0,
			idle_ttl_secs: 600, // 10 minutes
		}
	}
}


// vim: ts=4
