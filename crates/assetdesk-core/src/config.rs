//! Admission configuration
//!
//! Loaded once at startup by the host process. Every section has defaults so a
//! partial document (or none at all) yields a working configuration.

use std::time::Duration;

use serde::Deserialize;

pub use crate::rate_limit::RateLimitConfig;

/// Longest accepted ban period (one year); larger values are capped
pub const MAX_BAN_PERIOD_SECS: u64 = 365 * 24 * 60 * 60;
/// Longest accepted session lifetime (30 days); larger values are capped
pub const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// How the client address of a request is determined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
	/// Clients connect directly
	#[default]
	Standalone,
	/// Behind a reverse proxy that sets forwarding headers
	Proxy,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BanConfig {
	/// How long an offense keeps an address banned
	pub ban_period_secs: u64,
	/// Failed attempts counted by `BanList::penalize` before a ban is recorded
	pub offense_threshold: u32,
	/// Memory bound; the ban cache holds a tenth, the penalty cache a fifth of this
	pub max_tracked_ips: usize,
}

impl BanConfig {
	pub fn ban_period(&self) -> Duration {
		Duration::from_secs(self.ban_period_secs.min(MAX_BAN_PERIOD_SECS))
	}
}

impl Default for BanConfig {
	fn default() -> Self {
		Self {
			ban_period_secs: 900, // 15 minutes
			offense_threshold: 5,
			max_tracked_ips: 100_000,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
	/// Lifetime of all three session tokens, fixed at creation
	pub ttl_secs: u64,
}

impl SessionConfig {
	pub fn ttl(&self) -> Duration {
		Duration::from_secs(self.ttl_secs.min(MAX_SESSION_TTL_SECS))
	}
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self { ttl_secs: 20 * 60 }
	}
}

/// Allow-list sources, each a comma separated list of addresses or CIDR ranges
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AllowListConfig {
	pub wan: String,
	pub lan: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdmissionConfig {
	pub mode: ServerMode,
	pub rate_limit: RateLimitConfig,
	pub ban: BanConfig,
	pub session: SessionConfig,
	pub allow_list: AllowListConfig,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = AdmissionConfig::default();
		assert_eq!(config.mode, ServerMode::Standalone);
		assert_eq!(config.session.ttl(), Duration::from_secs(1200));
		assert_eq!(config.ban.ban_period(), Duration::from_secs(900));
		assert!(config.allow_list.lan.is_empty());
	}

	#[test]
	fn test_deserialize_nested() {
		let config: AdmissionConfig = serde_json::from_str(
			r#"{
				"mode": "proxy",
				"rateLimit": { "rate": 5, "burst": 10 },
				"ban": { "banPeriodSecs": 60 },
				"allowList": { "lan": "10.0.0.0/8, 192.168.0.0/16" }
			}"#,
		)
		.unwrap();

		assert_eq!(config.mode, ServerMode::Proxy);
		assert_eq!(config.rate_limit.rate, 5.0);
		assert_eq!(config.ban.ban_period(), Duration::from_secs(60));
		assert_eq!(config.ban.offense_threshold, 5);
		assert_eq!(config.session.ttl_secs, 1200);
		assert_eq!(config.allow_list.lan, "10.0.0.0/8, 192.168.0.0/16");
	}
}

// vim: ts=4
