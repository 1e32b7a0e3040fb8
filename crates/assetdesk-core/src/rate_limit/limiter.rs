//! Rate Limit Manager
//!
//! Token-bucket rate limiting keyed by client address. One `RateLimiterPool`
//! exists per purpose; `RateLimitManager` owns all four of them.
//!
//! Buckets live directly in a `DashMap`. Refill and consume run while the
//! entry's shard lock is held, so the pair is atomic per address: two callers
//! racing for the last token can never both win.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use super::config::{PoolConfig, PoolKind, RateLimitConfig};
use crate::prelude::*;

/// Slack for float rounding when a refill lands exactly on one token
const TOKEN_EPSILON: f64 = 1e-9;

/// Per-address bucket state
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TokenBucket {
	/// Always within `[0, burst]`
	pub tokens: f64,
	pub last_refill: Instant,
}

impl TokenBucket {
	fn full(config: &PoolConfig, now: Instant) -> Self {
		Self { tokens: config.burst, last_refill: now }
	}

	/// Add the tokens accrued since the last refill, capped at burst
	fn refill(&mut self, config: &PoolConfig, now: Instant) {
		let elapsed = now.saturating_duration_since(self.last_refill);
		let tokens = self.tokens + elapsed.as_secs_f64() * config.refill_rate;
		self.tokens = tokens.clamp(0.0, config.burst);
		// A clock reading from the past must not rewind the bucket
		if now > self.last_refill {
			self.last_refill = now;
		}
	}

	/// Spend one token, or report how long until one is available
	fn take(&mut self, config: &PoolConfig) -> Result<(), Duration> {
		if self.tokens + TOKEN_EPSILON >= 1.0 {
			self.tokens = (self.tokens - 1.0).max(0.0);
			Ok(())
		} else {
			let missing = 1.0 - self.tokens;
			Err(Duration::try_from_secs_f64(missing / config.refill_rate)
				.unwrap_or(Duration::from_secs(1)))
		}
	}

	/// Whether the bucket would be full at `now`, i.e. indistinguishable from a new one
	fn is_full_at(&self, config: &PoolConfig, now: Instant) -> bool {
		let elapsed = now.saturating_duration_since(self.last_refill);
		self.tokens + elapsed.as_secs_f64() * config.refill_rate + TOKEN_EPSILON >= config.burst
	}
}

/// Statistics of one pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
	pub tracked_addresses: usize,
	pub total_admitted: u64,
	pub total_limited: u64,
}

/// Token-bucket limiter for one purpose
#[derive(Debug)]
pub struct RateLimiterPool {
	kind: PoolKind,
	config: PoolConfig,
	idle_ttl: Duration,
	entries: DashMap<IpAddr, TokenBucket>,
	clock: Arc<dyn Clock>,
	total_admitted: AtomicU64,
	total_limited: AtomicU64,
}

impl RateLimiterPool {
	pub fn new(kind: PoolKind, config: PoolConfig, idle_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
		Self {
			kind,
			config,
			idle_ttl,
			entries: DashMap::new(),
			clock,
			total_admitted: AtomicU64::new(0),
			total_limited: AtomicU64::new(0),
		}
	}

	pub fn kind(&self) -> PoolKind {
		self.kind
	}

	pub fn config(&self) -> &PoolConfig {
		&self.config
	}

	/// Spend a token for `ip`, or return the time until one becomes available
	pub fn check(&self, ip: &IpAddr) -> Result<(), Duration> {
		let now = self.clock.now();
		let mut bucket = self
			.entries
			.entry(ip.to_canonical())
			.or_insert_with(|| TokenBucket::full(&self.config, now));

		bucket.refill(&self.config, now);
		let res = bucket.take(&self.config);
		drop(bucket);

		match res {
			Ok(()) => {
				self.total_admitted.fetch_add(1, Ordering::Relaxed);
			}
			Err(_) => {
				self.total_limited.fetch_add(1, Ordering::Relaxed);
			}
		}
		res
	}

	/// Admission decision for one request from `ip`
	pub fn admit(&self, ip: &IpAddr) -> bool {
		self.check(ip).is_ok()
	}

	/// Current bucket of an address with pending refill applied, without spending
	pub fn peek(&self, ip: &IpAddr) -> Option<TokenBucket> {
		let now = self.clock.now();
		self.entries.get(&ip.to_canonical()).map(|entry| {
			let mut bucket = *entry;
			bucket.refill(&self.config, now);
			bucket
		})
	}

	/// Drop buckets untouched for the idle TTL that have refilled to full burst.
	///
	/// Such a bucket behaves exactly like a freshly created one, so eviction
	/// never changes an admission decision. Returns the number of removed entries.
	pub fn evict_idle(&self) -> usize {
		let now = self.clock.now();
		let before = self.entries.len();
		self.entries.retain(|_, bucket| {
			let idle = now.saturating_duration_since(bucket.last_refill) >= self.idle_ttl;
			!(idle && bucket.is_full_at(&self.config, now))
		});
		before.saturating_sub(self.entries.len())
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn stats(&self) -> PoolStats {
		PoolStats {
			tracked_addresses: self.entries.len(),
			total_admitted: self.total_admitted.load(Ordering::Relaxed),
			total_limited: self.total_limited.load(Ordering::Relaxed),
		}
	}
}

/// Owns one pool per purpose
#[derive(Debug)]
pub struct RateLimitManager {
	pools: HashMap<PoolKind, RateLimiterPool>,
}

impl RateLimitManager {
	pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
		let pools = PoolKind::ALL
			.into_iter()
			.map(|kind| {
				let pool_config = config.pool(kind);
				debug!(
					"Rate limit pool {}: {} tokens/s, burst {}",
					kind, pool_config.refill_rate, pool_config.burst
				);
				(kind, RateLimiterPool::new(kind, pool_config, config.idle_ttl(), clock.clone()))
			})
			.collect();

		Self { pools }
	}

	pub fn pool(&self, kind: PoolKind) -> Option<&RateLimiterPool> {
		self.pools.get(&kind)
	}

	pub fn check(&self, kind: PoolKind, ip: &IpAddr) -> Result<(), Duration> {
		match self.pools.get(&kind) {
			Some(pool) => pool.check(ip),
			None => {
				// Every kind gets a pool in new(); reaching this is a construction bug
				error!("No rate limit pool for {}", kind);
				Ok(())
			}
		}
	}

	pub fn admit(&self, kind: PoolKind, ip: &IpAddr) -> bool {
		self.check(kind, ip).is_ok()
	}

	/// Run idle eviction on every pool
	pub fn evict_idle(&self) -> usize {
		self.pools.values().map(RateLimiterPool::evict_idle).sum()
	}

	pub fn stats(&self) -> Vec<(PoolKind, PoolStats)> {
		PoolKind::ALL
			.into_iter()
			.filter_map(|kind| self.pools.get(&kind).map(|pool| (kind, pool.stats())))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assetdesk_types::clock::ManualClock;
	use std::net::{Ipv4Addr, Ipv6Addr};

	fn pool_with(rate: f64, burst: f64) -> (RateLimiterPool, Arc<ManualClock>) {
		let clock = Arc::new(ManualClock::new());
		let pool = RateLimiterPool::new(
			PoolKind::Web,
			PoolConfig::new(rate, burst),
			Duration::from_secs(60),
			clock.clone(),
		);
		(pool, clock)
	}

	#[test]
	fn test_burst_then_deny() {
		let (pool, _clock) = pool_with(2.0, 5.0);
		let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100));

		for _ in 0..5 {
			assert!(pool.admit(&ip));
		}
		assert!(!pool.admit(&ip));
	}

	#[test]
	fn test_refill_after_one_interval() {
		let (pool, clock) = pool_with(2.0, 5.0);
		let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100));

		for _ in 0..5 {
			assert!(pool.admit(&ip));
		}
		assert!(!pool.admit(&ip));

		// 1 / refill_rate seconds buys exactly one more request
		clock.advance(Duration::from_millis(500));
		assert!(pool.admit(&ip));
		assert!(!pool.admit(&ip));
	}

	#[test]
	fn test_refill_never_exceeds_burst() {
		let (pool, clock) = pool_with(10.0, 3.0);
		let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

		assert!(pool.admit(&ip));
		clock.advance(Duration::from_secs(3600));

		let bucket = pool.peek(&ip).unwrap();
		assert_eq!(bucket.tokens, 3.0);

		for _ in 0..3 {
			assert!(pool.admit(&ip));
		}
		assert!(!pool.admit(&ip));
	}

	#[test]
	fn test_tokens_never_negative() {
		let (pool, _clock) = pool_with(1.0, 2.0);
		let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

		for _ in 0..10 {
			pool.admit(&ip);
			let bucket = pool.peek(&ip).unwrap();
			assert!(bucket.tokens >= 0.0 && bucket.tokens <= 2.0);
		}
	}

	#[test]
	fn test_retry_after_hint() {
		let (pool, _clock) = pool_with(4.0, 1.0);
		let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3));

		assert!(pool.check(&ip).is_ok());
		let wait = pool.check(&ip).unwrap_err();
		assert_eq!(wait, Duration::from_millis(250));
	}

	#[test]
	fn test_addresses_are_independent() {
		let (pool, _clock) = pool_with(1.0, 1.0);
		let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
		let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

		assert!(pool.admit(&a));
		assert!(!pool.admit(&a));
		assert!(pool.admit(&b));
	}

	#[test]
	fn test_ipv4_mapped_shares_bucket() {
		let (pool, _clock) = pool_with(1.0, 1.0);
		let v4 = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7));
		let mapped = IpAddr::V6(Ipv4Addr::new(192, 0, 2, 7).to_ipv6_mapped());

		assert!(pool.admit(&mapped));
		assert!(!pool.admit(&v4));
		assert_eq!(pool.len(), 1);
	}

	#[test]
	fn test_evict_idle_keeps_partial_buckets() {
		let (pool, clock) = pool_with(0.01, 5.0);
		let drained = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
		let light = IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1));

		for _ in 0..5 {
			pool.admit(&drained);
		}
		pool.admit(&light);

		// Not idle yet
		assert_eq!(pool.evict_idle(), 0);

		// Idle, but at 0.01 tokens/s 120s only refills 1.2 tokens
		clock.advance(Duration::from_secs(120));
		assert_eq!(pool.evict_idle(), 1);
		assert!(pool.peek(&drained).is_some());
		assert!(pool.peek(&light).is_none());
	}

	#[test]
	fn test_manager_pools() {
		let clock = Arc::new(ManualClock::new());
		let manager = RateLimitManager::new(&RateLimitConfig::new(10.0, 20.0), clock);
		let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100));

		for kind in PoolKind::ALL {
			assert!(manager.pool(kind).is_some());
		}

		// auth: burst 20 / 10 = 2
		assert!(manager.admit(PoolKind::Auth, &ip));
		assert!(manager.admit(PoolKind::Auth, &ip));
		assert!(!manager.admit(PoolKind::Auth, &ip));

		// Other pools keep their own buckets
		assert!(manager.admit(PoolKind::Web, &ip));

		let stats = manager.stats();
		let auth = stats.iter().find(|(k, _)| *k == PoolKind::Auth).unwrap();
		assert_eq!(auth.1.total_admitted, 2);
		assert_eq!(auth.1.total_limited, 1);
	}
}

// vim: ts=4
