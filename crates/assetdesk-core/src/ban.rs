//! Ban list
//!
//! Time-windowed bans keyed by client address. An address is banned while
//! `now < last_offense + ban_period`. Expired entries are dropped lazily by the
//! first check that finds them; `purge_expired()` exists for periodic cleanup.
//!
//! Both caches are LRU bounded, so a flood of distinct addresses evicts the
//! least recently seen entries instead of growing without limit.

use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::RwLock;

use crate::config::{BanConfig, MAX_BAN_PERIOD_SECS};
use crate::prelude::*;

const MIN_BAN_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1_000) {
	Some(v) => v,
	None => unreachable!(),
};
const MIN_PENALTY_CAPACITY: NonZeroUsize = match NonZeroUsize::new(2_000) {
	Some(v) => v,
	None => unreachable!(),
};

/// Ban entry stored in the ban list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannedEntry {
	pub ip: IpAddr,
	pub last_offense: Instant,
	pub ban_period: Duration,
}

impl BannedEntry {
	/// End of the ban window, `None` if it lies beyond what `Instant` can represent
	pub fn expires_at(&self) -> Option<Instant> {
		self.last_offense.checked_add(self.ban_period)
	}

	pub fn is_expired(&self, now: Instant) -> bool {
		self.expires_at().is_some_and(|at| now >= at)
	}

	pub fn remaining(&self, now: Instant) -> Duration {
		self.expires_at().map_or(self.ban_period, |at| at.saturating_duration_since(now))
	}
}

/// Failure tracking for an address below the ban threshold
#[derive(Debug, Clone, Copy)]
struct PenaltyEntry {
	count: u32,
	last_penalty: Instant,
}

#[derive(Debug)]
pub struct BanList {
	ban_period: Duration,
	offense_threshold: u32,
	bans: RwLock<LruCache<IpAddr, BannedEntry>>,
	penalties: RwLock<LruCache<IpAddr, PenaltyEntry>>,
	clock: Arc<dyn Clock>,
	total_bans: AtomicU64,
}

impl BanList {
	pub fn new(config: &BanConfig, clock: Arc<dyn Clock>) -> Self {
		let ban_cap = NonZeroUsize::new(config.max_tracked_ips / 10)
			.map_or(MIN_BAN_CAPACITY, |cap| cap.max(MIN_BAN_CAPACITY));
		let penalty_cap = NonZeroUsize::new(config.max_tracked_ips / 5)
			.map_or(MIN_PENALTY_CAPACITY, |cap| cap.max(MIN_PENALTY_CAPACITY));
		if config.ban_period_secs > MAX_BAN_PERIOD_SECS {
			warn!(
				"Ban period of {}s is too long, capped at {}s",
				config.ban_period_secs, MAX_BAN_PERIOD_SECS
			);
		}

		Self {
			ban_period: config.ban_period(),
			offense_threshold: config.offense_threshold.max(1),
			bans: RwLock::new(LruCache::new(ban_cap)),
			penalties: RwLock::new(LruCache::new(penalty_cap)),
			clock,
			total_bans: AtomicU64::new(0),
		}
	}

	pub fn ban_period(&self) -> Duration {
		self.ban_period
	}

	/// Check if address is banned, dropping the entry if its window has passed
	pub fn is_banned(&self, ip: &IpAddr) -> bool {
		self.remaining(ip).is_some()
	}

	/// Remaining ban time, or `None` if the address is not banned
	pub fn remaining(&self, ip: &IpAddr) -> Option<Duration> {
		let ip = ip.to_canonical();
		let now = self.clock.now();
		let mut bans = self.bans.write();

		let ban = bans.get(&ip)?;
		if ban.is_expired(now) {
			bans.pop(&ip);
			None
		} else {
			Some(ban.remaining(now))
		}
	}

	/// Ban an address now. Repeat offenses restart the window.
	pub fn record_offense(&self, ip: &IpAddr) {
		let ip = ip.to_canonical();
		let entry = BannedEntry { ip, last_offense: self.clock.now(), ban_period: self.ban_period };

		self.bans.write().put(ip, entry);
		self.total_bans.fetch_add(1, Ordering::Relaxed);
		info!("Banned {} for {:?}", ip, self.ban_period);
	}

	/// Count a failed attempt; records an offense once the threshold is reached.
	///
	/// Failures older than one ban period are forgotten. Returns `true` if this
	/// call banned the address.
	pub fn penalize(&self, ip: &IpAddr) -> bool {
		let ip = ip.to_canonical();
		let now = self.clock.now();
		let mut penalties = self.penalties.write();

		let entry =
			penalties.get_or_insert_mut(ip, || PenaltyEntry { count: 0, last_penalty: now });
		if now.saturating_duration_since(entry.last_penalty) >= self.ban_period {
			entry.count = 0;
		}
		entry.count = entry.count.saturating_add(1);
		entry.last_penalty = now;
		debug!("Penalty for {}: {}/{}", ip, entry.count, self.offense_threshold);

		if entry.count >= self.offense_threshold {
			penalties.pop(&ip);
			drop(penalties);
			self.record_offense(&ip);
			true
		} else {
			false
		}
	}

	/// Lift a ban and forget pending penalties. Returns whether a ban existed.
	pub fn unban(&self, ip: &IpAddr) -> bool {
		let ip = ip.to_canonical();
		self.penalties.write().pop(&ip);
		self.bans.write().pop(&ip).is_some()
	}

	/// All bans that are still in effect
	pub fn list(&self) -> Vec<BannedEntry> {
		let now = self.clock.now();
		self.bans.read().iter().filter(|(_, b)| !b.is_expired(now)).map(|(_, b)| b.clone()).collect()
	}

	/// Remove expired bans and stale penalties, returning the number of removed bans
	pub fn purge_expired(&self) -> usize {
		let now = self.clock.now();

		let removed = {
			let mut bans = self.bans.write();
			let expired: Vec<IpAddr> =
				bans.iter().filter(|(_, b)| b.is_expired(now)).map(|(ip, _)| *ip).collect();
			for ip in &expired {
				bans.pop(ip);
			}
			expired.len()
		};

		let mut penalties = self.penalties.write();
		let stale: Vec<IpAddr> = penalties
			.iter()
			.filter(|(_, p)| now.saturating_duration_since(p.last_penalty) >= self.ban_period)
			.map(|(ip, _)| *ip)
			.collect();
		for ip in &stale {
			penalties.pop(ip);
		}

		removed
	}

	/// Number of stored bans, including expired ones not yet purged
	pub fn len(&self) -> usize {
		self.bans.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.bans.read().is_empty()
	}

	pub fn total_bans(&self) -> u64 {
		self.total_bans.load(Ordering::Relaxed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assetdesk_types::clock::ManualClock;
	use std::net::Ipv4Addr;

	fn ban_list(period_secs: u64, threshold: u32) -> (BanList, Arc<ManualClock>) {
		let clock = Arc::new(ManualClock::new());
		let config = BanConfig {
			ban_period_secs: period_secs,
			offense_threshold: threshold,
			..BanConfig::default()
		};
		(BanList::new(&config, clock.clone()), clock)
	}

	#[test]
	fn test_ban_window() {
		let (bans, clock) = ban_list(60, 5);
		let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100));

		assert!(!bans.is_banned(&ip));

		bans.record_offense(&ip);
		assert!(bans.is_banned(&ip));

		clock.advance(Duration::from_secs(59));
		assert!(bans.is_banned(&ip));

		clock.advance(Duration::from_secs(1));
		assert!(!bans.is_banned(&ip));
		// Lazily removed by the check above
		assert_eq!(bans.len(), 0);
	}

	#[test]
	fn test_repeat_offense_extends_ban() {
		let (bans, clock) = ban_list(60, 5);
		let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100));

		bans.record_offense(&ip);
		clock.advance(Duration::from_secs(40));
		bans.record_offense(&ip);
		clock.advance(Duration::from_secs(40));

		assert!(bans.is_banned(&ip));
		assert_eq!(bans.remaining(&ip), Some(Duration::from_secs(20)));
		assert_eq!(bans.total_bans(), 2);
	}

	#[test]
	fn test_penalty_threshold() {
		let (bans, _clock) = ban_list(60, 3);
		let ip = IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1));

		assert!(!bans.penalize(&ip));
		assert!(!bans.penalize(&ip));
		assert!(!bans.is_banned(&ip));

		assert!(bans.penalize(&ip));
		assert!(bans.is_banned(&ip));
	}

	#[test]
	fn test_old_penalties_forgotten() {
		let (bans, clock) = ban_list(60, 2);
		let ip = IpAddr::V4(Ipv4Addr::new(10, 1, 1, 2));

		assert!(!bans.penalize(&ip));
		clock.advance(Duration::from_secs(61));
		assert!(!bans.penalize(&ip));
		assert!(!bans.is_banned(&ip));
	}

	#[test]
	fn test_unban() {
		let (bans, _clock) = ban_list(60, 5);
		let ip = IpAddr::V4(Ipv4Addr::new(10, 1, 1, 3));

		bans.record_offense(&ip);
		assert!(bans.unban(&ip));
		assert!(!bans.is_banned(&ip));
		assert!(!bans.unban(&ip));
	}

	#[test]
	fn test_list_and_purge() {
		let (bans, clock) = ban_list(60, 5);
		let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
		let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

		bans.record_offense(&a);
		clock.advance(Duration::from_secs(30));
		bans.record_offense(&b);
		clock.advance(Duration::from_secs(31));

		let active = bans.list();
		assert_eq!(active.len(), 1);
		assert_eq!(active[0].ip, b);

		assert_eq!(bans.len(), 2);
		assert_eq!(bans.purge_expired(), 1);
		assert_eq!(bans.len(), 1);
	}

	#[test]
	fn test_huge_ban_period_is_capped() {
		let (bans, clock) = ban_list(u64::MAX, 5);
		let ip = IpAddr::V4(Ipv4Addr::new(10, 1, 1, 4));
		let cap = Duration::from_secs(MAX_BAN_PERIOD_SECS);

		assert_eq!(bans.ban_period(), cap);
		bans.record_offense(&ip);
		assert!(bans.is_banned(&ip));
		assert_eq!(bans.remaining(&ip), Some(cap));
		assert_eq!(bans.list().len(), 1);
		assert_eq!(bans.purge_expired(), 0);

		clock.advance(cap);
		assert!(!bans.is_banned(&ip));
	}

	#[test]
	fn test_unrepresentable_expiry_never_expires() {
		let now = Instant::now();
		let entry = BannedEntry {
			ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
			last_offense: now,
			ban_period: Duration::MAX,
		};

		assert_eq!(entry.expires_at(), None);
		assert!(!entry.is_expired(now));
		assert_eq!(entry.remaining(now), Duration::MAX);
	}

	#[test]
	fn test_mapped_address_shares_ban() {
		let (bans, _clock) = ban_list(60, 5);
		let v4 = Ipv4Addr::new(192, 0, 2, 1);

		bans.record_offense(&IpAddr::V6(v4.to_ipv6_mapped()));
		assert!(bans.is_banned(&IpAddr::V4(v4)));
	}
}

// vim: ts=4
