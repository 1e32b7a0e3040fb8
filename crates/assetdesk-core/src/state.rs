//! Runtime state
//!
//! `AdmissionState` composes every admission subsystem. It is built once from
//! configuration and never mutated as a whole; each subsystem guards its own
//! data. `SharedState` holds the active instance behind a swappable pointer so
//! the whole state can be replaced atomically.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

use assetdesk_types::random::random_secret;

use crate::allow_list::{AllowLists, AllowScope};
use crate::ban::BanList;
use crate::config::AdmissionConfig;
use crate::extensions::Extensions;
use crate::prelude::*;
use crate::rate_limit::{AdmissionError, PoolKind, PoolStats, RateLimitManager};
use crate::session::SessionStore;

/// Length of the process-lifetime signing secret
pub const SIGNING_SECRET_BYTES: usize = 32;

#[derive(Debug)]
pub struct AdmissionState {
	pub config: AdmissionConfig,
	pub rate_limits: RateLimitManager,
	pub bans: BanList,
	pub allow_lists: AllowLists,
	pub sessions: SessionStore,

	// Handles of external collaborators (database, credential verifier)
	pub extensions: Extensions,

	signing_secret: Arc<[u8]>,
	clock: Arc<dyn Clock>,
	started_at: Instant,
}

/// Result of one `maintain()` pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
	pub evicted_buckets: usize,
	pub purged_bans: usize,
	pub purged_sessions: usize,
	pub session_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatsEntry {
	pub pool: PoolKind,
	#[serde(flatten)]
	pub stats: PoolStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionStats {
	pub pools: Vec<PoolStatsEntry>,
	pub active_bans: usize,
	pub total_bans: u64,
	pub sessions: usize,
	pub uptime_secs: u64,
}

impl AdmissionState {
	/// Build every subsystem from configuration and generate the signing secret
	pub fn init(
		config: AdmissionConfig,
		clock: Arc<dyn Clock>,
		random: Arc<dyn RandomSource>,
	) -> AdResult<Self> {
		let signing_secret: Arc<[u8]> =
			Arc::from(random_secret(random.as_ref(), SIGNING_SECRET_BYTES)?);

		let rate_limits = RateLimitManager::new(&config.rate_limit, clock.clone());
		let bans = BanList::new(&config.ban, clock.clone());
		let allow_lists = AllowLists::from_config(&config.allow_list);
		let sessions =
			SessionStore::new(&config.session, signing_secret.clone(), clock.clone(), random);

		info!(
			"Admission state initialized: mode {:?}, ban period {:?}, session TTL {:?}",
			config.mode,
			config.ban.ban_period(),
			config.session.ttl()
		);

		Ok(Self {
			started_at: clock.now(),
			config,
			rate_limits,
			bans,
			allow_lists,
			sessions,
			extensions: Extensions::new(),
			signing_secret,
			clock,
		})
	}

	/// Register an external handle before the state is shared
	pub fn with_extension<T: Send + Sync + 'static>(mut self, val: T) -> Self {
		self.extensions.insert(val);
		self
	}

	/// Get a registered extension by type. Returns error if not found.
	pub fn ext<T: Send + Sync + 'static>(&self) -> AdResult<&T> {
		self.extensions.get::<T>().ok_or_else(|| {
			Error::Internal(format!("Extension {} not registered", std::any::type_name::<T>()))
		})
	}

	pub fn signing_secret(&self) -> &[u8] {
		&self.signing_secret
	}

	pub fn clock(&self) -> &Arc<dyn Clock> {
		&self.clock
	}

	/// Spend a token of `pool` for `ip`
	pub fn admit(&self, pool: PoolKind, ip: &IpAddr) -> bool {
		self.rate_limits.admit(pool, ip)
	}

	pub fn is_allowed(&self, scope: AllowScope, ip: &str) -> bool {
		self.allow_lists.is_allowed(scope, ip)
	}

	/// Full admission decision: allow-list (if the route has a scope), ban, then rate limit.
	///
	/// The steps are individually atomic but not serialized against other requests.
	pub fn check(
		&self,
		ip: &IpAddr,
		pool: PoolKind,
		scope: Option<AllowScope>,
	) -> Result<(), AdmissionError> {
		if let Some(scope) = scope {
			if !self.allow_lists.contains(scope, ip) {
				debug!("{} rejected: not in {} allow-list", ip, scope);
				return Err(AdmissionError::NotAllowed { scope });
			}
		}

		if let Some(remaining) = self.bans.remaining(ip) {
			return Err(AdmissionError::Banned { remaining });
		}

		self.rate_limits
			.check(pool, ip)
			.map_err(|retry_after| AdmissionError::RateLimited { pool, retry_after })
	}

	/// Periodic housekeeping: idle buckets, expired bans and sessions, counter reconciliation
	pub fn maintain(&self) -> MaintenanceReport {
		let report = MaintenanceReport {
			evicted_buckets: self.rate_limits.evict_idle(),
			purged_bans: self.bans.purge_expired(),
			purged_sessions: self.sessions.purge_expired(),
			session_count: self.sessions.refresh_count(),
		};
		debug!(
			"Maintenance: {} idle buckets, {} bans, {} sessions removed; {} sessions active",
			report.evicted_buckets, report.purged_bans, report.purged_sessions, report.session_count
		);
		report
	}

	pub fn stats(&self) -> AdmissionStats {
		AdmissionStats {
			pools: self
				.rate_limits
				.stats()
				.into_iter()
				.map(|(pool, stats)| PoolStatsEntry { pool, stats })
				.collect(),
			active_bans: self.bans.list().len(),
			total_bans: self.bans.total_bans(),
			sessions: self.sessions.count(),
			uptime_secs: self.clock.now().saturating_duration_since(self.started_at).as_secs(),
		}
	}
}

/// Holder of the active `AdmissionState`
///
/// Readers clone the inner `Arc` and keep a consistent snapshot for as long as
/// they hold it; `replace()` publishes a fully built state in one step.
#[derive(Debug)]
pub struct SharedState {
	current: RwLock<Arc<AdmissionState>>,
}

impl SharedState {
	pub fn new(state: AdmissionState) -> Self {
		Self { current: RwLock::new(Arc::new(state)) }
	}

	/// Snapshot of the active state
	pub fn current(&self) -> Arc<AdmissionState> {
		self.current.read().clone()
	}

	/// Swap in a new state, returning the previous one
	pub fn replace(&self, state: AdmissionState) -> Arc<AdmissionState> {
		let next = Arc::new(state);
		let prev = std::mem::replace(&mut *self.current.write(), next);
		info!("Admission state replaced");
		prev
	}
}


// vim: ts=4
