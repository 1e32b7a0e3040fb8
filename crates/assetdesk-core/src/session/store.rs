//! Session store
//!
//! Concurrent map of session ID to session record plus an active-session
//! counter. The counter is maintained by increment/decrement on insert/delete
//! and can drift under races; `refresh_count()` recomputes it from the map.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use assetdesk_types::random::random_token;

use super::token::{AuthSession, SessionToken, SessionValidation};
use crate::config::{SessionConfig, MAX_SESSION_TTL_SECS};
use crate::prelude::*;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug)]
pub struct SessionStore {
	sessions: DashMap<Box<str>, Arc<AuthSession>>,
	count: AtomicUsize,
	ttl: Duration,
	secret: Arc<[u8]>,
	clock: Arc<dyn Clock>,
	random: Arc<dyn RandomSource>,
}

impl SessionStore {
	pub fn new(
		config: &SessionConfig,
		secret: Arc<[u8]>,
		clock: Arc<dyn Clock>,
		random: Arc<dyn RandomSource>,
	) -> Self {
		if config.ttl_secs > MAX_SESSION_TTL_SECS {
			warn!(
				"Session TTL of {}s is too long, capped at {}s",
				config.ttl_secs, MAX_SESSION_TTL_SECS
			);
		}
		Self {
			sessions: DashMap::new(),
			count: AtomicUsize::new(0),
			ttl: config.ttl(),
			secret,
			clock,
			random,
		}
	}

	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Derive the session ID from the bound address and the bearer value
	fn session_id(&self, ip: &IpAddr, bearer: &str) -> AdResult<String> {
		let mut mac = HmacSha256::new_from_slice(&self.secret)
			.map_err(|_| Error::Internal("invalid session signing key".into()))?;
		mac.update(ip.to_string().as_bytes());
		mac.update(&[0]);
		mac.update(bearer.as_bytes());
		Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
	}

	/// Issue a new session bound to `ip`.
	///
	/// Only genuinely new IDs are counted; an existing session with the same ID
	/// is replaced without touching the counter.
	pub fn create_session(&self, ip: &IpAddr) -> AdResult<Arc<AuthSession>> {
		let ip = ip.to_canonical();
		let now = self.clock.wall();

		let basic = random_token(self.random.as_ref())?;
		let bearer = random_token(self.random.as_ref())?;
		let csrf = random_token(self.random.as_ref())?;
		let id: Box<str> = self.session_id(&ip, &bearer)?.into();

		let session = Arc::new(AuthSession {
			id: id.clone(),
			ip,
			basic: SessionToken::issue(basic, ip, now, self.ttl),
			bearer: SessionToken::issue(bearer, ip, now, self.ttl),
			csrf: SessionToken::issue(csrf, ip, now, self.ttl),
			created_at: now,
		});

		match self.sessions.entry(id) {
			Entry::Occupied(mut entry) => {
				debug!("Session {} replaced", short_id(entry.key()));
				entry.insert(session.clone());
			}
			Entry::Vacant(entry) => {
				entry.insert(session.clone());
				self.count.fetch_add(1, Ordering::AcqRel);
			}
		}

		debug!("Session {} created for {}", short_id(&session.id), ip);
		Ok(session)
	}

	/// Check a presented session.
	///
	/// Unknown sessions, wrong credentials and expired tokens are ordinary
	/// negative results. An address that differs from the bound one and blank
	/// inputs are anomalies and returned as errors.
	pub fn validate_session(
		&self,
		id: &str,
		ip: &str,
		basic: &str,
		bearer: &str,
	) -> AdResult<SessionValidation> {
		let Some(session) = self.get(id) else {
			return Ok(SessionValidation::NOT_FOUND);
		};

		let ip = ip.trim();
		if ip.is_empty() {
			return Err(Error::ValidationError("blank client address".into()));
		}
		let addr = ip
			.parse::<IpAddr>()
			.map_err(|_| Error::ValidationError(format!("invalid client address '{}'", ip)))?;
		if !session.is_bound_to(&addr) {
			warn!(
				"Session {} bound to {} presented from {}",
				short_id(&session.id),
				session.ip,
				addr.to_canonical()
			);
			return Err(Error::SessionIpMismatch);
		}

		if basic.trim().is_empty() || bearer.trim().is_empty() {
			return Err(Error::ValidationError("blank session token".into()));
		}

		if !session.basic.matches(basic) || !session.bearer.matches(bearer) {
			return Ok(SessionValidation::INVALID);
		}

		let now = self.clock.wall();
		if !session.basic.is_current(now) || !session.bearer.is_current(now) {
			return Ok(SessionValidation::INVALID);
		}

		Ok(SessionValidation::VALID)
	}

	/// Check the CSRF token of an existing, unexpired session
	pub fn validate_csrf(&self, id: &str, csrf: &str) -> bool {
		let now = self.clock.wall();
		self.get(id)
			.is_some_and(|s| !s.is_expired(now) && s.csrf.is_current(now) && s.csrf.matches(csrf))
	}

	pub fn get(&self, id: &str) -> Option<Arc<AuthSession>> {
		self.sessions.get(id).map(|s| s.value().clone())
	}

	/// Replace a live session with a freshly issued one.
	///
	/// The old session is claimed by removing it from the map, so of several
	/// concurrent refreshes only one succeeds; the others see `None`. A new
	/// session (new tokens, new ID) is then created. Returns `None` if the
	/// session is unknown or already expired.
	pub fn refresh_session(&self, id: &str, ip: &IpAddr) -> AdResult<Option<Arc<AuthSession>>> {
		let Some((_, old)) = self.sessions.remove_if(id, |_, s| s.is_bound_to(ip)) else {
			// Unknown, or bound to another address and left in place
			return match self.get(id) {
				Some(s) if !s.is_bound_to(ip) => {
					warn!(
						"Refresh of session {} from foreign address {}",
						short_id(id),
						ip.to_canonical()
					);
					Err(Error::SessionIpMismatch)
				}
				_ => Ok(None),
			};
		};
		self.decrement(1);

		if old.is_expired(self.clock.wall()) {
			debug!("Session {} expired before refresh", short_id(id));
			return Ok(None);
		}

		let session = self.create_session(ip)?;
		debug!("Session {} refreshed as {}", short_id(id), short_id(&session.id));
		Ok(Some(session))
	}

	/// Remove a session. Returns whether it existed.
	pub fn delete_session(&self, id: &str) -> bool {
		if self.sessions.remove(id).is_some() {
			self.decrement(1);
			debug!("Session {} deleted", short_id(id));
			true
		} else {
			false
		}
	}

	/// Drop all expired sessions, returning how many were removed
	pub fn purge_expired(&self) -> usize {
		let now = self.clock.wall();
		let mut removed = 0;
		self.sessions.retain(|_, s| {
			let keep = !s.is_expired(now);
			if !keep {
				removed += 1;
			}
			keep
		});
		if removed > 0 {
			self.decrement(removed);
		}
		removed
	}

	/// Approximate number of live sessions
	pub fn count(&self) -> usize {
		self.count.load(Ordering::Acquire)
	}

	/// Recompute the session count from the map and store it
	pub fn refresh_count(&self) -> usize {
		let actual = self.sessions.iter().count();
		let previous = self.count.swap(actual, Ordering::AcqRel);
		if previous != actual {
			debug!("Session count corrected from {} to {}", previous, actual);
		}
		actual
	}

	fn decrement(&self, n: usize) {
		// Never below zero, even if the counter drifted. The closure always
		// returns Some, so the update cannot fail.
		let _ = self
			.count
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some(c.saturating_sub(n)));
	}
}

/// Log-safe prefix of a session ID
fn short_id(id: &str) -> &str {
	id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
	use super::*;
	use assetdesk_types::clock::ManualClock;
	use assetdesk_types::random::{FixedRandom, OsRandom};
	use std::net::{Ipv4Addr, Ipv6Addr};

	const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

	fn store_with(random: Arc<dyn RandomSource>) -> (SessionStore, Arc<ManualClock>) {
		let clock = Arc::new(ManualClock::new());
		let config = SessionConfig { ttl_secs: 1200 };
		let secret: Arc<[u8]> = Arc::from(&b"0123456789abcdef0123456789abcdef"[..]);
		(SessionStore::new(&config, secret, clock.clone(), random), clock)
	}

	fn store() -> (SessionStore, Arc<ManualClock>) {
		store_with(Arc::new(OsRandom))
	}

	#[test]
	fn test_create_then_validate() {
		let (store, _clock) = store();
		let s = store.create_session(&IP).unwrap();

		let result = store.validate_session(&s.id, "192.168.1.20", &s.basic.value, &s.bearer.value);
		assert_eq!(result.unwrap(), SessionValidation::VALID);
		assert_eq!(store.count(), 1);
	}

	#[test]
	fn test_tokens_share_binding_and_expiry() {
		let (store, clock) = store();
		let s = store.create_session(&IP).unwrap();
		let expiry = clock.wall() + Duration::from_secs(1200);

		for token in [&s.basic, &s.bearer, &s.csrf] {
			assert_eq!(token.ip, IP);
			assert_eq!(token.expiry, expiry);
			assert!(token.valid);
		}
		assert_ne!(s.basic.value, s.bearer.value);
	}

	#[test]
	fn test_unknown_session() {
		let (store, _clock) = store();
		let result = store.validate_session("nope", "192.168.1.20", "a", "b");
		assert_eq!(result.unwrap(), SessionValidation::NOT_FOUND);
	}

	#[test]
	fn test_wrong_bearer_is_invalid() {
		let (store, _clock) = store();
		let s = store.create_session(&IP).unwrap();

		let result = store.validate_session(&s.id, "192.168.1.20", &s.basic.value, "wrong");
		assert_eq!(result.unwrap(), SessionValidation::INVALID);
	}

	#[test]
	fn test_ip_mismatch_is_error() {
		let (store, _clock) = store();
		let s = store.create_session(&IP).unwrap();

		let result = store.validate_session(&s.id, "192.168.1.21", &s.basic.value, &s.bearer.value);
		assert!(matches!(result, Err(Error::SessionIpMismatch)));
	}

	#[test]
	fn test_mapped_address_matches_binding() {
		let (store, _clock) = store();
		let mapped = IpAddr::V6(Ipv4Addr::new(192, 168, 1, 20).to_ipv6_mapped());
		let s = store.create_session(&mapped).unwrap();
		assert_eq!(s.ip, IP);

		let result = store.validate_session(&s.id, "192.168.1.20", &s.basic.value, &s.bearer.value);
		assert_eq!(result.unwrap(), SessionValidation::VALID);
	}

	#[test]
	fn test_blank_inputs_are_errors() {
		let (store, _clock) = store();
		let s = store.create_session(&IP).unwrap();

		let blank_ip = store.validate_session(&s.id, " ", &s.basic.value, &s.bearer.value);
		assert!(matches!(blank_ip, Err(Error::ValidationError(_))));

		let blank_basic = store.validate_session(&s.id, "192.168.1.20", "", &s.bearer.value);
		assert!(matches!(blank_basic, Err(Error::ValidationError(_))));

		let blank_bearer = store.validate_session(&s.id, "192.168.1.20", &s.basic.value, "");
		assert!(matches!(blank_bearer, Err(Error::ValidationError(_))));
	}

	#[test]
	fn test_expired_session_is_invalid() {
		let (store, clock) = store();
		let s = store.create_session(&IP).unwrap();

		clock.advance(Duration::from_secs(1199));
		let result = store.validate_session(&s.id, "192.168.1.20", &s.basic.value, &s.bearer.value);
		assert_eq!(result.unwrap(), SessionValidation::VALID);

		clock.advance(Duration::from_secs(1));
		let result = store.validate_session(&s.id, "192.168.1.20", &s.basic.value, &s.bearer.value);
		assert_eq!(result.unwrap(), SessionValidation::INVALID);
	}

	#[test]
	fn test_delete_never_goes_negative() {
		let (store, _clock) = store();
		assert!(!store.delete_session("missing"));
		assert_eq!(store.count(), 0);

		let s = store.create_session(&IP).unwrap();
		assert!(store.delete_session(&s.id));
		assert!(!store.delete_session(&s.id));
		assert_eq!(store.count(), 0);
	}

	#[test]
	fn test_same_id_overwrite_not_counted() {
		// Constant random bytes give the same bearer, hence the same ID
		let (store, _clock) = store_with(Arc::new(FixedRandom(9)));
		let a = store.create_session(&IP).unwrap();
		let b = store.create_session(&IP).unwrap();

		assert_eq!(a.id, b.id);
		assert_eq!(store.count(), 1);
		assert_eq!(store.refresh_count(), 1);
	}

	#[test]
	fn test_session_id_depends_on_address() {
		let (store, _clock) = store_with(Arc::new(FixedRandom(9)));
		let a = store.create_session(&IP).unwrap();
		let b = store.create_session(&IpAddr::V6(Ipv6Addr::LOCALHOST)).unwrap();

		assert_ne!(a.id, b.id);
		assert_eq!(store.count(), 2);
	}

	#[test]
	fn test_refresh_count_corrects_drift() {
		let (store, _clock) = store();
		for _ in 0..3 {
			store.create_session(&IP).unwrap();
		}
		store.count.store(10, Ordering::Release);

		assert_eq!(store.refresh_count(), 3);
		assert_eq!(store.count(), 3);
	}

	#[test]
	fn test_refresh_replaces_session() {
		let (store, clock) = store();
		let old = store.create_session(&IP).unwrap();
		clock.advance(Duration::from_secs(600));

		let new = store.refresh_session(&old.id, &IP).unwrap().unwrap();
		assert_ne!(new.id, old.id);
		assert!(store.get(&old.id).is_none());
		assert_eq!(store.count(), 1);
		assert_eq!(new.bearer.expiry, clock.wall() + Duration::from_secs(1200));

		let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
		assert!(matches!(store.refresh_session(&new.id, &other), Err(Error::SessionIpMismatch)));
		assert!(store.refresh_session("missing", &IP).unwrap().is_none());
	}

	#[test]
	fn test_refresh_claims_old_session_once() {
		let (store, _clock) = store();
		let old = store.create_session(&IP).unwrap();

		let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
		assert!(matches!(store.refresh_session(&old.id, &other), Err(Error::SessionIpMismatch)));
		// A refused refresh leaves the session usable
		assert!(store.get(&old.id).is_some());
		assert_eq!(store.count(), 1);

		assert!(store.refresh_session(&old.id, &IP).unwrap().is_some());
		assert!(store.refresh_session(&old.id, &IP).unwrap().is_none());
		assert_eq!(store.count(), 1);
		assert_eq!(store.refresh_count(), 1);
	}

	#[test]
	fn test_huge_ttl_is_capped() {
		let clock = Arc::new(ManualClock::new());
		let config = SessionConfig { ttl_secs: u64::MAX };
		let secret: Arc<[u8]> = Arc::from(&b"0123456789abcdef0123456789abcdef"[..]);
		let store = SessionStore::new(&config, secret, clock.clone(), Arc::new(OsRandom));
		let cap = Duration::from_secs(MAX_SESSION_TTL_SECS);

		assert_eq!(store.ttl(), cap);
		let s = store.create_session(&IP).unwrap();
		assert_eq!(s.expires_at(), clock.wall() + cap);

		let result = store.validate_session(&s.id, "192.168.1.20", &s.basic.value, &s.bearer.value);
		assert_eq!(result.unwrap(), SessionValidation::VALID);
	}

	#[test]
	fn test_refresh_of_expired_session() {
		let (store, clock) = store();
		let old = store.create_session(&IP).unwrap();
		clock.advance(Duration::from_secs(1200));

		assert!(store.refresh_session(&old.id, &IP).unwrap().is_none());
		assert_eq!(store.count(), 0);
	}

	#[test]
	fn test_csrf() {
		let (store, clock) = store();
		let s = store.create_session(&IP).unwrap();

		assert!(store.validate_csrf(&s.id, &s.csrf.value));
		assert!(!store.validate_csrf(&s.id, &s.bearer.value));
		assert!(!store.validate_csrf("missing", &s.csrf.value));

		clock.advance(Duration::from_secs(1200));
		assert!(!store.validate_csrf(&s.id, &s.csrf.value));
	}

	#[test]
	fn test_purge_expired() {
		let (store, clock) = store();
		store.create_session(&IP).unwrap();
		clock.advance(Duration::from_secs(600));
		let fresh = store.create_session(&IP).unwrap();
		clock.advance(Duration::from_secs(600));

		assert_eq!(store.purge_expired(), 1);
		assert_eq!(store.count(), 1);
		assert!(store.get(&fresh.id).is_some());
	}
}

// vim: ts=4
