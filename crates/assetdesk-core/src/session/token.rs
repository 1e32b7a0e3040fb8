//! Session and token records

use std::net::IpAddr;
use std::time::{Duration, SystemTime};

use crate::config::MAX_SESSION_TTL_SECS;

/// One credential of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
	/// Opaque random value handed to the client
	pub value: Box<str>,
	pub expiry: SystemTime,
	pub not_before: SystemTime,
	pub ttl: Duration,
	/// Address the token was issued to
	pub ip: IpAddr,
	pub valid: bool,
}

impl SessionToken {
	/// New token valid from `now` for `ttl`, capped at the longest session lifetime
	pub fn issue(value: impl Into<Box<str>>, ip: IpAddr, now: SystemTime, ttl: Duration) -> Self {
		let ttl = ttl.min(Duration::from_secs(MAX_SESSION_TTL_SECS));
		// Unrepresentable expiry: issue the token already expired
		let expiry = now.checked_add(ttl).unwrap_or(now);
		Self { value: value.into(), expiry, not_before: now, ttl, ip, valid: true }
	}

	/// Usable at `now`: flagged valid, already active and not yet expired
	pub fn is_current(&self, now: SystemTime) -> bool {
		self.valid && now >= self.not_before && now < self.expiry
	}

	pub fn is_expired(&self, now: SystemTime) -> bool {
		now >= self.expiry
	}

	/// Time left until expiry, zero once expired
	pub fn expires_in(&self, now: SystemTime) -> Duration {
		self.expiry.duration_since(now).unwrap_or(Duration::ZERO)
	}

	/// Compare against a presented value without leaking the mismatch position
	pub fn matches(&self, presented: &str) -> bool {
		constant_time_eq(self.value.as_bytes(), presented.as_bytes())
	}
}

/// Server-side record of an authenticated client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
	pub id: Box<str>,
	/// Address the session is bound to; all three tokens carry the same one
	pub ip: IpAddr,
	pub basic: SessionToken,
	pub bearer: SessionToken,
	pub csrf: SessionToken,
	pub created_at: SystemTime,
}

impl AuthSession {
	/// A session lives while both its basic and bearer tokens are unexpired
	pub fn is_expired(&self, now: SystemTime) -> bool {
		self.basic.is_expired(now) || self.bearer.is_expired(now)
	}

	pub fn is_bound_to(&self, ip: &IpAddr) -> bool {
		let ip = ip.to_canonical();
		self.basic.ip == ip && self.bearer.ip == ip
	}

	pub fn expires_at(&self) -> SystemTime {
		self.basic.expiry.min(self.bearer.expiry)
	}
}

/// Outcome of a session check that did not hit an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionValidation {
	pub valid: bool,
	pub exists: bool,
}

impl SessionValidation {
	pub const NOT_FOUND: Self = Self { valid: false, exists: false };
	pub const INVALID: Self = Self { valid: false, exists: true };
	pub const VALID: Self = Self { valid: true, exists: true };
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}
	a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}


// vim: ts=4
