//! Login sessions
//!
//! Credentials are checked by an external `CredentialVerifier` registered with
//! the app; this crate only issues, refreshes and revokes sessions.

pub mod handler;

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::prelude::*;

#[async_trait]
pub trait CredentialVerifier: Debug + Send + Sync {
	/// Check a username/password pair. `Ok(false)` means the credentials are wrong.
	async fn verify(&self, username: &str, password: &str) -> AdResult<bool>;
}

/// Fixed set of users with SHA-256 password digests
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
	users: HashMap<Box<str>, [u8; 32]>,
}

impl StaticCredentials {
	pub fn new() -> Self {
		Self::default()
	}

	/// Parse `user:hexdigest` pairs separated by commas
	pub fn from_list(list: &str) -> AdResult<Self> {
		let mut creds = Self::new();
		for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
			let (user, digest) = entry
				.split_once(':')
				.ok_or_else(|| Error::ValidationError(format!("invalid user entry '{}'", entry)))?;
			let digest: [u8; 32] = hex::decode(digest.trim())
				.ok()
				.and_then(|d| d.try_into().ok())
				.ok_or_else(|| {
					Error::ValidationError(format!("invalid password digest for '{}'", user))
				})?;
			creds.users.insert(user.trim().into(), digest);
		}
		Ok(creds)
	}

	pub fn with_password(mut self, user: impl Into<Box<str>>, password: &str) -> Self {
		self.users.insert(user.into(), Sha256::digest(password.as_bytes()).into());
		self
	}

	pub fn len(&self) -> usize {
		self.users.len()
	}

	pub fn is_empty(&self) -> bool {
		self.users.is_empty()
	}
}

#[async_trait]
impl CredentialVerifier for StaticCredentials {
	async fn verify(&self, username: &str, password: &str) -> AdResult<bool> {
		let digest: [u8; 32] = Sha256::digest(password.as_bytes()).into();
		Ok(self.users.get(username).is_some_and(|stored| {
			stored.iter().zip(digest.iter()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_static_credentials() {
		let creds = StaticCredentials::new().with_password("admin", "s3cret");

		assert!(creds.verify("admin", "s3cret").await.unwrap());
		assert!(!creds.verify("admin", "s3cret ").await.unwrap());
		assert!(!creds.verify("root", "s3cret").await.unwrap());
	}

	#[tokio::test]
	async fn test_from_list() {
		// sha256("password")
		let creds = StaticCredentials::from_list(
			"ops:5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8, ",
		)
		.unwrap();

		assert_eq!(creds.len(), 1);
		assert!(creds.verify("ops", "password").await.unwrap());
	}

	#[test]
	fn test_from_list_rejects_garbage() {
		assert!(StaticCredentials::from_list("ops").is_err());
		assert!(StaticCredentials::from_list("ops:abcd").is_err());
		assert!(StaticCredentials::from_list("").unwrap().is_empty());
	}
}

// vim: ts=4
