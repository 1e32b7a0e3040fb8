//! Source of secure random bytes for token generation

use std::fmt::Debug;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngExt;

use crate::prelude::*;

/// Length of generated token values in bytes (256 bits)
pub const TOKEN_BYTES: usize = 32;

pub trait RandomSource: Debug + Send + Sync {
	fn fill_bytes(&self, dest: &mut [u8]) -> AdResult<()>;
}

/// Thread-local CSPRNG seeded from the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
	fn fill_bytes(&self, dest: &mut [u8]) -> AdResult<()> {
		let mut rng = rand::rng();
		for b in dest.iter_mut() {
			*b = rng.random_range(0..=u8::MAX);
		}
		Ok(())
	}
}

/// Deterministic source that always yields the same byte. Tests only.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub u8);

impl RandomSource for FixedRandom {
	fn fill_bytes(&self, dest: &mut [u8]) -> AdResult<()> {
		dest.fill(self.0);
		Ok(())
	}
}

/// Generate an opaque URL-safe token value
pub fn random_token(source: &dyn RandomSource) -> AdResult<String> {
	let mut buf = [0u8; TOKEN_BYTES];
	source.fill_bytes(&mut buf)?;
	Ok(URL_SAFE_NO_PAD.encode(buf))
}

/// Generate a raw secret of `len` bytes
pub fn random_secret(source: &dyn RandomSource, len: usize) -> AdResult<Box<[u8]>> {
	let mut buf = vec![0u8; len];
	source.fill_bytes(&mut buf)?;
	Ok(buf.into_boxed_slice())
}


// vim: ts=4
