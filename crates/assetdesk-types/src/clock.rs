//! Time source
//!
//! The admission core never reads the system time directly. Token buckets and
//! ban windows measure intervals on the monotonic clock, session expiry uses
//! wall-clock time because it travels to the client with the tokens.

use std::fmt::Debug;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;

pub trait Clock: Debug + Send + Sync {
	/// Monotonic time, used for interval math
	fn now(&self) -> Instant;

	/// Wall-clock time, used for expiry stamps
	fn wall(&self) -> SystemTime;
}

/// Clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}

	fn wall(&self) -> SystemTime {
		SystemTime::now()
	}
}

/// Manually advanced clock for tests
///
/// Both readings move together: `advance()` shifts the monotonic and the wall
/// time by the same amount.
#[derive(Debug)]
pub struct ManualClock {
	base: Instant,
	base_wall: SystemTime,
	offset: Mutex<Duration>,
}

impl ManualClock {
	pub fn new() -> Self {
		Self { base: Instant::now(), base_wall: SystemTime::now(), offset: Mutex::new(Duration::ZERO) }
	}

	pub fn advance(&self, by: Duration) {
		let mut offset = self.offset.lock();
		*offset = offset.saturating_add(by);
	}

	pub fn elapsed(&self) -> Duration {
		*self.offset.lock()
	}
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new()
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Instant {
		self.base + *self.offset.lock()
	}

	fn wall(&self) -> SystemTime {
		self.base_wall + *self.offset.lock()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_manual_clock_advances_both_readings() {
		let clock = ManualClock::new();
		let t0 = clock.now();
		let w0 = clock.wall();

		clock.advance(Duration::from_secs(5));

		assert_eq!(clock.now() - t0, Duration::from_secs(5));
		assert_eq!(clock.wall().duration_since(w0).ok(), Some(Duration::from_secs(5)));
		assert_eq!(clock.elapsed(), Duration::from_secs(5));
	}

	#[test]
	fn test_system_clock_is_monotonic() {
		let clock = SystemClock;
		let a = clock.now();
		let b = clock.now();
		assert!(b >= a);
	}
}

// vim: ts=4
