use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use assetdesk::admission::config::ServerMode;
use assetdesk::admission::rate_limit::RateLimitConfig;
use assetdesk::error::Error;
use assetdesk::{AppBuilder, StaticCredentials};
use tracing::warn;

/// Parse an environment variable, keeping the default if it is unset or invalid
fn env_parse<T: FromStr>(name: &str, default: T) -> T {
	match env::var(name) {
		Ok(val) => val.trim().parse().unwrap_or_else(|_| {
			warn!("Invalid value for {}: '{}', using default", name, val);
			default
		}),
		Err(_) => default,
	}
}

fn env_str(name: &str) -> Option<String> {
	env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
	let mut builder = AppBuilder::new();

	let mode = match env_str("MODE").as_deref().map(str::trim) {
		None | Some("standalone") => ServerMode::Standalone,
		Some("proxy") => ServerMode::Proxy,
		Some(other) => {
			warn!("Unknown MODE '{}', using standalone", other);
			ServerMode::Standalone
		}
	};
	let defaults = RateLimitConfig::default();
	let rate_limit = RateLimitConfig::new(
		env_parse("RATE_LIMIT", defaults.rate),
		env_parse("RATE_BURST", defaults.burst),
	);

	builder
		.listen(env_str("LISTEN").unwrap_or_else(|| "127.0.0.1:8080".into()))
		.mode(mode)
		.rate_limit(rate_limit)
		.ban_period(Duration::from_secs(env_parse("BAN_PERIOD_SECS", 15 * 60)))
		.session_ttl(Duration::from_secs(env_parse("SESSION_TTL_SECS", 20 * 60)))
		.allow_list(
			env_str("WAN_ALLOW").unwrap_or_default(),
			env_str("LAN_ALLOW").unwrap_or_default(),
		)
		.secure_cookies(!env_parse("INSECURE_COOKIES", false));

	if let Some(dist_dir) = env_str("DIST_DIR") {
		builder.dist_dir(dist_dir);
	}
	if let Some(files_dir) = env_str("FILES_DIR") {
		builder.files_dir(files_dir);
	}
	if let Some(users) = env_str("AUTH_USERS") {
		builder.credential_verifier(Arc::new(StaticCredentials::from_list(&users)?));
	}

	builder.run().await
}

// vim: ts=4
