//! App builder - constructs and runs the assetdesk application

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use assetdesk_core::config::{AdmissionConfig, AllowListConfig, ServerMode};
use assetdesk_core::extensions::Extensions;
use assetdesk_core::rate_limit::RateLimitConfig;
use assetdesk_core::{AdmissionState, SharedState};
use assetdesk_types::clock::SystemClock;
use assetdesk_types::random::OsRandom;

use crate::auth::CredentialVerifier;
use crate::prelude::*;
use crate::routes;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct AppBuilderOpts {
	pub listen: Box<str>,
	/// Static web client, served under the web pool
	pub dist_dir: Option<Box<std::path::Path>>,
	/// Downloadable files, served under `/files` in the file pool
	pub files_dir: Option<Box<std::path::Path>>,
	/// Add the `Secure` attribute to session cookies
	pub secure_cookies: bool,
	/// Pause before answering a failed login
	pub login_failure_delay: Duration,
	pub maintenance_interval: Duration,
}

#[derive(Debug)]
pub struct AppState {
	pub admission: Arc<SharedState>,
	pub opts: AppBuilderOpts,
}

impl AppState {
	/// Snapshot of the active admission state
	pub fn admission(&self) -> Arc<AdmissionState> {
		self.admission.current()
	}
}

pub type App = Arc<AppState>;

pub struct AppBuilder {
	opts: AppBuilderOpts,
	config: AdmissionConfig,
	clock: Arc<dyn Clock>,
	random: Arc<dyn RandomSource>,
	extensions: Extensions,
}

impl AppBuilder {
	pub fn new() -> Self {
		// Tests build several apps per process; only the first install wins
		let _ = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.try_init();
		AppBuilder {
			opts: AppBuilderOpts {
				listen: "127.0.0.1:8080".into(),
				dist_dir: None,
				files_dir: None,
				secure_cookies: true,
				login_failure_delay: Duration::from_secs(1),
				maintenance_interval: Duration::from_secs(60),
			},
			config: AdmissionConfig::default(),
			clock: Arc::new(SystemClock),
			random: Arc::new(OsRandom),
			extensions: Extensions::new(),
		}
	}

	// Opts
	pub fn listen(&mut self, listen: impl Into<Box<str>>) -> &mut Self {
		self.opts.listen = listen.into();
		self
	}
	pub fn dist_dir(&mut self, dist_dir: impl Into<PathBuf>) -> &mut Self {
		self.opts.dist_dir = Some(dist_dir.into().into_boxed_path());
		self
	}
	pub fn files_dir(&mut self, files_dir: impl Into<PathBuf>) -> &mut Self {
		self.opts.files_dir = Some(files_dir.into().into_boxed_path());
		self
	}
	pub fn secure_cookies(&mut self, secure: bool) -> &mut Self {
		self.opts.secure_cookies = secure;
		self
	}
	pub fn login_failure_delay(&mut self, delay: Duration) -> &mut Self {
		self.opts.login_failure_delay = delay;
		self
	}
	pub fn maintenance_interval(&mut self, interval: Duration) -> &mut Self {
		self.opts.maintenance_interval = interval;
		self
	}

	// Admission config
	pub fn config(&mut self, config: AdmissionConfig) -> &mut Self {
		self.config = config;
		self
	}
	pub fn mode(&mut self, mode: ServerMode) -> &mut Self {
		self.config.mode = mode;
		self
	}
	pub fn rate_limit(&mut self, rate_limit: RateLimitConfig) -> &mut Self {
		self.config.rate_limit = rate_limit;
		self
	}
	pub fn ban_period(&mut self, period: Duration) -> &mut Self {
		self.config.ban.ban_period_secs = period.as_secs();
		self
	}
	pub fn session_ttl(&mut self, ttl: Duration) -> &mut Self {
		self.config.session.ttl_secs = ttl.as_secs();
		self
	}
	pub fn allow_list(&mut self, wan: impl Into<String>, lan: impl Into<String>) -> &mut Self {
		self.config.allow_list = AllowListConfig { wan: wan.into(), lan: lan.into() };
		self
	}

	// Capabilities and external handles
	pub fn clock(&mut self, clock: Arc<dyn Clock>) -> &mut Self {
		self.clock = clock;
		self
	}
	pub fn random(&mut self, random: Arc<dyn RandomSource>) -> &mut Self {
		self.random = random;
		self
	}
	pub fn credential_verifier(&mut self, verifier: Arc<dyn CredentialVerifier>) -> &mut Self {
		self.extensions.insert(verifier);
		self
	}
	/// Register an external handle (database pool, ...) reachable from handlers
	pub fn extension<T: Send + Sync + 'static>(&mut self, val: T) -> &mut Self {
		self.extensions.insert(val);
		self
	}

	/// Construct the application state and router without serving
	pub fn build(self) -> AdResult<(App, Router)> {
		if !self.extensions.contains::<Arc<dyn CredentialVerifier>>() {
			warn!("No credential verifier configured, every login will be refused");
		}

		let mut state = AdmissionState::init(self.config, self.clock, self.random)?;
		state.extensions = self.extensions;

		let app: App =
			Arc::new(AppState { admission: Arc::new(SharedState::new(state)), opts: self.opts });
		let router = routes::init(app.clone());
		Ok((app, router))
	}

	pub async fn run(self) -> AdResult<()> {
		info!("assetdesk V{}", VERSION);

		let (app, router) = self.build()?;

		// Periodic admission state maintenance
		{
			let app = app.clone();
			tokio::spawn(async move {
				let mut interval = tokio::time::interval(app.opts.maintenance_interval);
				// The first tick completes immediately
				interval.tick().await;
				loop {
					interval.tick().await;
					let report = app.admission().maintain();
					if report.purged_bans > 0 {
						info!("Lifted {} expired bans", report.purged_bans);
					}
				}
			});
		}

		let listener = tokio::net::TcpListener::bind(app.opts.listen.as_ref()).await.map_err(|e| {
			error!("FATAL: Cannot listen on {}: {}", app.opts.listen, e);
			e
		})?;
		info!("Listening on HTTP {}", app.opts.listen);

		axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await?;
		Ok(())
	}
}

impl Default for AppBuilder {
	fn default() -> Self {
		Self::new()
	}
}

// vim: ts=4
