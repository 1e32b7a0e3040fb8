//! Route table
//!
//! Every route group sits behind an admission layer charging its own pool.

use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use assetdesk_core::{AdmissionLayer, AllowScope, PoolKind};

use crate::auth::handler;
use crate::prelude::*;

pub fn init(app: App) -> Router {
	let shared = app.admission.clone();

	let auth_router = Router::new()
		.route("/api/auth/login", post(handler::post_login))
		.route("/api/auth/logout", post(handler::post_logout))
		.route("/api/auth/refresh", post(handler::post_refresh))
		.layer(AdmissionLayer::new(shared.clone(), PoolKind::Auth));

	let api_router = Router::new()
		.route("/api/auth/session", get(handler::get_session))
		.route("/api/health", get(handler::get_health))
		.layer(AdmissionLayer::new(shared.clone(), PoolKind::Api));

	let admin_router = Router::new()
		.route("/api/admin/stats", get(handler::get_admin_stats))
		.layer(AdmissionLayer::new(shared.clone(), PoolKind::Api).restricted(AllowScope::Lan));

	let mut router = Router::new().merge(auth_router).merge(api_router).merge(admin_router);

	if let Some(files_dir) = &app.opts.files_dir {
		let files_router = Router::new()
			.nest_service("/files", ServeDir::new(files_dir))
			.layer(AdmissionLayer::new(shared.clone(), PoolKind::File));
		router = router.merge(files_router);
	}

	if let Some(dist_dir) = &app.opts.dist_dir {
		let web_router = Router::new()
			.fallback_service(ServeDir::new(dist_dir))
			.layer(AdmissionLayer::new(shared, PoolKind::Web));
		router = router.merge(web_router);
	}

	router.layer(TraceLayer::new_for_http()).with_state(app)
}

// vim: ts=4
