use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderName, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use serde::{Deserialize, Serialize};

use assetdesk_core::state::AdmissionStats;
use assetdesk_core::AuthSession;

use super::CredentialVerifier;
use crate::app::VERSION;
use crate::extract::{
	ClientAddr, SessionAuth, BASIC_COOKIE, BEARER_COOKIE, CSRF_COOKIE, SESSION_COOKIE,
};
use crate::prelude::*;

type Cookies = AppendHeaders<Vec<(HeaderName, String)>>;

fn unix_secs(t: SystemTime) -> u64 {
	t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn set_cookie(name: &str, value: &str, max_age: u64, http_only: bool, secure: bool) -> String {
	let mut cookie = format!("{}={}; Path=/; Max-Age={}; SameSite=Strict", name, value, max_age);
	if http_only {
		cookie.push_str("; HttpOnly");
	}
	if secure {
		cookie.push_str("; Secure");
	}
	cookie
}

/// Cookies carrying the session to the client. The CSRF token stays readable by scripts.
fn session_cookies(app: &App, session: &AuthSession) -> Cookies {
	let secure = app.opts.secure_cookies;
	let max_age = session.bearer.ttl.as_secs();
	AppendHeaders(vec![
		(SET_COOKIE, set_cookie(SESSION_COOKIE, &session.id, max_age, true, secure)),
		(SET_COOKIE, set_cookie(BASIC_COOKIE, &session.basic.value, max_age, true, secure)),
		(SET_COOKIE, set_cookie(BEARER_COOKIE, &session.bearer.value, max_age, true, secure)),
		(SET_COOKIE, set_cookie(CSRF_COOKIE, &session.csrf.value, max_age, false, secure)),
	])
}

fn clear_cookies(app: &App) -> Cookies {
	let secure = app.opts.secure_cookies;
	AppendHeaders(
		[SESSION_COOKIE, BASIC_COOKIE, BEARER_COOKIE, CSRF_COOKIE]
			.into_iter()
			.map(|name| (SET_COOKIE, set_cookie(name, "", 0, name != CSRF_COOKIE, secure)))
			.collect(),
	)
}

/// # Session
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
	session_id: String,
	client_ip: String,
	csrf_token: String,
	created_at: u64,
	expires_at: u64,
}

impl SessionInfo {
	fn new(session: &AuthSession) -> Self {
		Self {
			session_id: session.id.to_string(),
			client_ip: session.ip.to_string(),
			csrf_token: session.csrf.value.to_string(),
			created_at: unix_secs(session.created_at),
			expires_at: unix_secs(session.expires_at()),
		}
	}
}

/// # POST /api/auth/login
#[derive(Deserialize)]
pub struct LoginReq {
	username: String,
	password: String,
}

pub async fn post_login(
	State(app): State<App>,
	ClientAddr(ip): ClientAddr,
	Json(login): Json<LoginReq>,
) -> AdResult<impl IntoResponse> {
	if login.username.trim().is_empty() || login.password.is_empty() {
		return Err(Error::ValidationError("username and password are required".into()));
	}

	let state = app.admission();
	let verifier = state.ext::<Arc<dyn CredentialVerifier>>().ok();
	let verified = match verifier {
		Some(verifier) => verifier.verify(login.username.trim(), &login.password).await?,
		None => false,
	};

	if verified {
		let session = state.sessions.create_session(&ip)?;
		info!("User {} logged in from {}", login.username.trim(), ip);
		Ok((StatusCode::OK, session_cookies(&app, &session), Json(SessionInfo::new(&session))))
	} else {
		// Repeated failures turn into a ban
		if state.bans.penalize(&ip) {
			warn!("Too many failed logins from {}", ip);
		}
		tokio::time::sleep(app.opts.login_failure_delay).await;
		Err(Error::Unauthorized)
	}
}

/// # POST /api/auth/logout
pub async fn post_logout(State(app): State<App>, auth: SessionAuth) -> AdResult<impl IntoResponse> {
	let state = app.admission();
	auth.check_csrf(&state)?;

	state.sessions.delete_session(&auth.session.id);
	info!("Session from {} logged out", auth.client_ip);

	Ok((StatusCode::NO_CONTENT, clear_cookies(&app)))
}

/// # POST /api/auth/refresh
pub async fn post_refresh(State(app): State<App>, auth: SessionAuth) -> AdResult<impl IntoResponse> {
	let state = app.admission();
	auth.check_csrf(&state)?;

	let session = state
		.sessions
		.refresh_session(&auth.session.id, &auth.client_ip)?
		.ok_or(Error::Unauthorized)?;

	Ok((StatusCode::OK, session_cookies(&app, &session), Json(SessionInfo::new(&session))))
}

/// # GET /api/auth/session
pub async fn get_session(auth: SessionAuth) -> AdResult<(StatusCode, Json<SessionInfo>)> {
	Ok((StatusCode::OK, Json(SessionInfo::new(&auth.session))))
}

/// # GET /api/health
#[derive(Serialize)]
pub struct Health {
	status: &'static str,
	version: &'static str,
}

pub async fn get_health() -> (StatusCode, Json<Health>) {
	(StatusCode::OK, Json(Health { status: "ok", version: VERSION }))
}

/// # GET /api/admin/stats
pub async fn get_admin_stats(
	State(app): State<App>,
	_auth: SessionAuth,
) -> AdResult<(StatusCode, Json<AdmissionStats>)> {
	Ok((StatusCode::OK, Json(app.admission().stats())))
}


// vim: ts=4
