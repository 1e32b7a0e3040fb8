//! Request extractors and cookie helpers

use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use assetdesk_core::{AdmissionState, AuthSession, ClientIp};

use crate::prelude::*;

pub const SESSION_COOKIE: &str = "ad_sid";
pub const BASIC_COOKIE: &str = "ad_basic";
pub const BEARER_COOKIE: &str = "ad_bearer";
pub const CSRF_COOKIE: &str = "ad_csrf";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Value of a cookie from the `Cookie` request headers
pub fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers
		.get_all(COOKIE)
		.iter()
		.filter_map(|v| v.to_str().ok())
		.flat_map(|v| v.split(';'))
		.find_map(|pair| {
			let (key, value) = pair.trim().split_once('=')?;
			(key == name).then_some(value)
		})
		.filter(|value| !value.is_empty())
}

/// Bearer token from `Authorization: Bearer ...`, falling back to the cookie
fn bearer(headers: &HeaderMap) -> Option<&str> {
	headers
		.get(AUTHORIZATION)
		.and_then(|h| h.to_str().ok())
		.and_then(|h| h.strip_prefix("Bearer "))
		.map(str::trim)
		.filter(|t| !t.is_empty())
		.or_else(|| cookie(headers, BEARER_COOKIE))
}

// ClientAddr //
//************//
/// Address the request was admitted under
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub IpAddr);

impl<S> FromRequestParts<S> for ClientAddr
where
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		match parts.extensions.get::<ClientIp>() {
			Some(ClientIp(ip)) => Ok(ClientAddr(*ip)),
			None => {
				error!("No client address for {}, route lacks admission layer", parts.uri.path());
				Err(Error::Internal("client address unavailable".into()))
			}
		}
	}
}

// SessionAuth //
//*************//
/// A validated session of the requesting client
#[derive(Debug, Clone)]
pub struct SessionAuth {
	pub session: Arc<AuthSession>,
	pub client_ip: IpAddr,
	csrf: Option<Box<str>>,
}

impl SessionAuth {
	/// Require the CSRF header of state-changing requests to match the session
	pub fn check_csrf(&self, state: &AdmissionState) -> AdResult<()> {
		match &self.csrf {
			Some(csrf) if state.sessions.validate_csrf(&self.session.id, csrf) => Ok(()),
			_ => {
				warn!("CSRF check failed for session from {}", self.client_ip);
				Err(Error::PermissionDenied)
			}
		}
	}
}

impl FromRequestParts<App> for SessionAuth {
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, app: &App) -> Result<Self, Self::Rejection> {
		let ClientAddr(client_ip) = ClientAddr::from_request_parts(parts, app).await?;

		let headers = &parts.headers;
		let (Some(id), Some(basic), Some(bearer)) =
			(cookie(headers, SESSION_COOKIE), cookie(headers, BASIC_COOKIE), bearer(headers))
		else {
			return Err(Error::Unauthorized);
		};

		let state = app.admission();
		let validation =
			state.sessions.validate_session(id, &client_ip.to_string(), basic, bearer).map_err(
				|err| {
					if err.is_anomaly() {
						error!("Session anomaly from {}: {}", client_ip, err);
					}
					err
				},
			)?;

		if !validation.valid {
			debug!("Rejected session from {} (known: {})", client_ip, validation.exists);
			return Err(Error::Unauthorized);
		}

		let session = state.sessions.get(id).ok_or(Error::Unauthorized)?;
		let csrf = headers
			.get(CSRF_HEADER)
			.and_then(|h| h.to_str().ok())
			.map(|h| h.trim().into());

		Ok(SessionAuth { session, client_ip, csrf })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::HeaderValue;

	#[test]
	fn test_cookie_parsing() {
		let mut headers = HeaderMap::new();
		headers.append(COOKIE, HeaderValue::from_static("theme=dark; ad_sid=abc123"));
		headers.append(COOKIE, HeaderValue::from_static("ad_basic=b=64; ad_csrf="));

		assert_eq!(cookie(&headers, SESSION_COOKIE), Some("abc123"));
		assert_eq!(cookie(&headers, BASIC_COOKIE), Some("b=64"));
		assert_eq!(cookie(&headers, CSRF_COOKIE), None);
		assert_eq!(cookie(&headers, "missing"), None);
	}

	#[test]
	fn test_bearer_header_wins() {
		let mut headers = HeaderMap::new();
		headers.insert(COOKIE, HeaderValue::from_static("ad_bearer=from-cookie"));
		assert_eq!(bearer(&headers), Some("from-cookie"));

		headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
		assert_eq!(bearer(&headers), Some("from-header"));

		headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
		assert_eq!(bearer(&headers), Some("from-cookie"));
	}
}

// vim: ts=4
