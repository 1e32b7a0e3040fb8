//! Admission Error Types
//!
//! Expected denials of the admission path. These are ordinary outcomes, not
//! faults, and map to 403/429 responses.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::config::PoolKind;
use crate::allow_list::AllowScope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
	/// Address is outside the allow-list of the route's scope
	NotAllowed {
		scope: AllowScope,
	},
	/// Address is banned
	Banned {
		/// Remaining ban duration
		remaining: Duration,
	},
	/// Token bucket of the pool is empty
	RateLimited {
		pool: PoolKind,
		/// Time until the next token
		retry_after: Duration,
	},
}

impl std::fmt::Display for AdmissionError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			AdmissionError::NotAllowed { scope } => {
				write!(f, "Address not allowed for {} scope", scope)
			}
			AdmissionError::Banned { remaining } => {
				write!(f, "Address banned for {:?}", remaining)
			}
			AdmissionError::RateLimited { pool, retry_after } => {
				write!(f, "Rate limited in {} pool, retry after {:?}", pool, retry_after)
			}
		}
	}
}

impl std::error::Error for AdmissionError {}

impl IntoResponse for AdmissionError {
	fn into_response(self) -> Response {
		match self {
			AdmissionError::RateLimited { pool, retry_after } => {
				// Round up so clients never retry too early
				let retry_secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
				let body = serde_json::json!({
					"error": {
						"code": "E-RATE-LIMITED",
						"message": "Too many requests. Please slow down.",
						"details": {
							"pool": pool.name(),
							"retryAfter": retry_secs
						}
					}
				});

				let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();

				if let Ok(val) = retry_secs.to_string().parse() {
					response.headers_mut().insert("Retry-After", val);
				}
				if let Ok(val) = pool.name().parse() {
					response.headers_mut().insert("X-RateLimit-Pool", val);
				}

				response
			}
			AdmissionError::Banned { remaining } => {
				let body = serde_json::json!({
					"error": {
						"code": "E-RATE-BANNED",
						"message": "Access temporarily blocked due to repeated violations.",
						"details": {
							"remainingSecs": remaining.as_secs()
						}
					}
				});
				(StatusCode::FORBIDDEN, Json(body)).into_response()
			}
			AdmissionError::NotAllowed { scope } => {
				let body = serde_json::json!({
					"error": {
						"code": "E-ADDR-NOT-ALLOWED",
						"message": "Access from this address is not permitted.",
						"details": {
							"scope": scope.name()
						}
					}
				});
				(StatusCode::FORBIDDEN, Json(body)).into_response()
			}
		}
	}
}


// vim: ts=4
