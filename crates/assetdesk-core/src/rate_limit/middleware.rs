//! Admission Middleware
//!
//! Tower middleware layer applying the admission check to Axum routes.

use std::net::IpAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::Request;
use axum::response::IntoResponse;
use futures::future::BoxFuture;
use tower::{Layer, Service};

use super::config::PoolKind;
use super::error::AdmissionError;
use super::extractors::extract_client_ip;
use crate::allow_list::AllowScope;
use crate::prelude::*;
use crate::state::SharedState;

/// Client address the request was admitted under, stored in request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// Admission middleware layer
#[derive(Clone)]
pub struct AdmissionLayer {
	state: Arc<SharedState>,
	pool: PoolKind,
	scope: Option<AllowScope>,
}

impl AdmissionLayer {
	/// Charge requests to `pool`; no allow-list restriction
	pub fn new(state: Arc<SharedState>, pool: PoolKind) -> Self {
		Self { state, pool, scope: None }
	}

	/// Additionally require the client address to be in `scope`
	pub fn restricted(mut self, scope: AllowScope) -> Self {
		self.scope = Some(scope);
		self
	}
}

impl<S> Layer<S> for AdmissionLayer {
	type Service = AdmissionService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		AdmissionService { inner, state: self.state.clone(), pool: self.pool, scope: self.scope }
	}
}

/// Admission middleware service
#[derive(Clone)]
pub struct AdmissionService<S> {
	inner: S,
	state: Arc<SharedState>,
	pool: PoolKind,
	scope: Option<AllowScope>,
}

impl<S> Service<Request<Body>> for AdmissionService<S>
where
	S: Service<Request<Body>, Response = axum::response::Response> + Clone + Send + 'static,
	S::Future: Send + 'static,
{
	type Response = S::Response;
	type Error = S::Error;
	type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.inner.poll_ready(cx)
	}

	fn call(&mut self, mut req: Request<Body>) -> Self::Future {
		let state = self.state.current();
		let pool = self.pool;
		let scope = self.scope;
		let mut inner = self.inner.clone();

		Box::pin(async move {
			match extract_client_ip(&req, state.config.mode) {
				Some(ip) => {
					if let Err(error) = state.check(&ip, pool, scope) {
						return Ok(error.into_response());
					}
					req.extensions_mut().insert(ClientIp(ip));
				}
				// An unknown address can never satisfy an allow-list
				None => {
					if let Some(scope) = scope {
						warn!("No client address for {} request to {}", scope, req.uri().path());
						return Ok(AdmissionError::NotAllowed { scope }.into_response());
					}
				}
			}

			inner.call(req).await
		})
	}
}

// vim: ts=4
