//! Client Address Extraction
//!
//! Determines the address a request is admitted under. Behind a reverse proxy
//! the peer address is the proxy itself, so forwarding headers take priority.

use std::net::{IpAddr, SocketAddr};

use axum::extract::connect_info::MockConnectInfo;
use axum::extract::ConnectInfo;
use axum::http::Request;

use crate::config::ServerMode;

/// Extract client IP from request based on ServerMode
///
/// - Standalone mode: Use peer IP directly from ConnectInfo
/// - Proxy mode: Check forwarding headers first
pub fn extract_client_ip<B>(req: &Request<B>, mode: ServerMode) -> Option<IpAddr> {
	let ip = match mode {
		ServerMode::Standalone => peer_ip(req),
		ServerMode::Proxy => extract_from_xff(req)
			.or_else(|| extract_from_x_real_ip(req))
			.or_else(|| extract_from_forwarded(req))
			.or_else(|| peer_ip(req)),
	};
	ip.map(|ip| ip.to_canonical())
}

fn peer_ip<B>(req: &Request<B>) -> Option<IpAddr> {
	let ext = req.extensions();
	ext.get::<ConnectInfo<SocketAddr>>()
		.map(|ci| ci.0.ip())
		.or_else(|| ext.get::<MockConnectInfo<SocketAddr>>().map(|mock| mock.0.ip()))
}

/// Extract IP from X-Forwarded-For header
fn extract_from_xff<B>(req: &Request<B>) -> Option<IpAddr> {
	req.headers()
		.get("x-forwarded-for")
		.and_then(|h| h.to_str().ok())
		// "client, proxy1, proxy2": the leftmost entry is the original client
		.and_then(|s| s.split(',').next().map(str::trim).and_then(|ip| ip.parse().ok()))
}

/// Extract IP from X-Real-IP header
fn extract_from_x_real_ip<B>(req: &Request<B>) -> Option<IpAddr> {
	req.headers()
		.get("x-real-ip")
		.and_then(|h| h.to_str().ok())
		.and_then(|s| s.trim().parse().ok())
}

/// Extract IP from Forwarded header (RFC 7239)
fn extract_from_forwarded<B>(req: &Request<B>) -> Option<IpAddr> {
	let header = req.headers().get("forwarded").and_then(|h| h.to_str().ok())?;
	// "for=192.0.2.60;proto=http", possibly several comma separated hops
	let first_hop = header.split(',').next()?;
	first_hop.split(';').find_map(|part| {
		let (key, value) = part.trim().split_once('=')?;
		if !key.eq_ignore_ascii_case("for") {
			return None;
		}
		// Quoted IPv6 with optional port: "[2001:db8::1]:4711"
		let value = value.trim_matches('"');
		let value = match value.strip_prefix('[') {
			Some(rest) => rest.split(']').next()?,
			// IPv4 with port
			None if value.matches(':').count() == 1 => value.split(':').next()?,
			None => value,
		};
		value.parse().ok()
	})
}


// vim: ts=4
