//! CIDR allow-lists
//!
//! Built once at startup from comma separated address/CIDR strings and never
//! modified afterwards, so concurrent reads need no locking. A bare address
//! becomes a host prefix (/32 or /128) that matches only itself.

use std::net::IpAddr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::Deserialize;

use crate::config::AllowListConfig;
use crate::prelude::*;

/// Which allow-list a route is checked against
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowScope {
	Wan,
	Lan,
	/// Union of WAN and LAN
	Any,
}

impl AllowScope {
	pub fn name(&self) -> &'static str {
		match self {
			AllowScope::Wan => "wan",
			AllowScope::Lan => "lan",
			AllowScope::Any => "any",
		}
	}
}

impl std::fmt::Display for AllowScope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}

impl std::str::FromStr for AllowScope {
	type Err = Error;

	fn from_str(s: &str) -> AdResult<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"wan" => Ok(AllowScope::Wan),
			"lan" => Ok(AllowScope::Lan),
			"any" | "all" => Ok(AllowScope::Any),
			other => Err(Error::ValidationError(format!("unknown allow scope '{}'", other))),
		}
	}
}

/// Parse one allow-list entry: CIDR notation or a bare address
pub fn parse_entry(entry: &str) -> AdResult<IpNet> {
	let entry = entry.trim();
	if let Ok(net) = entry.parse::<IpNet>() {
		return Ok(net.trunc());
	}
	match entry.parse::<IpAddr>().map_err(|_| Error::Parse)? {
		IpAddr::V4(v4) => Ipv4Net::new(v4, 32).map(IpNet::V4),
		IpAddr::V6(v6) => Ipv6Net::new(v6, 128).map(IpNet::V6),
	}
	.map_err(|_| Error::Parse)
}

/// Immutable set of network prefixes
#[derive(Debug, Clone, Default)]
pub struct IpAllowList {
	nets: Box<[IpNet]>,
}

impl IpAllowList {
	/// Build from entries, skipping (and logging) the ones that do not parse
	pub fn new<I, S>(entries: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let nets = entries
			.into_iter()
			.filter(|s| !s.as_ref().trim().is_empty())
			.filter_map(|s| match parse_entry(s.as_ref()) {
				Ok(net) => Some(net),
				Err(_) => {
					warn!("Ignoring invalid allow-list entry '{}'", s.as_ref().trim());
					None
				}
			})
			.collect();
		Self { nets }
	}

	/// Build from a comma separated list
	pub fn from_csv(csv: &str) -> Self {
		Self::new(csv.split(','))
	}

	pub fn contains(&self, ip: &IpAddr) -> bool {
		let ip = ip.to_canonical();
		self.nets.iter().any(|net| net.contains(&ip))
	}

	/// Check a textual address; unparseable input is never allowed
	pub fn is_allowed(&self, ip: &str) -> bool {
		ip.trim().parse::<IpAddr>().is_ok_and(|ip| self.contains(&ip))
	}

	pub fn nets(&self) -> &[IpNet] {
		&self.nets
	}

	pub fn len(&self) -> usize {
		self.nets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nets.is_empty()
	}

	fn union(a: &IpAllowList, b: &IpAllowList) -> Self {
		Self { nets: a.nets.iter().chain(b.nets.iter()).copied().collect() }
	}
}

/// The three allow-list scopes
#[derive(Debug, Clone, Default)]
pub struct AllowLists {
	wan: IpAllowList,
	lan: IpAllowList,
	any: IpAllowList,
}

impl AllowLists {
	pub fn new(wan: IpAllowList, lan: IpAllowList) -> Self {
		let any = IpAllowList::union(&wan, &lan);
		Self { wan, lan, any }
	}

	pub fn from_config(config: &AllowListConfig) -> Self {
		let lists = Self::new(IpAllowList::from_csv(&config.wan), IpAllowList::from_csv(&config.lan));
		debug!("Allow-lists loaded: {} WAN, {} LAN prefixes", lists.wan.len(), lists.lan.len());
		lists
	}

	pub fn scope(&self, scope: AllowScope) -> &IpAllowList {
		match scope {
			AllowScope::Wan => &self.wan,
			AllowScope::Lan => &self.lan,
			AllowScope::Any => &self.any,
		}
	}

	pub fn contains(&self, scope: AllowScope, ip: &IpAddr) -> bool {
		self.scope(scope).contains(ip)
	}

	pub fn is_allowed(&self, scope: AllowScope, ip: &str) -> bool {
		self.scope(scope).is_allowed(ip)
	}
}


// vim: ts=4
