//! Client Address Resolution
//!
//! Derives the logical source address of a request from the CDN and proxy
//! headers, falling back to the transport peer address.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

/// CDN supplied address of the connecting client
pub const CDN_CONNECTING_IP_HEADER: &str = "cf-connecting-ip";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
/// Address used when nothing identifies the caller
pub const UNKNOWN_ADDRESS: &str = "Unknown";

/// Resolves the address requests are counted against.
///
/// Trust order, first match wins: CDN connecting-IP header, first entry of
/// X-Forwarded-For, transport peer address, `"Unknown"`. Header values are
/// not validated as IP addresses. With an empty trusted proxy list the
/// headers are honoured from any peer and can be spoofed by clients that
/// reach the server directly.
#[derive(Clone, Debug, Default)]
pub struct IpResolver {
	trusted_proxies: Box<[IpAddr]>,
}

impl IpResolver {
	pub fn new(trusted_proxies: impl Into<Box<[IpAddr]>>) -> Self {
		Self { trusted_proxies: trusted_proxies.into() }
	}

	pub fn resolve(&self, headers: &HeaderMap, remote: Option<SocketAddr>) -> Box<str> {
		if self.trusts_headers_from(remote) {
			if let Some(addr) = extract_from_cdn(headers).or_else(|| extract_from_xff(headers)) {
				return addr.into();
			}
		}
		remote.map_or_else(|| UNKNOWN_ADDRESS.into(), |addr| addr.ip().to_string().into())
	}

	fn trusts_headers_from(&self, remote: Option<SocketAddr>) -> bool {
		self.trusted_proxies.is_empty()
			|| remote.is_some_and(|addr| self.trusted_proxies.contains(&addr.ip()))
	}
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|h| h.to_str().ok())
}

/// Extract address from the CDN connecting-IP header
fn extract_from_cdn(headers: &HeaderMap) -> Option<&str> {
	header_str(headers, CDN_CONNECTING_IP_HEADER).map(str::trim).filter(|s| !s.is_empty())
}

/// Extract address from X-Forwarded-For header
fn extract_from_xff(headers: &HeaderMap) -> Option<&str> {
	// X-Forwarded-For can contain multiple addresses: "client, proxy1, proxy2"
	// Take the first (leftmost) one as the original client
	header_str(headers, FORWARDED_FOR_HEADER)
		.and_then(|s| s.split(',').next())
		.map(str::trim)
		.filter(|s| !s.is_empty())
}


// vim: ts=4
