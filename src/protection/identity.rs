use std::net::{IpAddr, SocketAddr};

use http::HeaderMap;

use crate::models::client::ClientKey;

/// Derive the client key for a request.
///
/// Priority: left-most `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// transport peer address. Both headers are taken at face value; anything
/// keyed on the result must treat it as advisory. A peer address that does
/// not parse yields [`ClientKey::unknown`], so all such clients share one
/// bucket and one behavior record.
pub fn resolve_client_key(headers: &HeaderMap, remote_addr: &str) -> ClientKey {
    if let Some(xff) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = xff.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return ClientKey::new(first);
        }
    }

    if let Some(real_ip) = header_str(headers, "x-real-ip") {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return ClientKey::new(real_ip);
        }
    }

    peer_ip(remote_addr).map_or_else(ClientKey::unknown, ClientKey::from)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// IP part of a `host:port` peer address, or a bare IP.
fn peer_ip(remote_addr: &str) -> Option<IpAddr> {
    let addr = remote_addr.trim();
    addr.parse::<SocketAddr>()
        .map(|sa| sa.ip())
        .or_else(|_| addr.parse::<IpAddr>())
        .ok()
}
