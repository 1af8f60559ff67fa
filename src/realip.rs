// =============================================================================
// Real-Client-Address Resolver
// =============================================================================

use std::net::SocketAddr;

use axum::http::HeaderMap;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn resolve_host(headers: &HeaderMap) -> Option<String> {
    if let Some(v) = header_str(headers, "CF-Connecting-IP") {
        let v = v.trim();
        if !v.is_empty() {
            return Some(v.to_string());
        }
    }
    if let Some(v) = header_str(headers, "X-Real-IP") {
        let v = v.trim();
        if !v.is_empty() {
            return Some(v.to_string());
        }
    }
    if let Some(v) = header_str(headers, "X-Forwarded-For") {
        if let Some(first) = v.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    None
}

fn resolve_port(headers: &HeaderMap) -> Option<u16> {
    if let Some(v) = header_str(headers, "X-Real-Port") {
        if let Ok(p) = v.trim().parse::<u16>() {
            if p != 0 {
                return Some(p);
            }
        }
    }
    if let Some(v) = header_str(headers, "X-Forwarded-Port") {
        if let Ok(p) = v.trim().parse::<u16>() {
            if p != 0 {
                return Some(p);
            }
        }
    }
    None
}

/// Resolve the real client `(host, port)` from proxy headers, falling back
/// to the transport-level address when either half is missing or zero.
/// Resolution is all-or-nothing: a derived host without a derived port (or
/// vice versa) falls back to the transport address for both.
pub fn resolve(headers: &HeaderMap, transport: SocketAddr) -> (String, u16) {
    match (resolve_host(headers), resolve_port(headers)) {
        (Some(host), Some(port)) => (host, port),
        _ => (transport.ip().to_string(), transport.port()),
    }
}
