//! Header hygiene for proxied requests and responses.
//!
//! # Design Decisions
//! - Hop-by-hop fields are stripped in both directions; they are only
//!   meaningful on a single transport hop
//! - Fields named by the `Connection` header are stripped before the fixed
//!   set, matching HTTP connection-option semantics
//! - Header copies preserve multi-value ordering

use std::net::SocketAddr;

use http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Fields that must not travel end-to-end through a proxy.
static HOP_BY_HOP_FIELDS: [HeaderName; 7] = [
    header::CONNECTION,
    header::TE,
    header::TRANSFER_ENCODING,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHORIZATION,
    HeaderName::from_static("proxy-authentication"),
    header::UPGRADE,
];

/// Remove every field named by the `Connection` header.
pub fn clear_connection_fields(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|field| HeaderName::from_bytes(field.trim().as_bytes()).ok())
        .collect();

    for field in listed {
        headers.remove(field);
    }
}

/// Remove the fixed hop-by-hop set.
pub fn clear_hop_by_hop_fields(headers: &mut HeaderMap) {
    for field in &HOP_BY_HOP_FIELDS {
        headers.remove(field);
    }
}

/// Copy every field from `from` into `to`, preserving the order and
/// multiplicity of repeated fields.
pub fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        to.append(name.clone(), value.clone());
    }
}

/// Build the `Forwarded` header value for a request received from
/// `remote_addr` with the original `host`.
///
/// A previous `Forwarded` header is overwritten rather than merged.
pub fn forwarded(remote_addr: SocketAddr, host: &str) -> Option<HeaderValue> {
    let value = format!(
        "for={};host={};proto=http",
        quote(&remote_addr.to_string()),
        quote(host)
    );
    HeaderValue::from_str(&value).ok()
}

/// Double-quote `s`, escaping everything that is not printable ASCII.
fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            c if c.is_ascii_graphic() || c == ' ' => quoted.push(c),
            c => quoted.extend(c.escape_default()),
        }
    }
    quoted.push('"');
    quoted
}
