//! The forwarding engine.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → in-flight accounting (shutdown drain)
//!     → shutdown / upgrade / domain checks
//!     → header hygiene + body tap
//!     → resolve name → forward to endpoints[0]
//!         ↻ on connection failure: blacklist address, back off, re-resolve
//!     → response hygiene → stream body to client
//! ```
//!
//! # Design Decisions
//! - Resolver errors are terminal (500); only transport errors are retried
//! - A retry requires an idempotent method and an untouched request body
//! - The failing address is blacklisted before re-resolving, so the next
//!   attempt cannot pick it again
//! - Responses finishing after a stop signal carry `Connection: close`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::response::IntoResponse;
use http::header::{self, HeaderValue};
use http::uri::{PathAndQuery, Scheme, Uri};
use http::{Method, Request, Response, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time::Duration;

use crate::config::schema::RoutingConfig;
use crate::lifecycle::Shutdown;
use crate::proxy::body::{BodyTap, ForwardBody};
use crate::proxy::{buffer, headers};
use crate::resolver::{preferred, Blacklist, CachedResolver, Resolver, Shuffled};

/// Proxies one inbound request at a time to the endpoints a resolver chain
/// hands it, retrying connection failures against other endpoints.
pub struct ProxyEngine {
    domain: String,
    max_attempts: u32,
    resolver: Arc<dyn Resolver>,
    blacklist: Arc<Blacklist>,
    client: Client<HttpConnector, ForwardBody>,
    shutdown: Arc<Shutdown>,
}

impl ProxyEngine {
    /// Assemble the resolver chain around `base` and bind the engine to a
    /// shutdown coordinator.
    pub fn new(config: &RoutingConfig, base: Arc<dyn Resolver>, shutdown: Arc<Shutdown>) -> Self {
        let cache = CachedResolver::new(config.cache_ttl(), base);
        let blacklist = Arc::new(Blacklist::new(config.blacklist_ttl(), Arc::new(cache)));

        let mut chain: Arc<dyn Resolver> = blacklist.clone();
        if config.shuffle {
            chain = Arc::new(Shuffled::new(chain));
        }
        let chain = preferred(&config.prefer_tag, chain);

        Self {
            domain: config.domain.clone(),
            max_attempts: config.max_attempts,
            resolver: chain,
            blacklist,
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            shutdown,
        }
    }

    /// The quarantine the engine feeds on connection failures.
    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// Handle one inbound request end to end.
    pub async fn serve(&self, req: Request<Body>, remote_addr: SocketAddr) -> Response<Body> {
        let _in_flight = self.shutdown.clone().enter();

        // Stopped servers refuse new work straight away.
        if self.shutdown.is_stopped() {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            response
                .headers_mut()
                .append(header::CONNECTION, HeaderValue::from_static("close"));
            return response;
        }

        // Protocol upgrades would need a dedicated tcp tunnel to the service.
        if req
            .headers()
            .get(header::UPGRADE)
            .is_some_and(|value| !value.is_empty())
        {
            return StatusCode::NOT_IMPLEMENTED.into_response();
        }

        let Some(host) = request_host(&req) else {
            tracing::error!(
                status = 503,
                reason = "Service Unavailable",
                domain = %self.domain,
                "the request carries no host to route on"
            );
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        };

        let Some(name) = host.strip_suffix(&self.domain) else {
            tracing::error!(
                status = 503,
                reason = "Service Unavailable",
                host = %host,
                domain = %self.domain,
                "the requested host doesn't belong to the domain served by the router"
            );
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        };

        let (mut parts, body) = req.into_parts();
        headers::clear_connection_fields(&mut parts.headers);
        headers::clear_hop_by_hop_fields(&mut parts.headers);

        let forwarded = headers::forwarded(remote_addr, &host);
        let tap = BodyTap::new(body);

        // Forward the request to the resolved endpoint. Connection errors are
        // retried on idempotent methods, only while no byte of the body has
        // been transmitted yet.
        let mut attempt: u32 = 0;
        let upstream = loop {
            let endpoints = match self.resolver.resolve(name).await {
                Ok(endpoints) => endpoints,
                Err(error) => {
                    tracing::error!(
                        status = 500,
                        reason = "Internal Server Error",
                        host = %host,
                        error = %error,
                        "an error was returned by the resolver"
                    );
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            };

            let Some(endpoint) = endpoints.first() else {
                tracing::error!(
                    status = 502,
                    reason = "Bad Gateway",
                    host = %host,
                    "no service returned by the resolver"
                );
                return StatusCode::BAD_GATEWAY.into_response();
            };

            let address = endpoint.address();
            let outbound = match outbound_request(&parts, &address, forwarded.as_ref(), &tap) {
                Ok(outbound) => outbound,
                Err(error) => {
                    tracing::error!(
                        status = 502,
                        reason = "Bad Gateway",
                        host = %host,
                        address = %address,
                        error = %error,
                        "the resolved address does not form a valid url"
                    );
                    return StatusCode::BAD_GATEWAY.into_response();
                }
            };

            match self.client.request(outbound).await {
                Ok(response) => break response,
                Err(error) => {
                    if attempt < self.max_attempts
                        && tap.bytes_read() == 0
                        && idempotent(&parts.method)
                    {
                        // Quarantine the address so the next resolve cannot
                        // hand it back for the retry.
                        self.blacklist.add(&address);
                        tracing::warn!(
                            host = %host,
                            address = %address,
                            error = %error,
                            "black-listing failing service"
                        );

                        // Backoff: 0ms, 10ms, 40ms, 90ms ... 810ms
                        tokio::time::sleep(backoff(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    tracing::error!(
                        status = 502,
                        reason = "Bad Gateway",
                        host = %host,
                        error = %error,
                        "forwarding the request to the service returned an error"
                    );
                    return StatusCode::BAD_GATEWAY.into_response();
                }
            }
        };

        // Configure the response header, removing fields that were not
        // directed at the client.
        let (mut parts, body) = upstream.into_parts();
        headers::clear_connection_fields(&mut parts.headers);
        headers::clear_hop_by_hop_fields(&mut parts.headers);

        if self.shutdown.is_stopped() {
            parts
                .headers
                .append(header::CONNECTION, HeaderValue::from_static("close"));
        }

        Response::from_parts(parts, buffer::pooled_copy(body))
    }
}

/// Build the request for one upstream attempt: same method and path, the
/// endpoint address as authority, sanitized headers, a fresh `Forwarded`
/// field, and the shared body tap.
fn outbound_request(
    parts: &http::request::Parts,
    address: &str,
    forwarded: Option<&HeaderValue>,
    tap: &Arc<BodyTap>,
) -> Result<Request<ForwardBody>, http::Error> {
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(PathAndQuery::as_str)
        .unwrap_or("/");

    let uri = Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(address)
        .path_and_query(path_and_query)
        .build()?;

    let mut outbound = Request::builder()
        .method(parts.method.clone())
        .uri(uri)
        .version(http::Version::HTTP_11)
        .body(ForwardBody::new(tap.clone()))?;

    headers::copy_headers(&parts.headers, outbound.headers_mut());
    if let Some(forwarded) = forwarded {
        outbound
            .headers_mut()
            .insert(header::FORWARDED, forwarded.clone());
    }

    Ok(outbound)
}

/// The host the client addressed, from the request target if it is in
/// absolute form, from the `Host` header otherwise.
fn request_host(req: &Request<Body>) -> Option<String> {
    if let Some(authority) = req.uri().authority() {
        return Some(authority.to_string());
    }
    req.headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Methods safe to send a second time after a connection failure.
fn idempotent(method: &Method) -> bool {
    matches!(
        method.as_str(),
        "GET" | "HEAD" | "PUT" | "DELETE" | "OPTIONS"
    )
}

/// Quadratic backoff between attempts: `attempt² × 10ms`.
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(u64::from(attempt) * u64::from(attempt) * 10)
}
