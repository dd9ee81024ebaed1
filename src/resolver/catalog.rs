//! Resolver backed by a catalog service speaking HTTP+JSON.
//!
//! The wire format is the consul catalog API: `GET
//! {base}/v1/catalog/service/{name}` answering 200 with a JSON array of
//! registered instances. An unknown name is a valid 200 with an empty array.

use http::StatusCode;
use serde::Deserialize;

use super::{Endpoint, ResolveError, Resolver};
use async_trait::async_trait;

/// Resolver that looks services up in an external catalog over HTTP.
///
/// Lookups are not retried here; the cache and the forwarding engine decide
/// what to do with failures.
pub struct CatalogResolver {
    base_url: String,
    client: reqwest::Client,
}

impl CatalogResolver {
    /// `address` may be a bare `host:port`; a missing scheme defaults to
    /// plain http.
    pub fn new(address: &str) -> Self {
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_owned()
        } else {
            format!("http://{address}")
        };

        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogService {
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "ServicePort")]
    service_port: u16,
    #[serde(rename = "ServiceTags")]
    service_tags: Option<Vec<String>>,
}

#[async_trait]
impl Resolver for CatalogResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<Endpoint>, ResolveError> {
        let url = format!("{}/v1/catalog/service/{}", self.base_url, name);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|error| ResolveError::Transport {
                url: url.clone(),
                message: error.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ResolveError::UnexpectedStatus {
                url,
                status: status_line(status),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| ResolveError::Transport {
                url: url.clone(),
                message: error.to_string(),
            })?;

        let instances: Vec<CatalogService> =
            serde_json::from_slice(&body).map_err(|error| ResolveError::Decode {
                url: url.clone(),
                message: error.to_string(),
            })?;

        let endpoints: Vec<Endpoint> = instances
            .into_iter()
            .map(|instance| Endpoint {
                host: instance.address,
                port: instance.service_port,
                tags: instance.service_tags.unwrap_or_default(),
            })
            .collect();

        tracing::info!(
            name,
            url = %url,
            status = status.as_u16(),
            endpoints = endpoints.len(),
            "catalog service discovery"
        );

        Ok(endpoints)
    }
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;

    type Fixtures = Arc<HashMap<&'static str, Vec<Endpoint>>>;

    async fn catalog_handler(
        State(fixtures): State<Fixtures>,
        Path(name): Path<String>,
    ) -> Json<serde_json::Value> {
        let instances: Vec<serde_json::Value> = fixtures
            .get(name.as_str())
            .map(|endpoints| {
                endpoints
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "Address": e.host,
                            "ServicePort": e.port,
                            "ServiceTags": e.tags,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Json(serde_json::Value::Array(instances))
    }

    async fn spawn_catalog(fixtures: Fixtures) -> SocketAddr {
        let app = Router::new()
            .route("/v1/catalog/service/{name}", get(catalog_handler))
            .route("/v1/catalog/service/", get(catalog_handler_missing))
            .with_state(fixtures);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        addr
    }

    async fn catalog_handler_missing() -> Json<serde_json::Value> {
        Json(serde_json::Value::Array(Vec::new()))
    }

    fn fixtures() -> Fixtures {
        Arc::new(HashMap::from([
            ("host-1", vec![Endpoint::new("host-1", 1000)]),
            ("host-2", vec![Endpoint::new("host-2", 2000)]),
            (
                "host-3",
                vec![Endpoint::with_tags("host-3", 3000, ["A", "B", "C"])],
            ),
        ]))
    }

    #[tokio::test]
    async fn resolves_registered_services() {
        let fixtures = fixtures();
        let addr = spawn_catalog(fixtures.clone()).await;

        // The bare address exercises the http:// default as well.
        let resolver = CatalogResolver::new(&addr.to_string());

        for name in ["host-1", "host-2", "host-3"] {
            let endpoints = resolver.resolve(name).await.unwrap();
            assert_eq!(&endpoints, fixtures.get(name).unwrap(), "{name}");
        }
    }

    #[tokio::test]
    async fn unknown_names_resolve_to_an_empty_list() {
        let addr = spawn_catalog(fixtures()).await;
        let resolver = CatalogResolver::new(&format!("http://{addr}"));

        let endpoints = resolver.resolve("").await.unwrap();
        assert!(endpoints.is_empty());
    }

    #[tokio::test]
    async fn non_200_statuses_are_errors() {
        let app = Router::new().route(
            "/v1/catalog/service/{name}",
            get(|| async { (http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let resolver = CatalogResolver::new(&addr.to_string());
        let error = resolver.resolve("web").await.unwrap_err();

        match error {
            ResolveError::UnexpectedStatus { url, status } => {
                assert!(url.ends_with("/v1/catalog/service/web"));
                assert_eq!(status, "500 Internal Server Error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn undecodable_bodies_are_errors() {
        let app = Router::new().route(
            "/v1/catalog/service/{name}",
            get(|| async { "not json at all" }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let resolver = CatalogResolver::new(&addr.to_string());
        assert!(matches!(
            resolver.resolve("web").await,
            Err(ResolveError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_catalogs_are_transport_errors() {
        // Bind and immediately drop to find a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let resolver = CatalogResolver::new(&addr.to_string());
        assert!(matches!(
            resolver.resolve("web").await,
            Err(ResolveError::Transport { .. })
        ));
    }
}
