//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so a minimal config stays minimal.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Name routing and retry behaviour.
    pub routing: RoutingConfig,

    /// Catalog backend used for service discovery.
    pub catalog: CatalogConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// How inbound hosts are mapped to services and how forwarding behaves.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Suffix of the Host header served by this router; the prefix before it
    /// is the service name (e.g., ".svc.cluster").
    pub domain: String,

    /// Endpoints carrying this tag are preferred. Empty disables the
    /// preference.
    pub prefer_tag: String,

    /// Randomize endpoint order before the tag preference applies, spreading
    /// load across instances.
    pub shuffle: bool,

    /// How long resolutions (including failed ones) are cached, in seconds.
    pub cache_ttl_secs: u64,

    /// How long a failing address stays quarantined, in seconds.
    pub blacklist_ttl_secs: u64,

    /// Upper bound on forwarding retries for one request.
    pub max_attempts: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            domain: ".localhost".to_string(),
            prefer_tag: String::new(),
            shuffle: true,
            cache_ttl_secs: 10,
            blacklist_ttl_secs: 60,
            max_attempts: 10,
        }
    }
}

impl RoutingConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn blacklist_ttl(&self) -> Duration {
        Duration::from_secs(self.blacklist_ttl_secs)
    }
}

/// Catalog backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Address of the catalog agent; a bare `host:port` defaults to http.
    pub address: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8500".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
