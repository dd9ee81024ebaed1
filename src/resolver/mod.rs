//! Service name resolution subsystem.
//!
//! # Data Flow
//! ```text
//! engine asks for "name"
//!     → prefer.rs (stable reorder by tag)
//!     → shuffle.rs (random reorder for load spread)
//!     → blacklist.rs (drop recently failing addresses)
//!     → cache.rs (single-flight TTL cache)
//!     → catalog.rs (HTTP+JSON lookup against the catalog backend)
//! ```
//!
//! # Design Decisions
//! - One polymorphic operation; every layer is a value implementing it
//! - Decorators own their inner resolver behind `Arc<dyn Resolver>`
//! - Unknown names resolve to an empty list, errors are runtime failures only
//! - List order is the preference order; callers take index 0

pub mod blacklist;
pub mod cache;
pub mod catalog;
pub mod endpoint;
pub mod prefer;
pub mod shuffle;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

pub use blacklist::Blacklist;
pub use cache::CachedResolver;
pub use catalog::CatalogResolver;
pub use endpoint::Endpoint;
pub use prefer::preferred;
pub use shuffle::Shuffled;

/// Runtime failure of a resolver. Unknown names are not errors; they resolve
/// to an empty endpoint list instead.
///
/// Variants are flattened to owned strings so resolutions can be cached and
/// shared between concurrent callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The request to the discovery backend could not be completed.
    #[error("{url}: {message}")]
    Transport { url: String, message: String },

    /// The discovery backend answered with something other than 200.
    #[error("{url}: {status}")]
    UnexpectedStatus { url: String, status: String },

    /// The discovery backend answered 200 with a body we could not decode.
    #[error("{url}: decoding catalog response: {message}")]
    Decode { url: String, message: String },
}

/// Translates a service name into the list of endpoints requests can be
/// forwarded to.
///
/// Endpoints are sorted with the best candidate first; the forwarding engine
/// picks the head of the list. Implementations must be safe for concurrent
/// invocation.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Vec<Endpoint>, ResolveError>;
}

/// A resolver that always returns the same endpoints, whatever the name.
/// Mostly intended for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticList(pub Vec<Endpoint>);

#[async_trait]
impl Resolver for StaticList {
    async fn resolve(&self, _name: &str) -> Result<Vec<Endpoint>, ResolveError> {
        Ok(self.0.clone())
    }
}

/// A resolver backed by a fixed name → endpoints mapping. Mostly intended
/// for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticMap(pub HashMap<String, Vec<Endpoint>>);

#[async_trait]
impl Resolver for StaticMap {
    async fn resolve(&self, name: &str) -> Result<Vec<Endpoint>, ResolveError> {
        Ok(self.0.get(name).cloned().unwrap_or_default())
    }
}
