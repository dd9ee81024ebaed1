//! Name-routed HTTP reverse proxy.
//!
//! Clients address services by Host header: everything before the configured
//! domain suffix is a service name, resolved through a chain of decorators
//! (preference → shuffle → blacklist → cache → catalog) to the endpoint the
//! request is forwarded to.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod resolver;

pub use config::RouterConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::ProxyEngine;
pub use resolver::{Endpoint, ResolveError, Resolver};
