//! Configuration validation logic.

use std::net::SocketAddr;

use crate::config::schema::RouterConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a RouterConfig for semantic correctness, collecting every
/// problem rather than stopping at the first one.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError(format!(
            "listener.bind_address '{}' is not a valid socket address",
            config.listener.bind_address
        )));
    }

    if config.routing.domain.is_empty() {
        errors.push(ValidationError(
            "routing.domain must not be empty; every host would match".to_string(),
        ));
    }

    if config.routing.cache_ttl_secs == 0 {
        errors.push(ValidationError(
            "routing.cache_ttl_secs must be > 0".to_string(),
        ));
    }
    if config.routing.blacklist_ttl_secs == 0 {
        errors.push(ValidationError(
            "routing.blacklist_ttl_secs must be > 0".to_string(),
        ));
    }
    if config.routing.max_attempts == 0 {
        errors.push(ValidationError(
            "routing.max_attempts must be > 0".to_string(),
        ));
    }

    if config.catalog.address.is_empty() {
        errors.push(ValidationError(
            "catalog.address must not be empty".to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
