//! The endpoint value type.

/// A single reachable instance of a service.
///
/// Endpoints are immutable values with structural equality; decorators clone
/// and reorder them freely. Tags are opaque strings, duplicates allowed, and
/// their order carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tags: Vec<String>,
}

impl Endpoint {
    /// Create an endpoint with no tags.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tags: Vec::new(),
        }
    }

    /// Create an endpoint carrying the given tags.
    pub fn with_tags<I, T>(host: impl Into<String>, port: u16, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            host: host.into(),
            port,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// The `host:port` address this endpoint is reached at. IPv6 hosts are
    /// bracketed so the result is always a valid authority.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
