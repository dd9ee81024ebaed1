//! Stable reordering by endpoint tag.

use std::sync::Arc;

use super::{Endpoint, ResolveError, Resolver};
use async_trait::async_trait;

/// Wrap `inner` so endpoints carrying `tag` come first in its results.
///
/// An empty tag means no preference at all and returns `inner` unchanged.
pub fn preferred(tag: &str, inner: Arc<dyn Resolver>) -> Arc<dyn Resolver> {
    if tag.is_empty() {
        return inner;
    }
    Arc::new(Preferred {
        tag: tag.to_owned(),
        inner,
    })
}

struct Preferred {
    tag: String,
    inner: Arc<dyn Resolver>,
}

#[async_trait]
impl Resolver for Preferred {
    async fn resolve(&self, name: &str) -> Result<Vec<Endpoint>, ResolveError> {
        let mut endpoints = self.inner.resolve(name).await?;
        // The sort must be stable to preserve the inner resolver's order
        // among preferred and non-preferred entries.
        endpoints.sort_by_key(|endpoint| !endpoint.has_tag(&self.tag));
        Ok(endpoints)
    }
}
