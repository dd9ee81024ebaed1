//! Random reordering for load spread.

use std::sync::Arc;

use rand::seq::SliceRandom;

use super::{Endpoint, ResolveError, Resolver};
use async_trait::async_trait;

/// Resolver decorator that returns the inner results in uniformly random
/// order, giving a basic form of load balancing between endpoints.
pub struct Shuffled {
    inner: Arc<dyn Resolver>,
}

impl Shuffled {
    pub fn new(inner: Arc<dyn Resolver>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Resolver for Shuffled {
    async fn resolve(&self, name: &str) -> Result<Vec<Endpoint>, ResolveError> {
        let mut endpoints = self.inner.resolve(name).await?;
        endpoints.shuffle(&mut rand::thread_rng());
        Ok(endpoints)
    }
}
