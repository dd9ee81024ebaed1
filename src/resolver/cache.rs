//! Single-flight TTL caching of resolutions.
//!
//! # Design Decisions
//! - At most one in-flight call to the inner resolver per name: the first
//!   caller publishes into a pending entry, late callers block on it
//! - TTL counts from insertion, never from last use
//! - Errors are cached exactly like successes for the same TTL, which keeps
//!   a failing discovery backend from being hammered
//! - Capacity is unbounded; a background sweeper evicts expired entries

use std::collections::hash_map::Entry as TableSlot;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::RwLock as AsyncRwLock;
use tokio::sync::{watch, OwnedRwLockWriteGuard};
use tokio::time::{Duration, Instant, MissedTickBehavior};

use super::{Endpoint, ResolveError, Resolver};
use async_trait::async_trait;

/// Upper bound on entries visited by one sweeper pass, so the exclusive table
/// lock is never held for long when the cache is large. Entries the pass did
/// not reach are picked up by a later one.
const SWEEP_MAX: usize = 100;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

type Resolution = Result<Vec<Endpoint>, ResolveError>;

/// A cache entry is created in a pending state and published exactly once.
/// `expires_at` is fixed at creation; the slot starts out write-locked by the
/// filling task and readers block on it until the fill completes.
struct CacheEntry {
    expires_at: Instant,
    slot: Arc<AsyncRwLock<Option<Resolution>>>,
}

impl CacheEntry {
    fn pending(expires_at: Instant) -> (Arc<Self>, OwnedRwLockWriteGuard<Option<Resolution>>) {
        let slot = Arc::new(AsyncRwLock::new(None));
        let fill = slot
            .clone()
            .try_write_owned()
            .expect("slot lock has no other handles yet");
        (Arc::new(Self { expires_at, slot }), fill)
    }
}

type Table = RwLock<HashMap<String, Arc<CacheEntry>>>;

/// Resolver decorator that caches the endpoints returned by an inner
/// resolver for a fixed amount of time.
pub struct CachedResolver {
    ttl: Duration,
    inner: Arc<dyn Resolver>,
    table: Arc<Table>,
    stop: watch::Sender<()>,
}

impl CachedResolver {
    pub fn new(ttl: Duration, inner: Arc<dyn Resolver>) -> Self {
        let table: Arc<Table> = Arc::new(RwLock::new(HashMap::new()));
        let (stop, stopped) = watch::channel(());

        // The sweeper captures the shared table, not the resolver, so the
        // resolver can be dropped while the task is still parked on its tick.
        tokio::spawn(sweep_loop(table.clone(), stopped));

        Self {
            ttl,
            inner,
            table,
            stop,
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<CacheEntry>> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table.get(name).cloned()
    }

    /// Publish a pending entry under `name`, unless another caller got there
    /// first.
    fn insert(&self, name: &str, entry: Arc<CacheEntry>) -> bool {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        match table.entry(name.to_owned()) {
            TableSlot::Vacant(slot) => {
                slot.insert(entry);
                true
            }
            TableSlot::Occupied(_) => false,
        }
    }

    /// Compare-and-delete: only remove the slot if it still holds the entry
    /// the caller observed, so a freshly inserted replacement survives.
    fn remove(&self, name: &str, entry: &Arc<CacheEntry>) {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = table.get(name) {
            if Arc::ptr_eq(current, entry) {
                table.remove(name);
            }
        }
    }
}

impl Drop for CachedResolver {
    fn drop(&mut self) {
        // Wake the sweeper so it exits now rather than at its next tick.
        let _ = self.stop.send(());
    }
}

#[async_trait]
impl Resolver for CachedResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<Endpoint>, ResolveError> {
        let now = Instant::now();

        loop {
            if let Some(entry) = self.lookup(name) {
                if now <= entry.expires_at {
                    let slot = entry.slot.read().await;
                    if let Some(resolution) = slot.as_ref() {
                        return resolution.clone();
                    }
                    // The filling task was dropped before publishing. Discard
                    // the husk and race for a fresh entry.
                    drop(slot);
                    self.remove(name, &entry);
                    continue;
                }
                self.remove(name, &entry);
            }

            let (entry, mut fill) = CacheEntry::pending(now + self.ttl);
            if !self.insert(name, entry) {
                continue;
            }

            let resolution = self.inner.resolve(name).await;
            *fill = Some(resolution.clone());
            return resolution;
        }
    }
}

async fn sweep_loop(table: Arc<Table>, mut stopped: watch::Receiver<()>) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stopped.changed() => return,
            _ = ticker.tick() => {
                sweep_pass(&table, Instant::now(), SWEEP_MAX);
            }
        }
    }
}

/// One bounded eviction pass. Returns the number of entries visited.
fn sweep_pass(table: &Table, now: Instant, max: usize) -> usize {
    let mut table = table.write().unwrap_or_else(|e| e.into_inner());

    let expired: Vec<String> = table
        .iter()
        .take(max)
        .filter(|(_, entry)| now > entry.expires_at)
        .map(|(name, _)| name.clone())
        .collect();

    let visited = table.len().min(max);

    for name in expired {
        table.remove(&name);
    }

    visited
}
