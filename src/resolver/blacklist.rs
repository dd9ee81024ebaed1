//! Time-windowed quarantine of failing endpoint addresses.
//!
//! The blacklist is shaped like the cache: a shared table, a bounded
//! background sweeper, and a resolver decorator in front of it. It is fed by
//! the forwarding engine whenever a connection to an endpoint fails.

use std::collections::hash_map::Entry as TableSlot;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tokio::time::{Duration, Instant, MissedTickBehavior};

use super::{Endpoint, ResolveError, Resolver};
use async_trait::async_trait;

const SWEEP_MAX: usize = 100;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

type Table = RwLock<HashMap<String, Instant>>;

/// Resolver decorator that filters quarantined addresses out of the inner
/// resolver's results.
pub struct Blacklist {
    timeout: Duration,
    inner: Arc<dyn Resolver>,
    table: Arc<Table>,
    stop: watch::Sender<()>,
}

impl Blacklist {
    pub fn new(timeout: Duration, inner: Arc<dyn Resolver>) -> Self {
        let table: Arc<Table> = Arc::new(RwLock::new(HashMap::new()));
        let (stop, stopped) = watch::channel(());

        tokio::spawn(sweep_loop(table.clone(), stopped));

        Self {
            timeout,
            inner,
            table,
            stop,
        }
    }

    /// Quarantine `address` for at least the configured timeout counted from
    /// now. An unexpired quarantine is never shortened by a later add.
    pub fn add(&self, address: &str) {
        let now = Instant::now();
        let limit = now + self.timeout;

        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        match table.entry(address.to_owned()) {
            TableSlot::Vacant(slot) => {
                slot.insert(limit);
            }
            TableSlot::Occupied(mut slot) => {
                if limit > *slot.get() {
                    slot.insert(limit);
                }
            }
        }
    }

    /// Whether `address` is currently quarantined.
    pub fn contains(&self, address: &str) -> bool {
        let now = Instant::now();
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table.get(address).is_some_and(|expires_at| now <= *expires_at)
    }
}

impl Drop for Blacklist {
    fn drop(&mut self) {
        let _ = self.stop.send(());
    }
}

#[async_trait]
impl Resolver for Blacklist {
    async fn resolve(&self, name: &str) -> Result<Vec<Endpoint>, ResolveError> {
        let mut endpoints = self.inner.resolve(name).await?;

        let now = Instant::now();
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());

        // Survivors keep their relative order.
        endpoints.retain(|endpoint| match table.get(&endpoint.address()) {
            Some(expires_at) => now > *expires_at,
            None => true,
        });

        Ok(endpoints)
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
        .filter(|(_, expires_at)| now > **expires_at)
        .map(|(address, _)| address.clone())
        .collect();

    let visited = table.len().min(max);

    for address in expired {
        table.remove(&address);
    }

    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticList;

    fn endpoints() -> Vec<Endpoint> {
        vec![
            Endpoint::new("host-1", 1000),
            Endpoint::new("host-2", 2000),
            Endpoint::new("host-3", 3000),
        ]
    }

    fn blacklist_over(endpoints: Vec<Endpoint>) -> Blacklist {
        Blacklist::new(Duration::from_secs(1), Arc::new(StaticList(endpoints)))
    }

    #[tokio::test]
    async fn filters_quarantined_addresses_in_order() {
        struct Case {
            quarantined: &'static [&'static str],
            expect: &'static [&'static str],
        }

        let cases = [
            Case {
                quarantined: &[],
                expect: &["host-1:1000", "host-2:2000", "host-3:3000"],
            },
            Case {
                quarantined: &["?"],
                expect: &["host-1:1000", "host-2:2000", "host-3:3000"],
            },
            Case {
                quarantined: &["host-1:1000"],
                expect: &["host-2:2000", "host-3:3000"],
            },
            Case {
                quarantined: &["host-2:2000"],
                expect: &["host-1:1000", "host-3:3000"],
            },
            Case {
                quarantined: &["host-3:3000"],
                expect: &["host-1:1000", "host-2:2000"],
            },
            Case {
                quarantined: &["host-1:1000", "host-2:2000"],
                expect: &["host-3:3000"],
            },
            Case {
                quarantined: &["host-1:1000", "host-2:2000", "host-3:3000"],
                expect: &[],
            },
        ];

        for case in cases {
            let blacklist = blacklist_over(endpoints());
            for address in case.quarantined {
                blacklist.add(address);
            }

            let resolved = blacklist.resolve("anything").await.unwrap();
            let addresses: Vec<String> = resolved.iter().map(Endpoint::address).collect();
            assert_eq!(addresses, case.expect, "quarantined {:?}", case.quarantined);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quarantine_expires_after_timeout() {
        let blacklist = blacklist_over(endpoints());
        blacklist.add("host-1:1000");

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(blacklist.contains("host-1:1000"));
        let resolved = blacklist.resolve("anything").await.unwrap();
        assert_eq!(resolved.len(), 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!blacklist.contains("host-1:1000"));
        let resolved = blacklist.resolve("anything").await.unwrap();
        assert_eq!(resolved.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_add_extends_the_quarantine() {
        let blacklist = blacklist_over(endpoints());

        blacklist.add("host-1:1000");
        tokio::time::sleep(Duration::from_millis(600)).await;
        blacklist.add("host-1:1000");

        // Past the first deadline, within the extended one.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(blacklist.contains("host-1:1000"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!blacklist.contains("host-1:1000"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_pass_is_bounded() {
        let table: Table = RwLock::new(HashMap::new());
        let now = Instant::now();

        {
            let mut table = table.write().unwrap();
            for i in 0..150 {
                table.insert(format!("host-{i}:80"), now - Duration::from_secs(1));
            }
        }

        let visited = sweep_pass(&table, now, SWEEP_MAX);
        assert_eq!(visited, SWEEP_MAX);
        assert!(table.read().unwrap().len() >= 50);
    }
}
