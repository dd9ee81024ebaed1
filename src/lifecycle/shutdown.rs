//! Shutdown coordination for the proxy.
//!
//! # Design Decisions
//! - A stopped engine refuses new requests but lets in-flight ones finish
//! - The drain waiter completes only once the in-flight count reaches zero
//! - The stopped flag is a plain atomic so the request path never blocks on it

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Coordinator between the request path and the shutdown sequence.
pub struct Shutdown {
    stopped: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Account for one request entering the engine. The request is counted
    /// until the returned guard drops, whatever exit path it takes.
    pub fn enter(self: Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard { shutdown: self }
    }

    /// Mark the engine stopped. New requests are refused from here on.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Wait until every in-flight request has returned. Call after [`stop`],
    /// otherwise new entries can keep the count from settling.
    ///
    /// [`stop`]: Shutdown::stop
    pub async fn wait_drained(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            // Register before re-checking the count, so a decrement landing
            // in between still wakes us.
            drained.as_mut().enable();

            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            drained.await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for the in-flight request count.
pub struct InFlightGuard {
    shutdown: Arc<Shutdown>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.shutdown.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shutdown.drained.notify_waiters();
        }
    }
}
