//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → shutdown.rs marks the engine stopped
//!
//! Shutdown (shutdown.rs):
//!     stop() → new requests get 503 → wait_drained() → listener closes
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
