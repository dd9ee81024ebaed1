//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, connect info)
//!     → proxy::engine (route, forward, retry)
//!     → response streamed back to the client
//! ```

pub mod server;

pub use server::HttpServer;
