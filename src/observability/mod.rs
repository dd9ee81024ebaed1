//! Observability subsystem.
//!
//! Structured logging via the tracing crate; every request outcome carries
//! `status`, `reason` and `host` fields, failures add `address` and the
//! wrapped error.

pub mod logging;
