//! External-facing APIs of the conduit engine.
//!
//! - **Lifecycle**: owner-scoped create, read, replace, update and delete of
//!   conduits, plus the privileged listing of active conduits
//! - **Feed**: read-only routing policy of active conduits, keyed by curi,
//!   consumed by the forwarding proxy

pub mod feed;
pub mod lifecycle;
pub mod types;

// Re-export all types for convenience
pub use types::*;
