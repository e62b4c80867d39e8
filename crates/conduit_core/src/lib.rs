//! Identity and access-policy engine for conduits.
//!
//! A conduit is a named, policy-gated handle routing requests to a backing
//! third-party service endpoint. This crate mints the public identifier of
//! every conduit (its curi), validates the access policy attached to it and
//! orchestrates the conduit lifecycle against a storage collaborator.
//!
//! The policy record produced here is the contract a reverse-proxy consults
//! on every forwarded request: which HTTP methods are allowed, which client
//! addresses are admitted and which form fields are stripped or passed.
//!
//! Every component is exposed as a [`tower::Service`], so the lifecycle API
//! and the proxy feed can be composed with standard tower layers.
//!
//! [`tower::Service`]: https://docs.rs/tower

#[cfg(test)]
mod tests;

pub mod conduit;
pub mod storage;

pub mod conduit_tracing {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: Once = Once::new();

    /// Initialize tracing for tests
    /// This sets up a tracing subscriber that will display logs during test execution.
    /// Call this at the beginning of tests that need to see tracing output.
    pub fn init() {
        INIT.call_once(|| {
            let filter = EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new("off"))
                .unwrap();

            fmt()
                .with_target(false)
                .with_test_writer()
                .with_env_filter(filter)
                .init();
        });
    }
}
