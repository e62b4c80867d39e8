//! Conduit module.
//!
//! This module mints conduit identifiers, validates the access policy of
//! conduits and orchestrates their lifecycle against a storage collaborator.
//!
//! ## Core Architecture
//!
//! The engine is exposed through two API services:
//!
//! ### Lifecycle API
//! Owner-scoped create, read, replace, update and delete of conduits, used
//! by the HTTP layer. Also serves the privileged listing of active conduits.
//!
//! ### Feed API
//! Read-only routing policy of active conduits keyed by curi, consumed by
//! the forwarding proxy on every request.
//!
//! ## Components
//!
//! - **Identifier Generator**: mints fixed-length curis from a restricted alphabet
//! - **Policy Validator**: checks RACM, allowlist, hidden form fields, status
//!   and throttle against a declared schema
//! - **Storage**: any service speaking the storage API; it must detect curi
//!   collisions atomically with the insert
//!
//! ## Concurrency
//!
//! Services hold no lock and no state beyond the storage collaborator. Each
//! request touches a single record of a single owner, and correctness relies
//! on the storage enforcing curi uniqueness and applying single-row updates
//! and deletes atomically.
//!
//! ## Initialization Helpers
//!
//! - `init_conduit_engine()`: engine over a fresh in-memory storage
//! - `init_conduit_engine_with_storage()`: engine over the given storage service
pub mod api;
pub mod core;
pub mod error;

use crate::{
    conduit::{
        api::{StorageRequest, StorageResponse, feed::FeedApiService, lifecycle::ConduitApiService},
        core::identifier::{CuriConfig, IdentifierGenerator},
        error::ConduitError,
    },
    storage::memory::MemoryStorage,
};

/// Lifecycle API service over the in-memory storage.
pub type ConduitApiDefaultStack = ConduitApiService<MemoryStorage>;

/// Feed API service over the in-memory storage.
pub type FeedApiDefaultStack = FeedApiService<MemoryStorage>;

/// Initialize a conduit engine over a fresh in-memory storage.
///
/// # Returns
/// A tuple containing (lifecycle service, feed service) sharing the same storage
pub fn init_conduit_engine(config: CuriConfig) -> (ConduitApiDefaultStack, FeedApiDefaultStack) {
    init_conduit_engine_with_storage(config, MemoryStorage::default())
}

/// Initialize a conduit engine over the provided storage service.
///
/// Both returned services share one [`IdentifierGenerator`], so the feed
/// recognizes exactly the curis the lifecycle service mints.
///
/// # Type Parameters
/// * `S` - Storage service implementing the storage API
pub fn init_conduit_engine_with_storage<S>(
    config: CuriConfig,
    storage: S,
) -> (ConduitApiService<S>, FeedApiService<S>)
where
    S: tower::Service<StorageRequest, Response = StorageResponse, Error = ConduitError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    let generator = IdentifierGenerator::new(config);
    let feed = FeedApiService::new(generator.clone(), storage.clone());
    let lifecycle = ConduitApiService::new(generator, storage);
    (lifecycle, feed)
}
