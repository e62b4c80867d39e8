//! Conduit API type definitions.
//!
//! This module defines the request and response types exchanged by the
//! services of the conduit engine.
//!
//! ## Lifecycle API
//! Used by the HTTP layer on behalf of an authenticated owner to create,
//! read, replace, update and delete conduits. Every request except
//! `ListActive` is scoped to the owner it carries.
//!
//! ## Feed API
//! Used by the forwarding proxy to load the routing policy of active
//! conduits.
//!
//! ## Storage API
//! Contract between the lifecycle service and its storage collaborator.
//! Any backend able to enforce a unique constraint on the curi and to apply
//! single-row updates and deletes atomically can implement it.

use std::collections::BTreeMap;

use crate::conduit::core::{
    record::{ConduitId, ConduitRecord, NewConduit, OwnerId, ProxyRoute},
    validation::ConduitInput,
};

/// Id range used to page through an owner's conduits.
///
/// Selects conduits whose id falls in `[start, start + count)`. Ids are
/// opaque but monotonic, so this is a range filter and not a cursor: gaps
/// left by deleted conduits make a window return fewer than `count` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: ConduitId,
    pub count: u64,
}

impl Window {
    pub fn new(start: ConduitId, count: u64) -> Self {
        Self { start, count }
    }

    pub fn contains(&self, id: ConduitId) -> bool {
        id >= self.start && id - self.start < self.count
    }
}

/// Lifecycle API request types.
#[derive(Debug, Clone)]
pub enum ConduitRequest {
    /// Create a conduit for `owner`.
    ///
    /// The input is validated before any curi is minted; nothing is persisted
    /// when validation fails.
    Create {
        /// Authenticated owner of the new conduit
        owner: OwnerId,
        /// Raw input fields
        input: ConduitInput,
    },

    /// Read one conduit. Unknown and foreign conduits are both reported as not found.
    Get { owner: OwnerId, id: ConduitId },

    /// List the conduits of `owner`, optionally restricted to an id window.
    List { owner: OwnerId, window: Option<Window> },

    /// List every active conduit regardless of owner.
    ///
    /// Privileged: reserved to service callers such as the forwarding proxy.
    ListActive,

    /// Overwrite every mutable field.
    ///
    /// Fields omitted from `input` revert to their defaults. `id`, `curi`
    /// and ownership are preserved.
    Replace {
        owner: OwnerId,
        id: ConduitId,
        /// Raw input fields, validated as for creation
        input: ConduitInput,
    },

    /// Merge the provided fields onto the stored conduit.
    ///
    /// Omitted fields are left untouched.
    Update {
        owner: OwnerId,
        id: ConduitId,
        /// Raw patch fields
        patch: ConduitInput,
    },

    /// Delete an inactive conduit.
    ///
    /// Idempotent: deleting a conduit that is already gone succeeds.
    Delete { owner: OwnerId, id: ConduitId },
}

/// Lifecycle API response types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConduitResponse {
    /// Identity of a newly created conduit. Other fields are not echoed.
    Created { id: ConduitId, curi: String },

    /// A single conduit, returned by `Get`, `Replace` and `Update`.
    Conduit(ConduitRecord),

    /// Conduits ordered by id, returned by `List` and `ListActive`.
    Conduits(Vec<ConduitRecord>),

    /// Acknowledgment of a deletion.
    Deleted { id: ConduitId },
}

/// Feed API request types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedRequest {
    /// Routing table of every active conduit.
    ActiveRoutes,

    /// Routing policy of one conduit, if it exists and is active.
    Route(String),
}

/// Feed API response types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedResponse {
    /// Active routes keyed by curi.
    Routes(BTreeMap<String, ProxyRoute>),

    /// Route lookup result.
    Route(Option<ProxyRoute>),
}

/// Storage API request types.
#[derive(Debug, Clone)]
pub enum StorageRequest {
    /// Persist a new conduit and assign its id.
    ///
    /// Must fail with [`StorageResponse::CuriCollision`] when the curi is
    /// already taken, atomically with the insertion.
    Insert(NewConduit),

    /// Fetch a conduit owned by `owner`.
    Fetch { owner: OwnerId, id: ConduitId },

    /// Fetch a conduit by curi, regardless of owner.
    FetchByCuri(String),

    /// Conduits of `owner`, ordered by id, optionally restricted to a window.
    ListOwned { owner: OwnerId, window: Option<Window> },

    /// Active conduits of every owner, ordered by id.
    ListActive,

    /// Overwrite the row matching the record's id, owner and curi.
    ///
    /// The write is conditional: it must be applied atomically only if the
    /// stored row still equals `expected`, and answered with
    /// [`StorageResponse::StaleWrite`] otherwise.
    Update { expected: ConduitRecord, record: ConduitRecord },

    /// Remove the row `id` if it is owned by `owner` and inactive.
    Delete { owner: OwnerId, id: ConduitId },
}

/// Storage API response types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageResponse {
    /// Conduit persisted under this id.
    Inserted(ConduitId),

    /// The curi of an `Insert` is already taken. Nothing was written.
    CuriCollision,

    /// Single fetch result.
    Record(Option<ConduitRecord>),

    /// Listing result.
    Records(Vec<ConduitRecord>),

    /// Number of rows overwritten by an `Update`.
    Updated(usize),

    /// The row targeted by an `Update` changed since it was read. Nothing
    /// was written.
    StaleWrite,

    /// Number of rows removed by a `Delete`.
    Deleted(usize),

    /// The row targeted by a `Delete` is active and was kept.
    DeleteRefusedActive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_window_contains_half_open_range() {
        let window = Window::new(520, 10);
        assert!(!window.contains(519));
        assert!(window.contains(520));
        assert!(window.contains(529));
        assert!(!window.contains(530));
        assert!(!Window::new(5, 0).contains(5));
        assert!(Window::new(1, u64::MAX).contains(u64::MAX));
    }
}
