//! In-memory storage service.
//!
//! Records live in a concurrent map keyed by id, next to a unique index from
//! curi to id. An insert claims its curi through the index entry API, so of
//! two concurrent inserts with the same curi exactly one succeeds and the
//! other observes a collision.
use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::Poll,
};

use dashmap::{DashMap, Entry};
use tower::Service;
#[cfg(feature = "conduit_tracing")]
use tracing::{debug, info};

use crate::conduit::{
    api::types::{StorageRequest, StorageResponse, Window},
    core::record::{ConduitId, ConduitRecord, NewConduit, OwnerId},
    error::ConduitError,
};

/// In-memory storage for conduit records
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    /// Last assigned id, ids start at 1
    last_id: Arc<AtomicU64>,
    records: Arc<DashMap<ConduitId, ConduitRecord>>,
    /// Unique index on curi
    curis: Arc<DashMap<String, ConduitId>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn insert(&self, new: NewConduit) -> StorageResponse {
        // Lock order: curi index first, records second. No other path nests them.
        match self.curis.entry(new.curi.clone()) {
            Entry::Occupied(_) => StorageResponse::CuriCollision,
            Entry::Vacant(slot) => {
                let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
                self.records.insert(id, ConduitRecord::from_new(id, new));
                slot.insert(id);
                StorageResponse::Inserted(id)
            }
        }
    }

    fn fetch(&self, owner: OwnerId, id: ConduitId) -> Option<ConduitRecord> {
        self.records.get(&id).filter(|record| record.user_id == owner).map(|record| record.clone())
    }

    fn fetch_by_curi(&self, curi: &str) -> Option<ConduitRecord> {
        let id = *self.curis.get(curi)?;
        self.records.get(&id).map(|record| record.clone())
    }

    fn list(&self, predicate: impl Fn(&ConduitRecord) -> bool) -> Vec<ConduitRecord> {
        let mut records: Vec<ConduitRecord> = self
            .records
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.id);
        records
    }

    fn list_owned(&self, owner: OwnerId, window: Option<Window>) -> Vec<ConduitRecord> {
        self.list(|record| {
            record.user_id == owner && window.is_none_or(|window| window.contains(record.id))
        })
    }

    /// Compare-and-swap of a single row, under the row's shard lock.
    fn update(&self, expected: &ConduitRecord, record: ConduitRecord) -> StorageResponse {
        match self.records.get_mut(&record.id) {
            Some(mut stored) if stored.user_id == record.user_id && stored.curi == record.curi => {
                if *stored != *expected {
                    return StorageResponse::StaleWrite;
                }
                *stored = record;
                StorageResponse::Updated(1)
            }
            _ => StorageResponse::Updated(0),
        }
    }

    fn delete(&self, owner: OwnerId, id: ConduitId) -> StorageResponse {
        if let Some((_, removed)) =
            self.records.remove_if(&id, |_, record| record.user_id == owner && !record.is_active())
        {
            self.curis.remove(&removed.curi);
            return StorageResponse::Deleted(1);
        }
        match self.records.get(&id) {
            Some(record) if record.user_id == owner && record.is_active() => {
                StorageResponse::DeleteRefusedActive
            }
            _ => StorageResponse::Deleted(0),
        }
    }
}

impl Service<StorageRequest> for MemoryStorage {
    type Response = StorageResponse;
    type Error = ConduitError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: StorageRequest) -> Self::Future {
        let this = self.clone();
        Box::pin(async move {
            Ok(match request {
                StorageRequest::Insert(new) => {
                    #[cfg(feature = "conduit_tracing")]
                    info!("[storage] Insert: owner: {}, curi: {}", new.user_id, new.curi);
                    this.insert(new)
                }
                StorageRequest::Fetch { owner, id } => {
                    #[cfg(feature = "conduit_tracing")]
                    debug!("[storage] Fetch: owner: {}, id: {}", owner, id);
                    StorageResponse::Record(this.fetch(owner, id))
                }
                StorageRequest::FetchByCuri(curi) => {
                    #[cfg(feature = "conduit_tracing")]
                    debug!("[storage] FetchByCuri: {}", curi);
                    StorageResponse::Record(this.fetch_by_curi(&curi))
                }
                StorageRequest::ListOwned { owner, window } => {
                    StorageResponse::Records(this.list_owned(owner, window))
                }
                StorageRequest::ListActive => {
                    StorageResponse::Records(this.list(|record| record.is_active()))
                }
                StorageRequest::Update { expected, record } => {
                    #[cfg(feature = "conduit_tracing")]
                    info!("[storage] Update: id: {}", record.id);
                    this.update(&expected, record)
                }
                StorageRequest::Delete { owner, id } => {
                    #[cfg(feature = "conduit_tracing")]
                    info!("[storage] Delete: owner: {}, id: {}", owner, id);
                    this.delete(owner, id)
                }
            })
        })
    }
}
