//! Conduit lifecycle API service implementation.
//!
//! This module provides the service handling owner-scoped conduit requests
//! coming from the HTTP layer.
//!
//! ## Service Architecture
//!
//! The `ConduitApiService` coordinates three components:
//! - **Identifier Generator**: mints the curi of new conduits
//! - **Policy Validator**: checks every mutating request before storage is touched
//! - **Storage Service**: persists records and enforces curi uniqueness
//!
//! ## Curi Collisions
//!
//! Collisions are not pre-checked: the storage reports them from the insert
//! itself.
//! A colliding curi is replaced by a freshly minted one exactly once. A second
//! collision is treated as a systemic fault of the identifier space and fails
//! the creation with [`ConduitError::CollisionExhausted`].
//!
//! ## Concurrent Writes
//!
//! Replace and update are read-modify-write cycles closed by a conditional
//! storage write. When another write lands in between, the change is
//! re-applied on a fresh read; persistent contention fails with
//! [`ConduitError::ConcurrentModification`].
//!
//! ## Deletion
//!
//! Only inactive conduits can be deleted. Deleting a conduit that is already
//! gone succeeds. A deletion or update reported to affect more than one row
//! means id uniqueness is broken and aborts the process.

use std::{future::Future, pin::Pin, task::Poll};

use tower::Service;
#[cfg(feature = "conduit_tracing")]
use tracing::info;
use tracing::{error, warn};

use crate::conduit::{
    api::types::{ConduitRequest, ConduitResponse, StorageRequest, StorageResponse, Window},
    core::{
        identifier::IdentifierGenerator,
        record::{ConduitFields, ConduitId, ConduitRecord, NewConduit, OwnerId},
        validation::{ConduitInput, PolicyValidator},
    },
    error::ConduitError,
};

/// Number of replacement curis minted after a collision.
pub const MAX_CURI_RETRIES: usize = 1;

/// Number of fresh read-modify-write attempts after a stale write.
pub const MAX_WRITE_RETRIES: usize = 3;

/// Conduit lifecycle API Service
///
/// Handles create, read, replace, update and delete requests on behalf of a
/// conduit owner, plus the privileged listing of active conduits.
#[derive(Debug, Clone)]
pub struct ConduitApiService<S> {
    /// Mints curis for new conduits
    generator: IdentifierGenerator,
    /// Validates policy-bearing fields
    validator: PolicyValidator,
    /// Storage collaborator
    storage: S,
}

impl<S> ConduitApiService<S> {
    /// Creates a new lifecycle service over the provided storage service
    pub fn new(generator: IdentifierGenerator, storage: S) -> Self {
        Self { generator, validator: PolicyValidator, storage }
    }

    pub fn generator(&self) -> &IdentifierGenerator {
        &self.generator
    }
}

impl<S> ConduitApiService<S>
where
    S: Service<StorageRequest, Response = StorageResponse, Error = ConduitError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    /// Forwards a request to storage, logging the detail of storage failures
    /// that callers only see as a generic error.
    async fn call_storage(
        &mut self,
        request: StorageRequest,
    ) -> Result<StorageResponse, ConduitError> {
        self.storage.call(request).await.inspect_err(|e| {
            if let ConduitError::Storage(detail) = e {
                error!("[conduit] Storage failure: {}", detail);
            }
        })
    }

    async fn create(
        &mut self,
        owner: OwnerId,
        input: ConduitInput,
    ) -> Result<ConduitResponse, ConduitError> {
        let draft = self.validator.validate_create(&input)?;
        let fields = ConduitFields::from_draft(draft)?;

        let mut retries = 0;
        loop {
            let curi = self.generator.mint();
            let new = NewConduit { curi: curi.clone(), user_id: owner, fields: fields.clone() };
            match self.call_storage(StorageRequest::Insert(new)).await? {
                StorageResponse::Inserted(id) => {
                    #[cfg(feature = "conduit_tracing")]
                    info!("[conduit] Create: owner: {}, id: {}, curi: {}", owner, id, curi);
                    return Ok(ConduitResponse::Created { id, curi });
                }
                StorageResponse::CuriCollision if retries < MAX_CURI_RETRIES => {
                    warn!("[conduit] Create: curi collision on {}, minting a replacement", curi);
                    retries += 1;
                }
                StorageResponse::CuriCollision => {
                    error!(
                        "[conduit] Create: curi collision on {} after {} retries, \
                         identifier space is compromised",
                        curi, retries
                    );
                    return Err(ConduitError::CollisionExhausted);
                }
                _ => return Err(ConduitError::InternalConduitError),
            }
        }
    }

    async fn fetch(
        &mut self,
        owner: OwnerId,
        id: ConduitId,
    ) -> Result<ConduitRecord, ConduitError> {
        match self.call_storage(StorageRequest::Fetch { owner, id }).await? {
            StorageResponse::Record(Some(record)) => Ok(record),
            StorageResponse::Record(None) => Err(ConduitError::NotFound(id)),
            _ => Err(ConduitError::InternalConduitError),
        }
    }

    async fn list(
        &mut self,
        owner: OwnerId,
        window: Option<Window>,
    ) -> Result<ConduitResponse, ConduitError> {
        match self.call_storage(StorageRequest::ListOwned { owner, window }).await? {
            StorageResponse::Records(records) => Ok(ConduitResponse::Conduits(records)),
            _ => Err(ConduitError::InternalConduitError),
        }
    }

    async fn list_active(&mut self) -> Result<ConduitResponse, ConduitError> {
        match self.call_storage(StorageRequest::ListActive).await? {
            StorageResponse::Records(records) => Ok(ConduitResponse::Conduits(records)),
            _ => Err(ConduitError::InternalConduitError),
        }
    }

    async fn replace(
        &mut self,
        owner: OwnerId,
        id: ConduitId,
        input: ConduitInput,
    ) -> Result<ConduitResponse, ConduitError> {
        self.validator.validate_immutable_fields(&input)?;
        let fields = ConduitFields::from_draft(self.validator.validate_create(&input)?)?;
        self.modify(owner, id, |record| record.fields = fields.clone()).await
    }

    async fn update(
        &mut self,
        owner: OwnerId,
        id: ConduitId,
        patch: ConduitInput,
    ) -> Result<ConduitResponse, ConduitError> {
        self.validator.validate_immutable_fields(&patch)?;
        let draft = self.validator.validate_patch(&patch)?;
        self.modify(owner, id, |record| record.fields.merge(draft.clone())).await
    }

    /// Reads the record, applies `change` and writes it back only if the
    /// stored row is still the one read. A stale write starts over from a
    /// fresh read, at most [`MAX_WRITE_RETRIES`] times.
    async fn modify(
        &mut self,
        owner: OwnerId,
        id: ConduitId,
        change: impl Fn(&mut ConduitRecord) + Send,
    ) -> Result<ConduitResponse, ConduitError> {
        let mut retries = 0;
        loop {
            let expected = self.fetch(owner, id).await?;
            let mut record = expected.clone();
            change(&mut record);
            let request = StorageRequest::Update { expected, record: record.clone() };
            match self.call_storage(request).await? {
                StorageResponse::Updated(1) => return Ok(ConduitResponse::Conduit(record)),
                // Removed between fetch and update
                StorageResponse::Updated(0) => return Err(ConduitError::NotFound(id)),
                StorageResponse::Updated(rows) => {
                    error!("[conduit] Update: {} rows share id {}, aborting", rows, id);
                    std::process::abort();
                }
                StorageResponse::StaleWrite if retries < MAX_WRITE_RETRIES => {
                    warn!("[conduit] Update: id {} changed since read, retrying", id);
                    retries += 1;
                }
                StorageResponse::StaleWrite => {
                    warn!("[conduit] Update: id {} still contended after {} retries", id, retries);
                    return Err(ConduitError::ConcurrentModification(id));
                }
                _ => return Err(ConduitError::InternalConduitError),
            }
        }
    }

    async fn delete(
        &mut self,
        owner: OwnerId,
        id: ConduitId,
    ) -> Result<ConduitResponse, ConduitError> {
        match self.call_storage(StorageRequest::Delete { owner, id }).await? {
            StorageResponse::Deleted(0 | 1) => Ok(ConduitResponse::Deleted { id }),
            StorageResponse::Deleted(rows) => {
                error!("[conduit] Delete: {} rows share id {}, aborting", rows, id);
                std::process::abort();
            }
            StorageResponse::DeleteRefusedActive => Err(ConduitError::ActiveConduitDeletion(id)),
            _ => Err(ConduitError::InternalConduitError),
        }
    }
}

impl<S> Service<ConduitRequest> for ConduitApiService<S>
where
    S: Service<StorageRequest, Response = StorageResponse, Error = ConduitError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = ConduitResponse;
    type Error = ConduitError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ConduitRequest) -> Self::Future {
        let mut this = self.clone();
        Box::pin(async move {
            match request {
                ConduitRequest::Create { owner, input } => this.create(owner, input).await,
                ConduitRequest::Get { owner, id } => {
                    #[cfg(feature = "conduit_tracing")]
                    info!("[conduit] Get: owner: {}, id: {}", owner, id);
                    this.fetch(owner, id).await.map(ConduitResponse::Conduit)
                }
                ConduitRequest::List { owner, window } => {
                    #[cfg(feature = "conduit_tracing")]
                    info!("[conduit] List: owner: {}, window: {:?}", owner, window);
                    this.list(owner, window).await
                }
                ConduitRequest::ListActive => {
                    #[cfg(feature = "conduit_tracing")]
                    info!("[conduit] ListActive");
                    this.list_active().await
                }
                ConduitRequest::Replace { owner, id, input } => {
                    #[cfg(feature = "conduit_tracing")]
                    info!("[conduit] Replace: owner: {}, id: {}", owner, id);
                    this.replace(owner, id, input).await
                }
                ConduitRequest::Update { owner, id, patch } => {
                    #[cfg(feature = "conduit_tracing")]
                    info!(
                        "[conduit] Update: owner: {}, id: {}, fields: {:?}",
                        owner,
                        id,
                        patch.keys().collect::<Vec<_>>()
                    );
                    this.update(owner, id, patch).await
                }
                ConduitRequest::Delete { owner, id } => {
                    #[cfg(feature = "conduit_tracing")]
                    info!("[conduit] Delete: owner: {}, id: {}", owner, id);
                    this.delete(owner, id).await
                }
            }
        })
    }
}
