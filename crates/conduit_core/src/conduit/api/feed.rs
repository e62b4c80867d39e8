//! Proxy feed API service implementation.
//!
//! Exposes the routing policy of conduits to the forwarding proxy: curi,
//! allowlist, permitted methods, hidden form field rules, throttle flag and
//! status. Only active conduits are ever surfaced; an inactive conduit is
//! indistinguishable from an unknown curi.

use std::{collections::BTreeMap, future::Future, pin::Pin, task::Poll};

use tower::Service;
#[cfg(feature = "conduit_tracing")]
use tracing::info;

use crate::conduit::{
    api::types::{FeedRequest, FeedResponse, StorageRequest, StorageResponse},
    core::{identifier::IdentifierGenerator, record::ProxyRoute},
    error::ConduitError,
};

/// Proxy feed API Service
///
/// Read-only view over the storage service. Malformed curis are answered
/// without a storage round trip.
#[derive(Debug, Clone)]
pub struct FeedApiService<S> {
    /// Used to recognize well-formed curis
    generator: IdentifierGenerator,
    /// Storage collaborator
    storage: S,
}

impl<S> FeedApiService<S> {
    pub fn new(generator: IdentifierGenerator, storage: S) -> Self {
        Self { generator, storage }
    }
}

impl<S> Service<FeedRequest> for FeedApiService<S>
where
    S: Service<StorageRequest, Response = StorageResponse, Error = ConduitError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = FeedResponse;
    type Error = ConduitError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: FeedRequest) -> Self::Future {
        let mut storage = self.storage.clone();
        let generator = self.generator.clone();
        Box::pin(async move {
            match request {
                FeedRequest::ActiveRoutes => {
                    match storage.call(StorageRequest::ListActive).await? {
                        StorageResponse::Records(records) => {
                            #[cfg(feature = "conduit_tracing")]
                            info!("[feed] ActiveRoutes: {} routes", records.len());
                            let routes: BTreeMap<String, ProxyRoute> = records
                                .iter()
                                .map(|record| (record.curi.clone(), record.route()))
                                .collect();
                            Ok(FeedResponse::Routes(routes))
                        }
                        _ => Err(ConduitError::InternalConduitError),
                    }
                }
                FeedRequest::Route(curi) => {
                    #[cfg(feature = "conduit_tracing")]
                    info!("[feed] Route: {}", curi);
                    if !generator.is_well_formed(&curi) {
                        return Ok(FeedResponse::Route(None));
                    }
                    match storage.call(StorageRequest::FetchByCuri(curi)).await? {
                        StorageResponse::Record(record) => Ok(FeedResponse::Route(
                            record.filter(|record| record.is_active()).map(|record| record.route()),
                        )),
                        _ => Err(ConduitError::InternalConduitError),
                    }
                }
            }
        })
    }
}
