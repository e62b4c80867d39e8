
mod lifecycle;

use std::time::Duration;

use fixtures::{input_with, minimal_input};
use serde_json::json;
use tower::{Service, ServiceBuilder, timeout::TimeoutLayer};

use crate::conduit::{
    api::{ConduitRequest, ConduitResponse, FeedRequest, FeedResponse},
    core::{identifier::CuriConfig, policy::Status},
    init_conduit_engine,
};

#[tokio::test]
async fn integration_init_conduit_engine() {
    crate::conduit_tracing::init();
    let (mut conduits, mut feed) = init_conduit_engine(CuriConfig::default());

    let (id, curi) = create!(conduits, 1, input_with(json!({"racm": ["GET", "POST"]})));
    assert_eq!(id, 1);
    assert!(conduits.generator().is_well_formed(&curi));

    // Inactive conduits stay out of the feed
    assert_eq!(
        feed.call(FeedRequest::Route(curi.clone())).await.unwrap(),
        FeedResponse::Route(None)
    );

    set_status!(conduits, 1, id, "active");
    let FeedResponse::Route(Some(route)) =
        feed.call(FeedRequest::Route(curi.clone())).await.unwrap()
    else {
        panic!("Expected FeedResponse::Route(Some(_))");
    };
    assert_eq!(route.curi, curi);
    assert_eq!(route.status, Status::Active);
    assert!(route.permits("POST"));
    assert!(!route.permits("DELETE"));
}

#[tokio::test]
async fn integration_default_values_on_read() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    let (id, curi) = create!(conduits, 7, minimal_input());
    let record = get!(conduits, 7, id);

    assert_eq!(record.id, id);
    assert_eq!(record.curi, curi);
    assert_eq!(record.user_id, 7);
    assert_eq!(record.fields.status, Status::Inactive);
    assert!(record.fields.throttle);
    assert!(record.fields.racm.is_empty());
    assert!(record.fields.allowlist.is_empty());
    assert!(record.fields.hidden_form_field.is_empty());
    assert_eq!(record.fields.description, None);
}

#[tokio::test]
async fn integration_engine_behind_timeout_layer() {
    crate::conduit_tracing::init();
    let (conduits, _) = init_conduit_engine(CuriConfig::default());
    let mut conduits = ServiceBuilder::new()
        .layer(TimeoutLayer::new(Duration::from_millis(100)))
        .service(conduits);

    let response = conduits
        .call(ConduitRequest::Create { owner: 1, input: minimal_input() })
        .await
        .unwrap();
    assert!(matches!(response, ConduitResponse::Created { id: 1, .. }));

    // Timeout layer boxes errors, the conduit error is still reachable
    let error = conduits.call(ConduitRequest::Get { owner: 2, id: 1 }).await.unwrap_err();
    assert_eq!(error.to_string(), "Conduit error, conduit not found (id: 1)");
}
