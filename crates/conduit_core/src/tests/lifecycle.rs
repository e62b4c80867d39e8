use std::collections::HashSet;

use serde_json::json;
use tower::Service;

use super::fixtures::{FailingStorage, input, input_with, minimal_input};
use crate::conduit::{
    api::{ConduitRequest, ConduitResponse, Window},
    core::{
        identifier::CuriConfig,
        policy::{HttpMethod, Status, SuriType},
        validation::ConduitField,
    },
    error::ConduitError,
    init_conduit_engine, init_conduit_engine_with_storage,
};

#[tokio::test]
async fn integration_create_racm_whitelist() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    let Err(ConduitError::Validation(errors)) = conduits
        .call(ConduitRequest::Create { owner: 1, input: input_with(json!({"racm": ["HEAD"]})) })
        .await
    else {
        panic!("Expected ConduitError::Validation");
    };
    assert!(errors.contains(ConduitField::Racm));
    assert_eq!(errors.len(), 1);

    let (id, _) = create!(conduits, 1, input_with(json!({"racm": ["GET", "POST"]})));
    let record = get!(conduits, 1, id);
    assert_eq!(record.fields.racm, [HttpMethod::Get, HttpMethod::Post].into_iter().collect());
}

#[tokio::test]
async fn integration_create_validation_failure_persists_nothing() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    let error = conduits
        .call(ConduitRequest::Create { owner: 1, input: input(json!({"suriType": "airtable"})) })
        .await
        .unwrap_err();
    assert_eq!(error.status_code(), 422);
    assert!(list!(conduits, 1, None).is_empty());

    // Ids are only consumed by successful inserts
    let (id, _) = create!(conduits, 1, minimal_input());
    assert_eq!(id, 1);
}

#[tokio::test]
async fn integration_create_allowlist_entries() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    let error = conduits
        .call(ConduitRequest::Create {
            owner: 1,
            input: input_with(json!({"allowlist": [{"random": "random"}]})),
        })
        .await
        .unwrap_err();
    let ConduitError::Validation(errors) = error else {
        panic!("Expected ConduitError::Validation");
    };
    assert!(errors.contains(ConduitField::Allowlist));

    let (id, _) = create!(
        conduits,
        1,
        input_with(json!({
            "allowlist": [{"address": "123.234.123.234", "status": "inactive", "comment": "x"}]
        }))
    );
    let record = get!(conduits, 1, id);
    assert_eq!(record.fields.allowlist.len(), 1);
    assert_eq!(record.fields.allowlist[0].address, "123.234.123.234");
    assert_eq!(record.fields.allowlist[0].status, Status::Inactive);
}

#[tokio::test]
async fn integration_create_ignores_client_supplied_identity() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    let (id, curi) = create!(
        conduits,
        4,
        input_with(json!({"id": 999, "userId": 1, "curi": "cd-22222222.conduit.run"}))
    );
    assert_eq!(id, 1);
    assert_ne!(curi, "cd-22222222.conduit.run");
    assert_eq!(get!(conduits, 4, id).user_id, 4);
}

#[tokio::test]
async fn integration_curi_format_and_uniqueness_under_concurrency() {
    crate::conduit_tracing::init();
    let config = CuriConfig::default();
    let curi_len = config.curi_len();
    let (conduits, _) = init_conduit_engine(config);

    let creations = (0..200u64).map(|owner| {
        let mut conduits = conduits.clone();
        tokio::spawn(async move {
            conduits.call(ConduitRequest::Create { owner: owner % 5, input: minimal_input() }).await
        })
    });
    let mut ids = HashSet::new();
    let mut curis = HashSet::new();
    for handle in futures::future::join_all(creations).await {
        let ConduitResponse::Created { id, curi } = handle.unwrap().unwrap() else {
            panic!("Expected ConduitResponse::Created");
        };
        assert_eq!(curi.len(), curi_len);
        assert!(conduits.generator().is_well_formed(&curi));
        assert!(ids.insert(id));
        assert!(curis.insert(curi));
    }
    assert_eq!(curis.len(), 200);
}

#[tokio::test]
async fn integration_get_is_owner_scoped() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    let (id, _) = create!(conduits, 1, minimal_input());
    assert_eq!(
        conduits.call(ConduitRequest::Get { owner: 2, id }).await,
        Err(ConduitError::NotFound(id))
    );
    assert_eq!(
        conduits.call(ConduitRequest::Get { owner: 1, id: 42 }).await,
        Err(ConduitError::NotFound(42))
    );
}

#[tokio::test]
async fn integration_list_window_over_many_records() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    for _ in 0..620 {
        create!(conduits, 1, minimal_input());
    }
    // Another owner's conduits never leak into the listing
    create!(conduits, 2, minimal_input());

    let records = list!(conduits, 1, Some(Window::new(520, 10)));
    assert_eq!(records.len(), 10);
    assert!(records.iter().all(|record| (520..530).contains(&record.id)));
    assert_eq!(records.first().map(|r| r.id), Some(520));

    assert_eq!(list!(conduits, 1, None).len(), 620);
    assert_eq!(list!(conduits, 2, None).len(), 1);
    assert!(list!(conduits, 2, Some(Window::new(1, 100))).is_empty());
}

#[tokio::test]
async fn integration_list_active_spans_owners() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    let (a, _) = create!(conduits, 1, input_with(json!({"status": "active"})));
    create!(conduits, 2, minimal_input());
    let (c, _) = create!(conduits, 3, minimal_input());
    set_status!(conduits, 3, c, "active");

    let ConduitResponse::Conduits(active) = conduits.call(ConduitRequest::ListActive).await.unwrap()
    else {
        panic!("Expected ConduitResponse::Conduits");
    };
    assert_eq!(active.iter().map(|r| (r.id, r.user_id)).collect::<Vec<_>>(), vec![(a, 1), (c, 3)]);
}

#[tokio::test]
async fn integration_replace_resets_omitted_fields() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    let (id, curi) = create!(
        conduits,
        1,
        input_with(json!({
            "racm": ["GET"],
            "throttle": false,
            "description": "orders",
            "hiddenFormField": [{"fieldName": "hp", "policy": "drop-if-filled"}],
        }))
    );

    let replacement = input(json!({
        "suriApiKey": "otherKey",
        "suriType": "smartsheet",
        "suri": "https://api.smartsheet.com/2.0/sheets/1",
        "racm": ["PUT"],
    }));
    let ConduitResponse::Conduit(replaced) = conduits
        .call(ConduitRequest::Replace { owner: 1, id, input: replacement })
        .await
        .unwrap()
    else {
        panic!("Expected ConduitResponse::Conduit");
    };
    assert_eq!(replaced.id, id);
    assert_eq!(replaced.curi, curi);
    assert_eq!(replaced.user_id, 1);
    assert_eq!(replaced.fields.suri_type, SuriType::Smartsheet);
    assert_eq!(replaced.fields.racm, [HttpMethod::Put].into_iter().collect());
    assert!(replaced.fields.throttle);
    assert_eq!(replaced.fields.description, None);
    assert!(replaced.fields.hidden_form_field.is_empty());
    assert_eq!(get!(conduits, 1, id), replaced);
}

#[tokio::test]
async fn integration_replace_requires_full_input() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    let (id, _) = create!(conduits, 1, minimal_input());
    let Err(ConduitError::Validation(errors)) = conduits
        .call(ConduitRequest::Replace { owner: 1, id, input: input(json!({"status": "active"})) })
        .await
    else {
        panic!("Expected ConduitError::Validation");
    };
    assert!(errors.contains(ConduitField::Suri));

    assert_eq!(
        conduits.call(ConduitRequest::Replace { owner: 2, id, input: minimal_input() }).await,
        Err(ConduitError::NotFound(id))
    );
}

#[tokio::test]
async fn integration_update_merges_present_fields() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    let (id, curi) = create!(
        conduits,
        1,
        input_with(json!({"racm": ["GET"], "description": "orders", "throttle": false}))
    );
    let ConduitResponse::Conduit(updated) = update!(
        conduits,
        1,
        id,
        json!({"allowlist": [{"address": "10.0.0.0/8", "status": "active"}], "description": null})
    )
    .unwrap() else {
        panic!("Expected ConduitResponse::Conduit");
    };
    assert_eq!(updated.curi, curi);
    assert_eq!(updated.fields.racm, [HttpMethod::Get].into_iter().collect());
    assert!(!updated.fields.throttle);
    assert_eq!(updated.fields.description, None);
    assert_eq!(updated.fields.allowlist.len(), 1);

    let error = update!(conduits, 1, id, json!({"racm": ["OPTIONS"]})).unwrap_err();
    assert_eq!(error.status_code(), 422);
    assert_eq!(get!(conduits, 1, id), updated);

    assert_eq!(
        update!(conduits, 9, id, json!({"status": "active"})),
        Err(ConduitError::NotFound(id))
    );
}

#[tokio::test]
async fn integration_curi_is_write_once() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    let (id, curi) = create!(conduits, 1, minimal_input());

    for value in [json!("anything"), json!(curi.clone()), json!(null)] {
        let error = update!(conduits, 1, id, json!({"curi": value})).unwrap_err();
        assert_eq!(error, ConduitError::ImmutableField("curi"));
        assert_eq!(error.status_code(), 400);

        let error = conduits
            .call(ConduitRequest::Replace {
                owner: 1,
                id,
                input: input_with(json!({"curi": value})),
            })
            .await
            .unwrap_err();
        assert_eq!(error, ConduitError::ImmutableField("curi"));
    }

    // Immutability is checked before existence and validity
    assert_eq!(
        update!(conduits, 1, 404, json!({"curi": "x", "racm": ["HEAD"]})),
        Err(ConduitError::ImmutableField("curi"))
    );
    assert_eq!(get!(conduits, 1, id).curi, curi);
}

#[tokio::test]
async fn integration_delete_state_gate_and_idempotence() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    let (id, _) = create!(conduits, 1, input_with(json!({"status": "active"})));

    let error = delete!(conduits, 1, id).unwrap_err();
    assert_eq!(error, ConduitError::ActiveConduitDeletion(id));
    assert_eq!(error.status_code(), 403);
    assert_eq!(get!(conduits, 1, id).id, id);

    set_status!(conduits, 1, id, "inactive");
    assert_eq!(delete!(conduits, 1, id), Ok(ConduitResponse::Deleted { id }));
    assert_eq!(delete!(conduits, 1, id), Ok(ConduitResponse::Deleted { id }));
    assert_eq!(
        conduits.call(ConduitRequest::Get { owner: 1, id }).await,
        Err(ConduitError::NotFound(id))
    );
}

#[tokio::test]
async fn integration_delete_foreign_conduit_is_noop() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine(CuriConfig::default());

    let (id, _) = create!(conduits, 1, minimal_input());
    assert_eq!(delete!(conduits, 2, id), Ok(ConduitResponse::Deleted { id }));
    assert_eq!(get!(conduits, 1, id).id, id);
}

#[tokio::test]
async fn integration_storage_failure_is_surfaced_generically() {
    crate::conduit_tracing::init();
    let (mut conduits, _) = init_conduit_engine_with_storage(CuriConfig::default(), FailingStorage);

    let error = conduits
        .call(ConduitRequest::Create { owner: 1, input: minimal_input() })
        .await
        .unwrap_err();
    assert!(matches!(error, ConduitError::Storage(_)));
    assert_eq!(error.status_code(), 500);
    assert!(!error.to_string().contains("10.9.8.7"));

    // Validation still runs before storage is reached
    let error = conduits
        .call(ConduitRequest::Create { owner: 1, input: input(json!({})) })
        .await
        .unwrap_err();
    assert_eq!(error.status_code(), 422);
}
