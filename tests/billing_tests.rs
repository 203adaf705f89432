//! Exactly-once billing under duplicate and concurrent invocations.

mod common;

use common::*;
use voicebridge_gateway::core::billing::BillingRecorder;
use voicebridge_gateway::core::pricing;
use voicebridge_gateway::core::types::ProviderId;
use voicebridge_gateway::storage::calls::NewProviderCall;
use voicebridge_gateway::storage::models::{CallStatus, ProviderCall, Session};
use voicebridge_gateway::Database;

async fn fixture(db: &Database) -> (Session, ProviderCall) {
    let tenant = create_tenant(db).await;
    let agent = create_agent(db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(db, &tenant, &agent).await;
    let call = db
        .insert_provider_call(NewProviderCall {
            session_id: session.id.clone(),
            correlation_id: "corr-1".to_string(),
            provider: ProviderId::VendorA,
            is_fallback: false,
            tokens_in: 1200,
            tokens_out: 400,
            latency_ms: 80,
            status: CallStatus::Success,
            error_code: None,
            error_message: None,
            attempt_number: 1,
        })
        .await
        .unwrap();
    (session, call)
}

#[tokio::test]
async fn billing_creates_one_event_with_snapshot_pricing() {
    let db = test_db().await;
    let (session, call) = fixture(&db).await;
    let recorder = BillingRecorder::new(db.clone());

    let event = recorder.record(&call, &session).await.unwrap().unwrap();
    assert_eq!(event.provider_call_id, call.id);
    assert_eq!(event.total_tokens, 1600);
    assert_eq!(
        event.cost_cents,
        pricing::cost_cents(ProviderId::VendorA, 1200, 400)
    );

    // The persisted snapshot reproduces the cost independently
    let snapshot: pricing::PricingSnapshot =
        serde_json::from_str(&event.pricing_snapshot).unwrap();
    assert_eq!(
        pricing::cost_cents_with(&snapshot, 1200, 400),
        event.cost_cents
    );
}

#[tokio::test]
async fn second_invocation_is_a_silent_no_op() {
    let db = test_db().await;
    let (session, call) = fixture(&db).await;
    let recorder = BillingRecorder::new(db.clone());

    assert!(recorder.record(&call, &session).await.unwrap().is_some());
    assert!(recorder.record(&call, &session).await.unwrap().is_none());
    assert!(recorder.record(&call, &session).await.unwrap().is_none());

    assert!(db.usage_event_for_call(&call.id).await.unwrap().is_some());
}

#[tokio::test]
async fn concurrent_invocations_produce_exactly_one_event() {
    let db = test_db().await;
    let (session, call) = fixture(&db).await;
    let recorder = BillingRecorder::new(db.clone());

    let attempts: Vec<_> = (0..8).map(|_| recorder.record(&call, &session)).collect();
    let results = futures::future::join_all(attempts).await;

    let billed = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Some(_))))
        .count();
    assert_eq!(billed, 1, "exactly one invocation wins");
    assert!(db.usage_event_for_call(&call.id).await.unwrap().is_some());
}

#[tokio::test]
async fn failed_calls_are_never_billed() {
    let db = test_db().await;
    let tenant = create_tenant(&db).await;
    let agent = create_agent(&db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&db, &tenant, &agent).await;
    let failed = db
        .insert_provider_call(NewProviderCall {
            session_id: session.id.clone(),
            correlation_id: "corr-2".to_string(),
            provider: ProviderId::VendorA,
            is_fallback: false,
            tokens_in: 0,
            tokens_out: 0,
            latency_ms: 12,
            status: CallStatus::Failed,
            error_code: Some("PROVIDER_ERROR".to_string()),
            error_message: Some("upstream internal error".to_string()),
            attempt_number: 1,
        })
        .await
        .unwrap();

    let recorder = BillingRecorder::new(db.clone());
    assert!(recorder.record(&failed, &session).await.unwrap().is_none());
    assert!(db.usage_event_for_call(&failed.id).await.unwrap().is_none());

    let fresh = db.provider_call_by_id(&failed.id).await.unwrap().unwrap();
    assert!(!fresh.billed, "only SUCCESS rows may become billed");
}
