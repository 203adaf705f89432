//! Session uniqueness, sequence allocation, and tenant scoping.

mod common;

use common::*;
use voicebridge_gateway::core::types::ProviderId;
use voicebridge_gateway::storage::messages::NewMessage;
use voicebridge_gateway::storage::models::{MessageRole, SessionChannel, SessionStatus};
use voicebridge_gateway::storage::sessions::NewSession;

#[tokio::test]
async fn active_session_is_reused_not_duplicated() {
    let db = test_db().await;
    let tenant = create_tenant(&db).await;
    let agent = create_agent(&db, &tenant, ProviderId::VendorA, None, &[]).await;

    let new_session = NewSession {
        tenant_id: tenant.id.clone(),
        agent_id: agent.id.clone(),
        customer_id: "customer-1".to_string(),
        channel: SessionChannel::Chat,
        demo_mode: false,
        metadata: None,
    };

    let (first, created_first) = db.create_session(new_session.clone()).await.unwrap();
    let (second, created_second) = db.create_session(new_session.clone()).await.unwrap();

    assert!(created_first);
    assert!(!created_second);
    assert_eq!(first.id, second.id);

    // Ending the session frees the (tenant, agent, customer) slot
    db.end_session(&tenant.id, &first.id).await.unwrap();
    let (third, created_third) = db.create_session(new_session).await.unwrap();
    assert!(created_third);
    assert_ne!(first.id, third.id);
}

#[tokio::test]
async fn demo_and_regular_sessions_do_not_collide() {
    let db = test_db().await;
    let tenant = create_tenant(&db).await;
    let agent = create_agent(&db, &tenant, ProviderId::VendorA, None, &[]).await;

    let base = NewSession {
        tenant_id: tenant.id.clone(),
        agent_id: agent.id.clone(),
        customer_id: "shared-customer".to_string(),
        channel: SessionChannel::Chat,
        demo_mode: false,
        metadata: None,
    };
    let demo = NewSession {
        demo_mode: true,
        ..base.clone()
    };

    let (regular, _) = db.create_session(base).await.unwrap();
    let (demo_session, created) = db.create_session(demo).await.unwrap();

    assert!(created, "demo mode is part of the uniqueness key");
    assert_ne!(regular.id, demo_session.id);
    assert!(demo_session.demo_mode);
}

#[tokio::test]
async fn ending_a_session_is_idempotent() {
    let db = test_db().await;
    let tenant = create_tenant(&db).await;
    let agent = create_agent(&db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&db, &tenant, &agent).await;

    let ended = db.end_session(&tenant.id, &session.id).await.unwrap().unwrap();
    assert_eq!(ended.status, SessionStatus::Ended);
    assert!(ended.ended_at.is_some());

    let again = db.end_session(&tenant.id, &session.id).await.unwrap().unwrap();
    assert_eq!(again.status, SessionStatus::Ended);
    assert_eq!(again.ended_at, ended.ended_at);
}

#[tokio::test]
async fn concurrent_appends_allocate_contiguous_sequences() {
    let db = test_db().await;
    let tenant = create_tenant(&db).await;
    let agent = create_agent(&db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&db, &tenant, &agent).await;

    let appends: Vec<_> = (0..10)
        .map(|i| {
            let db = db.clone();
            let session_id = session.id.clone();
            async move {
                db.append_message(NewMessage::new(
                    &session_id,
                    MessageRole::User,
                    format!("message {}", i),
                ))
                .await
            }
        })
        .collect();
    let results = futures::future::join_all(appends).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let messages = db.session_messages(&session.id).await.unwrap();
    let mut sequences: Vec<i64> = messages.iter().map(|m| m.sequence_number).collect();
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=10).collect::<Vec<i64>>());
}

#[tokio::test]
async fn message_append_to_missing_session_fails_cleanly() {
    let db = test_db().await;
    let err = db
        .append_message(NewMessage::new("missing", MessageRole::User, "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn tenant_scope_hides_other_tenants_rows() {
    let db = test_db().await;
    let tenant_a = create_tenant(&db).await;
    let tenant_b = create_tenant(&db).await;
    let agent = create_agent(&db, &tenant_a, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&db, &tenant_a, &agent).await;

    assert!(db
        .agent_by_id(&tenant_b.id, &agent.id)
        .await
        .unwrap()
        .is_none());
    assert!(db
        .session_by_id(&tenant_b.id, &session.id)
        .await
        .unwrap()
        .is_none());
    assert!(db.list_agents(&tenant_b.id).await.unwrap().is_empty());

    let totals = db.usage_totals(&tenant_b.id, None, None).await.unwrap();
    assert_eq!(totals.event_count, 0);
}
