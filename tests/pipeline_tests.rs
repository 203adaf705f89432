//! End-to-end pipeline behavior: concurrency, idempotency, fallback, and
//! the tool loop with billing.

mod common;

use std::sync::Arc;

use common::*;
use voicebridge_gateway::core::pipeline::SendMessageInput;
use voicebridge_gateway::core::pricing;
use voicebridge_gateway::core::providers::{VendorA, VendorB};
use voicebridge_gateway::core::types::{ProviderId, RequestContext};
use voicebridge_gateway::storage::models::{CallStatus, MessageRole, ToolExecStatus};
use voicebridge_gateway::{AdapterCatalog, FaultProfile, GatewayError};

fn input_with_key(content: &str, key: &str) -> SendMessageInput {
    SendMessageInput {
        content: content.to_string(),
        idempotency_key: Some(key.to_string()),
        audio_artifact_id: None,
    }
}

#[tokio::test]
async fn simple_message_produces_user_and_assistant_turns() {
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let reply = env
        .pipeline
        .process(
            &tenant.id,
            &session.id,
            SendMessageInput::text("hello"),
            &RequestContext::new(),
        )
        .await
        .unwrap();

    assert!(!reply.content.is_empty());
    assert_eq!(reply.metadata.provider, ProviderId::VendorA);
    assert!(!reply.metadata.used_fallback);
    assert!(reply.metadata.tokens_in > 0);

    let messages = env.db.session_messages(&session.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[0].sequence_number, 1);
    assert_eq!(messages[1].sequence_number, 2);
}

#[tokio::test]
async fn concurrent_messages_serialize_per_session() {
    // Latency simulation keeps the winner inside its critical section while
    // the other four attempt the lock
    let mut profile = FaultProfile::deterministic();
    profile.simulate_latency = true;
    profile.base_latency_ms = (25, 25);
    let mut catalog = AdapterCatalog::new();
    catalog.register(Arc::new(VendorA::with_profile(profile)));

    let env = test_env_with(catalog).await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let contexts: Vec<_> = (0..5).map(|_| RequestContext::new()).collect();
    let futures: Vec<_> = (0..5)
        .map(|i| {
            env.pipeline.process(
                &tenant.id,
                &session.id,
                input_with_key(&format!("message {}", i), &format!("key-{}", i)),
                &contexts[i],
            )
        })
        .collect();
    let results = futures::future::join_all(futures).await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(GatewayError::Conflict(_))))
        .count();
    assert_eq!(successes, 1, "exactly one message wins the session lock");
    assert_eq!(conflicts, 4, "the rest fail fast with CONFLICT");

    // One user turn and one assistant turn, contiguous from 1
    let messages = env.db.session_messages(&session.id).await.unwrap();
    let sequences: Vec<i64> = messages.iter().map(|m| m.sequence_number).collect();
    assert_eq!(sequences, vec![1, 2]);
}

#[tokio::test]
async fn duplicate_idempotency_key_replays_the_stored_response() {
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorB, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let first = env
        .pipeline
        .process(
            &tenant.id,
            &session.id,
            input_with_key("hello", "K"),
            &RequestContext::new(),
        )
        .await
        .unwrap();
    let count_after_first = env.db.session_messages(&session.id).await.unwrap().len();

    let second = env
        .pipeline
        .process(
            &tenant.id,
            &session.id,
            input_with_key("hello", "K"),
            &RequestContext::new(),
        )
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.content, second.content);
    assert_eq!(first.metadata, second.metadata);

    let count_after_second = env.db.session_messages(&session.id).await.unwrap().len();
    assert_eq!(count_after_first, count_after_second);

    // Replays never bill a second time
    let calls = env.db.session_provider_calls(&session.id).await.unwrap();
    assert_eq!(calls.len(), 1);
}

#[tokio::test]
async fn primary_failure_falls_back_to_secondary() {
    let mut catalog = AdapterCatalog::new();
    catalog.register(Arc::new(VendorA::with_profile(
        FaultProfile::deterministic().with_error_rate(1.0),
    )));
    catalog.register(Arc::new(VendorB::with_profile(FaultProfile::deterministic())));

    let env = test_env_with(catalog).await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(
        &env.db,
        &tenant,
        ProviderId::VendorA,
        Some(ProviderId::VendorB),
        &[],
    )
    .await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let reply = env
        .pipeline
        .process(
            &tenant.id,
            &session.id,
            SendMessageInput::text("hello"),
            &RequestContext::new(),
        )
        .await
        .unwrap();

    assert!(reply.metadata.used_fallback);
    assert_eq!(reply.metadata.provider, ProviderId::VendorB);

    let calls = env.db.session_provider_calls(&session.id).await.unwrap();
    let failed_a = calls
        .iter()
        .filter(|c| c.provider == ProviderId::VendorA && c.status == CallStatus::Failed)
        .count();
    let success_b = calls
        .iter()
        .filter(|c| c.provider == ProviderId::VendorB && c.status == CallStatus::Success)
        .count();
    assert!(failed_a >= 3, "all primary attempts persisted");
    assert!(success_b >= 1, "fallback success persisted");
}

#[tokio::test]
async fn total_failure_keeps_the_user_message_and_consumes_the_key() {
    let mut catalog = AdapterCatalog::new();
    catalog.register(Arc::new(VendorA::with_profile(
        FaultProfile::deterministic().with_error_rate(1.0),
    )));

    let env = test_env_with(catalog).await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let err = env
        .pipeline
        .process(
            &tenant.id,
            &session.id,
            input_with_key("hello", "K"),
            &RequestContext::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "PROVIDER_ERROR");

    // The user turn remains; no assistant turn was persisted
    let messages = env.db.session_messages(&session.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, MessageRole::User);

    // Every attempt left a call record
    let calls = env.db.session_provider_calls(&session.id).await.unwrap();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.status == CallStatus::Failed));

    // The consumed key replays as a provider failure, not a fresh attempt
    let err = env
        .pipeline
        .process(
            &tenant.id,
            &session.id,
            input_with_key("hello", "K"),
            &RequestContext::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "PROVIDER_ERROR");
    assert_eq!(env.db.session_messages(&session.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn tool_loop_produces_full_transcript_and_bills_both_calls() {
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(
        &env.db,
        &tenant,
        ProviderId::VendorA,
        None,
        &["InvoiceLookup"],
    )
    .await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let reply = env
        .pipeline
        .process(
            &tenant.id,
            &session.id,
            SendMessageInput::text("what's the status of order #12345?"),
            &RequestContext::new(),
        )
        .await
        .unwrap();

    assert!(reply.content.contains("12345"));
    assert!(reply.content.contains("SHIPPED"));

    // USER, ASSISTANT-with-toolCalls, TOOL, ASSISTANT-final
    let messages = env.db.session_messages(&session.id).await.unwrap();
    let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::Tool,
            MessageRole::Assistant,
        ]
    );
    assert_eq!(messages[1].tool_call_list().len(), 1);
    let sequences: Vec<i64> = messages.iter().map(|m| m.sequence_number).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);

    // Two successful provider calls, each billed exactly once
    let calls = env.db.session_provider_calls(&session.id).await.unwrap();
    let successes: Vec<_> = calls
        .iter()
        .filter(|c| c.status == CallStatus::Success)
        .collect();
    assert_eq!(successes.len(), 2);

    let mut total_cost = 0;
    let mut expected_cost = 0;
    for call in &successes {
        let event = env
            .db
            .usage_event_for_call(&call.id)
            .await
            .unwrap()
            .expect("usage event per successful call");
        total_cost += event.cost_cents;
        expected_cost += pricing::cost_cents(call.provider, call.tokens_in, call.tokens_out);
    }
    assert_eq!(total_cost, expected_cost);

    // One successful tool execution audit row
    let executions = env.db.session_tool_executions(&session.id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ToolExecStatus::Success);
    assert_eq!(executions[0].tool_name, "InvoiceLookup");
}

#[tokio::test]
async fn demo_sessions_never_bill() {
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_demo_session(&env.db, &tenant, &agent).await;

    env.pipeline
        .process(
            &tenant.id,
            &session.id,
            SendMessageInput::text("hello"),
            &RequestContext::new(),
        )
        .await
        .unwrap();

    let calls = env.db.session_provider_calls(&session.id).await.unwrap();
    assert!(!calls.is_empty());
    for call in &calls {
        assert!(!call.billed);
        assert!(env.db.usage_event_for_call(&call.id).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn ended_sessions_reject_messages() {
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    env.db.end_session(&tenant.id, &session.id).await.unwrap();

    let err = env
        .pipeline
        .process(
            &tenant.id,
            &session.id,
            SendMessageInput::text("hello"),
            &RequestContext::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;

    let err = env
        .pipeline
        .process(
            &tenant.id,
            "no-such-session",
            SendMessageInput::text("hello"),
            &RequestContext::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}
