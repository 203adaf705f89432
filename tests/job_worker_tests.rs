//! Durable job queue: claiming, retries, callbacks, and crash recovery.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::*;
use voicebridge_gateway::config::JobConfig;
use voicebridge_gateway::core::jobs::JobWorker;
use voicebridge_gateway::core::pipeline::SendMessageInput;
use voicebridge_gateway::core::providers::VendorA;
use voicebridge_gateway::core::types::{ProviderId, RequestContext};
use voicebridge_gateway::storage::jobs::NewJob;
use voicebridge_gateway::storage::models::{JobStatus, JobType};
use voicebridge_gateway::{AdapterCatalog, FaultProfile};

fn job_config() -> JobConfig {
    JobConfig {
        poll_interval: Duration::from_millis(10),
        lease: Duration::from_secs(300),
        worker_count: 1,
    }
}

fn send_message_job(tenant_id: &str, session_id: &str, content: &str) -> NewJob {
    NewJob {
        tenant_id: tenant_id.to_string(),
        job_type: JobType::SendMessage,
        idempotency_key: None,
        input: serde_json::json!({ "sessionId": session_id, "content": content }),
        callback_url: None,
        max_attempts: 3,
    }
}

#[tokio::test]
async fn job_executes_through_the_pipeline() {
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let (job, created) = env
        .db
        .submit_job(send_message_job(&tenant.id, &session.id, "hello"))
        .await
        .unwrap();
    assert!(created);

    let worker = JobWorker::new(env.db.clone(), Arc::clone(&env.pipeline), &job_config(), 0);
    assert!(worker.tick().await.unwrap());
    assert!(!worker.tick().await.unwrap(), "queue is drained");

    let job = env.db.job_by_id(&tenant.id, &job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert!(job.locked_by.is_none());
    let output = job.output.unwrap();
    assert!(output.contains("ASSISTANT"));

    let messages = env.db.session_messages(&session.id).await.unwrap();
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn duplicate_submission_returns_the_existing_job() {
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let mut new_job = send_message_job(&tenant.id, &session.id, "hello");
    new_job.idempotency_key = Some("submit-once".to_string());

    let (first, created_first) = env.db.submit_job(new_job.clone()).await.unwrap();
    let (second, created_second) = env.db.submit_job(new_job).await.unwrap();

    assert!(created_first);
    assert!(!created_second);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn completed_job_delivers_exactly_one_callback() {
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorB, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let server = spawn_callback_server().await;
    let mut new_job = send_message_job(&tenant.id, &session.id, "hello");
    new_job.callback_url = Some(server.url.clone());
    let (job, _) = env.db.submit_job(new_job).await.unwrap();

    let worker = JobWorker::new(env.db.clone(), Arc::clone(&env.pipeline), &job_config(), 0);
    assert!(worker.tick().await.unwrap());

    let job = env.db.job_by_id(&tenant.id, &job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.callback_sent);

    let hits = server.hits();
    assert_eq!(hits.len(), 1, "exactly one callback POST");
    assert_eq!(hits[0]["jobId"], job.id);
    assert_eq!(hits[0]["status"], "COMPLETED");
}

#[tokio::test]
async fn failing_job_retries_then_fails_terminally() {
    let mut catalog = AdapterCatalog::new();
    catalog.register(Arc::new(VendorA::with_profile(
        FaultProfile::deterministic().with_error_rate(1.0),
    )));
    let env = test_env_with(catalog).await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let mut new_job = send_message_job(&tenant.id, &session.id, "hello");
    new_job.max_attempts = 2;
    let (job, _) = env.db.submit_job(new_job).await.unwrap();

    let worker = JobWorker::new(env.db.clone(), Arc::clone(&env.pipeline), &job_config(), 0);

    // First attempt fails with budget left: back to PENDING
    assert!(worker.tick().await.unwrap());
    let after_first = env.db.job_by_id(&tenant.id, &job.id).await.unwrap().unwrap();
    assert_eq!(after_first.status, JobStatus::Pending);
    assert_eq!(after_first.attempts, 1);
    assert!(after_first.last_error.is_some());

    // Second attempt exhausts the budget: FAILED
    assert!(worker.tick().await.unwrap());
    let after_second = env.db.job_by_id(&tenant.id, &job.id).await.unwrap().unwrap();
    assert_eq!(after_second.status, JobStatus::Failed);
    assert_eq!(after_second.attempts, 2);
    assert!(after_second.error_message.is_some());
    assert!(after_second.completed_at.is_some());

    // Exhausted jobs are no longer claimable
    assert!(!worker.tick().await.unwrap());
}

#[tokio::test]
async fn stale_processing_job_is_recovered_without_duplicate_billing() {
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    // The message was already processed under this key before the worker
    // holding the job crashed
    env.pipeline
        .process(
            &tenant.id,
            &session.id,
            SendMessageInput {
                content: "hello".to_string(),
                idempotency_key: Some("job-K".to_string()),
                audio_artifact_id: None,
            },
            &RequestContext::new(),
        )
        .await
        .unwrap();
    let totals_before = env.db.usage_totals(&tenant.id, None, None).await.unwrap();
    assert_eq!(totals_before.event_count, 1);

    let mut new_job = send_message_job(&tenant.id, &session.id, "hello");
    new_job.idempotency_key = Some("job-K".to_string());
    let (job, _) = env.db.submit_job(new_job).await.unwrap();

    // Simulate the crash: PROCESSING with an expired lease
    sqlx::query(
        "UPDATE jobs SET status = 'PROCESSING', locked_at = ?, locked_by = 'dead-worker',
             lock_expires_at = ?, attempts = 1 WHERE id = ?",
    )
    .bind(Utc::now() - chrono::Duration::minutes(10))
    .bind(Utc::now() - chrono::Duration::seconds(1))
    .bind(&job.id)
    .execute(env.db.pool())
    .await
    .unwrap();

    let worker = JobWorker::new(env.db.clone(), Arc::clone(&env.pipeline), &job_config(), 0);
    let recovered = worker.startup_recovery().await.unwrap();
    assert_eq!(recovered, 1);

    let after_recovery = env.db.job_by_id(&tenant.id, &job.id).await.unwrap().unwrap();
    assert_eq!(after_recovery.status, JobStatus::Pending);
    assert!(after_recovery.locked_by.is_none());

    // The rescued job completes by replaying the stored response
    assert!(worker.tick().await.unwrap());
    let finished = env.db.job_by_id(&tenant.id, &job.id).await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Completed);

    // No duplicate transcript rows, no duplicate usage events
    let messages = env.db.session_messages(&session.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    let totals_after = env.db.usage_totals(&tenant.id, None, None).await.unwrap();
    assert_eq!(totals_after.event_count, 1);
    assert_eq!(totals_after.total_cost_cents, totals_before.total_cost_cents);
}

#[tokio::test]
async fn only_one_worker_claims_a_job() {
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    env.db
        .submit_job(send_message_job(&tenant.id, &session.id, "hello"))
        .await
        .unwrap();

    let worker_a = JobWorker::new(env.db.clone(), Arc::clone(&env.pipeline), &job_config(), 0);
    let worker_b = JobWorker::new(env.db.clone(), Arc::clone(&env.pipeline), &job_config(), 1);
    assert_ne!(worker_a.worker_id(), worker_b.worker_id());

    let (a, b) = tokio::join!(worker_a.tick(), worker_b.tick());
    let claims = [a.unwrap(), b.unwrap()];
    assert_eq!(
        claims.iter().filter(|claimed| **claimed).count(),
        1,
        "the claim statement hands the job to exactly one worker"
    );
}
