//! Voice artifact storage and the transcript-driven pipeline path.

mod common;

use common::*;
use voicebridge_gateway::config::VoiceConfig;
use voicebridge_gateway::core::pipeline::SendMessageInput;
use voicebridge_gateway::core::types::{ProviderId, RequestContext};
use voicebridge_gateway::core::voice::{AudioUpload, VoiceService};
use voicebridge_gateway::storage::models::{AudioType, MessageRole};

fn voice_config(dir: &tempfile::TempDir) -> VoiceConfig {
    VoiceConfig {
        storage_dir: dir.path().to_string_lossy().into_owned(),
        enabled: true,
    }
}

#[tokio::test]
async fn audio_round_trips_through_storage() {
    let dir = tempfile::tempdir().unwrap();
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let voice = VoiceService::new(env.db.clone(), &voice_config(&dir));
    let payload = b"RIFF....fake-wav-bytes";

    let artifact = voice
        .store_audio(
            &session.id,
            payload,
            AudioUpload {
                artifact_type: Some(AudioType::UserInput),
                format: Some("wav".to_string()),
                sample_rate: Some(16_000),
                duration_ms: Some(1200),
            },
        )
        .await
        .unwrap();

    assert_eq!(artifact.file_size, Some(payload.len() as i64));
    assert_eq!(artifact.format.as_deref(), Some("wav"));

    let (loaded, bytes) = voice.load_audio(&session.id, &artifact.id).await.unwrap();
    assert_eq!(loaded.id, artifact.id);
    assert_eq!(bytes, payload);

    let metadata = voice.artifact(&session.id, &artifact.id).await.unwrap();
    assert_eq!(metadata.sample_rate, Some(16_000));
    assert!(metadata.transcript.is_none());
}

#[tokio::test]
async fn transcript_drives_the_pipeline_and_links_the_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorB, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let voice = VoiceService::new(env.db.clone(), &voice_config(&dir));
    let artifact = voice
        .record_transcript(&session.id, "hello from a phone call", Some(2400), None)
        .await
        .unwrap();
    assert_eq!(artifact.transcript.as_deref(), Some("hello from a phone call"));

    let reply = env
        .pipeline
        .process(
            &tenant.id,
            &session.id,
            SendMessageInput {
                content: "hello from a phone call".to_string(),
                idempotency_key: None,
                audio_artifact_id: Some(artifact.id.clone()),
            },
            &RequestContext::new(),
        )
        .await
        .unwrap();
    assert!(!reply.content.is_empty());

    let messages = env.db.session_messages(&session.id).await.unwrap();
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].audio_artifact_id.as_deref(), Some(artifact.id.as_str()));
}

#[tokio::test]
async fn disabled_voice_mode_rejects_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let voice = VoiceService::new(
        env.db.clone(),
        &VoiceConfig {
            storage_dir: dir.path().to_string_lossy().into_owned(),
            enabled: false,
        },
    );

    let err = voice
        .store_audio(&session.id, b"bytes", AudioUpload::default())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn missing_artifact_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let env = test_env().await;
    let tenant = create_tenant(&env.db).await;
    let agent = create_agent(&env.db, &tenant, ProviderId::VendorA, None, &[]).await;
    let session = create_session(&env.db, &tenant, &agent).await;

    let voice = VoiceService::new(env.db.clone(), &voice_config(&dir));
    let err = voice.artifact(&session.id, "missing").await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}
