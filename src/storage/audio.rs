//! Audio artifact persistence

use super::models::{AudioArtifact, AudioType};
use super::Database;
use crate::utils::error::Result;
use chrono::Utc;
use uuid::Uuid;

/// Fields for a new stored audio artifact
#[derive(Debug, Clone, Default)]
pub struct NewAudioArtifact {
    pub session_id: String,
    pub artifact_type: Option<AudioType>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub duration_ms: Option<i64>,
    pub format: Option<String>,
    pub sample_rate: Option<i64>,
    pub provider: Option<String>,
    pub transcript: Option<String>,
    pub latency_ms: Option<i64>,
}

impl Database {
    pub async fn insert_audio_artifact(&self, new: NewAudioArtifact) -> Result<AudioArtifact> {
        let artifact = AudioArtifact {
            id: Uuid::new_v4().to_string(),
            session_id: new.session_id,
            artifact_type: new.artifact_type.unwrap_or(AudioType::UserInput),
            file_path: new.file_path,
            file_size: new.file_size,
            duration_ms: new.duration_ms,
            format: new.format,
            sample_rate: new.sample_rate,
            provider: new.provider,
            transcript: new.transcript,
            latency_ms: new.latency_ms,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO audio_artifacts (id, session_id, artifact_type, file_path, file_size,
                 duration_ms, format, sample_rate, provider, transcript, latency_ms, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&artifact.id)
        .bind(&artifact.session_id)
        .bind(artifact.artifact_type)
        .bind(&artifact.file_path)
        .bind(artifact.file_size)
        .bind(artifact.duration_ms)
        .bind(&artifact.format)
        .bind(artifact.sample_rate)
        .bind(&artifact.provider)
        .bind(&artifact.transcript)
        .bind(artifact.latency_ms)
        .bind(artifact.created_at)
        .execute(self.pool())
        .await?;

        Ok(artifact)
    }

    pub async fn audio_artifact_by_id(
        &self,
        session_id: &str,
        artifact_id: &str,
    ) -> Result<Option<AudioArtifact>> {
        let artifact = sqlx::query_as::<_, AudioArtifact>(
            "SELECT * FROM audio_artifacts WHERE id = ? AND session_id = ?",
        )
        .bind(artifact_id)
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(artifact)
    }
}
