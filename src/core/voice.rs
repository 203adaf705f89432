//! Voice channel support
//!
//! Speech transcription happens client-side; the core treats a voice turn
//! as plain text plus an opaque stored audio artifact. Audio bytes live on
//! the filesystem under the configured storage directory, metadata in the
//! database.

use crate::config::VoiceConfig;
use crate::storage::audio::NewAudioArtifact;
use crate::storage::models::{AudioArtifact, AudioType};
use crate::storage::Database;
use crate::utils::error::{GatewayError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Stores and serves opaque audio artifacts
#[derive(Clone)]
pub struct VoiceService {
    db: Database,
    storage_dir: PathBuf,
    enabled: bool,
}

/// Caller-supplied descriptors for an uploaded audio blob
#[derive(Debug, Clone, Default)]
pub struct AudioUpload {
    pub artifact_type: Option<AudioType>,
    pub format: Option<String>,
    pub sample_rate: Option<i64>,
    pub duration_ms: Option<i64>,
}

impl VoiceService {
    pub fn new(db: Database, config: &VoiceConfig) -> Self {
        Self {
            db,
            storage_dir: PathBuf::from(&config.storage_dir),
            enabled: config.enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a client-side transcript as an artifact without stored audio
    pub async fn record_transcript(
        &self,
        session_id: &str,
        transcript: &str,
        duration_ms: Option<i64>,
        format: Option<String>,
    ) -> Result<AudioArtifact> {
        self.db
            .insert_audio_artifact(NewAudioArtifact {
                session_id: session_id.to_string(),
                artifact_type: Some(AudioType::UserInput),
                duration_ms,
                format,
                transcript: Some(transcript.to_string()),
                ..NewAudioArtifact::default()
            })
            .await
    }

    /// Persist raw audio bytes and the artifact row describing them
    pub async fn store_audio(
        &self,
        session_id: &str,
        bytes: &[u8],
        upload: AudioUpload,
    ) -> Result<AudioArtifact> {
        if !self.enabled {
            return Err(GatewayError::validation("voice mode is disabled"));
        }
        if bytes.is_empty() {
            return Err(GatewayError::validation("audio body is empty"));
        }

        tokio::fs::create_dir_all(&self.storage_dir).await?;

        let extension = upload.format.as_deref().unwrap_or("bin");
        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.storage_dir.join(&file_name);
        tokio::fs::write(&path, bytes).await?;
        debug!(session_id, path = %path.display(), "stored audio artifact");

        let artifact = self
            .db
            .insert_audio_artifact(NewAudioArtifact {
                session_id: session_id.to_string(),
                artifact_type: upload.artifact_type,
                file_path: Some(path.to_string_lossy().into_owned()),
                file_size: Some(bytes.len() as i64),
                duration_ms: upload.duration_ms,
                format: upload.format,
                sample_rate: upload.sample_rate,
                ..NewAudioArtifact::default()
            })
            .await;

        // Don't leave orphaned files behind a failed insert
        if artifact.is_err() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "failed to clean up audio file");
            }
        }
        artifact
    }

    /// Artifact metadata, session-scoped
    pub async fn artifact(&self, session_id: &str, artifact_id: &str) -> Result<AudioArtifact> {
        self.db
            .audio_artifact_by_id(session_id, artifact_id)
            .await?
            .ok_or_else(|| GatewayError::not_found("audio artifact not found"))
    }

    /// The stored bytes for an artifact
    pub async fn load_audio(&self, session_id: &str, artifact_id: &str) -> Result<(AudioArtifact, Vec<u8>)> {
        let artifact = self.artifact(session_id, artifact_id).await?;
        let Some(path) = artifact.file_path.clone() else {
            return Err(GatewayError::not_found("artifact has no stored audio"));
        };
        let bytes = tokio::fs::read(Path::new(&path)).await.map_err(|e| {
            warn!(artifact_id = %artifact.id, error = %e, "audio file missing from storage");
            GatewayError::not_found("stored audio is unavailable")
        })?;
        Ok((artifact, bytes))
    }
}

/// Content type for serving stored audio
pub fn content_type_for(format: Option<&str>) -> &'static str {
    match format {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_map_known_formats() {
        assert_eq!(content_type_for(Some("wav")), "audio/wav");
        assert_eq!(content_type_for(Some("mp3")), "audio/mpeg");
        assert_eq!(content_type_for(Some("flac")), "application/octet-stream");
        assert_eq!(content_type_for(None), "application/octet-stream");
    }
}
