use chrono::Utc;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::models::{CommitManifest, ThumbnailJob};
use crate::services::queue::JobQueue;

/// Derives deterministic job identities and pushes thumbnail work onto the
/// queue. Fire-and-forget: callers never block on job completion.
pub struct JobDispatcher {
    queue: Arc<JobQueue>,
    thumb_width: u32,
    thumb_height: u32,
}

/// Standard thumbnail key layout.
pub fn build_thumb_key(file_name: &str, version: &str) -> String {
    format!(
        "assets/thumbnail/{file_name}/{version}/thumb_{file_name}_{}.jpg",
        Utc::now().timestamp_millis()
    )
}

/// Idempotency key: same (source, thumb) pair always maps to the same id.
/// Deliberately human-inspectable rather than hashed.
pub fn build_job_id(source_key: &str, thumb_key: &str) -> String {
    format!("thumb@{source_key}@{thumb_key}")
}

impl JobDispatcher {
    pub fn new(queue: Arc<JobQueue>, config: &PipelineConfig) -> Self {
        Self {
            queue,
            thumb_width: config.thumb_width,
            thumb_height: config.thumb_height,
        }
    }

    /// Enqueue a thumbnail render for a promoted asset. Returns the job id.
    pub fn enqueue_thumbnail_job(
        &self,
        promoted: &CommitManifest,
    ) -> Result<String, PipelineError> {
        if !promoted.key.to_lowercase().ends_with(".gltf") {
            return Err(PipelineError::InvalidKey(promoted.key.clone()));
        }

        let thumb_key = build_thumb_key(&promoted.file_name, &promoted.version);
        let job_id = build_job_id(&promoted.key, &thumb_key);

        let job = ThumbnailJob {
            source_key: promoted.key.clone(),
            thumb_key,
            width: self.thumb_width,
            height: self.thumb_height,
            version: promoted.version.clone(),
            user_data: promoted.user_data.clone(),
        };

        tracing::debug!("dispatching thumbnail job {}", job_id);
        Ok(self.queue.enqueue(&job_id, job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::queue::QueuePolicy;
    use serde_json::json;

    fn manifest(key: &str) -> CommitManifest {
        CommitManifest {
            key: key.to_string(),
            size_bytes: 10,
            file_name: "chair".to_string(),
            version: "1.0.0".to_string(),
            user_data: json!({}),
        }
    }

    fn dispatcher() -> (JobDispatcher, Arc<JobQueue>) {
        let queue = Arc::new(JobQueue::new(QueuePolicy::default()));
        let dispatcher = JobDispatcher::new(queue.clone(), &PipelineConfig::default());
        (dispatcher, queue)
    }

    #[test]
    fn test_job_id_is_deterministic_and_readable() {
        let id = build_job_id("final/a/1.0.0/a.gltf", "assets/thumbnail/a/1.0.0/t.jpg");
        assert_eq!(id, "thumb@final/a/1.0.0/a.gltf@assets/thumbnail/a/1.0.0/t.jpg");
        assert_eq!(
            id,
            build_job_id("final/a/1.0.0/a.gltf", "assets/thumbnail/a/1.0.0/t.jpg")
        );
    }

    #[test]
    fn test_thumb_key_layout() {
        let key = build_thumb_key("chair", "1.0.0");
        assert!(key.starts_with("assets/thumbnail/chair/1.0.0/thumb_chair_"));
        assert!(key.ends_with(".jpg"));
    }

    #[test]
    fn test_rejects_non_gltf_key() {
        let (dispatcher, _) = dispatcher();
        let err = dispatcher
            .enqueue_thumbnail_job(&manifest("final/chair/1.0.0/chair.glb"))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_KEY");
    }

    #[test]
    fn test_enqueue_registers_job_with_configured_dimensions() {
        let (dispatcher, queue) = dispatcher();
        let id = dispatcher
            .enqueue_thumbnail_job(&manifest("final/chair/1.0.0/chair.gltf"))
            .unwrap();
        let record = queue.record(&id).unwrap();
        assert_eq!(record.job.source_key, "final/chair/1.0.0/chair.gltf");
        assert_eq!(record.job.width, 200);
        assert_eq!(record.job.height, 200);
    }
}
