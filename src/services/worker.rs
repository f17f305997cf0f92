use async_trait::async_trait;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::gltf::{InjectParams, extract_metadata, inject_metadata};
use crate::models::{RenderOutcome, ThumbnailJob};
use crate::services::queue::JobHandler;
use crate::services::renderer::SceneRenderer;
use crate::services::storage::ObjectStore;

const THUMB_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
const GLTF_CONTENT_TYPE: &str = "model/gltf+json";

/// Queue consumer that runs one thumbnail job end to end:
/// load → validate → render → upload → inject → verify → persist.
///
/// The worker exclusively owns the source document during the processing
/// window; the stored copy is replaced only after the full cycle succeeds,
/// so readers never observe a partial write.
pub struct RenderWorker {
    store: Arc<dyn ObjectStore>,
    renderer: Arc<dyn SceneRenderer>,
}

impl RenderWorker {
    pub fn new(store: Arc<dyn ObjectStore>, renderer: Arc<dyn SceneRenderer>) -> Self {
        Self { store, renderer }
    }

    async fn process(&self, job: &ThumbnailJob) -> Result<RenderOutcome, PipelineError> {
        // LOADED
        let raw = self.store.get(&job.source_key).await?;
        tracing::debug!("loaded {} ({} bytes)", job.source_key, raw.len());

        // STRUCTURALLY_VALID
        let gltf_str = String::from_utf8(raw).map_err(|_| {
            PipelineError::InvalidDocument(format!("{} is not UTF-8 text", job.source_key))
        })?;
        validate_document(&gltf_str, &job.source_key)?;

        // RENDERED
        let jpeg = self
            .renderer
            .render(&gltf_str, job.width, job.height)
            .await?;
        tracing::debug!("rendered {} -> {} bytes of JPEG", job.source_key, jpeg.len());

        // UPLOADED
        self.store
            .put(
                &job.thumb_key,
                jpeg.clone(),
                mime::IMAGE_JPEG.as_ref(),
                Some(THUMB_CACHE_CONTROL),
            )
            .await?;

        // INJECTED. Works on a copy; the stored document is untouched on failure.
        let injected = inject_metadata(InjectParams {
            gltf_json: &gltf_str,
            thumb_jpeg: &jpeg,
            version: &job.version,
            uploaded_at: None,
            user_data: &job.user_data,
        })?;

        // VERIFIED. A sanity check, not a second source of truth.
        let (summary, _) = extract_metadata(&injected)?;
        if summary.textures == 0 {
            return Err(PipelineError::InvalidDocument(
                "injected document carries no thumbnail texture".to_string(),
            ));
        }

        // Persist the injected document over the promoted one.
        self.store
            .put(&job.source_key, injected.into_bytes(), GLTF_CONTENT_TYPE, None)
            .await?;

        Ok(RenderOutcome {
            status: "ok".to_string(),
            source_key: job.source_key.clone(),
            thumb_key: job.thumb_key.clone(),
            width: job.width,
            height: job.height,
            byte_count: jpeg.len(),
        })
    }
}

#[async_trait]
impl JobHandler for RenderWorker {
    async fn handle(&self, job: &ThumbnailJob) -> Result<RenderOutcome, PipelineError> {
        self.process(job).await
    }
}

/// Require JSON with at least an `asset` descriptor and a scene list. The
/// rejection message echoes the offending prefix to keep failures debuggable.
fn validate_document(text: &str, key: &str) -> Result<(), PipelineError> {
    let head: String = text.chars().take(60).collect();
    let parsed: serde_json::Value = serde_json::from_str(text).map_err(|_| {
        PipelineError::InvalidDocument(format!(
            "not valid JSON glTF at {key}, first bytes: {head:?}"
        ))
    })?;
    if parsed.get("asset").is_none() || parsed.get("scenes").is_none() {
        return Err(PipelineError::InvalidDocument(format!(
            "glTF core fields missing at {key}, first bytes: {head:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::renderer::{AlwaysFailingRenderer, StubRenderer};
    use crate::services::storage::MemoryObjectStore;
    use serde_json::{Value, json};

    const DOC: &str = r#"{"asset":{"version":"2.0"},"scenes":[{"nodes":[0]}],"nodes":[{"name":"a"}]}"#;

    fn job() -> ThumbnailJob {
        ThumbnailJob {
            source_key: "final/chair/1.0.0/chair.gltf".to_string(),
            thumb_key: "assets/thumbnail/chair/1.0.0/thumb_chair_1.jpg".to_string(),
            width: 64,
            height: 64,
            version: "1.0.0".to_string(),
            user_data: json!({"owner": "tester"}),
        }
    }

    async fn seeded_store(doc: &str) -> Arc<MemoryObjectStore> {
        let store = Arc::new(MemoryObjectStore::new());
        store
            .put(
                "final/chair/1.0.0/chair.gltf",
                doc.as_bytes().to_vec(),
                GLTF_CONTENT_TYPE,
                None,
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_full_cycle_uploads_and_injects() {
        let store = seeded_store(DOC).await;
        let worker = RenderWorker::new(store.clone(), Arc::new(StubRenderer));

        let outcome = worker.handle(&job()).await.unwrap();
        assert_eq!(outcome.status, "ok");
        assert_eq!(outcome.width, 64);
        assert!(outcome.byte_count > 0);

        // Thumbnail landed.
        let thumb = store.get(&job().thumb_key).await.unwrap();
        assert_eq!(thumb.len(), outcome.byte_count);

        // Source document now carries the injected metadata.
        let doc = store.get(&job().source_key).await.unwrap();
        let v: Value = serde_json::from_str(&String::from_utf8(doc).unwrap()).unwrap();
        assert_eq!(v["extras"]["esMeta"]["version"], "1.0.0");
        assert_eq!(v["extras"]["esUserData"]["owner"], "tester");
        assert_eq!(v["textures"].as_array().unwrap().len(), 1);
        assert_eq!(v["nodes"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_object_is_permanent() {
        let store = Arc::new(MemoryObjectStore::new());
        let worker = RenderWorker::new(store, Arc::new(StubRenderer));
        let err = worker.handle(&job()).await.unwrap_err();
        assert_eq!(err.code(), "OBJECT_NOT_FOUND");
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_invalid_document_is_rejected_with_prefix_echo() {
        let store = seeded_store("<not json at all, clearly>").await;
        let worker = RenderWorker::new(store, Arc::new(StubRenderer));
        let err = worker.handle(&job()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_DOCUMENT");
        assert!(err.to_string().contains("<not json"));
    }

    #[tokio::test]
    async fn test_missing_core_fields_rejected() {
        let store = seeded_store(r#"{"scenes":[]}"#).await;
        let worker = RenderWorker::new(store, Arc::new(StubRenderer));
        let err = worker.handle(&job()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_DOCUMENT");
    }

    #[tokio::test]
    async fn test_render_failure_leaves_document_untouched() {
        let store = seeded_store(DOC).await;
        let worker = RenderWorker::new(store.clone(), Arc::new(AlwaysFailingRenderer));
        let err = worker.handle(&job()).await.unwrap_err();
        assert_eq!(err.code(), "RENDER_FAILED");
        assert!(!err.is_permanent());

        // No thumbnail, source byte-identical.
        assert!(!store.contains(&job().thumb_key));
        let doc = store.get(&job().source_key).await.unwrap();
        assert_eq!(doc, DOC.as_bytes());
    }
}
