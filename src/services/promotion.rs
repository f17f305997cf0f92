use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::models::CommitManifest;
use crate::services::storage::ObjectStore;

/// Validates staged uploads against object-store truth and promotes them
/// from the staging prefix to the final prefix.
pub struct PromotionService {
    store: Arc<dyn ObjectStore>,
    staging_prefix: String,
    final_prefix: String,
}

impl PromotionService {
    pub fn new(store: Arc<dyn ObjectStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            staging_prefix: config.staging_prefix.clone(),
            final_prefix: config.final_prefix.clone(),
        }
    }

    /// Probe the store and require exact agreement with the asserted
    /// manifest. A mismatch rejects the commit, it is never corrected.
    pub async fn validate(&self, manifest: &CommitManifest) -> Result<(), PipelineError> {
        let meta = self.store.head(&manifest.key).await?;

        if !meta.key.starts_with(&self.staging_prefix) {
            return Err(PipelineError::InvalidPrefix(meta.key));
        }
        // Structurally impossible with a well-behaved store, but guarded.
        if manifest.key != meta.key {
            return Err(PipelineError::KeyMismatch {
                asserted: manifest.key.clone(),
                stored: meta.key,
            });
        }
        if manifest.size_bytes != meta.size_bytes {
            return Err(PipelineError::SizeMismatch {
                asserted: manifest.size_bytes,
                stored: meta.size_bytes,
            });
        }
        Ok(())
    }

    /// Copy the staged object to its final key, then delete the staging copy.
    ///
    /// The copy is the commit point and is strictly sequenced before the
    /// delete: a crash between the two steps leaves a reclaimable duplicate
    /// under staging, never a lost asset. A delete failure is therefore
    /// logged and swallowed.
    pub async fn promote(&self, manifest: &CommitManifest) -> Result<CommitManifest, PipelineError> {
        let final_key = manifest
            .key
            .replacen(&self.staging_prefix, &self.final_prefix, 1);

        self.store
            .copy(&manifest.key, &final_key)
            .await
            .map_err(|e| PipelineError::CopyFailed(e.to_string()))?;

        if let Err(e) = self.store.delete(&manifest.key).await {
            tracing::warn!(
                "staging cleanup failed for {} (final copy at {} is intact): {}",
                manifest.key,
                final_key,
                e
            );
        }

        tracing::info!("promoted {} -> {}", manifest.key, final_key);

        Ok(CommitManifest {
            key: final_key,
            ..manifest.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::MemoryObjectStore;
    use serde_json::json;

    fn manifest(key: &str, size_bytes: i64) -> CommitManifest {
        CommitManifest {
            key: key.to_string(),
            size_bytes,
            file_name: "x".to_string(),
            version: "1.0.0".to_string(),
            user_data: json!({}),
        }
    }

    async fn service_with(key: &str, data: &[u8]) -> (PromotionService, Arc<MemoryObjectStore>) {
        let store = Arc::new(MemoryObjectStore::new());
        store
            .put(key, data.to_vec(), "model/gltf+json", None)
            .await
            .unwrap();
        let service = PromotionService::new(store.clone(), &PipelineConfig::default());
        (service, store)
    }

    #[tokio::test]
    async fn test_validate_accepts_matching_manifest() {
        let (service, _) = service_with("staging/a.gltf", b"0123456789").await;
        service
            .validate(&manifest("staging/a.gltf", 10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_validate_rejects_size_mismatch() {
        let (service, _) = service_with("staging/a.glb", &[0u8; 120]).await;
        let err = service
            .validate(&manifest("staging/a.glb", 100))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SIZE_MISMATCH");
        assert_eq!(err.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_validate_rejects_non_staging_prefix() {
        let (service, _) = service_with("final/a.gltf", b"0123456789").await;
        let err = service
            .validate(&manifest("final/a.gltf", 10))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "KEY_INCORRECT");
    }

    #[tokio::test]
    async fn test_validate_missing_object() {
        let (service, _) = service_with("staging/other.gltf", b"0123456789").await;
        let err = service
            .validate(&manifest("staging/a.gltf", 10))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "OBJECT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_promote_moves_staging_to_final() {
        let (service, store) = service_with("staging/x/1.0.0/x.gltf", b"0123456789").await;
        let promoted = service
            .promote(&manifest("staging/x/1.0.0/x.gltf", 10))
            .await
            .unwrap();

        assert_eq!(promoted.key, "final/x/1.0.0/x.gltf");
        assert!(store.contains("final/x/1.0.0/x.gltf"));
        assert!(!store.contains("staging/x/1.0.0/x.gltf"));
    }

    #[tokio::test]
    async fn test_promote_replaces_only_first_occurrence() {
        let (service, _) = service_with("staging/nested/staging/y.gltf", b"01").await;
        let promoted = service
            .promote(&manifest("staging/nested/staging/y.gltf", 2))
            .await
            .unwrap();
        assert_eq!(promoted.key, "final/nested/staging/y.gltf");
    }

    #[tokio::test]
    async fn test_promote_missing_source_is_copy_failed() {
        let (service, _) = service_with("staging/present.gltf", b"01").await;
        let err = service
            .promote(&manifest("staging/gone.gltf", 2))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "COPY_FAILED");
    }
}
