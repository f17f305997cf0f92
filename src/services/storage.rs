use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use dashmap::DashMap;

use crate::error::PipelineError;
use crate::models::ObjectMeta;

/// Key-addressed object store contract. Keys are `/`-delimited path strings;
/// the first path segment (`staging/` vs `final/`) marks lifecycle phase.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Metadata probe. The returned meta echoes the probed key.
    async fn head(&self, key: &str) -> Result<ObjectMeta, PipelineError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError>;
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        cache_control: Option<&str>,
    ) -> Result<(), PipelineError>;
    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<(), PipelineError>;
    async fn delete(&self, key: &str) -> Result<(), PipelineError>;
}

/// S3/MinIO-backed store.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head(&self, key: &str) -> Result<ObjectMeta, PipelineError> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(out) => Ok(ObjectMeta {
                key: key.to_string(),
                size_bytes: out.content_length.unwrap_or(0),
                content_type: out.content_type,
            }),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Err(PipelineError::ObjectNotFound(key.to_string()))
                } else {
                    Err(PipelineError::Storage(anyhow::anyhow!(service_error)))
                }
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(out) => {
                let data = out
                    .body
                    .collect()
                    .await
                    .map_err(|e| PipelineError::Storage(anyhow::anyhow!(e)))?
                    .to_vec();
                Ok(data)
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    Err(PipelineError::ObjectNotFound(key.to_string()))
                } else {
                    Err(PipelineError::Storage(anyhow::anyhow!(service_error)))
                }
            }
        }
    }

    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        cache_control: Option<&str>,
    ) -> Result<(), PipelineError> {
        let mut req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type);
        if let Some(cc) = cache_control {
            req = req.cache_control(cc);
        }
        req.send()
            .await
            .map_err(|e| PipelineError::Storage(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<(), PipelineError> {
        let res = self
            .client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, source_key))
            .key(dest_key)
            .send()
            .await;

        if let Err(e) = res {
            tracing::error!(
                "S3 copy_object failed: source={}/{}, dest={}, error={:?}",
                self.bucket,
                source_key,
                dest_key,
                e
            );
            return Err(PipelineError::Storage(anyhow::anyhow!(e)));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| PipelineError::Storage(anyhow::anyhow!(e)))?;
        Ok(())
    }
}

#[derive(Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

/// In-memory store for development and tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, StoredObject>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head(&self, key: &str) -> Result<ObjectMeta, PipelineError> {
        let obj = self
            .objects
            .get(key)
            .ok_or_else(|| PipelineError::ObjectNotFound(key.to_string()))?;
        Ok(ObjectMeta {
            key: key.to_string(),
            size_bytes: obj.data.len() as i64,
            content_type: Some(obj.content_type.clone()),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        self.objects
            .get(key)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| PipelineError::ObjectNotFound(key.to_string()))
    }

    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        _cache_control: Option<&str>,
    ) -> Result<(), PipelineError> {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<(), PipelineError> {
        let obj = self
            .objects
            .get(source_key)
            .map(|o| o.clone())
            .ok_or_else(|| PipelineError::ObjectNotFound(source_key.to_string()))?;
        self.objects.insert(dest_key.to_string(), obj);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        self.objects.remove(key);
        Ok(())
    }
}
