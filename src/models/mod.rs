use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Client-asserted manifest submitted at commit time.
///
/// Must match the object store's authoritative metadata for the same key;
/// any mismatch rejects the commit, it is never silently corrected.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommitManifest {
    /// Object key, expected under the `staging/` prefix.
    pub key: String,
    pub size_bytes: i64,
    /// Asset file name, used to lay out the thumbnail key.
    pub file_name: String,
    /// Semantic version string, e.g. "1.0.0".
    pub version: String,
    /// Opaque user data carried verbatim into the injected metadata.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub user_data: serde_json::Value,
}

/// Authoritative metadata returned by a `head` probe against the store.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Key echoed back from the probe.
    pub key: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
}

/// Unit of work consumed by the render worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailJob {
    pub source_key: String,
    pub thumb_key: String,
    pub width: u32,
    pub height: u32,
    pub version: String,
    #[serde(default)]
    pub user_data: serde_json::Value,
}

/// Result payload of a completed render job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutcome {
    pub status: String,
    pub source_key: String,
    pub thumb_key: String,
    pub width: u32,
    pub height: u32,
    pub byte_count: usize,
}
