use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::PipelineError;

/// Minimum plausible byte length of a glTF JSON document.
const MIN_DOCUMENT_LEN: usize = 10;

/// The `asset` descriptor every conforming document carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// An image entry. Pixel bytes live either behind an external `uri`
/// reference or inlined as a `data:` URI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Image {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// A texture entry pointing at an image via `source`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Texture {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<usize>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Buffer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(rename = "byteLength", skip_serializing_if = "Option::is_none")]
    pub byte_length: Option<u64>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mesh {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primitives: Vec<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Typed view of the glTF root.
///
/// Every list is an explicit optional-with-empty-default field rather than a
/// runtime capability probe, so a document that omits a list type simply
/// reads as an empty list. Unknown keys are captured in `rest` and survive
/// read-modify-write passes untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GltfRoot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scenes: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meshes: Vec<Mesh>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub materials: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub textures: Vec<Texture>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buffers: Vec<Buffer>,
    #[serde(
        rename = "bufferViews",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub buffer_views: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accessors: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub animations: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skins: Vec<Value>,
    /// Open sidecar metadata slot at the root.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// An in-memory scene document: the parsed root plus a resource map holding
/// raw bytes for any reference not inlined as a data URI.
#[derive(Debug, Clone)]
pub struct SceneDocument {
    pub root: GltfRoot,
    pub resources: HashMap<String, Vec<u8>>,
}

impl SceneDocument {
    /// Decode a JSON document and its associated resource map.
    pub fn read_json(
        json: &str,
        resources: HashMap<String, Vec<u8>>,
    ) -> Result<Self, PipelineError> {
        if json.len() < MIN_DOCUMENT_LEN {
            return Err(PipelineError::InvalidDocument(format!(
                "document too short ({} bytes)",
                json.len()
            )));
        }
        let root: GltfRoot = serde_json::from_str(json)
            .map_err(|e| PipelineError::InvalidDocument(format!("not valid glTF JSON: {e}")))?;
        Ok(Self { root, resources })
    }

    /// Encode back to `{json, resources}`. Resources whose bytes were
    /// consumed by inlining no longer appear in the returned map.
    pub fn write_json(&self) -> Result<(String, HashMap<String, Vec<u8>>), PipelineError> {
        let json = serde_json::to_string(&self.root)
            .map_err(|e| PipelineError::InvalidDocument(format!("encode failed: {e}")))?;
        Ok((json, self.resources.clone()))
    }
}

/// True when a reference embeds its bytes as a self-describing data URI.
pub fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Build a `data:<mime>;base64,<...>` URI from raw bytes.
pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// Pull the MIME type out of a data URI, e.g. `data:image/jpeg;base64,...`.
pub fn sniff_data_uri_mime(uri: &str) -> Option<&str> {
    let rest = uri.strip_prefix("data:")?;
    let end = rest.find([';', ','])?;
    let mime = &rest[..end];
    if mime.is_empty() { None } else { Some(mime) }
}
