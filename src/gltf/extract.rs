use serde::Serialize;
use std::collections::HashMap;

use crate::error::PipelineError;
use crate::gltf::document::{
    SceneDocument, encode_data_uri, is_data_uri, sniff_data_uri_mime,
};

/// Fallback MIME for inlined buffers; glTF assigns buffers no MIME of their own.
const BUFFER_MIME: &str = "application/octet-stream";
/// Fallback MIME for images that declare none.
const IMAGE_FALLBACK_MIME: &str = "image/png";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetInfo {
    pub generator: Option<String>,
    pub version: Option<String>,
    pub copyright: Option<String>,
}

/// Structural summary of a scene document, used for verification and
/// diagnostics after injection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GltfSummary {
    pub asset: AssetInfo,
    pub scenes: usize,
    pub nodes: usize,
    pub meshes: usize,
    pub primitives: usize,
    pub materials: usize,
    pub textures: usize,
    pub images: usize,
    pub accessors: usize,
    pub animations: usize,
    pub skins: usize,
    pub buffers: usize,
    pub buffer_views: usize,
    /// Sum of declared buffer byte lengths.
    pub total_buffer_bytes: u64,
    /// Histogram of image MIME types, declared or sniffed from data URIs.
    pub mime_types: HashMap<String, u32>,
    /// `Some(true)` iff every buffer is a data URI; `None` when there are no
    /// buffers to check. Tri-state on purpose.
    pub embedded_buffers: Option<bool>,
    /// Same tri-state, over the images list.
    pub embedded_images: Option<bool>,
}

/// Summarize a document's structure and return it alongside a normalized
/// re-encoding of the document.
pub fn extract_metadata(gltf_json: &str) -> Result<(GltfSummary, String), PipelineError> {
    extract_metadata_with_resources(gltf_json, HashMap::new())
}

/// As [`extract_metadata`], additionally inlining any resource whose bytes
/// are supplied in `resources`: buffers become `application/octet-stream`
/// data URIs, images use their declared MIME or an image fallback. Resource
/// keys that match no document reference are logged and dropped, never an
/// error.
pub fn extract_metadata_with_resources(
    gltf_json: &str,
    resources: HashMap<String, Vec<u8>>,
) -> Result<(GltfSummary, String), PipelineError> {
    let mut doc = SceneDocument::read_json(gltf_json, resources)?;
    let summary = summarize(&doc);

    inline_remaining_resources(&mut doc);

    let leftover: Vec<&String> = doc.resources.keys().collect();
    if !leftover.is_empty() {
        tracing::warn!("leftover resources not inlined: {:?}", leftover);
    }

    let (json, _) = doc.write_json()?;
    Ok((summary, json))
}

fn summarize(doc: &SceneDocument) -> GltfSummary {
    let root = &doc.root;

    let asset = root
        .asset
        .as_ref()
        .map(|a| AssetInfo {
            generator: a.generator.clone(),
            version: a.version.clone(),
            copyright: a.copyright.clone(),
        })
        .unwrap_or_default();

    let mut mime_types: HashMap<String, u32> = HashMap::new();
    for image in &root.images {
        let mime = image.mime_type.clone().or_else(|| {
            image
                .uri
                .as_deref()
                .and_then(sniff_data_uri_mime)
                .map(str::to_string)
        });
        if let Some(mime) = mime {
            *mime_types.entry(mime).or_insert(0) += 1;
        }
    }

    let embedded_buffers = embedding_flag(root.buffers.iter().map(|b| b.uri.as_deref()));
    let embedded_images = embedding_flag(root.images.iter().map(|i| i.uri.as_deref()));

    GltfSummary {
        asset,
        scenes: root.scenes.len(),
        nodes: root.nodes.len(),
        meshes: root.meshes.len(),
        primitives: root.meshes.iter().map(|m| m.primitives.len()).sum(),
        materials: root.materials.len(),
        textures: root.textures.len(),
        images: root.images.len(),
        accessors: root.accessors.len(),
        animations: root.animations.len(),
        skins: root.skins.len(),
        buffers: root.buffers.len(),
        buffer_views: root.buffer_views.len(),
        total_buffer_bytes: root.buffers.iter().filter_map(|b| b.byte_length).sum(),
        mime_types,
        embedded_buffers,
        embedded_images,
    }
}

/// `None` for an empty list, otherwise whether every entry is a data URI.
fn embedding_flag<'a>(uris: impl ExactSizeIterator<Item = Option<&'a str>>) -> Option<bool> {
    if uris.len() == 0 {
        return None;
    }
    Some(uris.into_iter().all(|u| u.is_some_and(is_data_uri)))
}

/// Inline every external reference whose bytes the resource map holds.
fn inline_remaining_resources(doc: &mut SceneDocument) {
    for image in &mut doc.root.images {
        let Some(uri) = image.uri.clone() else { continue };
        if is_data_uri(&uri) {
            continue;
        }
        if let Some(bin) = doc.resources.remove(&uri) {
            let mime = image
                .mime_type
                .clone()
                .unwrap_or_else(|| IMAGE_FALLBACK_MIME.to_string());
            image.uri = Some(encode_data_uri(&mime, &bin));
        }
    }

    for buffer in &mut doc.root.buffers {
        let Some(uri) = buffer.uri.clone() else { continue };
        if is_data_uri(&uri) {
            continue;
        }
        if let Some(bin) = doc.resources.remove(&uri) {
            buffer.uri = Some(encode_data_uri(BUFFER_MIME, &bin));
        }
    }
}
