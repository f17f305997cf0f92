use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;

use crate::error::PipelineError;
use crate::gltf::document::{Image, SceneDocument, Texture, encode_data_uri};

/// Sentinel name identifying the injected thumbnail texture.
pub const THUMBNAIL_TEXTURE_NAME: &str = "__es_thumbnail__";

const THUMBNAIL_MIME: &str = "image/jpeg";

pub struct InjectParams<'a> {
    /// glTF JSON text (embedded-resource form expected).
    pub gltf_json: &'a str,
    /// JPEG thumbnail bytes.
    pub thumb_jpeg: &'a [u8],
    /// Semantic version string, e.g. "1.0.0".
    pub version: &'a str,
    /// Upload timestamp; `None` means "now".
    pub uploaded_at: Option<DateTime<Utc>>,
    /// Opaque user data, carried verbatim.
    pub user_data: &'a Value,
}

/// Embed a thumbnail plus version/user metadata into a glTF document and
/// return the new document string.
///
/// The thumbnail lands as a data URI on a sentinel-named texture's image, so
/// no entry for it ever appears in the resource map and the encode step needs
/// no special-casing. Re-injecting replaces the sentinel texture in place.
/// Root extras gain `esThumb`, `esMeta` and `esUserData`; every other extras
/// key is preserved.
pub fn inject_metadata(params: InjectParams<'_>) -> Result<String, PipelineError> {
    if params.thumb_jpeg.is_empty() {
        return Err(PipelineError::InvalidDocument(
            "thumbnail bytes are empty".to_string(),
        ));
    }

    let mut doc = SceneDocument::read_json(params.gltf_json, HashMap::new())?;
    let data_uri = encode_data_uri(THUMBNAIL_MIME, params.thumb_jpeg);

    let texture_index = upsert_thumbnail_texture(&mut doc, data_uri);

    let uploaded_at = params.uploaded_at.unwrap_or_else(Utc::now);
    let root = &mut doc.root;
    root.extras.insert(
        "esThumb".to_string(),
        json!({ "textureIndex": texture_index, "mimeType": THUMBNAIL_MIME }),
    );
    root.extras.insert(
        "esMeta".to_string(),
        json!({
            "version": params.version,
            "uploadedAt": uploaded_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }),
    );
    root.extras
        .insert("esUserData".to_string(), params.user_data.clone());

    let (json, _) = doc.write_json()?;
    Ok(json)
}

/// Find-or-create the sentinel texture and point it at an image holding the
/// thumbnail data URI. Returns the texture's index.
fn upsert_thumbnail_texture(doc: &mut SceneDocument, data_uri: String) -> usize {
    let root = &mut doc.root;

    let existing = root
        .textures
        .iter()
        .position(|t| t.name.as_deref() == Some(THUMBNAIL_TEXTURE_NAME));

    if let Some(texture_index) = existing {
        // Reuse the texture's image slot when it has one, otherwise give it one.
        let image_index = match root.textures[texture_index].source {
            Some(i) if i < root.images.len() => i,
            _ => {
                root.images.push(Image::default());
                let i = root.images.len() - 1;
                root.textures[texture_index].source = Some(i);
                i
            }
        };
        let image = &mut root.images[image_index];
        image.name = Some(THUMBNAIL_TEXTURE_NAME.to_string());
        image.uri = Some(data_uri);
        image.mime_type = Some(THUMBNAIL_MIME.to_string());
        texture_index
    } else {
        root.images.push(Image {
            name: Some(THUMBNAIL_TEXTURE_NAME.to_string()),
            uri: Some(data_uri),
            mime_type: Some(THUMBNAIL_MIME.to_string()),
            rest: Default::default(),
        });
        root.textures.push(Texture {
            name: Some(THUMBNAIL_TEXTURE_NAME.to_string()),
            source: Some(root.images.len() - 1),
            rest: Default::default(),
        });
        root.textures.len() - 1
    }
}
