//! Scene document codec plus the metadata injector/extractor built on it.
//!
//! Everything in this module is pure: documents come in as JSON text (with an
//! optional resource map for externally referenced bytes) and go out the same
//! way. No I/O happens here.

pub mod document;
pub mod extract;
pub mod inject;

pub use document::SceneDocument;
pub use extract::{GltfSummary, extract_metadata, extract_metadata_with_resources};
pub use inject::{InjectParams, THUMBNAIL_TEXTURE_NAME, inject_metadata};
