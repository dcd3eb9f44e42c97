// Common data models for the extraction pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Minimal metadata fetched by the per-strategy probe, before any transfer
/// is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: String,
    pub duration_seconds: u64,
    pub uploader: String,
}

/// Rich metadata for the info-only path. No artifact is allocated for this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoDetails {
    pub title: String,
    pub uploader: String,
    pub duration_seconds: u64,
    pub view_count: Option<u64>,
    pub upload_date: Option<String>,
    /// First 300 characters of the description
    pub description_excerpt: Option<String>,
    pub thumbnail_url: String,
    pub categories: Vec<String>,
    /// First 10 tags only
    pub tags: Vec<String>,
}

/// Successful extraction result returned to the serving layer.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub title: String,
    pub duration_seconds: u64,
    pub uploader: String,
    pub file_path: PathBuf,
    pub mime_type: &'static str,
    /// Which strategy produced the artifact ("android-music", "external-service", ...)
    pub method: String,
}

/// Diagnostic snapshot of the proxy pool.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyPoolStatus {
    pub total: usize,
    pub usable: Vec<String>,
}

/// MIME type for a downloaded artifact, keyed by extension. Unrecognized
/// extensions default to audio/mpeg.
pub fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("m4a") => "audio/mp4",
        Some("webm") => "audio/webm",
        Some("opus") => "audio/opus",
        _ => "audio/mpeg",
    }
}
