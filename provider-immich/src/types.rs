//! Immich API request and response types

use serde::{Deserialize, Serialize};

/// Body of `POST /api/search/metadata`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSearchRequest {
    pub page: u32,
    pub size: u32,
    pub with_exif: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub assets: AssetPage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPage {
    #[serde(default)]
    pub items: Vec<Asset>,

    /// Page number as a string, `null` on the last page
    pub next_page: Option<serde_json::Value>,

    pub total: Option<u64>,
}

/// Immich asset, trimmed to the fields used for matching
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub original_file_name: Option<String>,
    /// Older servers
    pub file_name: Option<String>,
    pub original_path: Option<String>,
    /// Base64 SHA-1 of the original file
    pub checksum: Option<String>,
    /// RFC 3339
    pub file_created_at: Option<String>,
    pub exif_info: Option<ExifInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExifInfo {
    pub file_size_in_byte: Option<u64>,
    /// RFC 3339
    pub date_time_original: Option<String>,
}

/// Immich error envelope
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub message: Option<serde_json::Value>,
    pub error: Option<String>,
}
