//! Immich API connector implementation
//!
//! Implements the `ImmichSource` trait over `POST /api/search/metadata`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::media::normalize_sha1_hex;
use bridge_traits::{Clock, ImmichSource, Inventory, InventoryOrigin, MediaRecord, SystemClock};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{ImmichError, Result};
use crate::types::{Asset, ErrorBody, MetadataSearchRequest, SearchResponse};

/// Assets requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 500;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);
const PROGRESS_INTERVAL_PAGES: u32 = 10;

/// Immich library connector
///
/// # Example
///
/// ```ignore
/// use provider_immich::ImmichConnector;
/// use bridge_traits::ImmichSource;
///
/// let connector = ImmichConnector::new(http_client, "https://pics.example.com", api_key);
/// let inventory = connector.list_library().await?;
/// ```
pub struct ImmichConnector {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    api_key: String,
    page_size: u32,
    clock: Arc<dyn Clock>,
}

impl ImmichConnector {
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `base_url` - Server root, without the `/api` suffix
    /// * `api_key` - Key sent as `x-api-key`
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            page_size: DEFAULT_PAGE_SIZE,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn search_url(&self) -> String {
        format!("{}/api/search/metadata", self.base_url)
    }

    fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
        value
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Immich checksums are base64 SHA-1; a few deployments report hex
    fn checksum_to_hex(checksum: &str) -> Option<String> {
        if let Some(hex) = normalize_sha1_hex(checksum) {
            return Some(hex);
        }
        BASE64
            .decode(checksum.trim())
            .ok()
            .filter(|bytes| bytes.len() == 20)
            .map(hex::encode)
    }

    /// Display name: original name, else legacy name, else tail of the path
    fn filename(asset: &Asset) -> Option<String> {
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());

        non_empty(&asset.original_file_name)
            .or_else(|| non_empty(&asset.file_name))
            .or_else(|| {
                asset
                    .original_path
                    .as_deref()
                    .and_then(|path| path.rsplit(['/', '\\']).next())
                    .filter(|tail| !tail.is_empty())
                    .map(str::to_string)
            })
    }

    /// Convert an asset to a media record; assets without any name yield `None`
    fn convert_asset(asset: Asset) -> Option<MediaRecord> {
        let Some(filename) = Self::filename(&asset) else {
            warn!(asset_id = %asset.id, "Skipping Immich asset without a filename");
            return None;
        };

        let exif = asset.exif_info.as_ref();
        let size = exif.and_then(|e| e.file_size_in_byte);
        let captured_at =
            Self::parse_timestamp(exif.and_then(|e| e.date_time_original.as_deref()))
                .or_else(|| Self::parse_timestamp(asset.file_created_at.as_deref()));
        let hash = asset.checksum.as_deref().and_then(Self::checksum_to_hex);

        let mut record = MediaRecord::new(asset.id, filename);
        if let Some(size) = size {
            record = record.with_size(size);
        }
        if let Some(captured_at) = captured_at {
            record = record.with_captured_at(captured_at);
        }
        if let Some(hash) = hash {
            record = record.with_content_hash(hash);
        }
        Some(record)
    }

    /// `nextPage` is documented as a numeric string; fall back to `page + 1`
    /// when it is present but unreadable.
    fn next_page(current: u32, next: Option<&serde_json::Value>) -> Option<u32> {
        let next = next?;
        match next {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(s.trim().parse().unwrap_or(current + 1)),
            serde_json::Value::Number(n) => {
                Some(n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(current + 1))
            }
            _ => Some(current + 1),
        }
    }

    fn status_error(response: &HttpResponse) -> ImmichError {
        let message = response
            .json::<ErrorBody>()
            .ok()
            .and_then(|body| match body.message {
                Some(serde_json::Value::String(m)) => Some(m),
                Some(serde_json::Value::Array(items)) => Some(
                    items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                        .collect::<Vec<_>>()
                        .join("; "),
                ),
                _ => body.error,
            })
            .unwrap_or_else(|| response.text_lossy().chars().take(300).collect());

        match response.status {
            401 | 403 => ImmichError::AuthenticationFailed(message),
            status_code => ImmichError::ApiError {
                status_code,
                message,
            },
        }
    }

    #[instrument(skip(self))]
    async fn fetch_page(&self, page: u32) -> Result<SearchResponse> {
        let request = HttpRequest::new(HttpMethod::Post, self.search_url())
            .api_key(&self.api_key)
            .header("Accept", "application/json")
            .json(&MetadataSearchRequest {
                page,
                size: self.page_size,
                with_exif: true,
            })?
            .timeout(SEARCH_TIMEOUT);

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            let error = Self::status_error(&response);
            warn!(status = response.status, error = %error, "Immich search failed");
            return Err(error);
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| ImmichError::ParseError(format!("Failed to parse search page {}: {}", page, e)))
    }

    async fn list_all(&self) -> Result<Inventory> {
        let mut records = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut visited_pages = HashSet::new();
        let mut duplicates = 0usize;
        let mut page = 1u32;

        loop {
            if !visited_pages.insert(page) {
                return Err(ImmichError::PaginationLoop(page));
            }

            let response = self.fetch_page(page).await?;
            let block = response.assets;
            if block.items.is_empty() {
                break;
            }

            debug!(page, items = block.items.len(), "Fetched Immich page");
            for asset in block.items {
                // Pages shift when assets are uploaded mid-listing.
                if !seen_ids.insert(asset.id.clone()) {
                    duplicates += 1;
                    continue;
                }
                if let Some(record) = Self::convert_asset(asset) {
                    records.push(record);
                }
            }

            if visited_pages.len() as u32 % PROGRESS_INTERVAL_PAGES == 0 {
                info!("Fetched {} Immich assets so far", records.len());
            }

            match Self::next_page(page, block.next_page.as_ref()) {
                Some(next) => page = next,
                None => break,
            }
        }

        if duplicates > 0 {
            warn!(duplicates, "Immich returned the same asset on several pages");
        }
        info!(
            assets = records.len(),
            pages = visited_pages.len(),
            "Listed Immich library"
        );

        Ok(Inventory::new(
            InventoryOrigin::Immich,
            self.clock.now(),
            records,
        )?)
    }
}

#[async_trait]
impl ImmichSource for ImmichConnector {
    #[instrument(skip(self), fields(base_url = %self.base_url, page_size = self.page_size))]
    async fn list_library(&self) -> BridgeResult<Inventory> {
        info!("Listing Immich library");
        Ok(self.list_all().await?)
    }
}
