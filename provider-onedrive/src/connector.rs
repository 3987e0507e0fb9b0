//! Microsoft Graph connector implementation
//!
//! Implements the `OneDriveSource` trait for the OneDrive camera roll.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::{
    ByteStream, Clock, DownloadRef, Inventory, InventoryOrigin, MediaRecord, OneDriveSource,
    SystemClock,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{OneDriveError, Result};
use crate::types::{ChildrenPage, DriveItem, GraphErrorBody};

/// Microsoft Graph v1.0 endpoint
pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Where the OneDrive mobile apps upload photos
pub const DEFAULT_CAMERA_ROLL_PATH: &str = "/Pictures/Camera Roll";

const LIST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ERROR_BODY_CHARS: usize = 300;

/// OneDrive camera-roll connector
///
/// # Example
///
/// ```ignore
/// use provider_onedrive::OneDriveConnector;
/// use bridge_traits::OneDriveSource;
///
/// let connector = OneDriveConnector::new(http_client, access_token);
/// let inventory = connector.list_camera_roll().await?;
/// ```
pub struct OneDriveConnector {
    http_client: Arc<dyn HttpClient>,
    access_token: String,
    graph_api_base: String,
    camera_roll_path: String,
    clock: Arc<dyn Clock>,
}

impl OneDriveConnector {
    /// Create a connector for the default camera roll
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `access_token` - Graph bearer token with `Files.Read`
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: impl Into<String>) -> Self {
        Self {
            http_client,
            access_token: access_token.into(),
            graph_api_base: GRAPH_API_BASE.to_string(),
            camera_roll_path: DEFAULT_CAMERA_ROLL_PATH.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_graph_api_base(mut self, base: impl Into<String>) -> Self {
        self.graph_api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Folder to list, relative to the drive root (e.g. `/Pictures/Camera Roll`)
    pub fn with_camera_roll_path(mut self, path: impl Into<String>) -> Self {
        self.camera_roll_path = path.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// First page of the camera-roll listing
    fn children_url(&self) -> String {
        let encoded: Vec<String> = self
            .camera_roll_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();

        format!(
            "{}/me/drive/root:/{}:/children",
            self.graph_api_base,
            encoded.join("/")
        )
    }

    fn content_url(&self, item_id: &str) -> String {
        format!(
            "{}/me/drive/items/{}/content",
            self.graph_api_base,
            urlencoding::encode(item_id)
        )
    }

    /// Parse an RFC 3339 timestamp, ignoring malformed values
    fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
        value
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Capture time: EXIF taken time, else filesystem mtime, else item mtime
    fn captured_at(item: &DriveItem) -> Option<DateTime<Utc>> {
        let taken = item.photo.as_ref().and_then(|p| p.taken_date_time.as_deref());
        let fs_modified = item
            .file_system_info
            .as_ref()
            .and_then(|f| f.last_modified_date_time.as_deref());

        Self::parse_timestamp(taken)
            .or_else(|| Self::parse_timestamp(fs_modified))
            .or_else(|| Self::parse_timestamp(item.last_modified_date_time.as_deref()))
    }

    /// Convert a drive item to a media record; folders yield `None`
    fn convert_item(item: DriveItem) -> Option<MediaRecord> {
        if !item.is_file() {
            return None;
        }

        let captured_at = Self::captured_at(&item);
        let sha1 = item
            .file
            .as_ref()
            .and_then(|f| f.hashes.as_ref())
            .and_then(|h| h.sha1_hash.clone());

        let mut record = MediaRecord::new(item.id.clone(), item.name)
            .with_download_ref(DownloadRef::new(item.id));
        if let Some(size) = item.size {
            record = record.with_size(size);
        }
        if let Some(captured_at) = captured_at {
            record = record.with_captured_at(captured_at);
        }
        if let Some(sha1) = sha1 {
            record = record.with_content_hash(sha1);
        }
        Some(record)
    }

    /// Map a non-success response to a provider error
    fn status_error(&self, response: &HttpResponse) -> OneDriveError {
        let message = response
            .json::<GraphErrorBody>()
            .ok()
            .and_then(|body| match (body.error.code, body.error.message) {
                (Some(code), Some(message)) => Some(format!("{}: {}", code, message)),
                (code, message) => code.or(message),
            })
            .unwrap_or_else(|| response.text_lossy().chars().take(MAX_ERROR_BODY_CHARS).collect());

        match response.status {
            401 => OneDriveError::AuthenticationFailed(format!(
                "{} (the access token may have expired)",
                message
            )),
            404 => OneDriveError::CameraRollNotFound {
                path: self.camera_roll_path.clone(),
            },
            status_code => OneDriveError::ApiError {
                status_code,
                message,
            },
        }
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn fetch_page(&self, url: &str) -> Result<ChildrenPage> {
        let request = HttpRequest::new(HttpMethod::Get, url)
            .bearer_token(&self.access_token)
            .header("Accept", "application/json")
            .timeout(LIST_TIMEOUT);

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            let error = self.status_error(&response);
            warn!(status = response.status, error = %error, "Graph listing failed");
            return Err(error);
        }

        serde_json::from_slice(&response.body).map_err(|e| {
            OneDriveError::ParseError(format!("Failed to parse children page: {}", e))
        })
    }

    async fn list_all(&self) -> Result<Inventory> {
        let mut next = Some(self.children_url());
        let mut visited = HashSet::new();
        let mut records = Vec::new();
        let mut folders = 0usize;
        let mut page_count = 0usize;

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                return Err(OneDriveError::PaginationLoop(url));
            }

            page_count += 1;
            let page = self.fetch_page(&url).await?;
            debug!(page = page_count, items = page.value.len(), "Fetched Graph page");

            for item in page.value {
                match Self::convert_item(item) {
                    Some(record) => records.push(record),
                    None => folders += 1,
                }
            }

            next = page.next_link;
        }

        info!(
            files = records.len(),
            folders_skipped = folders,
            pages = page_count,
            "Listed OneDrive camera roll"
        );

        Ok(Inventory::new(
            InventoryOrigin::OneDrive,
            self.clock.now(),
            records,
        )?)
    }
}

#[async_trait]
impl OneDriveSource for OneDriveConnector {
    #[instrument(skip(self), fields(path = %self.camera_roll_path))]
    async fn list_camera_roll(&self) -> BridgeResult<Inventory> {
        info!("Listing OneDrive camera roll");
        Ok(self.list_all().await?)
    }

    #[instrument(skip(self), fields(item_id = %download_ref))]
    async fn download(&self, download_ref: &DownloadRef) -> BridgeResult<ByteStream> {
        debug!("Starting OneDrive download");

        // Graph answers with a 302 to a pre-authenticated URL; the HTTP
        // client follows it.
        let request = HttpRequest::new(HttpMethod::Get, self.content_url(download_ref.as_str()))
            .bearer_token(&self.access_token);

        self.http_client.download_stream(request).await
    }
}
