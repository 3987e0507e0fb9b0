//! # Application Configuration
//!
//! Credentials, endpoints and paths for a reconciliation run.
//!
//! ## Overview
//!
//! [`AppConfig`] is assembled with [`AppConfigBuilder`], which fills defaults
//! and fails fast with an actionable message when a credential is missing or
//! still set to the placeholder value from the sample configuration.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::AppConfig;
//!
//! let config = AppConfig::builder()
//!     .onedrive_access_token(std::env::var("ONEDRIVE_ACCESS_TOKEN")?)
//!     .immich_base_url("https://pics.example.com")
//!     .immich_api_key(std::env::var("IMMICH_API_KEY")?)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::logging::redact_if_sensitive;
use std::path::PathBuf;

/// Microsoft Graph v1.0 endpoint
pub const DEFAULT_GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Camera roll location inside the user's drive
pub const DEFAULT_CAMERA_ROLL_PATH: &str = "/Pictures/Camera Roll";

/// Page size for Immich metadata search
pub const DEFAULT_IMMICH_PAGE_SIZE: u32 = 500;

/// Immich rejects search pages larger than this
pub const MAX_IMMICH_PAGE_SIZE: u32 = 1000;

/// Cache file, relative to the working directory
pub const DEFAULT_CACHE_FILE: &str = "onedrive_camera_roll_cache.json";

/// Review directory, relative to the working directory
pub const DEFAULT_TARGET_DIR: &str = "immich_missing_files";

const ONEDRIVE_TOKEN_PLACEHOLDER: &str = "YOUR_GRAPH_ACCESS_TOKEN_HERE";
const IMMICH_KEY_PLACEHOLDER: &str = "YOUR_IMMICH_API_KEY_HERE";

/// Configuration for one reconciliation run.
///
/// Use [`AppConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct AppConfig {
    /// Microsoft Graph bearer token
    pub onedrive_access_token: String,

    /// Graph API base URL, without trailing slash
    pub graph_api_base: String,

    /// Drive path of the camera roll folder
    pub camera_roll_path: String,

    /// Immich server URL, without trailing slash
    pub immich_base_url: String,

    /// Immich API key
    pub immich_api_key: String,

    /// Assets requested per Immich search page
    pub immich_page_size: u32,

    /// OneDrive metadata cache file
    pub cache_path: PathBuf,

    /// Directory receiving the collected files
    pub target_dir: PathBuf,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field(
                "onedrive_access_token",
                &redact_if_sensitive("access_token", &self.onedrive_access_token),
            )
            .field("graph_api_base", &self.graph_api_base)
            .field("camera_roll_path", &self.camera_roll_path)
            .field("immich_base_url", &self.immich_base_url)
            .field(
                "immich_api_key",
                &redact_if_sensitive("api_key", &self.immich_api_key),
            )
            .field("immich_page_size", &self.immich_page_size)
            .field("cache_path", &self.cache_path)
            .field("target_dir", &self.target_dir)
            .finish()
    }
}

impl AppConfig {
    /// Creates a new builder for constructing an `AppConfig`.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Both credentials are present and not placeholders
    /// - URLs use http or https
    /// - Page size is within Immich's limits
    /// - Paths are not empty
    pub fn validate(&self) -> Result<()> {
        if self.onedrive_access_token.trim().is_empty() {
            return Err(Error::CapabilityMissing {
                capability: "OneDrive access token".to_string(),
                message: "Set ONEDRIVE_ACCESS_TOKEN (a Microsoft Graph token with Files.Read). \
                          Graph Explorer can issue one for testing."
                    .to_string(),
            });
        }

        if self.onedrive_access_token.contains(ONEDRIVE_TOKEN_PLACEHOLDER) {
            return Err(Error::Config(
                "ONEDRIVE_ACCESS_TOKEN is still the placeholder value".to_string(),
            ));
        }

        if self.immich_api_key.trim().is_empty() {
            return Err(Error::CapabilityMissing {
                capability: "Immich API key".to_string(),
                message: "Set IMMICH_API_KEY (Account Settings > API Keys in the Immich web UI)."
                    .to_string(),
            });
        }

        if self.immich_api_key.contains(IMMICH_KEY_PLACEHOLDER) {
            return Err(Error::Config(
                "IMMICH_API_KEY is still the placeholder value".to_string(),
            ));
        }

        for (name, url) in [
            ("Graph API base URL", &self.graph_api_base),
            ("Immich base URL", &self.immich_base_url),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(Error::Config(format!(
                    "{} must start with http:// or https://, got '{}'",
                    name, url
                )));
            }
        }

        if !self.camera_roll_path.starts_with('/') {
            return Err(Error::Config(format!(
                "Camera roll path must be absolute within the drive, got '{}'",
                self.camera_roll_path
            )));
        }

        if self.immich_page_size == 0 || self.immich_page_size > MAX_IMMICH_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Immich page size must be between 1 and {}, got {}",
                MAX_IMMICH_PAGE_SIZE, self.immich_page_size
            )));
        }

        if self.cache_path.as_os_str().is_empty() {
            return Err(Error::Config("Cache file path cannot be empty".to_string()));
        }

        if self.target_dir.as_os_str().is_empty() {
            return Err(Error::Config("Target directory cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Builder for [`AppConfig`].
#[derive(Default)]
pub struct AppConfigBuilder {
    onedrive_access_token: Option<String>,
    graph_api_base: Option<String>,
    camera_roll_path: Option<String>,
    immich_base_url: Option<String>,
    immich_api_key: Option<String>,
    immich_page_size: Option<u32>,
    cache_path: Option<PathBuf>,
    target_dir: Option<PathBuf>,
}

impl AppConfigBuilder {
    pub fn onedrive_access_token(mut self, token: impl Into<String>) -> Self {
        self.onedrive_access_token = Some(token.into());
        self
    }

    /// Default: [`DEFAULT_GRAPH_API_BASE`]
    pub fn graph_api_base(mut self, url: impl Into<String>) -> Self {
        self.graph_api_base = Some(url.into());
        self
    }

    /// Default: [`DEFAULT_CAMERA_ROLL_PATH`]
    pub fn camera_roll_path(mut self, path: impl Into<String>) -> Self {
        self.camera_roll_path = Some(path.into());
        self
    }

    pub fn immich_base_url(mut self, url: impl Into<String>) -> Self {
        self.immich_base_url = Some(url.into());
        self
    }

    pub fn immich_api_key(mut self, key: impl Into<String>) -> Self {
        self.immich_api_key = Some(key.into());
        self
    }

    /// Default: [`DEFAULT_IMMICH_PAGE_SIZE`]
    pub fn immich_page_size(mut self, size: u32) -> Self {
        self.immich_page_size = Some(size);
        self
    }

    /// Default: [`DEFAULT_CACHE_FILE`]
    pub fn cache_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Default: [`DEFAULT_TARGET_DIR`]
    pub fn target_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.target_dir = Some(path.into());
        self
    }

    /// Builds the final `AppConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the Immich URL or a credential is missing, or if
    /// [`AppConfig::validate`] rejects the assembled values.
    pub fn build(self) -> Result<AppConfig> {
        let immich_base_url = self.immich_base_url.ok_or_else(|| {
            Error::Config(
                "Immich base URL is required. Set IMMICH_BASE_URL or pass --immich-url."
                    .to_string(),
            )
        })?;

        let config = AppConfig {
            onedrive_access_token: self.onedrive_access_token.unwrap_or_default(),
            graph_api_base: trim_trailing_slash(
                self.graph_api_base
                    .unwrap_or_else(|| DEFAULT_GRAPH_API_BASE.to_string()),
            ),
            camera_roll_path: self
                .camera_roll_path
                .unwrap_or_else(|| DEFAULT_CAMERA_ROLL_PATH.to_string()),
            immich_base_url: trim_trailing_slash(immich_base_url),
            immich_api_key: self.immich_api_key.unwrap_or_default(),
            immich_page_size: self.immich_page_size.unwrap_or(DEFAULT_IMMICH_PAGE_SIZE),
            cache_path: self
                .cache_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE)),
            target_dir: self
                .target_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET_DIR)),
        };

        config.validate()?;

        Ok(config)
    }
}

fn trim_trailing_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_builder() -> AppConfigBuilder {
        AppConfig::builder()
            .onedrive_access_token("eyJ0eXAi.token")
            .immich_base_url("https://pics.example.com/")
            .immich_api_key("immich-key")
    }

    #[test]
    fn test_build_with_defaults() {
        let config = complete_builder().build().unwrap();

        assert_eq!(config.graph_api_base, DEFAULT_GRAPH_API_BASE);
        assert_eq!(config.camera_roll_path, DEFAULT_CAMERA_ROLL_PATH);
        assert_eq!(config.immich_base_url, "https://pics.example.com");
        assert_eq!(config.immich_page_size, DEFAULT_IMMICH_PAGE_SIZE);
        assert_eq!(config.cache_path, PathBuf::from(DEFAULT_CACHE_FILE));
        assert_eq!(config.target_dir, PathBuf::from(DEFAULT_TARGET_DIR));
    }

    #[test]
    fn test_builder_requires_immich_url() {
        let result = AppConfig::builder()
            .onedrive_access_token("t")
            .immich_api_key("k")
            .build();

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("IMMICH_BASE_URL")));
    }

    #[test]
    fn test_builder_requires_onedrive_token() {
        let result = AppConfig::builder()
            .immich_base_url("https://pics.example.com")
            .immich_api_key("k")
            .build();

        assert!(matches!(result, Err(Error::CapabilityMissing { .. })));
    }

    #[test]
    fn test_builder_requires_immich_key() {
        let result = AppConfig::builder()
            .onedrive_access_token("t")
            .immich_base_url("https://pics.example.com")
            .build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { capability, .. }) if capability == "Immich API key"
        ));
    }

    #[test]
    fn test_rejects_placeholder_credentials() {
        let result = complete_builder()
            .onedrive_access_token("YOUR_GRAPH_ACCESS_TOKEN_HERE")
            .build();
        assert!(matches!(result, Err(Error::Config(_))));

        let result = complete_builder()
            .immich_api_key("YOUR_IMMICH_API_KEY_HERE")
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_invalid_page_size() {
        assert!(complete_builder().immich_page_size(0).build().is_err());
        assert!(complete_builder().immich_page_size(1001).build().is_err());
        assert!(complete_builder().immich_page_size(1000).build().is_ok());
    }

    #[test]
    fn test_rejects_non_http_url() {
        let result = complete_builder().immich_base_url("pics.example.com").build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Immich base URL")));
    }

    #[test]
    fn test_rejects_relative_camera_roll_path() {
        let result = complete_builder().camera_roll_path("Pictures").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = complete_builder().build().unwrap();
        let rendered = format!("{:?}", config);

        assert!(!rendered.contains("eyJ0eXAi.token"));
        assert!(!rendered.contains("immich-key"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
