//! Command-line interface

use bridge_traits::LogLevel;
use clap::{ArgAction, Parser};
use core_reconcile::ReconcileConfig;
use core_runtime::config::{
    AppConfig, DEFAULT_CACHE_FILE, DEFAULT_CAMERA_ROLL_PATH, DEFAULT_GRAPH_API_BASE,
    DEFAULT_IMMICH_PAGE_SIZE, DEFAULT_TARGET_DIR,
};
use core_runtime::logging::{LogFormat, LoggingConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Find OneDrive camera-roll files missing from Immich and download them for review
#[derive(Parser, Debug)]
#[command(name = "immich-onedrive-diff", version)]
pub struct Cli {
    /// Ignore the cached OneDrive inventory and list the camera roll again
    #[arg(long)]
    pub refresh_onedrive: bool,

    /// Microsoft Graph bearer token with Files.Read
    #[arg(long, env = "ONEDRIVE_ACCESS_TOKEN", hide_env_values = true)]
    pub onedrive_token: Option<String>,

    #[arg(long, env = "GRAPH_API_BASE", default_value = DEFAULT_GRAPH_API_BASE)]
    pub graph_api_base: String,

    /// Camera roll folder, relative to the drive root
    #[arg(long, env = "ONEDRIVE_CAMERA_ROLL_PATH", default_value = DEFAULT_CAMERA_ROLL_PATH)]
    pub camera_roll_path: String,

    /// Immich server URL, e.g. https://pics.example.com
    #[arg(long, env = "IMMICH_BASE_URL")]
    pub immich_url: Option<String>,

    #[arg(long, env = "IMMICH_API_KEY", hide_env_values = true)]
    pub immich_api_key: Option<String>,

    /// Assets per Immich search page
    #[arg(long, env = "IMMICH_PAGE_SIZE", default_value_t = DEFAULT_IMMICH_PAGE_SIZE)]
    pub immich_page_size: u32,

    /// OneDrive inventory cache
    #[arg(long, default_value = DEFAULT_CACHE_FILE)]
    pub cache_file: PathBuf,

    /// Where missing files are downloaded
    #[arg(long, default_value = DEFAULT_TARGET_DIR)]
    pub target_dir: PathBuf,

    /// Simultaneous downloads
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Allowed capture-time difference when matching by name and size
    #[arg(long, default_value_t = 2)]
    pub timestamp_tolerance_secs: u64,

    /// Give up on a download that receives nothing for this many seconds
    #[arg(long, default_value_t = 60)]
    pub download_idle_timeout_secs: u64,

    /// Also treat any Immich asset with the same filename as a match
    #[arg(long)]
    pub match_filename_only: bool,

    /// List missing files without downloading anything
    #[arg(long)]
    pub dry_run: bool,

    /// Download without asking for confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Log output format: pretty, json or compact
    #[arg(long, default_value = "compact")]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn app_config(&self) -> core_runtime::Result<AppConfig> {
        let mut builder = AppConfig::builder()
            .graph_api_base(&self.graph_api_base)
            .camera_roll_path(&self.camera_roll_path)
            .immich_page_size(self.immich_page_size)
            .cache_path(&self.cache_file)
            .target_dir(&self.target_dir);

        if let Some(token) = &self.onedrive_token {
            builder = builder.onedrive_access_token(token);
        }
        if let Some(url) = &self.immich_url {
            builder = builder.immich_base_url(url);
        }
        if let Some(key) = &self.immich_api_key {
            builder = builder.immich_api_key(key);
        }

        builder.build()
    }

    pub fn reconcile_config(&self, app: &AppConfig) -> ReconcileConfig {
        ReconcileConfig {
            refresh_onedrive: self.refresh_onedrive,
            target_dir: app.target_dir.clone(),
            max_concurrent_downloads: self.concurrency,
            timestamp_tolerance: Duration::from_secs(self.timestamp_tolerance_secs),
            match_filename_only: self.match_filename_only,
            download_idle_timeout: Duration::from_secs(self.download_idle_timeout_secs),
        }
    }

    /// `RUST_LOG`, when set, overrides the verbosity flags
    pub fn logging_config(&self, rust_log: Option<String>) -> LoggingConfig {
        let level = match self.verbose {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        };

        let config = LoggingConfig::default()
            .with_format(self.log_format)
            .with_level(level);

        match rust_log.filter(|f| !f.trim().is_empty()) {
            Some(filter) => config.with_filter(filter),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec![
            "immich-onedrive-diff",
            "--onedrive-token",
            "graph-token",
            "--immich-url",
            "https://pics.example.com",
            "--immich-api-key",
            "immich-key",
        ];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_command_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);

        assert!(!cli.refresh_onedrive);
        assert!(!cli.dry_run);
        assert!(!cli.yes);
        assert_eq!(cli.concurrency, 4);
        assert_eq!(cli.timestamp_tolerance_secs, 2);
        assert_eq!(cli.download_idle_timeout_secs, 60);
        assert_eq!(cli.cache_file, PathBuf::from("onedrive_camera_roll_cache.json"));
        assert_eq!(cli.target_dir, PathBuf::from("immich_missing_files"));
        assert_eq!(cli.log_format, LogFormat::Compact);
    }

    #[test]
    fn test_flags_reach_configs() {
        let cli = parse(&[
            "--refresh-onedrive",
            "--target-dir",
            "review",
            "--concurrency",
            "8",
            "--timestamp-tolerance-secs",
            "5",
            "--match-filename-only",
            "--immich-page-size",
            "250",
            "--download-idle-timeout-secs",
            "300",
        ]);

        let app = cli.app_config().unwrap();
        assert_eq!(app.immich_page_size, 250);
        assert_eq!(app.target_dir, PathBuf::from("review"));

        let reconcile = cli.reconcile_config(&app);
        assert!(reconcile.refresh_onedrive);
        assert!(reconcile.match_filename_only);
        assert_eq!(reconcile.max_concurrent_downloads, 8);
        assert_eq!(reconcile.timestamp_tolerance, Duration::from_secs(5));
        assert_eq!(reconcile.target_dir, PathBuf::from("review"));
        assert_eq!(reconcile.download_idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_placeholder_token_is_rejected() {
        let cli = Cli::try_parse_from([
            "immich-onedrive-diff",
            "--onedrive-token",
            "YOUR_GRAPH_ACCESS_TOKEN_HERE",
            "--immich-url",
            "https://pics.example.com",
            "--immich-api-key",
            "immich-key",
        ])
        .unwrap();
        assert!(cli.app_config().is_err());
    }

    #[test]
    fn test_logging_config() {
        let cli = parse(&["-vv", "--log-format", "json"]);
        let config = cli.logging_config(None);
        assert_eq!(config.level, LogLevel::Trace);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, None);

        let config = parse(&[]).logging_config(Some("core_reconcile=debug".to_string()));
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.filter.as_deref(), Some("core_reconcile=debug"));

        assert!(Cli::try_parse_from(["immich-onedrive-diff", "--log-format", "xml"]).is_err());
    }
}
