//! Cache and download configuration.

use std::path::PathBuf;
use std::time::Duration;

use tourist_core::defaults::{
    CACHE_DIR, DATABASE_FILENAME, DOWNLOAD_MAX_CONCURRENT, JPEG_QUALITY, SAMPLE_SIZE,
};
use tourist_core::{Error, Result};

/// Configuration for the image cache and the coordinator that feeds it.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Flat directory holding every cached image.
    pub cache_dir: PathBuf,
    /// Downloads allowed in flight at once, across all locations.
    pub max_concurrent_downloads: usize,
    /// JPEG quality used for re-encoding (1..=100).
    pub jpeg_quality: u8,
    /// Per-request timeout for searches and image downloads. `None` leaves
    /// the transport default in place.
    pub http_timeout: Option<Duration>,
    /// Photos kept per location per population cycle.
    pub sample_size: usize,
    /// Explicit database URL; defaults to a file inside `cache_dir`.
    pub database_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(CACHE_DIR),
            max_concurrent_downloads: DOWNLOAD_MAX_CONCURRENT,
            jpeg_quality: JPEG_QUALITY,
            http_timeout: None,
            sample_size: SAMPLE_SIZE,
            database_url: None,
        }
    }
}

impl CacheConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TOURIST_CACHE_DIR` | `./tourist-cache` | Image cache directory |
    /// | `TOURIST_MAX_DOWNLOADS` | `6` | Concurrent downloads |
    /// | `TOURIST_JPEG_QUALITY` | `100` | Re-encode quality |
    /// | `TOURIST_HTTP_TIMEOUT_SECS` | unset | HTTP request timeout |
    /// | `TOURIST_DATABASE_URL` | `sqlite://<cache dir>/tourist.db` | Record store |
    pub fn from_env() -> Self {
        let cache_dir = std::env::var("TOURIST_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(CACHE_DIR));

        let max_concurrent_downloads = std::env::var("TOURIST_MAX_DOWNLOADS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DOWNLOAD_MAX_CONCURRENT)
            .max(1);

        let jpeg_quality = std::env::var("TOURIST_JPEG_QUALITY")
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(JPEG_QUALITY);

        let http_timeout = std::env::var("TOURIST_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            cache_dir,
            max_concurrent_downloads,
            jpeg_quality,
            http_timeout,
            sample_size: SAMPLE_SIZE,
            database_url: std::env::var("TOURIST_DATABASE_URL").ok(),
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_downloads = max;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size;
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// The configured database URL, or the default file inside the cache dir.
    pub fn database_url(&self) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            format!(
                "sqlite://{}",
                self.cache_dir.join(DATABASE_FILENAME).display()
            )
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("cache_dir cannot be empty".to_string()));
        }
        if self.max_concurrent_downloads == 0 {
            return Err(Error::Config(
                "max_concurrent_downloads must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.sample_size == 0 {
            return Err(Error::Config("sample_size must be at least 1".to_string()));
        }
        Ok(())
    }
}
