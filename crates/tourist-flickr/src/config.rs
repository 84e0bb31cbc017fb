//! Search client configuration.

use serde::{Deserialize, Serialize};

use tourist_core::defaults::{
    FLICKR_API_URL, FLICKR_SEARCH_METHOD, SEARCH_PAGE_SIZE, UPLOAD_WINDOW_DAYS,
};
use tourist_core::{Error, Result};

/// Flickr search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlickrConfig {
    /// API key sent with every request.
    pub api_key: String,
    /// REST endpoint.
    pub api_url: String,
    /// Remote method name.
    pub method: String,
    /// Photos requested in the single result page.
    pub per_page: u32,
    /// Only photos uploaded within this many trailing days are requested.
    pub upload_window_days: i64,
}

impl Default for FlickrConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: FLICKR_API_URL.to_string(),
            method: FLICKR_SEARCH_METHOD.to_string(),
            per_page: SEARCH_PAGE_SIZE,
            upload_window_days: UPLOAD_WINDOW_DAYS,
        }
    }
}

impl FlickrConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Load from environment variables.
    ///
    /// - `FLICKR_API_KEY`: API key (required for real use)
    /// - `FLICKR_API_URL`: endpoint override
    /// - `FLICKR_PER_PAGE`: page size (default: 500)
    /// - `FLICKR_UPLOAD_WINDOW_DAYS`: upload window (default: 365)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("FLICKR_API_KEY").unwrap_or_default(),
            api_url: std::env::var("FLICKR_API_URL").unwrap_or(defaults.api_url),
            method: defaults.method,
            per_page: std::env::var("FLICKR_PER_PAGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.per_page),
            upload_window_days: std::env::var("FLICKR_UPLOAD_WINDOW_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.upload_window_days),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn with_upload_window_days(mut self, days: i64) -> Self {
        self.upload_window_days = days;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config(
                "FLICKR_API_KEY must be set to a non-empty value".to_string(),
            ));
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "Flickr api_url must start with http:// or https://, got: {}",
                self.api_url
            )));
        }
        if self.per_page == 0 || self.per_page > SEARCH_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Flickr per_page must be within 1..={SEARCH_PAGE_SIZE}, got {}",
                self.per_page
            )));
        }
        if self.upload_window_days <= 0 {
            return Err(Error::Config(format!(
                "Flickr upload_window_days must be positive, got {}",
                self.upload_window_days
            )));
        }
        Ok(())
    }
}
