//! Flickr `photos.search` client.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use tourist_core::{Error, PhotoFields, PhotoSearch, Result};

use crate::config::FlickrConfig;

/// HTTP client for geographic photo search.
#[derive(Clone)]
pub struct FlickrClient {
    client: Client,
    config: FlickrConfig,
}

impl FlickrClient {
    /// Create a client with a default HTTP transport.
    pub fn new(config: FlickrConfig) -> Result<Self> {
        Self::with_http_client(config, Client::new())
    }

    /// Create a client sharing an existing HTTP transport.
    pub fn with_http_client(config: FlickrConfig, client: Client) -> Result<Self> {
        config.validate()?;
        info!(
            api_url = %config.api_url,
            per_page = config.per_page,
            upload_window_days = config.upload_window_days,
            "Initializing Flickr search client"
        );
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(FlickrConfig::from_env())
    }

    pub fn config(&self) -> &FlickrConfig {
        &self.config
    }

    /// Request URL for a search around the coordinate, with the upload window
    /// measured back from `now`.
    pub fn search_url(&self, latitude: f64, longitude: f64, now: DateTime<Utc>) -> Result<Url> {
        let min_upload_date = now - Duration::days(self.config.upload_window_days);
        let params = [
            ("method", self.config.method.clone()),
            ("api_key", self.config.api_key.clone()),
            ("format", "json".to_string()),
            ("nojsoncallback", "1".to_string()),
            ("per_page", self.config.per_page.to_string()),
            ("min_upload_date", min_upload_date.timestamp().to_string()),
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
        ];
        Url::parse_with_params(&self.config.api_url, &params)
            .map_err(|e| Error::Config(format!("invalid Flickr api_url: {e}")))
    }
}

/// Extract photo identity fields from a search response body.
///
/// Entries missing an identity field or carrying unsafe characters are
/// skipped. A `photos` container with no entries yields an empty list.
pub fn parse_search_response(body: &str) -> Result<Vec<PhotoFields>> {
    let json: Value = serde_json::from_str(body)?;

    if json.get("stat").and_then(Value::as_str) == Some("fail") {
        let code = json.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = json
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(Error::Parse(format!("Flickr API error {code}: {message}")));
    }

    let photos = json
        .get("photos")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Parse("response has no 'photos' container".to_string()))?;
    let items = photos
        .get("photo")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Parse("'photos' container has no 'photo' array".to_string()))?;

    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let fields = match PhotoFields::deserialize(item) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed photo entry");
                continue;
            }
        };
        if let Err(e) = fields.validate() {
            warn!(index, error = %e, "Skipping photo entry with unsafe fields");
            continue;
        }
        results.push(fields);
    }

    debug!(
        received = items.len(),
        accepted = results.len(),
        "Parsed search response"
    );
    Ok(results)
}

#[async_trait]
impl PhotoSearch for FlickrClient {
    async fn search(&self, latitude: f64, longitude: f64) -> Result<Vec<PhotoFields>> {
        let start = Instant::now();
        let url = self.search_url(latitude, longitude, Utc::now())?;

        debug!(latitude, longitude, "Searching photos");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("search request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Network(format!(
                "Flickr returned {status}: {body}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read search response: {e}")))?;
        let results = parse_search_response(&body)?;

        info!(
            latitude,
            longitude,
            result_count = results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Photo search complete"
        );
        Ok(results)
    }
}
