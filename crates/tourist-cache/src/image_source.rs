//! HTTP source for remote image bytes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use tourist_core::{Error, ImageSource, Result};

/// Downloads images with a plain GET.
#[derive(Clone)]
pub struct HttpImageSource {
    client: Client,
}

impl HttpImageSource {
    /// Build a client, optionally with a per-request timeout.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// The underlying transport, for sharing with other HTTP clients.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("image request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network(format!("image host returned {status} for {url}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read image body: {e}")))?;
        tracing::trace!(url, size = bytes.len(), "Image downloaded");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/3_4_t.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let source = HttpImageSource::new(None).unwrap();
        let bytes = source
            .fetch(&format!("{}/2/3_4_t.jpg", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = HttpImageSource::new(Some(Duration::from_secs(5))).unwrap();
        let err = source
            .fetch(&format!("{}/missing.jpg", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(ref m) if m.contains("404")));
    }
}
