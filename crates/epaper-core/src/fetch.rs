//! Retrieval of source PDF bytes

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{EpaperError, Result};

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches over HTTP(S). Non-success status codes are fetch failures.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EpaperError::SourceFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| EpaperError::SourceFetch(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EpaperError::SourceFetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Serves fixed documents by URL and counts requests. Unknown URLs fail like
/// a 404 would.
#[derive(Default)]
pub struct MemoryFetcher {
    documents: HashMap<String, Vec<u8>>,
    requests: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.documents.insert(url.into(), bytes);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| EpaperError::SourceFetch(format!("404 Not Found: {}", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_fetcher_counts_requests() {
        let fetcher = MemoryFetcher::new().with_document("https://a/x.pdf", b"%PDF".to_vec());
        assert_eq!(fetcher.fetch("https://a/x.pdf").await.unwrap(), b"%PDF");
        assert!(matches!(
            fetcher.fetch("https://a/missing.pdf").await,
            Err(EpaperError::SourceFetch(_))
        ));
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn test_http_fetcher_reports_connection_failure() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let err = HttpFetcher::new()
            .fetch("http://127.0.0.1:9/edition.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, EpaperError::SourceFetch(_)));
    }
}
