//! Download orchestration: asset check, fetch, watermark, save
//!
//! Every outcome is reported to the user as a single [`Notice`]. Fetch and
//! parse failures look the same to the user; only the log tells them apart.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{EpaperError, Result};
use crate::fetch::SourceFetcher;
use crate::models::Edition;
use crate::sink::{SaveSink, SavedDownload, WatermarkedOutput};
use crate::watermark::apply_watermark;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeVariant {
    Default,
    Destructive,
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
}

impl Notice {
    pub fn download_unavailable() -> Self {
        Self {
            title: "Download Not Available".into(),
            description: "No PDF is available for this ePaper.".into(),
            variant: NoticeVariant::Destructive,
        }
    }

    pub fn download_started() -> Self {
        Self {
            title: "Download Started".into(),
            description: "Your watermarked ePaper is being downloaded.".into(),
            variant: NoticeVariant::Default,
        }
    }

    pub fn download_failed() -> Self {
        Self {
            title: "Download Failed".into(),
            description: "Unable to download the ePaper. Please try again.".into(),
            variant: NoticeVariant::Destructive,
        }
    }
}

#[derive(Debug)]
pub enum DownloadOutcome {
    Saved(SavedDownload),
    /// The edition has no PDF; nothing was fetched.
    Unavailable,
    Failed(EpaperError),
}

impl DownloadOutcome {
    pub fn notice(&self) -> Notice {
        match self {
            DownloadOutcome::Saved(_) => Notice::download_started(),
            DownloadOutcome::Unavailable => Notice::download_unavailable(),
            DownloadOutcome::Failed(_) => Notice::download_failed(),
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, DownloadOutcome::Saved(_))
    }
}

pub struct DownloadService {
    fetcher: Arc<dyn SourceFetcher>,
}

impl DownloadService {
    pub fn new(fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch and watermark an edition's PDF without saving it.
    pub async fn prepare(
        &self,
        edition: &Edition,
        username: &str,
        timestamp: DateTime<FixedOffset>,
    ) -> Result<WatermarkedOutput> {
        let url = edition
            .primary_pdf_url()
            .ok_or_else(|| EpaperError::DownloadUnavailable(edition.id.clone()))?;

        let source = self.fetcher.fetch(url).await.map_err(|e| {
            warn!("Fetch failed for edition {} ({}): {}", edition.id, url, e);
            e
        })?;

        // Parsing and stamping are CPU-bound; keep them off the async workers.
        let username = username.to_string();
        let stamped =
            tokio::task::spawn_blocking(move || apply_watermark(&source, &username, &timestamp))
                .await
                .map_err(|e| EpaperError::Internal(format!("watermark task failed: {}", e)))?
                .map_err(|e| {
                    warn!("Watermarking failed for edition {}: {}", edition.id, e);
                    e
                })?;

        info!(
            "Watermarked edition {} ({} pages)",
            edition.id,
            stamped.page_count()
        );
        Ok(WatermarkedOutput::new(&edition.id, stamped.bytes))
    }

    /// Full download: nothing is fetched when the edition has no PDF, and the
    /// sink only sees complete output.
    pub async fn download<S>(
        &self,
        edition: &Edition,
        username: &str,
        timestamp: DateTime<FixedOffset>,
        sink: &mut S,
    ) -> DownloadOutcome
    where
        S: SaveSink + Send,
    {
        let output = match self.prepare(edition, username, timestamp).await {
            Ok(output) => output,
            Err(EpaperError::DownloadUnavailable(_)) => {
                info!("Edition {} has no PDF", edition.id);
                return DownloadOutcome::Unavailable;
            }
            Err(e) => return DownloadOutcome::Failed(e),
        };

        match sink.save(output) {
            Ok(saved) => DownloadOutcome::Saved(saved),
            Err(e) => {
                error!("Saving edition {} failed: {}", edition.id, e);
                DownloadOutcome::Failed(e)
            }
        }
    }
}
