//! Handles for in-flight image downloads.

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::error;
use uuid::Uuid;

use tourist_core::Result;

use crate::image_cache::FetchOutcome;

/// Downloads spawned for one location.
///
/// Dropping the batch detaches the downloads; they keep running and update
/// the store on completion. [`wait`](Self::wait) collects their outcomes.
#[derive(Debug)]
pub struct DownloadBatch {
    location_id: Uuid,
    handles: Vec<(String, JoinHandle<Result<FetchOutcome>>)>,
}

/// Outcome counts of a finished [`DownloadBatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub materialized: usize,
    pub discarded: usize,
    /// Keys of photos whose download failed and remain unmaterialized.
    pub failed: Vec<String>,
}

impl DownloadSummary {
    pub fn total(&self) -> usize {
        self.materialized + self.discarded + self.failed.len()
    }
}

impl DownloadBatch {
    pub(crate) fn new(location_id: Uuid) -> Self {
        Self {
            location_id,
            handles: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, photo_key: String, handle: JoinHandle<Result<FetchOutcome>>) {
        self.handles.push((photo_key, handle));
    }

    pub fn location_id(&self) -> Uuid {
        self.location_id
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every download to finish.
    pub async fn wait(self) -> DownloadSummary {
        let (keys, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut summary = DownloadSummary::default();
        for (photo_key, result) in keys.into_iter().zip(results) {
            match result {
                Ok(Ok(FetchOutcome::Materialized)) => summary.materialized += 1,
                Ok(Ok(FetchOutcome::Discarded)) => summary.discarded += 1,
                Ok(Err(_)) => summary.failed.push(photo_key),
                Err(e) => {
                    error!(
                        location_id = %self.location_id,
                        photo_key = %photo_key,
                        error = ?e,
                        "Download task panicked"
                    );
                    summary.failed.push(photo_key);
                }
            }
        }
        summary
    }
}
