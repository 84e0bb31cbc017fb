//! Core traits for the photo cache.
//!
//! These traits define the seams between the coordinator and its
//! collaborators, so remote services and storage can be swapped in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::StoreEnvelope;
use crate::models::*;

// =============================================================================
// REMOTE SERVICES
// =============================================================================

/// Geographic photo search.
#[async_trait]
pub trait PhotoSearch: Send + Sync {
    /// Identity fields of photos taken near the coordinate. An empty result
    /// is not an error.
    async fn search(&self, latitude: f64, longitude: f64) -> Result<Vec<PhotoFields>>;
}

/// Source of raw image bytes.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// GET the full payload at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

// =============================================================================
// PHOTO REPOSITORY
// =============================================================================

/// Photo records scoped by owning location, with change notifications.
///
/// Every mutation and its notification are committed atomically with respect
/// to other mutations on the same store.
#[async_trait]
pub trait PhotoRepository: Send + Sync {
    /// Insert an unmaterialized photo and emit `Inserted`.
    ///
    /// Fails with `Conflict` if the location already owns the same remote photo.
    async fn create(&self, location: &Location, fields: PhotoFields) -> Result<Photo>;

    /// Set `materialized` and emit `Updated`, even if it was already set.
    ///
    /// Fails with `NotFound` if the record no longer exists.
    async fn mark_materialized(&self, photo: &Photo) -> Result<Photo>;

    /// Remove the record and emit `Deleted`. Returns false if it was already gone.
    async fn delete(&self, photo: &Photo) -> Result<bool>;

    /// All photos of a location, ordered by local filename descending.
    async fn query(&self, location_id: Uuid) -> Result<Vec<Photo>>;

    /// A single photo by owning location and key.
    async fn get(&self, location_id: Uuid, key: &str) -> Result<Option<Photo>>;

    async fn exists(&self, photo: &Photo) -> Result<bool>;

    /// Records across all locations pointing at `filename`.
    async fn count_by_filename(&self, filename: &str) -> Result<i64>;

    async fn count_for_location(&self, location_id: Uuid) -> Result<i64>;

    /// Subscribe to committed changes, in commit order.
    fn subscribe(&self) -> broadcast::Receiver<StoreEnvelope>;
}

// =============================================================================
// LOCATION REPOSITORY
// =============================================================================

/// Request for creating a location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateLocationRequest {
    pub title: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Repository for locations.
#[async_trait]
pub trait LocationRepository: Send + Sync {
    /// Validate coordinates and insert a new location.
    async fn create(&self, req: CreateLocationRequest) -> Result<Location>;

    async fn get(&self, id: Uuid) -> Result<Option<Location>>;

    /// Like [`get`](Self::get) but fails with `LocationNotFound`.
    async fn fetch(&self, id: Uuid) -> Result<Location> {
        self.get(id).await?.ok_or(Error::LocationNotFound(id))
    }

    /// All locations, titled first by title descending, untitled last.
    async fn list(&self) -> Result<Vec<Location>>;

    async fn set_title(&self, id: Uuid, title: Option<&str>) -> Result<()>;

    /// Move a location. Rejected with `InvalidState` while it still owns photos.
    async fn update_coordinates(&self, id: Uuid, latitude: f64, longitude: f64)
        -> Result<Location>;

    /// Delete a location. Rejected with `InvalidState` while it still owns photos.
    async fn delete(&self, id: Uuid) -> Result<()>;
}
