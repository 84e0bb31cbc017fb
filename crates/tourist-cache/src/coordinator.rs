//! Per-location population and eviction.
//!
//! Each location moves through `Empty → Searching → Populating → Ready` when
//! populated and `Ready → Evicting → Empty` when its photos are removed.
//! Transitions are checked under one lock, so overlapping requests for the
//! same location are rejected with `InvalidState` instead of racing.
//!
//! Locations this process has not touched yet derive their state from the
//! store: `Ready` if they own photos, `Empty` otherwise.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use tourist_core::defaults::SAMPLE_SIZE;
use tourist_core::{
    sample, validate_coordinates, CreateLocationRequest, Error, Location, LocationRepository,
    LocationState, Photo, PhotoRepository, PhotoSearch, Result,
};

use crate::downloads::DownloadBatch;
use crate::image_cache::ImageCache;

/// Result of a successful populate.
#[derive(Debug)]
pub struct PopulateReport {
    pub location_id: Uuid,
    /// Items returned by the search before sampling.
    pub found: usize,
    /// Records created, in creation order.
    pub photos: Vec<Photo>,
    /// One download per created record.
    pub downloads: DownloadBatch,
}

/// Result of an eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictReport {
    pub location_id: Uuid,
    pub photos_deleted: usize,
}

/// Drives search, sampling, record creation, downloads and eviction for
/// locations.
pub struct LocationPhotoCoordinator {
    search: Arc<dyn PhotoSearch>,
    locations: Arc<dyn LocationRepository>,
    photos: Arc<dyn PhotoRepository>,
    cache: Arc<ImageCache>,
    sample_size: usize,
    states: Mutex<HashMap<Uuid, LocationState>>,
}

impl LocationPhotoCoordinator {
    pub fn new(
        search: Arc<dyn PhotoSearch>,
        locations: Arc<dyn LocationRepository>,
        photos: Arc<dyn PhotoRepository>,
        cache: Arc<ImageCache>,
    ) -> Self {
        Self {
            search,
            locations,
            photos,
            cache,
            sample_size: SAMPLE_SIZE,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Override the number of photos kept per population cycle.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn photos(&self) -> &Arc<dyn PhotoRepository> {
        &self.photos
    }

    pub fn locations(&self) -> &Arc<dyn LocationRepository> {
        &self.locations
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    // =========================================================================
    // State machine
    // =========================================================================

    /// Current lifecycle state of a location.
    pub async fn state(&self, location_id: Uuid) -> Result<LocationState> {
        let states = self.states.lock().await;
        match states.get(&location_id) {
            Some(state) => Ok(*state),
            None => self.derive_state(location_id).await,
        }
    }

    async fn derive_state(&self, location_id: Uuid) -> Result<LocationState> {
        let owned = self.photos.count_for_location(location_id).await?;
        Ok(if owned > 0 {
            LocationState::Ready
        } else {
            LocationState::Empty
        })
    }

    /// Move to `next` if the current state is one of `allowed`; returns the
    /// state that was left.
    async fn begin(
        &self,
        location_id: Uuid,
        allowed: &[LocationState],
        next: LocationState,
        op: &str,
    ) -> Result<LocationState> {
        let mut states = self.states.lock().await;
        let current = match states.get(&location_id) {
            Some(state) => *state,
            None => self.derive_state(location_id).await?,
        };
        if !allowed.contains(&current) {
            debug!(%location_id, %current, op, "Transition rejected");
            return Err(Error::InvalidState(format!(
                "cannot {op} location {location_id} while it is {current}"
            )));
        }
        states.insert(location_id, next);
        debug!(%location_id, from = %current, to = %next, "State transition");
        Ok(current)
    }

    async fn set_state(&self, location_id: Uuid, state: LocationState) {
        let previous = self.states.lock().await.insert(location_id, state);
        debug!(%location_id, from = ?previous, to = %state, "State transition");
    }

    // =========================================================================
    // Population
    // =========================================================================

    /// Search around the location, keep a random sample, create one record
    /// per sampled item and start its download.
    ///
    /// Only allowed from `Empty`; use [`refresh`](Self::refresh) for a
    /// populated location. Returns once the record set is fixed; downloads
    /// continue in the background. Search failures leave the location
    /// `Empty` and surface as [`Error::Fetch`].
    #[instrument(skip(self))]
    pub async fn populate(&self, location_id: Uuid) -> Result<PopulateReport> {
        let location = self.locations.fetch(location_id).await?;
        self.begin(
            location_id,
            &[LocationState::Empty],
            LocationState::Searching,
            "populate",
        )
        .await?;
        self.search_and_populate(&location).await
    }

    /// Body of a populate for a location already moved to `Searching`.
    async fn search_and_populate(&self, location: &Location) -> Result<PopulateReport> {
        let location_id = location.id;
        let found = match self
            .search
            .search(location.latitude, location.longitude)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                self.set_state(location_id, LocationState::Empty).await;
                warn!(%location_id, error = %e, "Photo search failed");
                return Err(Error::fetch(location_id, e));
            }
        };
        let found_count = found.len();

        self.set_state(location_id, LocationState::Populating).await;
        let sampled = match sample(found, self.sample_size) {
            Ok(sampled) => sampled,
            Err(e) => {
                self.set_state(location_id, LocationState::Empty).await;
                return Err(Error::fetch(location_id, e));
            }
        };

        let mut photos = Vec::with_capacity(sampled.len());
        let mut downloads = DownloadBatch::new(location_id);
        for fields in sampled {
            match self.photos.create(location, fields).await {
                Ok(photo) => {
                    downloads.push(photo.key.clone(), self.cache.spawn_fetch(photo.clone()));
                    photos.push(photo);
                }
                Err(Error::Conflict(msg)) => {
                    debug!(%location_id, reason = %msg, "Duplicate search result skipped");
                }
                Err(e) => {
                    let state = if photos.is_empty() {
                        LocationState::Empty
                    } else {
                        LocationState::Ready
                    };
                    self.set_state(location_id, state).await;
                    warn!(
                        %location_id,
                        created = photos.len(),
                        error = %e,
                        "Record creation failed, stopping populate"
                    );
                    return Err(Error::fetch(location_id, e));
                }
            }
        }

        self.set_state(location_id, LocationState::Ready).await;
        info!(
            %location_id,
            found = found_count,
            result_count = photos.len(),
            "Location populated"
        );

        Ok(PopulateReport {
            location_id,
            found: found_count,
            photos,
            downloads,
        })
    }

    /// Delete every photo of the location, file first, then record.
    ///
    /// Allowed from `Ready` or `Empty`. Downloads still in flight for the
    /// location notice the missing record and discard their result.
    #[instrument(skip(self))]
    pub async fn evict(&self, location_id: Uuid) -> Result<EvictReport> {
        let previous = self.begin_eviction(location_id, "evict").await?;
        let report = self.evict_photos(location_id, previous).await?;

        self.set_state(location_id, LocationState::Empty).await;
        info!(%location_id, photos_deleted = report.photos_deleted, "Location evicted");
        Ok(report)
    }

    async fn begin_eviction(&self, location_id: Uuid, op: &str) -> Result<LocationState> {
        self.begin(
            location_id,
            &[LocationState::Ready, LocationState::Empty],
            LocationState::Evicting,
            op,
        )
        .await
    }

    /// Evict every photo of a location in `Evicting`. The location stays
    /// `Evicting` on success; on failure it is moved back out.
    async fn evict_photos(
        &self,
        location_id: Uuid,
        previous: LocationState,
    ) -> Result<EvictReport> {
        let photos = match self.photos.query(location_id).await {
            Ok(photos) => photos,
            Err(e) => {
                self.set_state(location_id, previous).await;
                return Err(e);
            }
        };

        let mut photos_deleted = 0;
        for photo in &photos {
            match self.cache.evict_photo(photo).await {
                Ok(true) => photos_deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    self.set_state(location_id, LocationState::Ready).await;
                    warn!(
                        %location_id,
                        photo_key = %photo.key,
                        deleted = photos_deleted,
                        error = %e,
                        "Eviction interrupted"
                    );
                    return Err(e);
                }
            }
        }

        Ok(EvictReport {
            location_id,
            photos_deleted,
        })
    }

    /// Evict, then populate again with a fresh sample. The location goes
    /// straight from `Evicting` to `Searching`.
    #[instrument(skip(self))]
    pub async fn refresh(&self, location_id: Uuid) -> Result<PopulateReport> {
        let location = self.locations.fetch(location_id).await?;
        let previous = self.begin_eviction(location_id, "refresh").await?;
        self.evict_photos(location_id, previous).await?;

        self.set_state(location_id, LocationState::Searching).await;
        self.search_and_populate(&location).await
    }

    // =========================================================================
    // Location lifecycle
    // =========================================================================

    /// Create a location in the `Empty` state. Follow with
    /// [`populate`](Self::populate) to fetch its photos.
    pub async fn create_location(
        &self,
        title: Option<String>,
        latitude: f64,
        longitude: f64,
    ) -> Result<Location> {
        let location = self
            .locations
            .create(CreateLocationRequest {
                title,
                latitude,
                longitude,
            })
            .await?;
        self.set_state(location.id, LocationState::Empty).await;
        Ok(location)
    }

    /// Move a location: evict its photos, update its coordinates, populate
    /// at the new position.
    ///
    /// The location stays `Evicting` until the coordinates are updated, so
    /// no other populate can run at the old position in between.
    #[instrument(skip(self))]
    pub async fn move_location(
        &self,
        location_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> Result<PopulateReport> {
        validate_coordinates(latitude, longitude)?;
        self.locations.fetch(location_id).await?;

        let previous = self.begin_eviction(location_id, "move").await?;
        self.evict_photos(location_id, previous).await?;

        let location = match self
            .locations
            .update_coordinates(location_id, latitude, longitude)
            .await
        {
            Ok(location) => location,
            Err(e) => {
                self.set_state(location_id, LocationState::Empty).await;
                return Err(e);
            }
        };

        self.set_state(location_id, LocationState::Searching).await;
        self.search_and_populate(&location).await
    }

    /// Evict a location's photos through the regular delete path, then
    /// delete the location itself.
    #[instrument(skip(self))]
    pub async fn delete_location(&self, location_id: Uuid) -> Result<EvictReport> {
        self.locations.fetch(location_id).await?;

        let previous = self.begin_eviction(location_id, "delete").await?;
        let report = self.evict_photos(location_id, previous).await?;
        if let Err(e) = self.locations.delete(location_id).await {
            self.set_state(location_id, LocationState::Empty).await;
            return Err(e);
        }
        self.states.lock().await.remove(&location_id);

        info!(%location_id, photos_deleted = report.photos_deleted, "Location deleted");
        Ok(report)
    }

    // =========================================================================
    // Photo maintenance
    // =========================================================================

    /// Delete a selection of a location's photos by key. Unknown keys are
    /// ignored. Returns the number of records deleted.
    #[instrument(skip(self, keys), fields(requested = keys.len()))]
    pub async fn delete_photos(&self, location_id: Uuid, keys: &[String]) -> Result<usize> {
        let previous = self
            .begin(
                location_id,
                &[LocationState::Ready, LocationState::Empty],
                LocationState::Evicting,
                "delete photos of",
            )
            .await?;

        let mut deleted = 0;
        for key in keys {
            let photo = match self.photos.get(location_id, key).await {
                Ok(Some(photo)) => photo,
                Ok(None) => {
                    debug!(%location_id, photo_key = %key, "Photo not found, skipping");
                    continue;
                }
                Err(e) => {
                    self.set_state(location_id, previous).await;
                    return Err(e);
                }
            };
            match self.cache.evict_photo(&photo).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    self.set_state(location_id, previous).await;
                    return Err(e);
                }
            }
        }

        let remaining = self.derive_state(location_id).await;
        self.set_state(location_id, remaining.unwrap_or(previous))
            .await;
        info!(%location_id, deleted, "Photos deleted");
        Ok(deleted)
    }

    /// Start downloads again for every unmaterialized photo of a location.
    #[instrument(skip(self))]
    pub async fn retry_pending(&self, location_id: Uuid) -> Result<DownloadBatch> {
        let current = self.state(location_id).await?;
        if current.is_populating() || current == LocationState::Evicting {
            return Err(Error::InvalidState(format!(
                "cannot retry downloads of location {location_id} while it is {current}"
            )));
        }

        let mut downloads = DownloadBatch::new(location_id);
        for photo in self.photos.query(location_id).await? {
            if !photo.materialized {
                downloads.push(photo.key.clone(), self.cache.spawn_fetch(photo));
            }
        }

        info!(%location_id, pending = downloads.len(), "Retrying pending downloads");
        Ok(downloads)
    }
}
