//! On-disk image cache.
//!
//! Downloaded images are decoded, re-encoded as JPEG and written atomically
//! (temp file, `sync_all`, rename) into one flat directory. A photo record is
//! marked materialized only after its file is in place.
//!
//! Filenames are derived from the remote photo alone, so records of different
//! locations may point at the same file. Files are removed only when no other
//! record still references them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use tourist_core::{new_v7, Error, ImageSource, Photo, PhotoRepository, Result};

use crate::config::CacheConfig;

/// Result of a single `fetch_and_store`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// File written and record marked materialized.
    Materialized,
    /// The record was deleted while the download was in flight; nothing kept.
    Discarded,
}

/// Downloads, re-encodes and stores photo images.
pub struct ImageCache {
    cache_dir: PathBuf,
    source: Arc<dyn ImageSource>,
    photos: Arc<dyn PhotoRepository>,
    downloads: Arc<Semaphore>,
    file_locks: FileLocks,
    jpeg_quality: u8,
}

/// One async lock per cache filename. Unused entries are pruned on the next
/// acquisition.
#[derive(Default)]
struct FileLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileLocks {
    async fn lock(&self, filename: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(filename.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

impl ImageCache {
    pub fn new(
        config: &CacheConfig,
        source: Arc<dyn ImageSource>,
        photos: Arc<dyn PhotoRepository>,
    ) -> Self {
        Self {
            cache_dir: config.cache_dir.clone(),
            source,
            photos,
            downloads: Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1))),
            file_locks: FileLocks::default(),
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache path of a photo's image.
    pub fn path_for(&self, photo: &Photo) -> PathBuf {
        self.cache_dir.join(&photo.local_filename)
    }

    /// Create the cache directory and check that it accepts writes, reads,
    /// renames and deletes.
    pub async fn validate(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await.map_err(|e| {
            Error::FileSystem(format!("create_dir_all({:?}): {}", self.cache_dir, e))
        })?;

        let check_path = self.cache_dir.join(".health-check");
        let data = b"cache-health-check";
        write_atomic(&check_path, data).await?;

        let read_back = fs::read(&check_path)
            .await
            .map_err(|e| Error::FileSystem(format!("read({:?}): {}", check_path, e)))?;
        if read_back != data {
            return Err(Error::FileSystem("read-back mismatch".to_string()));
        }

        fs::remove_file(&check_path)
            .await
            .map_err(|e| Error::FileSystem(format!("remove_file({:?}): {}", check_path, e)))?;
        Ok(())
    }

    /// Download `photo`, store it as JPEG and mark the record materialized.
    ///
    /// Waits for a download slot first. An existing non-empty cache file is
    /// reused without downloading. A record deleted before or during
    /// the download is never resurrected and leaves no file behind.
    ///
    /// The cached-file check, the write and the materialization run under
    /// the file's lock, so a concurrent release of the same file cannot
    /// remove it between them.
    pub async fn fetch_and_store(&self, photo: &Photo) -> Result<FetchOutcome> {
        let _permit = self
            .downloads
            .acquire()
            .await
            .map_err(|e| Error::Internal(format!("download semaphore closed: {e}")))?;
        let start = Instant::now();

        if !self.photos.exists(photo).await? {
            debug!(
                location_id = %photo.location_id,
                photo_key = %photo.key,
                "Record gone before download, skipping"
            );
            return Ok(FetchOutcome::Discarded);
        }

        let path = self.path_for(photo);
        {
            let _file = self.file_locks.lock(&photo.local_filename).await;
            if is_cached(&path).await {
                trace!(filename = %photo.local_filename, "Cached file already present");
                return self.commit(photo, true, start).await;
            }
        }

        let bytes = self.source.fetch(&photo.remote_url).await?;
        let quality = self.jpeg_quality;
        let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&bytes, quality))
            .await
            .map_err(|e| Error::Internal(format!("encode task failed: {e}")))??;

        let _file = self.file_locks.lock(&photo.local_filename).await;
        if !self.photos.exists(photo).await? {
            debug!(
                location_id = %photo.location_id,
                photo_key = %photo.key,
                "Record deleted during download, discarding image"
            );
            return Ok(FetchOutcome::Discarded);
        }
        write_atomic(&path, &jpeg).await?;
        self.commit(photo, false, start).await
    }

    /// Mark `photo` materialized once its file is in place. Caller holds the
    /// file's lock.
    async fn commit(&self, photo: &Photo, reused: bool, start: Instant) -> Result<FetchOutcome> {
        match self.photos.mark_materialized(photo).await {
            Ok(_) => {
                debug!(
                    location_id = %photo.location_id,
                    photo_key = %photo.key,
                    filename = %photo.local_filename,
                    reused,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Photo materialized"
                );
                Ok(FetchOutcome::Materialized)
            }
            Err(Error::NotFound(_)) => {
                debug!(
                    location_id = %photo.location_id,
                    photo_key = %photo.key,
                    "Record deleted while writing, removing file"
                );
                self.release_locked(photo).await;
                Ok(FetchOutcome::Discarded)
            }
            Err(e) => Err(e),
        }
    }

    /// Run [`fetch_and_store`](Self::fetch_and_store) on its own task.
    ///
    /// Failures are logged; the record stays unmaterialized.
    pub fn spawn_fetch(self: &Arc<Self>, photo: Photo) -> JoinHandle<Result<FetchOutcome>> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let result = cache.fetch_and_store(&photo).await;
            if let Err(e) = &result {
                warn!(
                    location_id = %photo.location_id,
                    photo_key = %photo.key,
                    url = %photo.remote_url,
                    error = %e,
                    "Photo download failed"
                );
            }
            result
        })
    }

    /// Remove the cached file of `photo`. A missing file is not an error;
    /// returns whether a file was removed.
    pub async fn delete_backing_file(&self, photo: &Photo) -> Result<bool> {
        let path = self.path_for(photo);
        match fs::remove_file(&path).await {
            Ok(()) => {
                trace!(filename = %photo.local_filename, "Cached file deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(filename = %photo.local_filename, "Cached file already absent");
                Ok(false)
            }
            Err(e) => Err(Error::FileSystem(format!(
                "remove_file({}): {}",
                path.display(),
                e
            ))),
        }
    }

    /// Delete the file of `photo` unless another record still references it.
    ///
    /// The reference count and the removal happen under the file's lock.
    /// Never fails: errors are logged and reported as `false`.
    pub async fn release_backing_file(&self, photo: &Photo) -> bool {
        let _file = self.file_locks.lock(&photo.local_filename).await;
        self.release_locked(photo).await
    }

    async fn release_locked(&self, photo: &Photo) -> bool {
        match self.other_references(photo).await {
            Ok(0) => {}
            Ok(others) => {
                debug!(
                    filename = %photo.local_filename,
                    others,
                    "Cached file still referenced, keeping"
                );
                return false;
            }
            Err(e) => {
                warn!(
                    filename = %photo.local_filename,
                    error = %e,
                    "Could not check file references, keeping file"
                );
                return false;
            }
        }

        match self.delete_backing_file(photo).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(
                    location_id = %photo.location_id,
                    filename = %photo.local_filename,
                    error = %e,
                    "Failed to delete cached file"
                );
                false
            }
        }
    }

    /// Delete `photo`'s file and then its record.
    ///
    /// The file is checked again once the record is gone, so an image written
    /// by a download that raced the deletion does not outlive its record.
    /// Returns whether the record existed.
    pub async fn evict_photo(&self, photo: &Photo) -> Result<bool> {
        self.release_backing_file(photo).await;
        let deleted = self.photos.delete(photo).await?;
        if fs::try_exists(self.path_for(photo)).await.unwrap_or(false) {
            self.release_backing_file(photo).await;
        }
        Ok(deleted)
    }

    /// Records other than `photo` that point at its file.
    async fn other_references(&self, photo: &Photo) -> Result<i64> {
        let total = self.photos.count_by_filename(&photo.local_filename).await?;
        let own = i64::from(self.photos.exists(photo).await?);
        Ok((total - own).max(0))
    }
}

async fn is_cached(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Decode any supported image format and re-encode it as baseline JPEG.
pub fn encode_jpeg(bytes: &[u8], quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;
    let rgb = img.to_rgb8();

    let mut out = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder.encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

/// Write `data` to `path` so that readers see either nothing or the whole file.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::FileSystem(format!("invalid cache path {}", path.display())))?;
    let temp_path = parent.join(format!(".{file_name}.{}.tmp", new_v7().simple()));

    let mut file = fs::File::create(&temp_path).await.map_err(|e| {
        warn!(temp_path = %temp_path.display(), error = %e, "File::create failed");
        e
    })?;
    if let Err(e) = file.write_all(data).await {
        drop(file);
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    file.sync_all().await?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path).await {
        warn!(from = %temp_path.display(), to = %path.display(), error = %e, "rename failed");
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}
