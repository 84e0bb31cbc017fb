//! Photo record store with ordered change notifications.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use tourist_core::defaults::EVENT_BUS_CAPACITY;
use tourist_core::{
    Error, EventBus, Location, Photo, PhotoFields, PhotoRepository, Result, StoreEnvelope,
    StoreEvent,
};

const PHOTO_COLUMNS: &str = "location_id, photo_key, farm, server, remote_id, secret, \
                             remote_url, local_filename, materialized, created_at";

/// SQLite implementation of PhotoRepository.
///
/// All mutations pass through `seq`: the lock is held across the SQL
/// statement and the broadcast, so subscribers observe changes in commit
/// order and never see a notification for a row the store does not hold.
pub struct SqlitePhotoStore {
    pool: SqlitePool,
    events: EventBus,
    seq: Mutex<u64>,
}

impl SqlitePhotoStore {
    /// Create a new SqlitePhotoStore with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_event_capacity(pool, EVENT_BUS_CAPACITY)
    }

    /// Create a store whose change channel buffers `capacity` envelopes.
    pub fn with_event_capacity(pool: SqlitePool, capacity: usize) -> Self {
        Self {
            pool,
            events: EventBus::new(capacity),
            seq: Mutex::new(0),
        }
    }

    /// Number of live change subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    fn publish(&self, seq: &mut u64, event: StoreEvent) {
        *seq += 1;
        self.events.emit(*seq, event);
    }
}

fn photo_from_row(r: &SqliteRow) -> Photo {
    Photo {
        location_id: r.get("location_id"),
        key: r.get("photo_key"),
        farm: r.get("farm"),
        server: r.get("server"),
        id: r.get("remote_id"),
        secret: r.get("secret"),
        remote_url: r.get("remote_url"),
        local_filename: r.get("local_filename"),
        materialized: r.get("materialized"),
        created_at: r.get("created_at"),
    }
}

fn map_insert_error(e: sqlx::Error, photo: &Photo) -> Error {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return Error::Conflict(format!(
                "location {} already owns photo {}",
                photo.location_id, photo.key
            ));
        }
        if db.is_foreign_key_violation() {
            return Error::LocationNotFound(photo.location_id);
        }
    }
    Error::Database(e)
}

#[async_trait]
impl PhotoRepository for SqlitePhotoStore {
    async fn create(&self, location: &Location, fields: PhotoFields) -> Result<Photo> {
        fields.validate()?;
        let photo = Photo::new(location.id, fields);

        let mut seq = self.seq.lock().await;
        sqlx::query(
            r#"
            INSERT INTO photo (location_id, photo_key, farm, server, remote_id, secret,
                               remote_url, local_filename, materialized, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(photo.location_id)
        .bind(&photo.key)
        .bind(&photo.farm)
        .bind(&photo.server)
        .bind(&photo.id)
        .bind(&photo.secret)
        .bind(&photo.remote_url)
        .bind(&photo.local_filename)
        .bind(photo.materialized)
        .bind(photo.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &photo))?;

        self.publish(&mut seq, StoreEvent::Inserted(photo.clone()));
        drop(seq);

        tracing::trace!(
            location_id = %photo.location_id,
            photo_key = %photo.key,
            filename = %photo.local_filename,
            "Photo record created"
        );
        Ok(photo)
    }

    async fn mark_materialized(&self, photo: &Photo) -> Result<Photo> {
        let mut seq = self.seq.lock().await;
        let row = sqlx::query(&format!(
            "UPDATE photo SET materialized = 1 \
             WHERE location_id = ? AND photo_key = ? \
             RETURNING {PHOTO_COLUMNS}"
        ))
        .bind(photo.location_id)
        .bind(&photo.key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "photo {} of location {}",
                photo.key, photo.location_id
            ))
        })?;

        let updated = photo_from_row(&row);
        self.publish(&mut seq, StoreEvent::Updated(updated.clone()));
        drop(seq);

        tracing::trace!(
            location_id = %updated.location_id,
            photo_key = %updated.key,
            "Photo marked materialized"
        );
        Ok(updated)
    }

    async fn delete(&self, photo: &Photo) -> Result<bool> {
        let mut seq = self.seq.lock().await;
        let row = sqlx::query(&format!(
            "DELETE FROM photo WHERE location_id = ? AND photo_key = ? \
             RETURNING {PHOTO_COLUMNS}"
        ))
        .bind(photo.location_id)
        .bind(&photo.key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            tracing::debug!(
                location_id = %photo.location_id,
                photo_key = %photo.key,
                "Photo already deleted"
            );
            return Ok(false);
        };

        self.publish(&mut seq, StoreEvent::Deleted(photo_from_row(&row)));
        drop(seq);

        tracing::trace!(
            location_id = %photo.location_id,
            photo_key = %photo.key,
            "Photo record deleted"
        );
        Ok(true)
    }

    async fn query(&self, location_id: Uuid) -> Result<Vec<Photo>> {
        let rows = sqlx::query(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photo \
             WHERE location_id = ? \
             ORDER BY local_filename DESC"
        ))
        .bind(location_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(photo_from_row).collect())
    }

    async fn get(&self, location_id: Uuid, key: &str) -> Result<Option<Photo>> {
        let row = sqlx::query(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photo WHERE location_id = ? AND photo_key = ?"
        ))
        .bind(location_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(photo_from_row))
    }

    async fn exists(&self, photo: &Photo) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM photo WHERE location_id = ? AND photo_key = ?")
                .bind(photo.location_id)
                .bind(&photo.key)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(found.is_some())
    }

    async fn count_by_filename(&self, filename: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM photo WHERE local_filename = ?")
            .bind(filename)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn count_for_location(&self, location_id: Uuid) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM photo WHERE location_id = ?")
            .bind(location_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEnvelope> {
        self.events.subscribe()
    }
}
