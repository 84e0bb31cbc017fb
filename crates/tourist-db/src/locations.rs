//! Location repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use tourist_core::{
    new_v7, validate_coordinates, CreateLocationRequest, Error, Location, LocationRepository,
    Result,
};

/// SQLite implementation of LocationRepository.
#[derive(Clone)]
pub struct SqliteLocationRepository {
    pool: SqlitePool,
}

impl SqliteLocationRepository {
    /// Create a new SqliteLocationRepository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn ensure_no_photos(tx: &mut Transaction<'_, Sqlite>, id: Uuid) -> Result<()> {
        let owned: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM photo WHERE location_id = ?")
            .bind(id)
            .fetch_one(&mut **tx)
            .await
            .map_err(Error::Database)?;
        if owned > 0 {
            return Err(Error::InvalidState(format!(
                "location {id} still owns {owned} photos; evict them first"
            )));
        }
        Ok(())
    }
}

fn normalize_title(title: Option<&str>) -> Option<String> {
    title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn location_from_row(r: &SqliteRow) -> Location {
    Location {
        id: r.get("id"),
        title: r.get("title"),
        latitude: r.get("latitude"),
        longitude: r.get("longitude"),
        created_at: r.get("created_at"),
    }
}

#[async_trait]
impl LocationRepository for SqliteLocationRepository {
    async fn create(&self, req: CreateLocationRequest) -> Result<Location> {
        validate_coordinates(req.latitude, req.longitude)?;

        let location = Location {
            id: new_v7(),
            title: normalize_title(req.title.as_deref()),
            latitude: req.latitude,
            longitude: req.longitude,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO location (id, title, latitude, longitude, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(location.id)
        .bind(&location.title)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(location.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        tracing::info!(
            location_id = %location.id,
            latitude = location.latitude,
            longitude = location.longitude,
            "Location created"
        );
        Ok(location)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Location>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, latitude, longitude, created_at
            FROM location
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(location_from_row))
    }

    async fn list(&self) -> Result<Vec<Location>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, latitude, longitude, created_at
            FROM location
            ORDER BY title IS NULL, title DESC, created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(location_from_row).collect())
    }

    async fn set_title(&self, id: Uuid, title: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE location SET title = ? WHERE id = ?")
            .bind(normalize_title(title))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::LocationNotFound(id));
        }
        Ok(())
    }

    async fn update_coordinates(
        &self,
        id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> Result<Location> {
        validate_coordinates(latitude, longitude)?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        Self::ensure_no_photos(&mut tx, id).await?;

        let row = sqlx::query(
            r#"
            UPDATE location SET latitude = ?, longitude = ?
            WHERE id = ?
            RETURNING id, title, latitude, longitude, created_at
            "#,
        )
        .bind(latitude)
        .bind(longitude)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::LocationNotFound(id))?;

        tx.commit().await.map_err(Error::Database)?;

        tracing::debug!(location_id = %id, latitude, longitude, "Location moved");
        Ok(location_from_row(&row))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        Self::ensure_no_photos(&mut tx, id).await?;

        let result = sqlx::query("DELETE FROM location WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::LocationNotFound(id));
        }

        tx.commit().await.map_err(Error::Database)?;

        tracing::info!(location_id = %id, "Location deleted");
        Ok(())
    }
}
