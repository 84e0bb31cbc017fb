//! # tourist-db
//!
//! SQLite persistence layer for the location photo cache.
//!
//! This crate provides:
//! - Connection pool management (file-backed or in-memory)
//! - The location repository
//! - The photo record store and its ordered change channel
//!
//! ## Example
//!
//! ```rust,ignore
//! use tourist_db::{CreateLocationRequest, Database, LocationRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("sqlite://tourist.db").await?;
//!     db.migrate().await?;
//!
//!     let location = db.locations.create(CreateLocationRequest {
//!         title: Some("Paris".to_string()),
//!         latitude: 48.8566,
//!         longitude: 2.3522,
//!     }).await?;
//!
//!     println!("Created location: {}", location.id);
//!     Ok(())
//! }
//! ```
use std::sync::Arc;

pub mod locations;
pub mod photos;
pub mod pool;

// Re-export core types
pub use tourist_core::*;

pub use locations::SqliteLocationRepository;
pub use photos::SqlitePhotoStore;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig, IN_MEMORY_URL};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::SqlitePool,
    /// Location repository.
    pub locations: Arc<SqliteLocationRepository>,
    /// Photo record store; shared so every holder sees one change channel.
    pub photos: Arc<SqlitePhotoStore>,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self {
            locations: Arc::new(SqliteLocationRepository::new(pool.clone())),
            photos: Arc::new(SqlitePhotoStore::new(pool.clone())),
            pool,
        }
    }

    /// Connect to a database URL with default pool settings.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Connect with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Open a private in-memory database with the schema applied.
    pub async fn in_memory() -> Result<Self> {
        let db = Self::connect_with_config(IN_MEMORY_URL, PoolConfig::in_memory()).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }
}
