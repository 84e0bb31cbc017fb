//! tourist: command-line front end for the location photo cache.
//!
//! Creates locations, fetches a random sample of nearby photos for each and
//! keeps their images in a local cache directory.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use tourist_cache::{
    CacheConfig, DownloadBatch, HttpImageSource, ImageCache, LocationPhotoCoordinator,
};
use tokio::sync::{broadcast, oneshot};
use tourist_core::{
    run_projector, ChangeBatch, ChangeProjector, LocationRepository, PhotoRepository,
    StoreEnvelope,
};
use tourist_db::Database;
use tourist_flickr::{FlickrClient, FlickrConfig};

#[derive(Parser)]
#[command(name = "tourist")]
#[command(author, version, about = "Cache photos taken around your favourite places")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a location and fetch its photos
    Add {
        /// Latitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Longitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Display title
        #[arg(short, long)]
        title: Option<String>,
    },

    /// List locations
    List,

    /// List the photos of a location
    Photos {
        /// Location id
        id: Uuid,
    },

    /// Replace a location's photos with a fresh sample
    Refresh {
        /// Location id
        id: Uuid,
    },

    /// Move a location and fetch photos for its new position
    Move {
        /// Location id
        id: Uuid,

        /// New latitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// New longitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },

    /// Delete a location with its photos and cached files
    Delete {
        /// Location id
        id: Uuid,
    },

    /// Retry downloads that have not completed
    Retry {
        /// Location id
        id: Uuid,
    },
}

/// Prints store changes for one location as they are committed.
struct ConsoleProjector {
    total: usize,
    materialized: usize,
}

impl ChangeProjector for ConsoleProjector {
    fn apply(&mut self, batch: ChangeBatch) {
        if batch.lagged {
            println!("  (missed some updates)");
        }
        for photo in batch.updated.iter().filter(|p| p.materialized) {
            self.materialized += 1;
            println!(
                "  [{}/{}] {}",
                self.materialized.min(self.total),
                self.total,
                photo.local_filename
            );
        }
    }
}

fn init_tracing() {
    // Logs go to stderr; stdout carries command output.
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   RUST_LOG    - standard env filter (default: "warn,tourist=info,tourist_cache=info,tourist_flickr=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warn,tourist=info,tourist_cache=info,tourist_flickr=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

struct App {
    db: Database,
    coordinator: LocationPhotoCoordinator,
}

async fn build_app() -> anyhow::Result<App> {
    let config = CacheConfig::from_env();
    config.validate()?;

    tokio::fs::create_dir_all(&config.cache_dir)
        .await
        .with_context(|| format!("creating cache dir {}", config.cache_dir.display()))?;

    let db = Database::connect(&config.database_url()).await?;
    db.migrate().await?;

    let source = HttpImageSource::new(config.http_timeout)?;
    let search =
        FlickrClient::with_http_client(FlickrConfig::from_env(), source.client().clone())
            .context("configuring Flickr search (is FLICKR_API_KEY set?)")?;

    let photos: Arc<dyn PhotoRepository> = db.photos.clone();
    let locations: Arc<dyn LocationRepository> = db.locations.clone();
    let cache = Arc::new(ImageCache::new(&config, Arc::new(source), photos.clone()));
    cache.validate().await?;

    let coordinator = LocationPhotoCoordinator::new(Arc::new(search), locations, photos, cache)
        .with_sample_size(config.sample_size);

    info!(
        cache_dir = %config.cache_dir.display(),
        max_downloads = config.max_concurrent_downloads,
        "Photo cache ready"
    );
    Ok(App { db, coordinator })
}

/// Wait for `downloads`, printing progress as records are materialized.
///
/// `rx` should be subscribed before the downloads were started.
async fn follow_downloads(
    rx: broadcast::Receiver<StoreEnvelope>,
    downloads: DownloadBatch,
    total: usize,
) {
    let location_id = downloads.location_id();
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let progress = tokio::spawn(async move {
        let mut projector = ConsoleProjector {
            total,
            materialized: 0,
        };
        let shutdown = async move {
            let _ = done_rx.await;
        };
        run_projector(rx, location_id, &mut projector, shutdown).await;
    });

    let summary = downloads.wait().await;
    // Every update is on the bus once the downloads are done; let the
    // projector print what it still holds before reporting.
    let _ = done_tx.send(());
    if let Err(e) = progress.await {
        warn!(error = %e, "Progress printer failed");
    }

    println!(
        "{} downloaded, {} failed",
        summary.materialized,
        summary.failed.len()
    );
    if !summary.failed.is_empty() {
        println!("run `tourist retry {location_id}` to try the failed downloads again");
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let app = build_app().await?;
    let coordinator = &app.coordinator;

    match cli.command {
        Commands::Add { lat, lon, title } => {
            let location = coordinator.create_location(title, lat, lon).await?;
            println!("location {}", location.id);
            let rx = app.db.photos.subscribe();
            let report = coordinator.populate(location.id).await?;
            println!(
                "{} photos found, keeping {}",
                report.found,
                report.photos.len()
            );
            let total = report.photos.len();
            follow_downloads(rx, report.downloads, total).await;
        }
        Commands::List => {
            for location in coordinator.locations().list().await? {
                let count = coordinator.photos().count_for_location(location.id).await?;
                println!(
                    "{}  {:>10.5} {:>11.5}  {:>3} photos  {}",
                    location.id,
                    location.latitude,
                    location.longitude,
                    count,
                    location.title.as_deref().unwrap_or("(untitled)")
                );
            }
        }
        Commands::Photos { id } => {
            coordinator.locations().fetch(id).await?;
            for photo in coordinator.photos().query(id).await? {
                let status = if photo.materialized { "cached " } else { "pending" };
                println!(
                    "{}  {}",
                    status,
                    coordinator.cache().path_for(&photo).display()
                );
            }
        }
        Commands::Refresh { id } => {
            let rx = app.db.photos.subscribe();
            let report = coordinator.refresh(id).await?;
            let total = report.photos.len();
            println!("{} photos found, keeping {}", report.found, total);
            follow_downloads(rx, report.downloads, total).await;
        }
        Commands::Move { id, lat, lon } => {
            let rx = app.db.photos.subscribe();
            let report = coordinator.move_location(id, lat, lon).await?;
            let total = report.photos.len();
            println!("{} photos found, keeping {}", report.found, total);
            follow_downloads(rx, report.downloads, total).await;
        }
        Commands::Delete { id } => {
            let report = coordinator.delete_location(id).await?;
            println!(
                "deleted location {} and {} photos",
                id, report.photos_deleted
            );
        }
        Commands::Retry { id } => {
            coordinator.locations().fetch(id).await?;
            let rx = app.db.photos.subscribe();
            let downloads = coordinator.retry_pending(id).await?;
            if downloads.is_empty() {
                println!("nothing to retry");
            } else {
                let total = downloads.len();
                follow_downloads(rx, downloads, total).await;
            }
        }
    }

    tourist_db::log_pool_metrics(app.db.pool());
    app.db.pool.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
