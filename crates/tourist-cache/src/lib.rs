//! # tourist-cache
//!
//! Image caching and per-location orchestration.
//!
//! - [`ImageCache`] downloads photo images, re-encodes them as JPEG and
//!   writes them atomically into a flat cache directory.
//! - [`LocationPhotoCoordinator`] runs the search → sample → record →
//!   download pipeline for a location and its eviction counterpart.

pub mod config;
pub mod coordinator;
pub mod downloads;
pub mod image_cache;
pub mod image_source;

pub use config::CacheConfig;
pub use coordinator::{EvictReport, LocationPhotoCoordinator, PopulateReport};
pub use downloads::{DownloadBatch, DownloadSummary};
pub use image_cache::{encode_jpeg, FetchOutcome, ImageCache};
pub use image_source::HttpImageSource;
