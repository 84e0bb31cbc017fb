//! Centralized default constants for the photo cache.
//!
//! All crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// SEARCH
// =============================================================================

/// Flickr REST endpoint.
pub const FLICKR_API_URL: &str = "https://api.flickr.com/services/rest/";

/// Remote method name for a location search.
pub const FLICKR_SEARCH_METHOD: &str = "flickr.photos.search";

/// Maximum photos requested in the single result page.
pub const SEARCH_PAGE_SIZE: u32 = 500;

/// Only photos uploaded within this many trailing days are requested.
pub const UPLOAD_WINDOW_DAYS: i64 = 365;

// =============================================================================
// SAMPLING
// =============================================================================

/// Photos kept per location per population cycle.
pub const SAMPLE_SIZE: usize = 21;

// =============================================================================
// IMAGE CACHE
// =============================================================================

/// Concurrent image downloads across all locations.
pub const DOWNLOAD_MAX_CONCURRENT: usize = 6;

/// JPEG quality used when re-encoding downloaded images (highest setting).
pub const JPEG_QUALITY: u8 = 100;

/// Cache directory used when `TOURIST_CACHE_DIR` is unset.
pub const CACHE_DIR: &str = "./tourist-cache";

/// SQLite database filename inside the cache directory.
pub const DATABASE_FILENAME: &str = "tourist.db";

// =============================================================================
// EVENTS
// =============================================================================

/// Broadcast buffer for store change notifications.
///
/// Recommended: 256 for production, 32 for tests.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// DATABASE
// =============================================================================

/// Maximum pooled SQLite connections.
pub const DB_MAX_CONNECTIONS: u32 = 5;

/// Seconds to wait for a pooled connection.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;
