//! Data model for locations and their cached photos.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// =============================================================================
// LOCATION
// =============================================================================

/// A user-designated geographic point around which photos are fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    /// Display title; `None` until resolved (e.g. by reverse geocoding).
    pub title: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
}

/// Validate a WGS84 coordinate pair.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(Error::InvalidArgument(format!(
            "latitude must be within [-90, 90], got {latitude}"
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::InvalidArgument(format!(
            "longitude must be within [-180, 180], got {longitude}"
        )));
    }
    Ok(())
}

/// Per-location population lifecycle.
///
/// `Empty → Searching → Populating → Ready`, and `Ready → Evicting → Empty`
/// for refresh and delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationState {
    Empty,
    Searching,
    Populating,
    Ready,
    Evicting,
}

impl LocationState {
    /// True while a search or record creation is in flight.
    pub fn is_populating(&self) -> bool {
        matches!(self, LocationState::Searching | LocationState::Populating)
    }
}

impl fmt::Display for LocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Searching => write!(f, "searching"),
            Self::Populating => write!(f, "populating"),
            Self::Ready => write!(f, "ready"),
            Self::Evicting => write!(f, "evicting"),
        }
    }
}

// =============================================================================
// PHOTO
// =============================================================================

/// Identity fields of one remote photo, as returned by the search API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoFields {
    /// Farm number; the API sends a JSON number, older payloads a string.
    #[serde(deserialize_with = "string_or_number")]
    pub farm: String,
    pub server: String,
    pub id: String,
    pub secret: String,
}

impl PhotoFields {
    pub fn new(
        farm: impl Into<String>,
        server: impl Into<String>,
        id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            farm: farm.into(),
            server: server.into(),
            id: id.into(),
            secret: secret.into(),
        }
    }

    /// Reject empty fields and anything that could escape the cache directory
    /// once interpolated into a filename or URL.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("farm", &self.farm),
            ("server", &self.server),
            ("id", &self.id),
            ("secret", &self.secret),
        ] {
            if value.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "photo field '{name}' must not be empty"
                )));
            }
            if !value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(Error::InvalidArgument(format!(
                    "photo field '{name}' contains unsupported characters: '{value}'"
                )));
            }
        }
        Ok(())
    }

    /// Deterministic identity key for this remote photo.
    pub fn key(&self) -> String {
        format!("{}-{}-{}-{}", self.farm, self.server, self.id, self.secret)
    }

    /// Thumbnail URL on the static image host.
    pub fn remote_url(&self) -> String {
        format!(
            "https://farm{}.staticflickr.com/{}/{}_{}_t.jpg",
            self.farm, self.server, self.id, self.secret
        )
    }

    /// Filename inside the flat cache directory.
    pub fn local_filename(&self) -> String {
        format!("{}_{}_t.jpg", self.id, self.secret)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(serde_json::Number),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}

/// Metadata and cache state for one remote image owned by a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    /// Owning location; set at creation and never changed.
    pub location_id: Uuid,
    /// Deterministic key derived from the four identity fields.
    pub key: String,
    pub farm: String,
    pub server: String,
    pub id: String,
    pub secret: String,
    pub remote_url: String,
    pub local_filename: String,
    /// True once the cached file exists and is non-empty.
    pub materialized: bool,
    pub created_at: DateTime<Utc>,
}

impl Photo {
    /// Build an unmaterialized photo for `location_id`, deriving URL and filename.
    pub fn new(location_id: Uuid, fields: PhotoFields) -> Self {
        let key = fields.key();
        let remote_url = fields.remote_url();
        let local_filename = fields.local_filename();
        Self {
            location_id,
            key,
            farm: fields.farm,
            server: fields.server,
            id: fields.id,
            secret: fields.secret,
            remote_url,
            local_filename,
            materialized: false,
            created_at: Utc::now(),
        }
    }

    /// The identity fields this photo was created from.
    pub fn fields(&self) -> PhotoFields {
        PhotoFields::new(&self.farm, &self.server, &self.id, &self.secret)
    }
}
