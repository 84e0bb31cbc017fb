//! # tourist-flickr
//!
//! Geographic photo search against the Flickr REST API.
//!
//! [`FlickrClient`] implements [`tourist_core::PhotoSearch`]: one request per
//! search, a single page of up to 500 results uploaded within the trailing
//! year, parsed into [`tourist_core::PhotoFields`].

pub mod client;
pub mod config;

pub use client::{parse_search_response, FlickrClient};
pub use config::FlickrConfig;
