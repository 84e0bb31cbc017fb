//! # tourist-core
//!
//! Core types, traits, and abstractions for the location photo cache.
//!
//! This crate provides the data model, error type, sampling, and store
//! change events that the database, search client, and cache crates share.

pub mod defaults;
pub mod error;
pub mod events;
pub mod models;
pub mod sampler;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{
    next_batch, run_projector, try_next_batch, ChangeBatch, ChangeProjector, EventBus,
    StoreEnvelope, StoreEvent,
};
pub use models::*;
pub use sampler::{sample, sample_with_rng};
pub use traits::*;
pub use uuid_utils::new_v7;
