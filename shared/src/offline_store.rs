//! Device-local copy of the ride list.
//!
//! The whole list lives as one JSON array under a single fixed key. Entries
//! written by older builds may be missing fields, so every entry is run
//! through [`RideRequest::normalize`] on the way out. Reads and writes go
//! through the `KeyValue` capability; results come back as
//! `Event::CacheLoaded` and `Event::CacheSaved`.

use chrono::{DateTime, Local};
use crux_kv::error::KeyValueError;
use crux_kv::KeyValue;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::event::Event;
use crate::model::RideRequest;
use crate::LOCAL_RIDES_KEY;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Kv(#[from] KeyValueError),

    #[error("corrupted cache: {reason}")]
    Corrupted { reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A normalised cache read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedRides {
    pub rides: Vec<RideRequest>,
    /// Entries that had no id and were given a fresh one.
    pub generated_ids: usize,
    pub dropped: usize,
}

impl CachedRides {
    /// Invented ids only survive a relaunch once they are written back.
    #[must_use]
    pub fn needs_write_back(&self) -> bool {
        self.generated_ids > 0
    }
}

pub fn request_load(kv: &KeyValue<Event>) {
    kv.get(LOCAL_RIDES_KEY.to_string(), Event::CacheLoaded);
}

/// Replaces the cached list wholesale.
pub fn save(kv: &KeyValue<Event>, rides: &[RideRequest]) -> Result<(), StoreError> {
    let bytes = encode_rides(rides)?;
    kv.set(LOCAL_RIDES_KEY.to_string(), bytes, |result| {
        Event::CacheSaved(result.map(drop))
    });
    debug!(count = rides.len(), "local_cache_save_requested");
    Ok(())
}

pub fn encode_rides(rides: &[RideRequest]) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(rides).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Parses and normalises the cached list. A missing key is an empty list.
pub fn decode_rides(bytes: Option<&[u8]>, now: &DateTime<Local>) -> Result<CachedRides, StoreError> {
    let Some(bytes) = bytes else {
        debug!("local_cache_empty");
        return Ok(CachedRides::default());
    };

    let value: Value = serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupted {
        reason: e.to_string(),
    })?;

    let Value::Array(entries) = value else {
        return Err(StoreError::Corrupted {
            reason: "expected a JSON array".to_string(),
        });
    };

    let mut cached = CachedRides::default();
    for (index, entry) in entries.iter().enumerate() {
        let Some(ride) = RideRequest::normalize(entry, now) else {
            warn!(index, "local_cache_entry_dropped");
            cached.dropped += 1;
            continue;
        };
        if RideRequest::stored_id(entry).is_none() {
            debug!(index, ride_id = %ride.id, "local_cache_id_generated");
            cached.generated_ids += 1;
        }
        cached.rides.push(ride);
    }

    debug!(
        total = entries.len(),
        kept = cached.rides.len(),
        generated_ids = cached.generated_ids,
        "local_cache_loaded"
    );
    Ok(cached)
}
