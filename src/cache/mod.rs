//! Generic caching layer for API responses and offline support.
//!
//! This module is API-agnostic and provides:
//! - A JSON file store partitioned into buckets, one per resource type
//! - Per-type TTLs, with zero meaning "never cache"
//! - Whole-bucket invalidation after mutations
//! - Stale reads when the network is unavailable
//! - Name-to-id lookups over cached entities

mod layer;
mod storage;
mod traits;
mod ttl;

pub use layer::CacheLayer;
pub use storage::{Cached, Store};
pub use traits::{CacheResult, CacheSource, Named, TransportFailure};
pub use ttl::{ResourceType, TtlTable, FALLBACK_TTL};
