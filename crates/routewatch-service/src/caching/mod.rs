//! In-memory bookkeeping for route resolutions.
//!
//! - [`RoutePairKey`] quantizes an (origin, destination) pair into a cache key.
//! - [`RouteCache`] is the bounded, TTL-aware store of resolved routes.
//! - [`PendingSet`] tracks which ambulance/hospital pairs currently have a network
//!   resolution scheduled or in flight.

mod cache_key;
mod memory;
mod pending;

pub use cache_key::RoutePairKey;
pub use memory::{CacheEntry, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, RouteCache};
pub use pending::{PendingGuard, PendingSet};
