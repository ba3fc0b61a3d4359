//! Route resolution, caching and overlay state for the live ambulance map.
//!
//! The [`RouteResolver`](resolver::RouteResolver) turns (origin, destination) pairs pushed by the
//! dispatch server into road-following geometry from an external routing oracle, caching and
//! deduplicating the work. The [`MapSession`](session::MapSession) feeds push events through the
//! resolver and into an [`OverlayRenderer`](overlay::OverlayRenderer).

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod oracle;
pub mod overlay;
pub mod resolver;
pub mod session;
pub mod types;
pub mod utils;
