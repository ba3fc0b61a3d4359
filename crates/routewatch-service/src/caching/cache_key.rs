use std::fmt::{self, Write};
use std::sync::Arc;

use crate::types::Coordinate;

/// Separates the latitude and longitude of one coordinate.
const COMPONENT_DELIMITER: char = ',';
/// Separates origin from destination. Never produced by the numeric encoding.
const PAIR_DELIMITER: char = ';';

/// The cache key of an (origin, destination) pair.
///
/// Both coordinates are rounded to six decimal digits before encoding, so requests whose
/// positions differ only below that precision intentionally share a key. The encoding is a
/// pure function of the rounded coordinates: equal rounded pairs always produce equal keys,
/// and distinct rounded pairs never collide.
///
/// The textual form looks like `2.444800,-76.614700;2.441981,-76.612537`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutePairKey(Arc<str>);

impl RoutePairKey {
    /// Encodes an (origin, destination) pair.
    ///
    /// Callers must pass finite coordinates. Non-finite values are a contract violation and
    /// produce a key that is stable but meaningless.
    pub fn encode(origin: Coordinate, destination: Coordinate) -> Self {
        debug_assert!(
            origin.is_finite() && destination.is_finite(),
            "route pair keys require finite coordinates"
        );

        let mut key = String::with_capacity(48);
        write_coordinate(&mut key, origin);
        key.push(PAIR_DELIMITER);
        write_coordinate(&mut key, destination);
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutePairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_coordinate(key: &mut String, coord: Coordinate) {
    let (lat, lon) = coord.to_microdegrees();
    write_micro(key, lat);
    key.push(COMPONENT_DELIMITER);
    write_micro(key, lon);
}

/// Writes whole microdegrees as a fixed six-digit decimal.
///
/// Formatting the integer instead of the float keeps `-0.0` and `0.0` on the same key.
fn write_micro(key: &mut String, micro: i64) {
    let sign = if micro < 0 { "-" } else { "" };
    let abs = micro.unsigned_abs();
    // Writing into a `String` is infallible.
    let _ = write!(key, "{sign}{}.{:06}", abs / 1_000_000, abs % 1_000_000);
}
