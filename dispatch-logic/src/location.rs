use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A "part" of a location
pub type LocationComponent = f64;

/// Convenience alias for UTC DT
pub type UtcDT = DateTime<Utc>;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// Some location in the world, either from a device fix or a customer record
pub struct Location {
    /// Latitude
    pub lat: LocationComponent,
    /// Longitude
    pub long: LocationComponent,
}

impl Location {
    pub const fn new(lat: LocationComponent, long: LocationComponent) -> Self {
        Self { lat, long }
    }

    /// Whether both components are finite and inside the WGS84 ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.long.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.long)
    }

    /// Parse a `"lat,long"` pair as stored on customer records. Anything that isn't exactly two
    /// valid numbers yields `None`.
    pub fn parse_pair(raw: &str) -> Option<Self> {
        let mut parts = raw.split(',').map(str::trim);
        let lat = parts.next()?.parse().ok()?;
        let long = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        let location = Self::new(lat, long);
        location.is_valid().then_some(location)
    }

    /// Great-circle distance in meters (haversine)
    pub fn distance_meters(&self, other: &Location) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_long = (other.long - self.long).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_long / 2.0).sin().powi(2);

        EARTH_RADIUS_METERS * 2.0 * a.sqrt().asin()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// A raw fix as delivered by the device position source
pub struct PositionSample {
    pub location: Location,
    /// Accuracy radius in meters, bigger is worse
    pub accuracy: f64,
    pub timestamp: UtcDT,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionError {
    /// The operator refused location access
    PermissionDenied,
    /// The device couldn't determine a position right now
    Unavailable,
    /// No fix arrived in time
    Timeout,
}

impl PositionError {
    /// Whether this error means we can no longer trust the last known origin
    pub fn clears_origin(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

impl std::fmt::Display for PositionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "location permission denied"),
            Self::Unavailable => write!(f, "location unavailable"),
            Self::Timeout => write!(f, "location request timed out"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PositionEvent {
    Sample(PositionSample),
    Error(PositionError),
}

pub trait PositionSource {
    /// Start pushing events into `events`. Events stop once the returned token is cancelled.
    fn subscribe(&self, events: mpsc::Sender<PositionEvent>) -> CancellationToken;
}
