use serde::{Deserialize, Serialize};

use crate::location::PositionError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Something the operator should know about, none of these stop the session
pub enum Advisory {
    /// A position fix was far too inaccurate to use, contains its accuracy in meters
    LowAccuracy(f64),
    /// The position source reported an error
    PositionUnavailable(PositionError),
    /// No compass on this device, the position marker won't rotate
    OrientationUnavailable,
    /// The routing service failed, the last drawn route is now stale
    RouteFailed(String),
    /// The customer lookup failed for some numbers
    LookupFailed(String),
    /// The last pending stop was delivered
    AllDelivered,
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowAccuracy(meters) => {
                write!(f, "GPS signal is weak (accurate to {meters:.0}m), waiting for a better fix")
            }
            Self::PositionUnavailable(why) => write!(f, "Live tracking paused: {why}"),
            Self::OrientationUnavailable => write!(f, "Compass not available on this device"),
            Self::RouteFailed(why) => write!(f, "Couldn't update the route: {why}"),
            Self::LookupFailed(why) => write!(f, "Customer lookup failed: {why}"),
            Self::AllDelivered => write!(f, "All deliveries completed!"),
        }
    }
}
