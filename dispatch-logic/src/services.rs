use serde::{Deserialize, Serialize};

use crate::{
    location::Location,
    orientation::Heading,
    prelude::*,
    stop::{CustomerRecord, Stop, StopId},
};

pub trait LookupService: Send + Sync {
    /// Find the customers with the given phone numbers. Numbers without a record are simply
    /// missing from the result. Callers never pass more than
    /// [MAX_LOOKUP_BATCH](crate::MAX_LOOKUP_BATCH) numbers at once.
    fn find_by_phone_numbers(
        &self,
        numbers: &[String],
    ) -> impl Future<Output = Result<Vec<CustomerRecord>>> + Send;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// A drivable path as computed by a [RoutingService]
pub struct RoutePath {
    /// Geometry of the path, from the origin to the last waypoint
    pub points: Vec<Location>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

impl RoutePath {
    pub fn summary(&self) -> RouteSummary {
        RouteSummary {
            distance_meters: self.distance_meters,
            duration_seconds: self.duration_seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RouteSummary {
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

pub trait RoutingService: Send + Sync + 'static {
    /// Compute a path visiting `waypoints` in order, the first waypoint is the origin
    fn compute_route(
        &self,
        waypoints: Vec<Location>,
    ) -> impl Future<Output = Result<RoutePath>> + Send;
}

/// Whatever is drawing the map. Holds at most one route at a time.
pub trait MapSink: Send + Sync {
    /// Handle to a marker placed on the map
    type Marker: Send + Sync;

    /// Place a marker for `stop` at `location`
    fn add_marker(&self, stop: &Stop, location: Location) -> Self::Marker;
    fn remove_marker(&self, marker: Self::Marker);
    fn set_view(&self, center: Location, zoom: u8);
    /// Draw `path`, the previous route has already been cleared
    fn render_route(&self, path: &RoutePath);
    fn clear_route(&self);
    /// Move the operator's own marker
    fn move_position_marker(&self, _location: Location) {}
    /// Rotate the operator's own marker
    fn rotate_position_marker(&self, _heading: Heading) {}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// A request for the customer at `target` to pay `amount` to the store
pub struct PaymentCode {
    pub payee_id: String,
    pub payee_name: String,
    pub amount: f64,
    pub payer_name: String,
    pub target: StopId,
}

impl PaymentCode {
    pub fn for_stop(payee_id: &str, payee_name: &str, stop: &Stop) -> Self {
        Self {
            payee_id: payee_id.to_string(),
            payee_name: payee_name.to_string(),
            amount: stop.amount_due,
            payer_name: stop.display_name.clone(),
            target: stop.id.clone(),
        }
    }
}

pub trait PaymentCodeSink: Send + Sync {
    fn render_payment_code(&self, code: &PaymentCode);
}
