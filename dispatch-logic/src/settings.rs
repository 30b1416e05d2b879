use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Largest batch the customer lookup accepts in one call
pub const MAX_LOOKUP_BATCH: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// A map viewport
pub struct MapView {
    pub center: Location,
    pub zoom: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
/// Tuning for a dispatch session, every knob the different storefront variants disagreed on
pub struct DispatchSettings {
    /// Position samples less accurate than this (meters) are ignored
    pub accuracy_reject_meters: f64,
    /// Position samples less accurate than this (meters) also warn the operator
    pub accuracy_advisory_meters: f64,
    /// Number of accepted samples averaged into the origin
    pub smoothing_window: usize,
    /// Phone numbers sent to the lookup service per call, capped at [MAX_LOOKUP_BATCH]
    pub lookup_batch_size: usize,
    /// Minimum time between route requests caused by movement
    pub recompute_min_interval_ms: u64,
    /// Minimum movement (meters) before movement causes a route request
    pub recompute_min_displacement_meters: f64,
    /// Minimum time between heading updates pushed to the map
    pub heading_min_interval_ms: u64,
    /// Weight of a new heading sample, 1.0 disables smoothing
    pub heading_smoothing: f64,
    /// Added to magnetic headings to get true headings, east positive
    pub magnetic_declination_degrees: f64,
    /// Payment address of the store
    pub payee_id: String,
    /// Name shown to customers when they pay
    pub payee_name: String,
    /// Where the map starts before a position is known
    pub home_view: MapView,
    /// Zoom used when centering on the first position fix
    pub focus_zoom: u8,
}

impl DispatchSettings {
    pub fn lookup_batch_size(&self) -> usize {
        self.lookup_batch_size.clamp(1, MAX_LOOKUP_BATCH)
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            accuracy_reject_meters: 10.0,
            accuracy_advisory_meters: 50.0,
            smoothing_window: 3,
            lookup_batch_size: MAX_LOOKUP_BATCH,
            recompute_min_interval_ms: 5000,
            recompute_min_displacement_meters: 15.0,
            heading_min_interval_ms: 100,
            heading_smoothing: 0.5,
            magnetic_declination_degrees: 0.0,
            payee_id: String::new(),
            payee_name: String::new(),
            home_view: MapView {
                center: Location::new(29.0723, 80.1035),
                zoom: 13,
            },
            focus_zoom: 16,
        }
    }
}
