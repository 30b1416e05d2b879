use std::sync::{
    Mutex as StdMutex,
    atomic::{AtomicU64, Ordering},
};

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dispatch_logic::{
    Heading, HeadingConvention, Location, MapSink, NorthReference, OrientationSource,
    PaymentCode, PaymentCodeSink, PositionError, PositionEvent, PositionSample, PositionSource,
    RawHeading, RoutePath, RoutingService, StateUpdateSender, Stop,
};
use dispatch_transport::{directions_url, upi_payment_url};

pub mod prelude {
    pub use anyhow::{Context, anyhow, bail};
    pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
}

pub use prelude::*;

fn default_convention() -> HeadingConvention {
    HeadingConvention::Clockwise(NorthReference::True)
}

fn default_accuracy() -> f64 {
    5.0
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
/// One line of a replay script
pub enum ScriptEvent {
    /// Replace the current stops with the customers for these comma separated numbers
    Search { phones: String },
    /// Add the customers for these comma separated numbers to the current stops
    Extend { phones: String },
    Position {
        lat: f64,
        long: f64,
        #[serde(default = "default_accuracy")]
        accuracy: f64,
    },
    PositionError { error: PositionError },
    Heading {
        degrees: Option<f64>,
        #[serde(default = "default_convention")]
        convention: HeadingConvention,
    },
    Delivered { phone: String },
    Wait { millis: u64 },
}

impl ScriptEvent {
    /// Parse a script, one JSON event per line. Blank lines and lines starting with `#` are
    /// skipped.
    pub fn parse_script(raw: &str) -> Result<Vec<Self>> {
        raw.lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
            .map(|(i, l)| {
                serde_json::from_str(l).with_context(|| format!("Bad script event on line {}", i + 1))
            })
            .collect()
    }

    pub fn position_event(lat: f64, long: f64, accuracy: f64) -> PositionEvent {
        PositionEvent::Sample(PositionSample {
            location: Location::new(lat, long),
            accuracy,
            timestamp: Utc::now(),
        })
    }
}

/// A device source fed from a channel we hold the sending half of. Events sent before the
/// dispatcher subscribes are queued.
pub struct ForwardingSource<T> {
    events: StdMutex<Option<mpsc::Receiver<T>>>,
}

impl<T: Send + 'static> ForwardingSource<T> {
    pub fn new() -> (mpsc::Sender<T>, Self) {
        let (tx, rx) = mpsc::channel(32);
        let source = Self {
            events: StdMutex::new(Some(rx)),
        };
        (tx, source)
    }

    fn forward(&self, out: mpsc::Sender<T>) -> CancellationToken {
        let token = CancellationToken::new();

        let events = self.events.lock().ok().and_then(|mut e| e.take());
        let Some(mut events) = events else {
            warn!("Source can only be subscribed to once");
            return token;
        };

        let cancel = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        if out.send(event).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Source forwarding stopped");
        });

        token
    }
}

pub type ScriptedPositions = ForwardingSource<PositionEvent>;
pub type ScriptedHeadings = ForwardingSource<RawHeading>;

impl PositionSource for ScriptedPositions {
    fn subscribe(&self, events: mpsc::Sender<PositionEvent>) -> CancellationToken {
        self.forward(events)
    }
}

impl OrientationSource for ScriptedHeadings {
    fn subscribe(&self, samples: mpsc::Sender<RawHeading>) -> Option<CancellationToken> {
        Some(self.forward(samples))
    }
}

/// Router that connects the waypoints with straight lines, for running without a server
pub struct StraightLineRouter {
    /// Assumed travel speed
    pub meters_per_second: f64,
}

impl Default for StraightLineRouter {
    fn default() -> Self {
        // 30 km/h
        Self {
            meters_per_second: 30.0 / 3.6,
        }
    }
}

impl RoutingService for StraightLineRouter {
    async fn compute_route(&self, waypoints: Vec<Location>) -> Result<RoutePath> {
        if waypoints.len() < 2 {
            bail!("Need an origin and at least one stop to route");
        }

        let distance_meters = waypoints
            .windows(2)
            .map(|w| w[0].distance_meters(&w[1]))
            .sum::<f64>();

        Ok(RoutePath {
            points: waypoints,
            distance_meters,
            duration_seconds: distance_meters / self.meters_per_second,
        })
    }
}

#[derive(Default)]
/// [MapSink] that logs what it would draw
pub struct LogMap {
    next_marker: AtomicU64,
    markers: AtomicU64,
}

impl LogMap {
    /// Markers currently on the map
    pub fn marker_count(&self) -> u64 {
        self.markers.load(Ordering::Relaxed)
    }
}

impl MapSink for LogMap {
    type Marker = u64;

    fn add_marker(&self, stop: &Stop, location: Location) -> Self::Marker {
        let id = self.next_marker.fetch_add(1, Ordering::Relaxed);
        self.markers.fetch_add(1, Ordering::Relaxed);
        let directions = directions_url(location)
            .map(|u| u.to_string())
            .unwrap_or_default();
        info!(
            "Marker {id}: {} ({}) at {},{} {directions}",
            stop.display_name, stop.id, location.lat, location.long
        );
        id
    }

    fn remove_marker(&self, marker: Self::Marker) {
        self.markers.fetch_sub(1, Ordering::Relaxed);
        info!("Marker {marker} removed");
    }

    fn set_view(&self, center: Location, zoom: u8) {
        info!("View centered on {},{} at zoom {zoom}", center.lat, center.long);
    }

    fn render_route(&self, path: &RoutePath) {
        info!(
            "Route drawn: {} points, {:.1} km, {:.0} min",
            path.points.len(),
            path.distance_meters / 1000.0,
            path.duration_seconds / 60.0
        );
    }

    fn clear_route(&self) {
        info!("Route cleared");
    }

    fn move_position_marker(&self, location: Location) {
        debug!("Operator at {},{}", location.lat, location.long);
    }

    fn rotate_position_marker(&self, heading: Heading) {
        debug!("Operator facing {}°", heading.whole_degrees());
    }
}

/// Logs the UPI link a payment QR code would encode
pub struct LogPayments;

impl PaymentCodeSink for LogPayments {
    fn render_payment_code(&self, code: &PaymentCode) {
        match upi_payment_url(code) {
            Ok(url) => info!("Payment for {} ({:.2} INR): {url}", code.target, code.amount),
            Err(why) => error!("No payment code for {}: {why:?}", code.target),
        }
    }
}

#[derive(Default)]
pub struct LogUpdates {
    updates: AtomicU64,
}

impl LogUpdates {
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

impl StateUpdateSender for LogUpdates {
    fn send_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        debug!("UI state changed");
    }
}
