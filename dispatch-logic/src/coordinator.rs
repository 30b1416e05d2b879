use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{location::Location, settings::DispatchSettings};

/// Identifies a route request, later requests have bigger ids
pub type RequestId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoutePhase {
    /// Missing an origin or stops, no route
    Idle,
    /// A route has been requested and is either in flight or drawn
    Routing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub id: RequestId,
    /// The origin followed by every stop waypoint
    pub waypoints: Vec<Location>,
}

#[derive(Debug, Clone, PartialEq)]
/// Something the coordinator needs done
pub enum RouteAction {
    /// Send this request to the routing service
    Request(RouteRequest),
    /// Routing stopped, remove the drawn route if `rendered` is set
    Teardown { rendered: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Draw the result, clearing the currently drawn route first if `replaces` is set
    Render { replaces: bool },
    /// A newer request was issued (or routing stopped) since, drop the result
    Stale,
}

#[derive(Debug, Clone, Copy)]
struct IssuedRequest {
    id: RequestId,
    origin: Location,
    at: Instant,
}

/// Decides when the route needs computing again.
///
/// Every request carries the full waypoint list, only the result of the latest request is ever
/// drawn.
pub struct RouteCoordinator {
    origin: Option<Location>,
    waypoints: Vec<Location>,
    phase: RoutePhase,
    next_id: RequestId,
    latest: Option<IssuedRequest>,
    rendered: Option<RequestId>,
    /// The origin moved far enough but it was too soon to recompute
    recompute_owed: bool,
    min_interval: Duration,
    min_displacement: f64,
}

impl RouteCoordinator {
    pub fn new(settings: &DispatchSettings) -> Self {
        Self {
            origin: None,
            waypoints: Vec::new(),
            phase: RoutePhase::Idle,
            next_id: 0,
            latest: None,
            rendered: None,
            recompute_owed: false,
            min_interval: Duration::from_millis(settings.recompute_min_interval_ms),
            min_displacement: settings.recompute_min_displacement_meters,
        }
    }

    pub fn phase(&self) -> RoutePhase {
        self.phase
    }

    pub fn origin(&self) -> Option<Location> {
        self.origin
    }

    /// Whether `id` is the request whose result we're waiting on or showing
    pub fn is_current(&self, id: RequestId) -> bool {
        self.phase == RoutePhase::Routing && self.latest.is_some_and(|r| r.id == id)
    }

    /// A new filtered origin arrived. Movement only triggers a new request once enough time
    /// has passed *and* the origin moved far enough since the last request. A move held back
    /// only by time is made up for at [Self::next_deadline].
    pub fn update_origin(&mut self, origin: Location, now: Instant) -> Option<RouteAction> {
        self.origin = Some(origin);

        if self.waypoints.is_empty() {
            return None;
        }

        match (self.phase, self.latest) {
            (RoutePhase::Routing, Some(last)) => {
                let waited = now.saturating_duration_since(last.at) >= self.min_interval;
                let moved = last.origin.distance_meters(&origin) >= self.min_displacement;
                if waited && moved {
                    self.issue(now)
                } else {
                    self.recompute_owed = moved;
                    None
                }
            }
            _ => self.issue(now),
        }
    }

    /// When a held back move should be routed, if there is one
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.phase != RoutePhase::Routing || !self.recompute_owed {
            return None;
        }
        self.latest.map(|last| last.at + self.min_interval)
    }

    /// Issue the held back request if its deadline has passed
    pub fn poll_deadline(&mut self, now: Instant) -> Option<RouteAction> {
        match self.next_deadline() {
            Some(deadline) if now >= deadline => self.issue(now),
            _ => None,
        }
    }

    /// The origin can no longer be trusted
    pub fn clear_origin(&mut self) -> Option<RouteAction> {
        self.origin = None;
        self.go_idle()
    }

    /// The stop registry changed, always recomputes right away when an origin is known
    pub fn update_waypoints(
        &mut self,
        waypoints: Vec<Location>,
        now: Instant,
    ) -> Option<RouteAction> {
        self.waypoints = waypoints;

        if self.waypoints.is_empty() {
            self.go_idle()
        } else {
            self.issue(now)
        }
    }

    /// Stop routing entirely, used when the session ends
    pub fn reset(&mut self) -> Option<RouteAction> {
        self.origin = None;
        self.waypoints.clear();
        self.go_idle()
    }

    /// A request finished successfully, decide whether its result gets drawn
    pub fn resolve(&mut self, id: RequestId) -> Resolution {
        if self.is_current(id) {
            let replaces = self.rendered.replace(id).is_some();
            Resolution::Render { replaces }
        } else {
            Resolution::Stale
        }
    }

    fn issue(&mut self, now: Instant) -> Option<RouteAction> {
        let origin = self.origin?;

        self.next_id += 1;
        let id = self.next_id;

        self.phase = RoutePhase::Routing;
        self.latest = Some(IssuedRequest { id, origin, at: now });
        self.recompute_owed = false;

        let mut waypoints = Vec::with_capacity(self.waypoints.len() + 1);
        waypoints.push(origin);
        waypoints.extend_from_slice(&self.waypoints);

        Some(RouteAction::Request(RouteRequest { id, waypoints }))
    }

    fn go_idle(&mut self) -> Option<RouteAction> {
        if self.phase == RoutePhase::Idle {
            return None;
        }

        self.phase = RoutePhase::Idle;
        self.latest = None;
        self.recompute_owed = false;
        let rendered = self.rendered.take().is_some();
        Some(RouteAction::Teardown { rendered })
    }
}
