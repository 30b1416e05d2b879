use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{Mutex, mpsc},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    advisory::Advisory,
    coordinator::{RequestId, Resolution, RouteAction, RouteCoordinator, RoutePhase, RouteRequest},
    location::{Location, PositionError, PositionEvent, PositionSource},
    orientation::{Heading, OrientationAdapter, OrientationOutcome, OrientationSource, RawHeading},
    position_filter::{FilterOutcome, PositionFilter},
    prelude::*,
    registry::{RegistryChange, StopRegistry},
    resolver::{SearchErrorKind, SearchReport, SearchResolver},
    services::{
        LookupService, MapSink, PaymentCode, PaymentCodeSink, RoutePath, RouteSummary,
        RoutingService,
    },
    settings::DispatchSettings,
    stop::{Stop, StopId},
};

pub trait StateUpdateSender: Send + Sync {
    /// The UI state changed, re-read it with [Dispatcher::ui_state]
    fn send_update(&self);
    /// Show `advisory` to the operator
    fn send_advisory(&self, advisory: Advisory) {
        warn!("{advisory}");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Snapshot of a dispatch session for the UI
pub struct DispatchUiState {
    pub stops: Vec<Stop>,
    pub origin: Option<Location>,
    pub heading: Option<Heading>,
    pub phase: RoutePhase,
    /// Route requests that haven't come back yet
    pub pending_routes: usize,
    /// The currently drawn route
    pub route: Option<RouteSummary>,
}

struct RouteOutcome {
    id: RequestId,
    result: Result<RoutePath>,
}

type QueuePair<T> = (mpsc::Sender<T>, Mutex<mpsc::Receiver<T>>);

struct DispatchState<M: MapSink> {
    filter: PositionFilter,
    stops: StopRegistry<M>,
    coordinator: RouteCoordinator,
    orientation: OrientationAdapter,
    in_flight: usize,
    route: Option<RouteSummary>,
}

/// A delivery session, owns the pending stops, live position and the drawn route.
///
/// Looks customers up with [LookupService], routes with [RoutingService], draws on [MapSink],
/// shows payment codes on [PaymentCodeSink] and tells the UI about changes through
/// [StateUpdateSender]. Device events are consumed by [Dispatcher::main_loop].
pub struct Dispatcher<
    L: LookupService,
    R: RoutingService,
    M: MapSink,
    Q: PaymentCodeSink,
    S: StateUpdateSender,
> {
    state: Mutex<DispatchState<M>>,
    settings: DispatchSettings,
    resolver: SearchResolver<L>,
    router: Arc<R>,
    map: M,
    payments: Q,
    updates: S,
    routes: QueuePair<RouteOutcome>,
    cancel: CancellationToken,
}

impl<L: LookupService, R: RoutingService, M: MapSink, Q: PaymentCodeSink, S: StateUpdateSender>
    Dispatcher<L, R, M, Q, S>
{
    pub fn new(
        settings: DispatchSettings,
        lookup: L,
        router: Arc<R>,
        map: M,
        payments: Q,
        updates: S,
    ) -> Self {
        let (tx, rx) = mpsc::channel(16);

        let state = DispatchState {
            filter: PositionFilter::new(&settings),
            stops: StopRegistry::new(),
            coordinator: RouteCoordinator::new(&settings),
            orientation: OrientationAdapter::new(&settings),
            in_flight: 0,
            route: None,
        };

        Self {
            resolver: SearchResolver::new(lookup, &settings),
            state: Mutex::new(state),
            settings,
            router,
            map,
            payments,
            updates,
            routes: (tx, Mutex::new(rx)),
            cancel: CancellationToken::new(),
        }
    }

    /// Look up a comma separated list of phone numbers, replacing the current stops with the
    /// customers found
    pub async fn search(&self, raw: &str) -> SearchReport {
        self.run_search(raw, true).await
    }

    /// Like [Self::search], but keeps the current stops and appends new ones
    pub async fn extend_search(&self, raw: &str) -> SearchReport {
        self.run_search(raw, false).await
    }

    async fn run_search(&self, raw: &str, replace: bool) -> SearchReport {
        let report = self.resolver.resolve(raw).await;

        let lookup_failure = report.errors.iter().find_map(|e| match &e.kind {
            SearchErrorKind::LookupFailed(why) => Some(why.clone()),
            _ => None,
        });
        if let Some(why) = lookup_failure {
            self.updates.send_advisory(Advisory::LookupFailed(why));
        }

        let mut state = self.state.lock().await;

        if replace {
            let change = state.stops.clear(&self.map);
            self.stops_changed(&mut state, change);
        }

        let change = state.stops.add_stops(report.stops.iter().cloned(), &self.map);

        if let Some(RegistryChange::Added(ids)) = &change {
            for stop in ids.iter().filter_map(|id| state.stops.get(id)) {
                let code = PaymentCode::for_stop(
                    &self.settings.payee_id,
                    &self.settings.payee_name,
                    stop,
                );
                self.payments.render_payment_code(&code);
            }
        }

        self.stops_changed(&mut state, change);
        drop(state);

        self.updates.send_update();
        report
    }

    /// Mark the stop with `id` as delivered, removing it. Returns false if there's no such stop.
    pub async fn mark_delivered(&self, id: &StopId) -> bool {
        let mut state = self.state.lock().await;

        let change = state.stops.remove(id, &self.map);
        if change.is_none() {
            warn!("Tried to deliver unknown stop {id}");
            return false;
        }

        info!("Delivered {id}");
        self.stops_changed(&mut state, change);
        let all_delivered = state.stops.is_empty();
        drop(state);

        if all_delivered {
            self.updates.send_advisory(Advisory::AllDelivered);
        }
        self.updates.send_update();
        true
    }

    pub async fn handle_position(&self, event: PositionEvent) {
        let mut state = self.state.lock().await;

        match event {
            PositionEvent::Sample(sample) => match state.filter.accept(&sample) {
                FilterOutcome::Accepted {
                    position,
                    first_fix,
                } => {
                    self.map.move_position_marker(position);
                    if first_fix {
                        info!("Position acquired");
                        self.map.set_view(position, self.settings.focus_zoom);
                    }
                    let action = state.coordinator.update_origin(position, Instant::now());
                    self.perform(&mut state, action);
                }
                FilterOutcome::Rejected { advisory } => {
                    debug!("Ignoring position with accuracy {}m", sample.accuracy);
                    if let Some(advisory) = advisory {
                        self.updates.send_advisory(advisory);
                    }
                    return;
                }
            },
            PositionEvent::Error(why) => {
                warn!("Position source error: {why}");
                self.updates
                    .send_advisory(Advisory::PositionUnavailable(why));
                if !why.clears_origin() {
                    return;
                }
                self.lose_origin(&mut state);
            }
        }

        drop(state);
        self.updates.send_update();
    }

    pub async fn handle_heading(&self, sample: RawHeading) {
        let mut state = self.state.lock().await;
        let outcome = state.orientation.accept(sample, Instant::now());
        drop(state);

        match outcome {
            OrientationOutcome::Updated(heading) => {
                self.map.rotate_position_marker(heading);
                self.updates.send_update();
            }
            OrientationOutcome::Throttled => {}
            OrientationOutcome::Unavailable(advisory) => {
                if let Some(advisory) = advisory {
                    self.updates.send_advisory(advisory);
                }
            }
        }
    }

    async fn handle_route_outcome(&self, outcome: RouteOutcome) {
        let mut state = self.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);

        let RouteOutcome { id, result } = outcome;

        match result {
            Ok(path) => match state.coordinator.resolve(id) {
                Resolution::Render { replaces } => {
                    debug!("Drawing route {id}");
                    if replaces {
                        self.map.clear_route();
                    }
                    self.map.render_route(&path);
                    state.route = Some(path.summary());
                }
                Resolution::Stale => {
                    debug!("Discarding stale route {id}");
                }
            },
            Err(why) => {
                if state.coordinator.is_current(id) {
                    error!("Route request {id} failed: {why:?}");
                    self.updates
                        .send_advisory(Advisory::RouteFailed(why.to_string()));
                } else {
                    debug!("Stale route request {id} failed: {why:?}");
                }
            }
        }

        drop(state);
        self.updates.send_update();
    }

    async fn recompute_due(&self) {
        let mut state = self.state.lock().await;
        let action = state.coordinator.poll_deadline(Instant::now());
        if action.is_some() {
            debug!("Routing from where the operator stopped");
        }
        self.perform(&mut state, action);
        drop(state);
        self.updates.send_update();
    }

    async fn position_source_closed(&self) {
        warn!("Position source closed");
        let mut state = self.state.lock().await;
        self.lose_origin(&mut state);
        drop(state);
        self.updates
            .send_advisory(Advisory::PositionUnavailable(PositionError::Unavailable));
        self.updates.send_update();
    }

    fn lose_origin(&self, state: &mut DispatchState<M>) {
        state.filter.reset();
        let action = state.coordinator.clear_origin();
        self.perform(state, action);
    }

    fn stops_changed(&self, state: &mut DispatchState<M>, change: Option<RegistryChange>) {
        let Some(change) = change else {
            return;
        };
        debug!("Stops changed: {change:?}");
        let action = state
            .coordinator
            .update_waypoints(state.stops.waypoints(), Instant::now());
        self.perform(state, action);
    }

    fn perform(&self, state: &mut DispatchState<M>, action: Option<RouteAction>) {
        match action {
            Some(RouteAction::Request(request)) => {
                state.in_flight += 1;
                self.request_route(request);
            }
            Some(RouteAction::Teardown { rendered }) => {
                info!("No route to show, tearing down");
                if rendered {
                    self.map.clear_route();
                }
                state.route = None;
            }
            None => {}
        }
    }

    fn request_route(&self, request: RouteRequest) {
        debug!(
            "Requesting route {} through {} waypoints",
            request.id,
            request.waypoints.len()
        );
        let router = self.router.clone();
        let results = self.routes.0.clone();
        tokio::spawn(async move {
            let RouteRequest { id, waypoints } = request;
            let result = router.compute_route(waypoints).await;
            results.send(RouteOutcome { id, result }).await.ok();
        });
    }

    async fn teardown(&self) {
        let mut state = self.state.lock().await;
        state.stops.clear(&self.map);
        let action = state.coordinator.reset();
        self.perform(&mut state, action);
        state.filter.reset();
        // Results still in flight are never read once the loop is gone
        state.in_flight = 0;
    }

    pub async fn ui_state(&self) -> DispatchUiState {
        let state = self.state.lock().await;
        DispatchUiState {
            stops: state.stops.all().cloned().collect(),
            origin: state.coordinator.origin(),
            heading: state.orientation.current(),
            phase: state.coordinator.phase(),
            pending_routes: state.in_flight,
            route: state.route,
        }
    }

    pub fn quit(&self) {
        self.cancel.cancel();
    }

    /// Main loop of a session: consumes device events and finished route requests until
    /// [Self::quit] is called. Unsubscribes from the sources and clears the map on the way out.
    pub async fn main_loop<P: PositionSource, O: OrientationSource>(
        &self,
        positions: &P,
        orientation: Option<&O>,
    ) -> Result {
        let mut routes = self
            .routes
            .1
            .try_lock()
            .context("Dispatch session is already running")?;

        let home = self.settings.home_view;
        self.map.set_view(home.center, home.zoom);

        let (position_tx, mut position_rx) = mpsc::channel(32);
        let position_sub = positions.subscribe(position_tx);

        let (heading_tx, mut heading_rx) = mpsc::channel(32);
        let heading_sub = orientation.and_then(|o| o.subscribe(heading_tx));

        if heading_sub.is_none() {
            let advisory = self.state.lock().await.orientation.mark_unavailable();
            if let Some(advisory) = advisory {
                self.updates.send_advisory(advisory);
            }
        }

        let mut positions_open = true;
        let mut headings_open = heading_sub.is_some();

        loop {
            let deadline = self.state.lock().await.coordinator.next_deadline();

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    break;
                }

                Some(outcome) = routes.recv() => {
                    self.handle_route_outcome(outcome).await;
                }

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.recompute_due().await;
                }

                event = position_rx.recv(), if positions_open => {
                    match event {
                        Some(event) => self.handle_position(event).await,
                        None => {
                            positions_open = false;
                            self.position_source_closed().await;
                        }
                    }
                }

                sample = heading_rx.recv(), if headings_open => {
                    match sample {
                        Some(sample) => self.handle_heading(sample).await,
                        None => headings_open = false,
                    }
                }
            }
        }

        position_sub.cancel();
        if let Some(sub) = heading_sub {
            sub.cancel();
        }

        self.teardown().await;
        info!("Dispatch session ended");

        Ok(())
    }
}
