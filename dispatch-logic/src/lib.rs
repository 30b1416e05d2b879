mod advisory;
mod coordinator;
mod dispatcher;
mod location;
mod orientation;
mod position_filter;
mod registry;
mod resolver;
mod services;
mod settings;
mod stop;

pub use advisory::Advisory;
pub use coordinator::{
    RequestId, Resolution, RouteAction, RouteCoordinator, RoutePhase, RouteRequest,
};
pub use dispatcher::{DispatchUiState, Dispatcher, StateUpdateSender};
pub use location::{
    Location, PositionError, PositionEvent, PositionSample, PositionSource, UtcDT,
};
pub use orientation::{
    Heading, HeadingConvention, NorthReference, OrientationAdapter, OrientationOutcome,
    OrientationSource, RawHeading,
};
pub use position_filter::{FilterOutcome, PositionFilter};
pub use registry::{RegistryChange, StopRegistry};
pub use resolver::{
    SearchError, SearchErrorKind, SearchReport, SearchResolver, parse_phone_numbers,
};
pub use services::{
    LookupService, MapSink, PaymentCode, PaymentCodeSink, RoutePath, RouteSummary,
    RoutingService,
};
pub use settings::{DispatchSettings, MAX_LOOKUP_BATCH, MapView};
pub use stop::{CustomerRecord, Stop, StopId};

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
