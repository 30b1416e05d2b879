use std::collections::VecDeque;

use crate::{
    advisory::Advisory,
    location::{Location, PositionSample},
    settings::DispatchSettings,
};

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// The sample went into the average, `position` is the new smoothed position. `first_fix`
    /// is set only for the very first accepted sample of the session.
    Accepted { position: Location, first_fix: bool },
    /// The sample was dropped, `advisory` is set when it was bad enough to tell the operator
    Rejected { advisory: Option<Advisory> },
}

/// Drops inaccurate fixes and smooths the rest with a trailing moving average
pub struct PositionFilter {
    reject_above: f64,
    advise_above: f64,
    window: usize,
    samples: VecDeque<Location>,
    acquired: bool,
}

impl PositionFilter {
    pub fn new(settings: &DispatchSettings) -> Self {
        let window = settings.smoothing_window.max(1);
        Self {
            reject_above: settings.accuracy_reject_meters,
            advise_above: settings.accuracy_advisory_meters,
            window,
            samples: VecDeque::with_capacity(window),
            acquired: false,
        }
    }

    pub fn accept(&mut self, sample: &PositionSample) -> FilterOutcome {
        if !sample.location.is_valid() || !sample.accuracy.is_finite() || sample.accuracy < 0.0 {
            return FilterOutcome::Rejected { advisory: None };
        }

        if sample.accuracy > self.reject_above {
            let advisory =
                (sample.accuracy > self.advise_above).then_some(Advisory::LowAccuracy(sample.accuracy));
            return FilterOutcome::Rejected { advisory };
        }

        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(sample.location);

        let first_fix = !self.acquired;
        self.acquired = true;

        FilterOutcome::Accepted {
            position: self.mean(),
            first_fix,
        }
    }

    /// Current smoothed position, if any sample has been accepted since the last reset
    pub fn current(&self) -> Option<Location> {
        (!self.samples.is_empty()).then(|| self.mean())
    }

    /// Forget held samples, used when the position source can no longer be trusted.
    /// A later fix is not reported as the first one again.
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    fn mean(&self) -> Location {
        let n = self.samples.len() as f64;
        let (lat, long) = self
            .samples
            .iter()
            .fold((0.0, 0.0), |(lat, long), l| (lat + l.lat, long + l.long));
        Location::new(lat / n, long / n)
    }
}
