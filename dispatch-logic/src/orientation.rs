use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{advisory::Advisory, settings::DispatchSettings};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NorthReference {
    True,
    Magnetic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// How a platform reports its heading
pub enum HeadingConvention {
    /// Compass style, degrees clockwise from north
    Clockwise(NorthReference),
    /// Device orientation `alpha` style, degrees counter-clockwise from north
    CounterClockwise(NorthReference),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// A heading straight from the device, `degrees` is `None` when the sensor had nothing
pub struct RawHeading {
    pub degrees: Option<f64>,
    pub convention: HeadingConvention,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// Degrees clockwise from true north, always in `[0, 360)`
pub struct Heading(f64);

impl Heading {
    pub fn new(degrees: f64) -> Self {
        // rem_euclid rounds tiny negatives up to exactly 360
        let d = degrees.rem_euclid(360.0);
        Self(if d >= 360.0 { 0.0 } else { d })
    }

    pub fn degrees(&self) -> f64 {
        self.0
    }

    /// Rounded to a whole degree, 0 to 359
    pub fn whole_degrees(&self) -> u16 {
        (self.0.round() as u16) % 360
    }

    /// Move towards `target` by `weight` along the shortest arc
    fn blend(self, target: Heading, weight: f64) -> Heading {
        let diff = (target.0 - self.0 + 540.0).rem_euclid(360.0) - 180.0;
        Heading::new(self.0 + diff * weight)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrientationOutcome {
    /// Push this heading to the map
    Updated(Heading),
    /// Too soon after the last update, sample dropped
    Throttled,
    /// No usable heading, `advisory` is only set the first time
    Unavailable(Option<Advisory>),
}

pub trait OrientationSource {
    /// Start pushing samples into `samples`, `None` means this platform has no orientation sensor
    fn subscribe(&self, samples: mpsc::Sender<RawHeading>) -> Option<CancellationToken>;
}

/// Turns raw compass samples into a smoothed, throttled heading
pub struct OrientationAdapter {
    min_interval: Duration,
    smoothing: f64,
    declination: f64,
    last_update: Option<Instant>,
    current: Option<Heading>,
    advised: bool,
}

impl OrientationAdapter {
    pub fn new(settings: &DispatchSettings) -> Self {
        Self {
            min_interval: Duration::from_millis(settings.heading_min_interval_ms),
            smoothing: settings.heading_smoothing.clamp(0.01, 1.0),
            declination: settings.magnetic_declination_degrees,
            last_update: None,
            current: None,
            advised: false,
        }
    }

    pub fn current(&self) -> Option<Heading> {
        self.current
    }

    pub fn accept(&mut self, sample: RawHeading, now: Instant) -> OrientationOutcome {
        let Some(raw) = sample.degrees.filter(|d| d.is_finite()) else {
            return OrientationOutcome::Unavailable(self.mark_unavailable());
        };

        if self
            .last_update
            .is_some_and(|last| now.duration_since(last) < self.min_interval)
        {
            return OrientationOutcome::Throttled;
        }

        let target = self.normalize(raw, sample.convention);
        let heading = match self.current {
            Some(prev) => prev.blend(target, self.smoothing),
            None => target,
        };

        self.current = Some(heading);
        self.last_update = Some(now);
        OrientationOutcome::Updated(heading)
    }

    /// Note that no heading is available, returns an advisory the first time only
    pub fn mark_unavailable(&mut self) -> Option<Advisory> {
        if self.advised {
            None
        } else {
            self.advised = true;
            Some(Advisory::OrientationUnavailable)
        }
    }

    fn normalize(&self, raw: f64, convention: HeadingConvention) -> Heading {
        let (clockwise, reference) = match convention {
            HeadingConvention::Clockwise(reference) => (raw, reference),
            HeadingConvention::CounterClockwise(reference) => (360.0 - raw, reference),
        };
        match reference {
            NorthReference::True => Heading::new(clockwise),
            NorthReference::Magnetic => Heading::new(clockwise + self.declination),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUE_CW: HeadingConvention = HeadingConvention::Clockwise(NorthReference::True);

    fn raw(degrees: f64, convention: HeadingConvention) -> RawHeading {
        RawHeading {
            degrees: Some(degrees),
            convention,
        }
    }

    #[test]
    fn test_heading_stays_below_360() {
        assert_eq!(Heading::new(-1e-14).degrees(), 0.0);
        assert_eq!(Heading::new(720.0).degrees(), 0.0);
        assert_eq!(Heading::new(-90.0).degrees(), 270.0);

        let blended = Heading::new(0.3).blend(Heading::new(359.7), 0.5);
        assert!((0.0..360.0).contains(&blended.degrees()), "{blended:?}");
        assert_eq!(blended.whole_degrees(), 0);
    }

    fn unsmoothed() -> OrientationAdapter {
        OrientationAdapter::new(&DispatchSettings {
            heading_smoothing: 1.0,
            magnetic_declination_degrees: 10.0,
            ..Default::default()
        })
    }

    fn updated(outcome: OrientationOutcome) -> Heading {
        match outcome {
            OrientationOutcome::Updated(h) => h,
            other => panic!("Expected a heading update, got {other:?}"),
        }
    }

    #[test]
    fn test_conventions() {
        let now = Instant::now();
        let step = Duration::from_secs(1);

        let mut adapter = unsmoothed();
        let h = updated(adapter.accept(raw(90.0, TRUE_CW), now));
        assert_eq!(h.whole_degrees(), 90);

        let ccw = HeadingConvention::CounterClockwise(NorthReference::True);
        let h = updated(adapter.accept(raw(90.0, ccw), now + step));
        assert_eq!(h.whole_degrees(), 270);

        let magnetic = HeadingConvention::Clockwise(NorthReference::Magnetic);
        let h = updated(adapter.accept(raw(355.0, magnetic), now + step * 2));
        assert_eq!(h.whole_degrees(), 5);

        let h = updated(adapter.accept(raw(0.0, ccw), now + step * 3));
        assert_eq!(h.whole_degrees(), 0);
    }

    #[test]
    fn test_throttle() {
        let now = Instant::now();
        let mut adapter = unsmoothed();
        updated(adapter.accept(raw(10.0, TRUE_CW), now));
        assert_eq!(
            adapter.accept(raw(20.0, TRUE_CW), now + Duration::from_millis(50)),
            OrientationOutcome::Throttled
        );
        let h = updated(adapter.accept(raw(30.0, TRUE_CW), now + Duration::from_millis(100)));
        assert_eq!(h.whole_degrees(), 30);
    }

    #[test]
    fn test_smoothing_wraps_north() {
        let now = Instant::now();
        let mut adapter = OrientationAdapter::new(&DispatchSettings::default());
        updated(adapter.accept(raw(350.0, TRUE_CW), now));
        let h = updated(adapter.accept(raw(10.0, TRUE_CW), now + Duration::from_secs(1)));
        // Halfway along the short arc is north, not south
        assert_eq!(h.whole_degrees(), 0);
    }

    #[test]
    fn test_unavailable_advises_once() {
        let now = Instant::now();
        let mut adapter = unsmoothed();
        let missing = RawHeading {
            degrees: None,
            convention: TRUE_CW,
        };
        assert_eq!(
            adapter.accept(missing, now),
            OrientationOutcome::Unavailable(Some(Advisory::OrientationUnavailable))
        );
        assert_eq!(
            adapter.accept(missing, now + Duration::from_secs(1)),
            OrientationOutcome::Unavailable(None)
        );
        assert!(adapter.current().is_none());
    }
}
