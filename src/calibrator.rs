//! Calibration session state machine
//!
//! [`MagCalibrator`] times the collection window, feeds accepted samples into
//! a [`SampleBuffer`], and runs the RANSAC fit and parameter extraction once
//! the window closes. It owns no threads or subscriptions: measurements are
//! pushed in by the host, time comes from a [`Clock`], and results go out
//! through a [`ParameterSink`].

use core::mem;
use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use nalgebra::Vector3;
use tracing::{info, trace, warn};

use crate::buffer::SampleBuffer;
use crate::calibration::{CalibrationResult, extract_calibration};
use crate::error::{CalibrationError, Result};
use crate::ransac::estimate_ellipsoid;
use crate::types::CalibrationSettings;

/// Monotonic time source
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

/// Wall-clock time source backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Clock whose origin is the moment of creation
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Externally driven clock, e.g. from message timestamps when replaying logs
///
/// Clones share the same time, so a host can keep one handle and give another
/// to the calibrator.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current time
    pub fn set(&self, now: Duration) {
        let nanos = u64::try_from(now.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.store(nanos, Ordering::Relaxed);
    }

    /// Move the current time forward
    pub fn advance(&self, step: Duration) {
        self.set(self.now().saturating_add(step));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

/// Destination for calibration parameters, one named scalar per call
///
/// Implemented for closures `FnMut(&str, f64) -> Result<(), String>`.
pub trait ParameterSink {
    /// Store one parameter; an error carries the rejection reason
    fn set_param(&mut self, name: &str, value: f64) -> core::result::Result<(), String>;
}

impl<F> ParameterSink for F
where
    F: FnMut(&str, f64) -> core::result::Result<(), String>,
{
    fn set_param(&mut self, name: &str, value: f64) -> core::result::Result<(), String> {
        self(name, value)
    }
}

/// Pull-based supply of magnetometer readings
///
/// Implemented for any iterator of `Vector3<f64>`.
pub trait MeasurementSource {
    /// Next reading, or `None` when the source is exhausted
    fn next_measurement(&mut self) -> Option<Vector3<f64>>;
}

impl<I> MeasurementSource for I
where
    I: Iterator<Item = Vector3<f64>>,
{
    fn next_measurement(&mut self) -> Option<Vector3<f64>> {
        self.next()
    }
}

/// Observable calibrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibratorState {
    /// No session in progress
    Idle,
    /// Collecting samples until the window closes
    Collecting,
    /// Fitting the collected samples
    Computing,
}

/// Summary of a successful session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// Extracted calibration
    pub result: CalibrationResult,
    /// Samples collected during the window
    pub samples_used: usize,
    /// Samples supporting the fitted ellipsoid
    pub inliers: usize,
    /// Parameters the sink rejected; the others were stored
    pub push_failures: Vec<CalibrationError>,
}

/// What happened to a pushed measurement
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementOutcome {
    /// Stored in the current session
    Accepted,
    /// Ignored: no session, decimated, repeated, or not finite
    Rejected,
    /// Arrived after the window closed and triggered the fit
    Finished(Result<SessionReport>),
}

impl MeasurementOutcome {
    /// Whether the measurement was stored
    pub fn accepted(&self) -> bool {
        matches!(self, MeasurementOutcome::Accepted)
    }
}

#[derive(Debug)]
struct Collection {
    started_at: Duration,
    reference_field_strength: f64,
    buffer: SampleBuffer,
}

#[derive(Debug)]
enum Session {
    Idle,
    Collecting(Collection),
    Computing,
}

/// Magnetometer calibration session controller
///
/// The parameter sink and clock are supplied at construction. Measurements are
/// not: the host pushes each reading through [`MagCalibrator::push_measurement`],
/// or lends a [`MeasurementSource`] to [`MagCalibrator::pump`] for the length of a
/// session, so the calibrator never owns the sensor feed.
///
/// # Example
/// ```
/// use core::time::Duration;
/// use nalgebra::Vector3;
/// use mag_cal::{CalibrationSettings, MagCalibrator, ManualClock};
///
/// let clock = ManualClock::new();
/// let settings = CalibrationSettings {
///     collection_duration: Duration::from_secs(10),
///     measurement_skip: 0,
///     ..Default::default()
/// };
/// let sink = |name: &str, value: f64| -> Result<(), String> {
///     println!("{name} = {value}");
///     Ok(())
/// };
/// let mut calibrator = MagCalibrator::with_clock(settings, clock.clone(), sink);
///
/// calibrator.start(50.0).unwrap();
/// assert!(calibrator.is_calibrating());
///
/// assert!(calibrator.push_measurement(Vector3::new(50.0, 0.0, 0.0)).accepted());
/// ```
pub struct MagCalibrator<P: ParameterSink, C: Clock = MonotonicClock> {
    settings: CalibrationSettings,
    clock: C,
    sink: P,
    session: Session,
    result: Option<CalibrationResult>,
    last_error: Option<CalibrationError>,
}

impl<P: ParameterSink> MagCalibrator<P, MonotonicClock> {
    /// Create a calibrator timed by the system monotonic clock
    pub fn new(settings: CalibrationSettings, sink: P) -> Self {
        Self::with_clock(settings, MonotonicClock::new(), sink)
    }
}

impl<P: ParameterSink, C: Clock> MagCalibrator<P, C> {
    /// Create a calibrator with an explicit time source
    pub fn with_clock(settings: CalibrationSettings, clock: C, sink: P) -> Self {
        Self {
            settings,
            clock,
            sink,
            session: Session::Idle,
            result: None,
            last_error: None,
        }
    }

    /// Current settings
    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    /// Replace the settings; takes effect at the next session start
    pub fn set_settings(&mut self, settings: CalibrationSettings) {
        self.settings = settings;
    }

    /// Begin a session scaled to `reference_field_strength`
    ///
    /// # Errors
    /// * [`CalibrationError::AlreadyCalibrating`] if a session is in progress; it is left untouched
    /// * [`CalibrationError::InvalidReferenceStrength`] unless the strength is positive and finite
    pub fn start(&mut self, reference_field_strength: f64) -> Result<()> {
        if !matches!(self.session, Session::Idle) {
            warn!("calibration start requested while already calibrating");
            return Err(CalibrationError::AlreadyCalibrating);
        }
        if !(reference_field_strength > 0.0 && reference_field_strength.is_finite()) {
            warn!(reference_field_strength, "rejecting calibration start");
            return Err(CalibrationError::InvalidReferenceStrength(reference_field_strength));
        }

        info!(
            reference_field_strength,
            duration_s = self.settings.collection_duration.as_secs_f64(),
            "magnetometer calibration started"
        );
        self.session = Session::Collecting(Collection {
            started_at: self.clock.now(),
            reference_field_strength,
            buffer: SampleBuffer::from_settings(&self.settings),
        });
        Ok(())
    }

    /// Abandon the session in progress without fitting; returns whether one was active
    pub fn cancel(&mut self) -> bool {
        match mem::replace(&mut self.session, Session::Idle) {
            Session::Idle => false,
            _ => {
                info!("magnetometer calibration cancelled");
                true
            }
        }
    }

    /// Whether a session is collecting or computing
    pub fn is_calibrating(&self) -> bool {
        !matches!(self.session, Session::Idle)
    }

    /// Current session state
    pub fn state(&self) -> CalibratorState {
        match self.session {
            Session::Idle => CalibratorState::Idle,
            Session::Collecting(_) => CalibratorState::Collecting,
            Session::Computing => CalibratorState::Computing,
        }
    }

    /// Time since the session started, if collecting
    pub fn elapsed(&self) -> Option<Duration> {
        match &self.session {
            Session::Collecting(collection) => {
                Some(self.clock.now().saturating_sub(collection.started_at))
            }
            _ => None,
        }
    }

    /// Samples stored so far in the current session
    pub fn sample_count(&self) -> usize {
        match &self.session {
            Session::Collecting(collection) => collection.buffer.len(),
            _ => 0,
        }
    }

    /// Samples stored so far in the current session
    pub fn samples(&self) -> &[Vector3<f64>] {
        match &self.session {
            Session::Collecting(collection) => collection.buffer.samples(),
            _ => &[],
        }
    }

    /// Most recent successful calibration
    pub fn result(&self) -> Option<&CalibrationResult> {
        self.result.as_ref()
    }

    /// Failure of the most recent session, cleared by the next success
    pub fn last_error(&self) -> Option<&CalibrationError> {
        self.last_error.as_ref()
    }

    /// Access the parameter sink
    pub fn sink(&self) -> &P {
        &self.sink
    }

    /// Offer one magnetometer reading
    ///
    /// While the window is open the reading goes to the sample buffer. The
    /// first reading after the window closes runs the fit synchronously and
    /// reports the session outcome.
    pub fn push_measurement(&mut self, field: Vector3<f64>) -> MeasurementOutcome {
        let Session::Collecting(collection) = &mut self.session else {
            trace!("measurement ignored, no calibration in progress");
            return MeasurementOutcome::Rejected;
        };

        let elapsed = self.clock.now().saturating_sub(collection.started_at);
        if elapsed <= self.settings.collection_duration {
            return if collection.buffer.accept(field) {
                MeasurementOutcome::Accepted
            } else {
                trace!("measurement decimated or repeated");
                MeasurementOutcome::Rejected
            };
        }

        let Session::Collecting(collection) = mem::replace(&mut self.session, Session::Computing)
        else {
            return MeasurementOutcome::Rejected;
        };
        let outcome = self.compute(collection);
        self.session = Session::Idle;

        match &outcome {
            Ok(report) => {
                self.last_error = None;
                info!(
                    samples = report.samples_used,
                    inliers = report.inliers,
                    push_failures = report.push_failures.len(),
                    "magnetometer calibration complete"
                );
            }
            Err(err) => {
                warn!(%err, "magnetometer calibration failed");
                self.last_error = Some(err.clone());
            }
        }
        MeasurementOutcome::Finished(outcome)
    }

    /// Drain `source` while a session is active
    ///
    /// Returns the session outcome once the window closes, or `None` if the
    /// source runs dry first (or no session was active).
    pub fn pump<S: MeasurementSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Option<Result<SessionReport>> {
        while self.is_calibrating() {
            let field = source.next_measurement()?;
            if let MeasurementOutcome::Finished(outcome) = self.push_measurement(field) {
                return Some(outcome);
            }
        }
        None
    }

    fn compute(&mut self, collection: Collection) -> Result<SessionReport> {
        let samples = collection.buffer.into_samples();
        info!(samples = samples.len(), "collection window closed, fitting ellipsoid");

        let estimate = estimate_ellipsoid(&samples, &self.settings.ransac)?;
        let result = extract_calibration(&estimate.model, collection.reference_field_strength)?;

        let push_failures = self.publish(&result);
        self.result = Some(result);

        Ok(SessionReport {
            result,
            samples_used: samples.len(),
            inliers: estimate.inlier_count(),
            push_failures,
        })
    }

    /// Push every parameter, continuing past failures
    fn publish(&mut self, result: &CalibrationResult) -> Vec<CalibrationError> {
        let mut failures = Vec::new();
        for (name, value) in result.parameters() {
            if let Err(reason) = self.sink.set_param(name, value) {
                warn!(parameter = name, value, %reason, "failed to set calibration parameter");
                failures.push(CalibrationError::ParameterPushFailed { name, reason });
            }
        }
        failures
    }
}
