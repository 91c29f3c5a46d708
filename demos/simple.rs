use core::time::Duration;

use mag_cal::{CalibrationSettings, MagCalibrator, ManualClock, MeasurementOutcome};
use nalgebra::Vector3;

const SAMPLE_PERIOD: Duration = Duration::from_millis(20); // 50 Hz magnetometer
const FIELD_STRENGTH: f64 = 48.0; // local field in µT

fn main() {
    let clock = ManualClock::new();
    let settings = CalibrationSettings {
        collection_duration: Duration::from_secs(20),
        measurement_skip: 4,
        ..Default::default()
    };
    let sink = |name: &str, value: f64| -> Result<(), String> {
        println!("{name:>13} = {value:.6}"); // replace this with a write to your parameter store
        Ok(())
    };
    let mut calibrator = MagCalibrator::with_clock(settings, clock.clone(), sink);

    calibrator
        .start(FIELD_STRENGTH)
        .expect("reference field strength is positive");

    for i in 0.. {
        // this loop should repeat each time new magnetometer data is available
        clock.advance(SAMPLE_PERIOD);
        let magnetometer = simulated_reading(i); // replace this with actual magnetometer data in µT

        if let MeasurementOutcome::Finished(outcome) = calibrator.push_measurement(magnetometer) {
            match outcome {
                Ok(report) => println!(
                    "Calibrated from {} samples ({} inliers)",
                    report.samples_used, report.inliers
                ),
                Err(err) => println!("Calibration failed: {err}"),
            }
            break;
        }
    }
}

/// Sensor tumbling through orientations with a hard-iron offset and unequal axis gains
fn simulated_reading(i: u32) -> Vector3<f64> {
    let t = i as f64 * 0.013;
    let (yaw, pitch) = (t * 7.0, (t * 1.9).sin() * 1.4);
    let direction = Vector3::new(pitch.cos() * yaw.cos(), pitch.cos() * yaw.sin(), pitch.sin());
    let gains = Vector3::new(1.08, 0.93, 1.01);
    direction.component_mul(&gains) * FIELD_STRENGTH + Vector3::new(12.0, -7.5, 3.2)
}
