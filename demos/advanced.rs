//! Advanced magnetometer calibration demonstration
//!
//! This example replays a magnetometer log through a calibration session,
//! using the log's own timestamps to time the collection window, and plots
//! raw against corrected readings.
//!
//! Features demonstrated:
//! - Custom session and RANSAC settings
//! - Replaying recorded data with an externally driven clock
//! - Best-effort parameter publishing with per-parameter failures
//! - Structured logging of the pipeline via `RUST_LOG`
//! - Visualization of the ellipsoid before and after correction
//!
//! Run with: `RUST_LOG=mag_cal=debug cargo run --example advanced [log.csv]`
//!
//! Without an argument a synthetic log with injected interference is written
//! to `magnetometer_log.csv` and used instead.

use core::time::Duration;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;

use mag_cal::{
    CalibrationSettings, MagCalibrator, ManualClock, MeasurementOutcome, ParameterSink,
    RansacSettings,
};
use nalgebra::{Matrix3, Vector3};
use plotters::prelude::*;
use rand::prelude::*;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct MagnetometerRecord {
    #[serde(rename = "Time (s)")]
    time: f64,
    #[serde(rename = "Magnetometer X (uT)")]
    mag_x: f64,
    #[serde(rename = "Magnetometer Y (uT)")]
    mag_y: f64,
    #[serde(rename = "Magnetometer Z (uT)")]
    mag_z: f64,
}

impl MagnetometerRecord {
    fn field(&self) -> Vector3<f64> {
        Vector3::new(self.mag_x, self.mag_y, self.mag_z)
    }
}

/// Parameter store that refuses writes to a fixed set of names
#[derive(Debug, Default)]
struct ParameterStore {
    values: BTreeMap<String, f64>,
    read_only: Vec<&'static str>,
}

impl ParameterSink for ParameterStore {
    fn set_param(&mut self, name: &str, value: f64) -> Result<(), String> {
        if self.read_only.contains(&name) {
            return Err("parameter is read-only".to_string());
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }
}

const FIELD_STRENGTH: f64 = 48.0; // µT
const SAMPLE_RATE: f64 = 50.0; // Hz
const SYNTHETIC_LOG: &str = "magnetometer_log.csv";

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Advanced magnetometer calibration - log replay with diagnostics");

    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            write_synthetic_log(SYNTHETIC_LOG)?;
            println!("Wrote synthetic log to {SYNTHETIC_LOG}");
            SYNTHETIC_LOG.to_string()
        }
    };

    let mut reader = csv::Reader::from_path(&path)?;
    let mut records = Vec::new();
    for result in reader.deserialize() {
        let record: MagnetometerRecord = result?;
        records.push(record);
    }
    let Some(first) = records.first() else {
        return Err(format!("{path} contains no readings").into());
    };
    let start_time = first.time;

    let settings = CalibrationSettings {
        collection_duration: Duration::from_secs(40),
        measurement_skip: 2,       // keep one reading in three
        duplicate_tolerance: 1e-6, // treat sub-nT repeats as a stalled feed
        ransac: RansacSettings {
            iterations: 250,
            inlier_threshold: 1.5, // µT
            min_inliers: 50,
            ..Default::default()
        },
    };
    let store = ParameterStore {
        read_only: vec!["MAG_A13_COMP"],
        ..Default::default()
    };

    let clock = ManualClock::new();
    let mut calibrator = MagCalibrator::with_clock(settings, clock.clone(), store);
    calibrator.start(FIELD_STRENGTH)?;

    println!("Replaying {} readings from {}...", records.len(), path);

    let mut report = None;
    for (i, record) in records.iter().enumerate() {
        clock.set(Duration::from_secs_f64((record.time - start_time).max(0.0)));

        if let MeasurementOutcome::Finished(outcome) = calibrator.push_measurement(record.field()) {
            report = Some(outcome?);
            break;
        }

        if i % 500 == 0 {
            println!(
                "t={:.1}s: {} samples collected",
                record.time - start_time,
                calibrator.sample_count()
            );
        }
    }

    let Some(report) = report else {
        return Err("log ended before the collection window closed".into());
    };

    let result = report.result;
    let raw: Vec<_> = records.iter().map(MagnetometerRecord::field).collect();
    let corrected = result.apply_all(&raw);

    println!(
        "Fitted {} samples, {} inliers ({:.0}%)",
        report.samples_used,
        report.inliers,
        100.0 * report.inliers as f64 / report.samples_used as f64
    );
    println!("Hard iron: {:.3}", result.hard_iron().transpose());
    println!("Soft iron: {:.4}", result.soft_iron());
    println!(
        "Corrected magnitude RMS error: {:.3} µT",
        result.residual_rms(&raw)
    );
    for failure in &report.push_failures {
        println!("✗ {failure}");
    }
    println!(
        "✓ {} of 12 parameters stored",
        calibrator.sink().values.len()
    );

    println!("Generating calibration plots...");
    create_calibration_plots(&records, &raw, &corrected)?;
    println!("✓ Plots saved to calibration_plots.png");
    Ok(())
}

/// Write a tumbling-sensor log with soft/hard iron distortion, noise, and interference bursts
fn write_synthetic_log<P: AsRef<Path>>(path: P) -> Result<(), Box<dyn Error>> {
    let mut rng = Pcg64::seed_from_u64(42);
    #[rustfmt::skip]
    let soft_iron = Matrix3::new(
        1.10, 0.04, -0.02,
        0.04, 0.92, 0.03,
        -0.02, 0.03, 1.02,
    );
    let hard_iron = Vector3::new(14.0, -6.5, 22.0);

    let mut writer = csv::Writer::from_path(path)?;
    let count = (60.0 * SAMPLE_RATE) as usize;
    for i in 0..count {
        let time = i as f64 / SAMPLE_RATE;
        let yaw = time * 0.9;
        let pitch = (time * 0.23).sin() * 1.45;
        let direction =
            Vector3::new(pitch.cos() * yaw.cos(), pitch.cos() * yaw.sin(), pitch.sin());

        let mut field = soft_iron * direction * FIELD_STRENGTH + hard_iron;
        field += Vector3::new(
            rng.random_range(-0.2..0.2),
            rng.random_range(-0.2..0.2),
            rng.random_range(-0.2..0.2),
        );
        // Short bursts of interference from a nearby motor
        if (time % 7.0) < 0.4 {
            field += Vector3::new(rng.random_range(-30.0..30.0), 0.0, rng.random_range(-30.0..30.0));
        }

        writer.serialize(MagnetometerRecord {
            time,
            mag_x: field.x,
            mag_y: field.y,
            mag_z: field.z,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Create plots comparing raw and corrected readings
///
/// Generates a 4-panel plot showing:
/// 1. XY projection
/// 2. XZ projection
/// 3. YZ projection
/// 4. Field magnitude over time
fn create_calibration_plots(
    records: &[MagnetometerRecord],
    raw: &[Vector3<f64>],
    corrected: &[Vector3<f64>],
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new("calibration_plots.png", (1200, 1000)).into_drawing_area();
    root.fill(&WHITE)?;

    let (top, bottom) = root.split_vertically(600);
    let projections = top.split_evenly((1, 3));

    let extent = raw
        .iter()
        .chain(corrected)
        .map(|v| v.amax())
        .fold(FIELD_STRENGTH, f64::max)
        * 1.1;

    for (area, (name, a, b)) in projections
        .iter()
        .zip([("XY", 0, 1), ("XZ", 0, 2), ("YZ", 1, 2)])
    {
        let mut chart = ChartBuilder::on(area)
            .caption(format!("{name} projection"), ("sans-serif", 18))
            .margin(5)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(-extent..extent, -extent..extent)?;

        chart.configure_mesh().draw()?;

        chart
            .draw_series(
                raw.iter()
                    .map(|v| Circle::new((v[a], v[b]), 1, RED.mix(0.4).filled())),
            )?
            .label("Raw")
            .legend(|(x, y)| Circle::new((x, y), 3, RED.filled()));

        chart
            .draw_series(
                corrected
                    .iter()
                    .map(|v| Circle::new((v[a], v[b]), 1, BLUE.mix(0.4).filled())),
            )?
            .label("Corrected")
            .legend(|(x, y)| Circle::new((x, y), 3, BLUE.filled()));

        chart.configure_series_labels().draw()?;
    }

    let start = records.first().map_or(0.0, |r| r.time);
    let end = records.last().map_or(1.0, |r| r.time);
    let max_magnitude = raw.iter().map(|v| v.norm()).fold(FIELD_STRENGTH, f64::max) * 1.1;

    let mut magnitude_chart = ChartBuilder::on(&bottom)
        .caption("Field magnitude", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(start..end, 0.0..max_magnitude)?;

    magnitude_chart
        .configure_mesh()
        .x_desc("Time (s)")
        .y_desc("µT")
        .draw()?;

    magnitude_chart
        .draw_series(LineSeries::new(
            records.iter().zip(raw).map(|(r, v)| (r.time, v.norm())),
            &RED,
        ))?
        .label("Raw")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], RED));

    magnitude_chart
        .draw_series(LineSeries::new(
            records.iter().zip(corrected).map(|(r, v)| (r.time, v.norm())),
            &BLUE,
        ))?
        .label("Corrected")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], BLUE));

    magnitude_chart
        .draw_series(LineSeries::new(
            [(start, FIELD_STRENGTH), (end, FIELD_STRENGTH)],
            &BLACK,
        ))?
        .label("Reference")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], BLACK));

    magnitude_chart.configure_series_labels().draw()?;

    root.present()?;
    Ok(())
}
