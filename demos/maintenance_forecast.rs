//! Train and export forecasts for all three maintenance metrics.
//!
//! Synthetic event logs stand in for the plant's intervention records.
//!
//! ```bash
//! RUST_LOG=maintenance_forecast=debug cargo run --example maintenance_forecast -- [config.json]
//! ```

use chrono::{Duration, NaiveDate};
use maintenance_forecast::{
    aggregate_weekly, write_predictions_json, FileModelStore, MetricKind, PipelineConfig,
    PredictionExport, PredictionPipeline, TrainingPipeline,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Gamma, Poisson};
use std::collections::BTreeMap;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Dated failure events with their downtime hours
fn failure_log(rng: &mut StdRng, start: NaiveDate, days: i64) -> Vec<(NaiveDate, f64)> {
    let hours = Gamma::new(2.0, 1.5).expect("valid gamma parameters");
    let mut events = Vec::new();
    for day in 0..days {
        let season = 1.0 + 0.6 * ((day as f64) * std::f64::consts::TAU / 365.0).sin();
        let count: f64 = Poisson::new(0.6 * season)
            .map(|p| Distribution::<f64>::sample(&p, rng))
            .unwrap_or(0.0);
        for _ in 0..count as usize {
            events.push((start + Duration::days(day), hours.sample(rng)));
        }
    }
    events
}

/// Dated work orders with technician hours
fn workload_log(rng: &mut StdRng, start: NaiveDate, days: i64) -> Vec<(NaiveDate, f64)> {
    (0..days)
        .filter(|day| day % 7 < 5)
        .map(|day| (start + Duration::days(day), rng.gen_range(2.0..9.0)))
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maintenance_forecast=info".into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig {
            seed: Some(7),
            ..Default::default()
        },
    };

    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or(0));
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).ok_or("bad start date")?;
    let failures = failure_log(&mut rng, start, 3 * 365);
    let workload = workload_log(&mut rng, start, 3 * 365);

    let mut series: BTreeMap<MetricKind, Vec<f64>> = BTreeMap::new();
    for kind in MetricKind::ALL {
        let events = match kind {
            MetricKind::Failures | MetricKind::Downtime => &failures,
            MetricKind::Workload => &workload,
        };
        series.insert(kind, aggregate_weekly(events, kind.aggregation()).values());
    }

    let out_dir = std::env::temp_dir().join("maintenance_forecast");
    let mut store = FileModelStore::new(out_dir.join("saved_models"));

    let training = TrainingPipeline::new(config.clone())?;
    let trained = training.run(
        &mut store,
        series.iter().map(|(kind, values)| (kind.artifact_name(), values)),
    );
    for (metric, summary) in trained.succeeded() {
        println!(
            "{:<22} weeks={:<4} train_windows={:<4} final_loss={:.6}",
            metric,
            summary.series_len,
            summary.train_windows,
            summary.final_loss.unwrap_or(f64::NAN)
        );
    }
    for (metric, err) in trained.failed() {
        println!("{:<22} skipped: {}", metric, err);
    }

    let prediction = PredictionPipeline::new(config)?;
    let report = prediction.run(
        &store,
        series.iter().map(|(kind, values)| (kind.artifact_name(), values)),
    );

    // export under the dashboard's category keys
    let export: PredictionExport = MetricKind::ALL
        .iter()
        .map(|kind| (kind.export_key().to_string(), report.records(kind.artifact_name()).to_vec()))
        .collect();

    let export_path = out_dir.join("ml_predictions.json");
    write_predictions_json(&export_path, &export)?;
    println!("Predictions exported to {}", export_path.display());

    Ok(())
}
