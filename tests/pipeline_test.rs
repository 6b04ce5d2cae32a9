use chrono::{Duration, NaiveDate};
use maintenance_forecast::{
    aggregate_weekly, chronological_split, window, ForecastError, MemoryModelStore, MetricKind,
    PipelineConfig, PredictionPipeline, ScaleState, TrainingPipeline,
};

fn config() -> PipelineConfig {
    PipelineConfig {
        epochs: 4,
        hidden_size: 12,
        seed: Some(2024),
        ..Default::default()
    }
}

/// Two years of synthetic failure events, a few per week with a seasonal swing
fn failure_events() -> Vec<(NaiveDate, f64)> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let mut events = Vec::new();
    for day in 0..728i64 {
        let per_day = if (day / 7) % 6 < 3 { day % 2 } else { (day % 3 == 0) as i64 * 2 };
        for k in 0..per_day {
            events.push((start + Duration::days(day), 0.5 + k as f64));
        }
    }
    events
}

#[test]
fn test_reference_example() {
    let series = [2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0];

    let windows = window(&series, 4);
    assert_eq!(windows.inputs, vec![vec![2.0, 4.0, 6.0, 8.0], vec![4.0, 6.0, 8.0, 10.0]]);
    assert_eq!(windows.targets, vec![10.0, 12.0]);

    let scale = ScaleState::fit(&series).unwrap();
    assert_eq!(scale.transform(&[2.0, 14.0, 8.0]), vec![0.0, 1.0, 0.5]);
}

#[test]
fn test_split_then_window_keeps_time_order() {
    let series: Vec<f64> = (0..40).map(|i| i as f64).collect();
    let scale = ScaleState::fit(&series).unwrap();
    let scaled = scale.transform(&series);

    let (train, test) = chronological_split(&scaled, 0.8);
    assert_eq!(train.len(), 32);
    assert_eq!([train, test].concat(), scaled);

    let train_windows = window(train, 4);
    let test_windows = window(test, 4);
    assert_eq!(train_windows.len(), 27);
    assert_eq!(test_windows.len(), 3);
    assert!(train_windows.targets.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(train_windows.targets.last().unwrap() < test_windows.inputs[0].first().unwrap());
}

#[test]
fn test_events_to_predictions_for_every_metric() {
    let events = failure_events();
    let failures = aggregate_weekly(&events, MetricKind::Failures.aggregation());
    let downtime = aggregate_weekly(&events, MetricKind::Downtime.aggregation());
    assert_eq!(failures.len(), 104);
    assert_eq!(downtime.len(), 104);

    let metrics = vec![
        (MetricKind::Failures.artifact_name(), failures.values()),
        (MetricKind::Downtime.artifact_name(), downtime.values()),
    ];

    let mut store = MemoryModelStore::new();
    let training = TrainingPipeline::new(config()).unwrap();
    let trained = training.run(&mut store, metrics.clone());
    assert!(trained.all_succeeded(), "{:?}", trained.failed().collect::<Vec<_>>());

    for (_, summary) in trained.succeeded() {
        // floor(0.8 * 104) = 83 training weeks
        assert_eq!(summary.train_windows, 83 - 5);
        assert_eq!(summary.test_windows, 21 - 5);
    }

    // workload was never trained, its siblings still predict
    let mut requested = metrics.clone();
    requested.push((MetricKind::Workload.artifact_name(), failures.values()));

    let report = PredictionPipeline::new(config()).unwrap().run(&store, requested);
    assert!(matches!(
        report.get("model_workload_hours"),
        Some(Err(ForecastError::ArtifactNotFound { .. }))
    ));

    let records = report.records("model_failure_count");
    assert_eq!(records.len(), 104 - 5);
    let steps: Vec<usize> = records.iter().map(|r| r.step).collect();
    assert_eq!(steps, (1..=99).collect::<Vec<_>>());
    for (i, record) in records.iter().enumerate() {
        assert!((record.actual - failures.values()[i + 4]).abs() < 1e-9);
    }

    let export = report.into_export();
    assert_eq!(export.len(), 3);
    assert!(export["model_workload_hours"].is_empty());
    assert_eq!(export["model_downtime"].len(), 99);
}

#[test]
fn test_one_bad_metric_does_not_abort_the_run() {
    let mut store = MemoryModelStore::new();
    let training = TrainingPipeline::new(config()).unwrap();
    let good: Vec<f64> = (0..60).map(|i| ((i * 5) % 9) as f64).collect();

    let report = training.run(
        &mut store,
        vec![("constant", vec![4.0; 60]), ("good", good), ("short", vec![1.0, 2.0, 3.0])],
    );

    assert_eq!(report.len(), 3);
    assert!(matches!(report.get("constant"), Some(Err(ForecastError::DegenerateRange { .. }))));
    assert!(matches!(report.get("short"), Some(Err(ForecastError::InsufficientData { .. }))));
    assert!(matches!(report.get("good"), Some(Ok(_))));
    assert_eq!(report.succeeded().count(), 1);
}

#[test]
fn test_invalid_config_rejected() {
    let bad = PipelineConfig { split_ratio: 0.0, ..config() };
    assert!(matches!(TrainingPipeline::new(bad.clone()), Err(ForecastError::InvalidConfig(_))));
    assert!(matches!(PredictionPipeline::new(bad), Err(ForecastError::InvalidConfig(_))));
}
