//! Weekly metric series built from dated maintenance events.
//!
//! Weeks end on Monday: an event on a Monday belongs to the week ending that
//! day, an event on a Tuesday to the week ending the following Monday.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ForecastError, Result};

/// The metrics reported to the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Number of failures per week
    Failures,
    /// Total downtime hours per week
    Downtime,
    /// Total workload hours per week
    Workload,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Failures, MetricKind::Downtime, MetricKind::Workload];

    /// Key used in the prediction export
    pub fn export_key(self) -> &'static str {
        match self {
            MetricKind::Failures => "failures",
            MetricKind::Downtime => "downtime",
            MetricKind::Workload => "workload",
        }
    }

    /// Name under which the trained artifact is stored
    pub fn artifact_name(self) -> &'static str {
        match self {
            MetricKind::Failures => "model_failure_count",
            MetricKind::Downtime => "model_downtime",
            MetricKind::Workload => "model_workload_hours",
        }
    }

    /// How raw events roll up into this metric
    pub fn aggregation(self) -> Aggregation {
        match self {
            MetricKind::Failures => Aggregation::Count,
            MetricKind::Downtime | MetricKind::Workload => Aggregation::Sum,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.export_key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Add up event values; non-finite values count as zero
    Sum,
    /// Count events, ignoring their values
    Count,
}

/// The Monday on or after `date`
pub fn week_ending(date: NaiveDate) -> NaiveDate {
    let days_to_monday = (7 - date.weekday().num_days_from_monday()) % 7;
    date + Duration::days(days_to_monday as i64)
}

/// A gap-free series with one value per week
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklySeries {
    points: Vec<(NaiveDate, f64)>,
}

impl WeeklySeries {
    /// Validates that weeks are exactly seven days apart and values finite
    pub fn new(points: Vec<(NaiveDate, f64)>) -> Result<Self> {
        for pair in points.windows(2) {
            let (previous, next) = (pair[0].0, pair[1].0);
            if next - previous != Duration::days(7) {
                return Err(ForecastError::InvalidSeries(format!(
                    "weeks {} and {} are not consecutive",
                    previous, next
                )));
            }
        }
        if let Some((week, value)) = points.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ForecastError::InvalidSeries(format!(
                "non-finite value {} for week {}",
                value, week
            )));
        }
        Ok(WeeklySeries { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn weeks(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|(week, _)| *week).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, value)| *value).collect()
    }
}

/// Bucket dated events into weeks ending on Monday
///
/// Every week from the first to the last bucket is present; weeks without
/// events get zero.
pub fn aggregate_weekly(events: &[(NaiveDate, f64)], aggregation: Aggregation) -> WeeklySeries {
    let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for &(date, value) in events {
        let contribution = match aggregation {
            Aggregation::Sum if value.is_finite() => value,
            Aggregation::Sum => 0.0,
            Aggregation::Count => 1.0,
        };
        *buckets.entry(week_ending(date)).or_insert(0.0) += contribution;
    }

    let (first, last) = match (buckets.keys().next(), buckets.keys().next_back()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return WeeklySeries::default(),
    };

    let mut points = Vec::new();
    let mut week = first;
    while week <= last {
        points.push((week, buckets.get(&week).copied().unwrap_or(0.0)));
        week += Duration::days(7);
    }

    WeeklySeries { points }
}
