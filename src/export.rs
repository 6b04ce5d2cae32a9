use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// One evaluated window, in original units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// 1-based position within the evaluated windows
    pub step: usize,
    pub actual: f64,
    pub predicted: f64,
}

/// Metric category → ordered prediction records
pub type PredictionExport = BTreeMap<String, Vec<PredictionRecord>>;

pub fn to_json_string(export: &PredictionExport) -> Result<String> {
    Ok(serde_json::to_string_pretty(export)?)
}

/// Write the export as pretty JSON, creating parent directories as needed
pub fn write_predictions_json<P: AsRef<Path>>(path: P, export: &PredictionExport) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, to_json_string(export)?)?;
    tracing::info!(path = %path.display(), metrics = export.len(), "predictions exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_field_names() {
        let record = PredictionRecord { step: 1, actual: 10.0, predicted: 9.5 };
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json, serde_json::json!({ "step": 1, "actual": 10.0, "predicted": 9.5 }));
    }

    #[test]
    fn test_write_predictions_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("public").join("data").join("ml_predictions.json");

        let mut export = PredictionExport::new();
        export.insert("failures".into(), vec![PredictionRecord { step: 1, actual: 3.0, predicted: 2.75 }]);
        export.insert("workload".into(), Vec::new());
        write_predictions_json(&path, &export).unwrap();

        let read: PredictionExport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read, export);
    }
}
