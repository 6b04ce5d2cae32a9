//! Model store: one trained artifact per metric name.
//!
//! An artifact always carries the network together with the scale state it
//! was trained against. On disk every metric is a directory holding the
//! network file and `scale.json`; both are written in one atomic directory
//! swap and both must be present for a load to succeed.

use ndarray::{Array2, Dimension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::{ForecastError, Result};
use crate::layers::linear::LinearLayer;
use crate::layers::lstm_cell::LSTMCell;
use crate::models::sequence_model::SequenceModel;
use crate::scaler::ScaleState;

const SCALE_FILE: &str = "scale.json";

/// Serializable version of Array2<f64> for persistence
#[derive(Serialize, Deserialize, Clone, Debug)]
struct SerializableArray2 {
    data: Vec<f64>,
    shape: (usize, usize),
}

impl From<&Array2<f64>> for SerializableArray2 {
    fn from(array: &Array2<f64>) -> Self {
        Self {
            data: array.iter().cloned().collect(),
            shape: array.raw_dim().into_pattern(),
        }
    }
}

impl TryFrom<SerializableArray2> for Array2<f64> {
    type Error = ForecastError;

    fn try_from(array: SerializableArray2) -> Result<Self> {
        Array2::from_shape_vec(array.shape, array.data)
            .map_err(|e| ForecastError::Serialization(format!("bad matrix shape: {}", e)))
    }
}

/// Serializable LSTM cell parameters
#[derive(Serialize, Deserialize, Clone, Debug)]
struct SerializableLSTMCell {
    w_ih: SerializableArray2,
    w_hh: SerializableArray2,
    bias: SerializableArray2,
    input_size: usize,
    hidden_size: usize,
}

impl From<&LSTMCell> for SerializableLSTMCell {
    fn from(cell: &LSTMCell) -> Self {
        Self {
            w_ih: (&cell.w_ih).into(),
            w_hh: (&cell.w_hh).into(),
            bias: (&cell.bias).into(),
            input_size: cell.input_size,
            hidden_size: cell.hidden_size,
        }
    }
}

impl TryFrom<SerializableLSTMCell> for LSTMCell {
    type Error = ForecastError;

    fn try_from(cell: SerializableLSTMCell) -> Result<Self> {
        let lstm = LSTMCell {
            w_ih: cell.w_ih.try_into()?,
            w_hh: cell.w_hh.try_into()?,
            bias: cell.bias.try_into()?,
            input_size: cell.input_size,
            hidden_size: cell.hidden_size,
        };
        let gates = 4 * lstm.hidden_size;
        if lstm.w_ih.dim() != (gates, lstm.input_size)
            || lstm.w_hh.dim() != (gates, lstm.hidden_size)
            || lstm.bias.dim() != (gates, 1)
        {
            return Err(ForecastError::Serialization(
                "LSTM parameter shapes do not match stored sizes".into(),
            ));
        }
        Ok(lstm)
    }
}

/// Serializable sequence model
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SerializableSequenceModel {
    lstm: SerializableLSTMCell,
    head_weight: SerializableArray2,
    head_bias: SerializableArray2,
    dropout_rate: f64,
}

impl From<&SequenceModel> for SerializableSequenceModel {
    fn from(model: &SequenceModel) -> Self {
        Self {
            lstm: model.lstm().into(),
            head_weight: (&model.head().weight).into(),
            head_bias: (&model.head().bias).into(),
            dropout_rate: model.dropout_rate(),
        }
    }
}

impl TryFrom<SerializableSequenceModel> for SequenceModel {
    type Error = ForecastError;

    fn try_from(model: SerializableSequenceModel) -> Result<Self> {
        let lstm = LSTMCell::try_from(model.lstm)?;
        let head = LinearLayer::from_weights(model.head_weight.try_into()?, model.head_bias.try_into()?);
        if head.weight.dim() != (1, lstm.hidden_size) || head.bias.dim() != (1, 1) {
            return Err(ForecastError::Serialization(
                "output layer shape does not match hidden size".into(),
            ));
        }
        if !(0.0..1.0).contains(&model.dropout_rate) {
            return Err(ForecastError::Serialization(format!(
                "stored dropout rate {} out of range",
                model.dropout_rate
            )));
        }
        Ok(SequenceModel::from_parts(lstm, head, model.dropout_rate))
    }
}

/// Training information stored with every artifact
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ArtifactMetadata {
    pub metric: String,
    pub version: String,
    pub created_at: String,
    pub look_back: usize,
    pub hidden_size: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub final_loss: Option<f64>,
}

impl ArtifactMetadata {
    pub fn new(metric: &str, config: &PipelineConfig, final_loss: Option<f64>) -> Self {
        ArtifactMetadata {
            metric: metric.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            look_back: config.look_back,
            hidden_size: config.hidden_size,
            epochs: config.epochs,
            batch_size: config.batch_size,
            final_loss,
        }
    }
}

/// A trained model together with the scale state it was trained on
#[derive(Clone, Debug)]
pub struct ModelArtifact {
    pub metric: String,
    pub model: SequenceModel,
    pub scale: ScaleState,
    pub metadata: ArtifactMetadata,
}

impl ModelArtifact {
    pub fn look_back(&self) -> usize {
        self.model.look_back
    }
}

/// Network file contents
#[derive(Serialize, Deserialize)]
struct SavedNetwork {
    network: SerializableSequenceModel,
    metadata: ArtifactMetadata,
}

/// Key-value store of trained artifacts, keyed by metric name
///
/// Saving an artifact for a metric that already has one replaces it.
pub trait ModelStore {
    fn save(&mut self, artifact: &ModelArtifact) -> Result<()>;

    /// Fails with `ArtifactNotFound` unless a complete artifact is stored.
    fn load(&self, metric: &str) -> Result<ModelArtifact>;

    fn contains(&self, metric: &str) -> bool;
}

/// In-memory store, mostly for tests and single-process runs
#[derive(Default, Clone, Debug)]
pub struct MemoryModelStore {
    artifacts: HashMap<String, ModelArtifact>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl ModelStore for MemoryModelStore {
    fn save(&mut self, artifact: &ModelArtifact) -> Result<()> {
        validate_metric_name(&artifact.metric)?;
        self.artifacts.insert(artifact.metric.clone(), artifact.clone());
        Ok(())
    }

    fn load(&self, metric: &str) -> Result<ModelArtifact> {
        self.artifacts
            .get(metric)
            .cloned()
            .ok_or_else(|| ForecastError::artifact_not_found(metric))
    }

    fn contains(&self, metric: &str) -> bool {
        self.artifacts.contains_key(metric)
    }
}

/// Encoding used for the network file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactFormat {
    /// `network.bin`, compact and fast
    #[default]
    Binary,
    /// `network.json`, human-readable
    Json,
}

impl ArtifactFormat {
    fn file_name(self) -> &'static str {
        match self {
            ArtifactFormat::Binary => "network.bin",
            ArtifactFormat::Json => "network.json",
        }
    }

    fn encode(self, saved: &SavedNetwork) -> Result<Vec<u8>> {
        Ok(match self {
            ArtifactFormat::Binary => bincode::serialize(saved)?,
            ArtifactFormat::Json => serde_json::to_vec_pretty(saved)?,
        })
    }

    fn decode(self, bytes: &[u8]) -> Result<SavedNetwork> {
        Ok(match self {
            ArtifactFormat::Binary => bincode::deserialize(bytes)?,
            ArtifactFormat::Json => serde_json::from_slice(bytes)?,
        })
    }
}

/// Directory-backed store
///
/// Layout: `<root>/<metric>/network.{bin,json}` plus `<root>/<metric>/scale.json`.
#[derive(Debug, Clone)]
pub struct FileModelStore {
    root: PathBuf,
    format: ArtifactFormat,
}

impl FileModelStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self::with_format(root, ArtifactFormat::default())
    }

    pub fn with_format<P: AsRef<Path>>(root: P, format: ArtifactFormat) -> Self {
        FileModelStore {
            root: root.as_ref().to_path_buf(),
            format,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the artifact for `metric`
    pub fn artifact_dir(&self, metric: &str) -> PathBuf {
        self.root.join(metric)
    }

    /// The network file present for `metric`, whichever format wrote it
    fn find_network(&self, dir: &Path) -> Option<(PathBuf, ArtifactFormat)> {
        [self.format, ArtifactFormat::Binary, ArtifactFormat::Json]
            .into_iter()
            .map(|format| (dir.join(format.file_name()), format))
            .find(|(path, _)| path.is_file())
    }
}

impl ModelStore for FileModelStore {
    fn save(&mut self, artifact: &ModelArtifact) -> Result<()> {
        let metric = artifact.metric.as_str();
        validate_metric_name(metric)?;
        fs::create_dir_all(&self.root)?;

        let staging = self.root.join(format!(".{}.tmp", metric));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir(&staging)?;

        let saved = SavedNetwork {
            network: (&artifact.model).into(),
            metadata: artifact.metadata.clone(),
        };
        fs::write(staging.join(self.format.file_name()), self.format.encode(&saved)?)?;
        fs::write(staging.join(SCALE_FILE), serde_json::to_vec_pretty(&artifact.scale)?)?;

        let target = self.artifact_dir(metric);
        if target.exists() {
            let retired = self.root.join(format!(".{}.old", metric));
            if retired.exists() {
                fs::remove_dir_all(&retired)?;
            }
            fs::rename(&target, &retired)?;
            fs::rename(&staging, &target)?;
            fs::remove_dir_all(&retired)?;
        } else {
            fs::rename(&staging, &target)?;
        }

        tracing::debug!(metric, path = %target.display(), "artifact saved");
        Ok(())
    }

    fn load(&self, metric: &str) -> Result<ModelArtifact> {
        validate_metric_name(metric)?;
        let dir = self.artifact_dir(metric);
        let scale_path = dir.join(SCALE_FILE);

        let (network_path, format) = match self.find_network(&dir) {
            Some(found) if scale_path.is_file() => found,
            _ => return Err(ForecastError::artifact_not_found(metric)),
        };

        let saved = format.decode(&fs::read(&network_path)?)?;
        let scale: ScaleState = serde_json::from_slice(&fs::read(&scale_path)?)?;
        if !scale.is_valid() {
            return Err(ForecastError::Serialization(format!(
                "stored scale for {} is unusable: min {} max {}",
                metric, scale.min, scale.max
            )));
        }
        let model = SequenceModel::try_from(saved.network)?;

        Ok(ModelArtifact {
            metric: metric.to_string(),
            model,
            scale,
            metadata: saved.metadata,
        })
    }

    fn contains(&self, metric: &str) -> bool {
        if validate_metric_name(metric).is_err() {
            return false;
        }
        let dir = self.artifact_dir(metric);
        dir.join(SCALE_FILE).is_file() && self.find_network(&dir).is_some()
    }
}

/// Metric names become directory names, so keep them to a single plain component
pub fn validate_metric_name(metric: &str) -> Result<()> {
    let valid = !metric.is_empty()
        && !metric.starts_with('.')
        && !metric.contains(['/', '\\'])
        && !metric.chars().any(char::is_control);
    if valid {
        Ok(())
    } else {
        Err(ForecastError::InvalidMetricName(metric.to_string()))
    }
}
