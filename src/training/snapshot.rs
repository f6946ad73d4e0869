//! Status snapshots polled from the training service.
//!
//! Each poll produces an immutable [`StatusSnapshot`]; a new snapshot
//! supersedes the prior one. The status tag vocabulary is an external
//! contract; unrecognized tags are carried verbatim and treated as
//! non-terminal.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Fixed accuracy reported when neither an explicit accuracy nor a detection
/// metric is present in the final snapshot.
pub const DEFAULT_ACCURACY: f64 = 0.85;

/// Lifecycle phase reported by the training service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Initializing,
    PreparingDataset,
    DatasetCreated,
    Running,
    Exporting,
    Completed,
    Failed,
    Cancelled,
    /// The service lost track of the job; treated as a failure variant.
    NotFound,
    /// Unrecognized tag, displayed verbatim and treated as non-terminal.
    Other(String),
}

impl JobPhase {
    /// Parse a status tag from the wire, folding known aliases.
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "initializing" => Self::Initializing,
            "preparing_dataset" | "preparing_data" => Self::PreparingDataset,
            "dataset_created" => Self::DatasetCreated,
            "running" | "training" => Self::Running,
            "exporting" => Self::Exporting,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "not_found" => Self::NotFound,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether no further progress updates can occur after this phase.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::NotFound
        )
    }

    /// Canonical tag for display and logging.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Initializing => "initializing",
            Self::PreparingDataset => "preparing_dataset",
            Self::DatasetCreated => "dataset_created",
            Self::Running => "running",
            Self::Exporting => "exporting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::NotFound => "not_found",
            Self::Other(tag) => tag,
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One polled status payload describing a job at a point in time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusSnapshot {
    pub status: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub current_epoch: Option<u32>,
    #[serde(default)]
    pub total_epochs: Option<u32>,
    /// Progress percent reported by the service, when present.
    #[serde(default)]
    pub progress: Option<f64>,
    /// Metric mapping; keys follow the service's inconsistent naming and are
    /// folded through [`canonical_metric_key`].
    #[serde(default)]
    pub metrics: Option<BTreeMap<String, serde_json::Value>>,
    /// Explicit accuracy value, preferred over any detection metric.
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// `YYYY-MM-DD HH:MM:SS` timestamps written by the service.
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    /// Duration in seconds, when the service computed one.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
    #[serde(default)]
    pub model_path: Option<String>,
    /// Opaque dataset summary passed through for display.
    #[serde(default)]
    pub dataset_info: Option<serde_json::Value>,
    /// Per-epoch history used by metric-curve consumers; passed through.
    #[serde(default)]
    pub epochs: Option<serde_json::Value>,
}

impl StatusSnapshot {
    /// The lifecycle phase this snapshot reports.
    pub fn phase(&self) -> JobPhase {
        JobPhase::parse(&self.status)
    }

    /// Metrics folded onto the canonical schema, numeric values only.
    ///
    /// Keys with no known alias pass through untouched. When an alias and its
    /// canonical form both appear, the canonical entry wins.
    pub fn canonical_metrics(&self) -> BTreeMap<String, f64> {
        let mut folded = BTreeMap::new();
        let Some(metrics) = &self.metrics else {
            return folded;
        };
        for (key, value) in metrics {
            let Some(value) = value.as_f64() else {
                continue;
            };
            let canonical = canonical_metric_key(key);
            if canonical != key && metrics.contains_key(canonical) {
                continue;
            }
            folded.insert(canonical.to_string(), value);
        }
        folded
    }

    /// Look up one metric by canonical name.
    pub fn metric(&self, canonical: &str) -> Option<f64> {
        self.canonical_metrics().get(canonical).copied()
    }

    /// Accuracy for the surrounding form: the explicit value, else the
    /// canonical `map50` metric, else [`DEFAULT_ACCURACY`].
    pub fn accuracy_or_default(&self) -> f64 {
        self.accuracy
            .or_else(|| self.metric("map50"))
            .unwrap_or(DEFAULT_ACCURACY)
    }
}

/// Fold a wire metric key onto the canonical schema.
///
/// Canonical keys: `map50`, `precision`, `recall`, `loss`. The service emits
/// YOLO-flavored variants (`mAP50(B)`, `metrics/mAP_0.5`, `train/box_loss`)
/// depending on which component wrote the status file.
pub fn canonical_metric_key(raw: &str) -> &str {
    match raw {
        "map50" | "mAP50(B)" | "mAP_50" | "best_map50" | "metrics/mAP_0.5" => "map50",
        "precision" | "precision(B)" | "metrics/precision" => "precision",
        "recall" | "recall(B)" | "metrics/recall" => "recall",
        "loss" | "box_loss" | "train/box_loss" => "loss",
        other => other,
    }
}
