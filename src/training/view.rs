//! Pure projection of status snapshots into displayable view state.
//!
//! Keeping this a function of `StatusSnapshot -> ViewState` means the state
//! machine and rendering are testable without any rendered page; callers
//! (the CLI, or an embedding UI) only print what comes out of here.

use std::time::Duration;

use time::{PrimitiveDateTime, format_description::FormatItem, macros::format_description};

use crate::training::snapshot::{JobPhase, StatusSnapshot};

/// Timestamp format written by the training service.
const SERVICE_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Progress never shown above this while estimated from wall-clock time.
const ESTIMATE_CAP_PERCENT: u8 = 95;

/// Severity of the headline notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Displayable progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressView {
    /// Rounded percent in `0..=100`.
    pub percent: u8,
    /// True when derived from elapsed wall-clock time rather than epoch
    /// counts; carries no correctness guarantee.
    pub estimated: bool,
}

/// Final result rows shown once a session completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTable {
    pub rows: Vec<(String, String)>,
}

/// Everything a front end needs to render one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub status_line: String,
    pub notice: NoticeLevel,
    pub progress: Option<ProgressView>,
    pub results: Option<ResultTable>,
}

/// Rendering options, surfaced from [`crate::config::MonitorConfig`].
#[derive(Debug, Clone)]
pub struct ViewOptions {
    /// Canonical metric names to include in the result table.
    pub metric_keys: Vec<String>,
    /// Percent-per-minute ramp for the wall-clock progress estimate.
    pub ramp_percent_per_minute: f32,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            metric_keys: ["map50", "precision", "recall", "loss"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            ramp_percent_per_minute: 5.0,
        }
    }
}

/// Project one snapshot into view state.
///
/// `elapsed` is the wall-clock time since the job went active, used only for
/// the estimated progress ramp while the service has not reported epochs.
pub fn view_state(
    snapshot: &StatusSnapshot,
    elapsed: Option<Duration>,
    options: &ViewOptions,
) -> ViewState {
    let phase = snapshot.phase();
    ViewState {
        status_line: status_line(&phase, snapshot),
        notice: notice_level(&phase),
        progress: progress_view(&phase, snapshot, elapsed, options.ramp_percent_per_minute),
        results: matches!(phase, JobPhase::Completed)
            .then(|| result_table(snapshot, &options.metric_keys)),
    }
}

/// Human-readable status line for one snapshot.
pub fn status_line(phase: &JobPhase, snapshot: &StatusSnapshot) -> String {
    match phase {
        JobPhase::Initializing => "Initializing...".to_string(),
        JobPhase::PreparingDataset => "Preparing training data...".to_string(),
        JobPhase::DatasetCreated => "Dataset created, preparing to train...".to_string(),
        JobPhase::Running => running_status_line(snapshot),
        JobPhase::Exporting => "Exporting model...".to_string(),
        JobPhase::Completed => "Training complete!".to_string(),
        JobPhase::Failed => match &snapshot.error {
            Some(error) => format!("Training failed: {error}"),
            None => "Training failed!".to_string(),
        },
        JobPhase::Cancelled => "Training was cancelled".to_string(),
        JobPhase::NotFound => "Training state lost; the job may have ended or been cancelled"
            .to_string(),
        // Unrecognized tags are displayed verbatim rather than failing.
        JobPhase::Other(tag) => tag.clone(),
    }
}

fn running_status_line(snapshot: &StatusSnapshot) -> String {
    let epochs = match (snapshot.current_epoch, snapshot.total_epochs) {
        (Some(current), Some(total)) if total > 0 => format!(" Epoch {current}/{total}"),
        _ => String::new(),
    };
    let metrics = snapshot.canonical_metrics();
    let inline = match (metrics.get("map50"), metrics.get("loss")) {
        (Some(map50), Some(loss)) => format!(" (mAP: {map50:.3}, loss: {loss:.3})"),
        (Some(map50), None) => format!(" (mAP: {map50:.3})"),
        _ => String::new(),
    };
    format!("Training...{epochs}{inline}")
}

fn notice_level(phase: &JobPhase) -> NoticeLevel {
    match phase {
        JobPhase::Completed => NoticeLevel::Success,
        JobPhase::Failed | JobPhase::NotFound => NoticeLevel::Error,
        JobPhase::Cancelled => NoticeLevel::Warning,
        _ => NoticeLevel::Info,
    }
}

fn progress_view(
    phase: &JobPhase,
    snapshot: &StatusSnapshot,
    elapsed: Option<Duration>,
    ramp_percent_per_minute: f32,
) -> Option<ProgressView> {
    if phase.is_terminal() {
        return matches!(phase, JobPhase::Completed).then_some(ProgressView {
            percent: 100,
            estimated: false,
        });
    }
    if let (Some(current), Some(total)) = (snapshot.current_epoch, snapshot.total_epochs) {
        if total > 0 {
            let ratio = (f64::from(current) / f64::from(total)).clamp(0.0, 1.0);
            return Some(ProgressView {
                percent: (ratio * 100.0).round() as u8,
                estimated: false,
            });
        }
    }
    if let Some(percent) = snapshot.progress {
        return Some(ProgressView {
            percent: percent.clamp(0.0, 100.0).round() as u8,
            estimated: false,
        });
    }
    if matches!(phase, JobPhase::Running) {
        if let Some(elapsed) = elapsed {
            let minutes = elapsed.as_secs_f32() / 60.0;
            let percent = (minutes * ramp_percent_per_minute).floor() as u64;
            return Some(ProgressView {
                percent: percent.min(u64::from(ESTIMATE_CAP_PERCENT)) as u8,
                estimated: true,
            });
        }
    }
    None
}

/// Build the final result rows for a completed session.
pub fn result_table(snapshot: &StatusSnapshot, metric_keys: &[String]) -> ResultTable {
    let metrics = snapshot.canonical_metrics();
    let mut rows = vec![(
        "Accuracy (mAP50)".to_string(),
        format_percent(snapshot.accuracy_or_default()),
    )];
    for key in metric_keys {
        // map50 is already surfaced through the accuracy row.
        if key == "map50" {
            continue;
        }
        let Some(value) = metrics.get(key) else {
            continue;
        };
        let formatted = if key == "loss" {
            format!("{value:.3}")
        } else {
            format_percent(*value)
        };
        rows.push((metric_label(key), formatted));
    }
    if let Some(seconds) = duration_seconds(snapshot) {
        rows.push(("Training time".to_string(), format_duration_secs(seconds)));
    }
    if let Some(total) = snapshot.total_epochs {
        rows.push(("Epochs".to_string(), total.to_string()));
    }
    ResultTable { rows }
}

fn metric_label(key: &str) -> String {
    match key {
        "precision" => "Precision".to_string(),
        "recall" => "Recall".to_string(),
        "loss" => "Loss".to_string(),
        other => other.to_string(),
    }
}

/// Format a 0..1 ratio as a percentage with two decimals.
pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Decompose whole seconds into a minute/second display value.
pub fn format_duration_secs(seconds: u64) -> String {
    let minutes = seconds / 60;
    let rest = seconds % 60;
    if minutes == 0 {
        format!("{rest}s")
    } else {
        format!("{minutes}m {rest}s")
    }
}

/// Training duration in seconds: the explicit value if the service computed
/// one, otherwise the difference between its start/end timestamps.
pub fn duration_seconds(snapshot: &StatusSnapshot) -> Option<u64> {
    if let Some(duration) = snapshot.duration {
        if duration.is_finite() && duration >= 0.0 {
            return Some(duration.round() as u64);
        }
    }
    let start = parse_service_time(snapshot.start_time.as_deref()?)?;
    let end = parse_service_time(snapshot.end_time.as_deref()?)?;
    let seconds = (end - start).whole_seconds();
    u64::try_from(seconds).ok()
}

fn parse_service_time(text: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(text.trim(), SERVICE_TIME_FORMAT).ok()
}
