//! CLI entry point: drive one training session against the configured service.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use trainwatch::config::{self, MonitorConfig};
use trainwatch::logging;
use trainwatch::training::view::{self, ViewOptions};
use trainwatch::training::{SessionEvent, TerminalOutcome, TrainingApi, TrainingSession};

#[derive(Debug)]
struct CliArgs {
    request_path: PathBuf,
    config_path: Option<PathBuf>,
    base_url: Option<String>,
    save: bool,
}

fn main() -> ExitCode {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };
    match run(args) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

const USAGE: &str = "Usage: trainwatch <request.toml> [--config <path>] [--base-url <url>] [--save]";

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut request_path = None;
    let mut config_path = None;
    let mut base_url = None;
    let mut save = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args.next().ok_or("--config requires a path")?;
                config_path = Some(PathBuf::from(value));
            }
            "--base-url" => {
                let value = args.next().ok_or("--base-url requires a URL")?;
                base_url = Some(value);
            }
            "--save" => save = true,
            other if other.starts_with('-') => {
                return Err(format!("Unknown flag: {other}"));
            }
            _ => {
                if request_path.is_some() {
                    return Err("Only one request file may be given".to_string());
                }
                request_path = Some(PathBuf::from(arg));
            }
        }
    }

    Ok(CliArgs {
        request_path: request_path.ok_or("Missing request file")?,
        config_path,
        base_url,
        save,
    })
}

fn run(args: CliArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    let request_text = std::fs::read_to_string(&args.request_path).map_err(|err| {
        format!(
            "Failed to read request file {}: {err}",
            args.request_path.display()
        )
    })?;
    let request: trainwatch::training::TrainingRequest = toml::from_str(&request_text)
        .map_err(|err| format!("Invalid request file: {err}"))?;

    let base_url = args.base_url.as_deref().unwrap_or(&config.base_url);
    let api = TrainingApi::new(base_url)?;
    let options = ViewOptions {
        metric_keys: config.metric_keys.clone(),
        ramp_percent_per_minute: config.progress_ramp_percent_per_minute,
    };

    let started = Instant::now();
    let mut session = TrainingSession::start(api, request, config.poll_interval())?;
    let (outcome, final_snapshot) = session.run_to_terminal(|event| match event {
        SessionEvent::Accepted { .. } => {}
        SessionEvent::Progress(snapshot) => {
            let view = view::view_state(snapshot, Some(started.elapsed()), &options);
            match view.progress {
                Some(progress) if progress.estimated => {
                    tracing::info!("{} (~{}%)", view.status_line, progress.percent);
                }
                Some(progress) => {
                    tracing::info!("{} ({}%)", view.status_line, progress.percent);
                }
                None => tracing::info!("{}", view.status_line),
            }
        }
        SessionEvent::Terminal { .. } => {}
    })?;

    let view = view::view_state(&final_snapshot, None, &options);
    match outcome {
        TerminalOutcome::Completed => {
            tracing::info!("{}", view.status_line);
            if let Some(results) = &view.results {
                println!("Training results:");
                for (label, value) in &results.rows {
                    println!("  {label}: {value}");
                }
            }
            if let Some(path) = &final_snapshot.model_path {
                println!("Model written to {path}");
            }
            if args.save {
                let draft = session.save_trained_model()?;
                tracing::info!(model_id = %draft.model_id, "Trained model saved");
            }
            Ok(ExitCode::SUCCESS)
        }
        TerminalOutcome::Cancelled => {
            tracing::warn!("{}", view.status_line);
            Ok(ExitCode::FAILURE)
        }
        TerminalOutcome::Failed | TerminalOutcome::NotFound => {
            tracing::error!("{}", view.status_line);
            if let Some(traceback) = &final_snapshot.traceback {
                tracing::error!("Failure detail:\n{traceback}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn load_config(args: &CliArgs) -> Result<MonitorConfig, config::ConfigError> {
    match &args.config_path {
        Some(path) => config::load_from_path(path),
        None => config::load_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_request_path() {
        let args = parse_args(
            ["job.toml", "--base-url", "http://trainer:5000", "--save"]
                .into_iter()
                .map(String::from),
        )
        .unwrap();
        assert_eq!(args.request_path, PathBuf::from("job.toml"));
        assert_eq!(args.base_url.as_deref(), Some("http://trainer:5000"));
        assert!(args.save);
        assert!(args.config_path.is_none());
    }

    #[test]
    fn missing_request_file_is_an_error() {
        assert!(parse_args(std::iter::empty()).is_err());
    }

    #[test]
    fn unknown_flags_are_rejected() {
        let err = parse_args(["job.toml", "--verbose"].into_iter().map(String::from)).unwrap_err();
        assert!(err.contains("--verbose"));
    }
}
