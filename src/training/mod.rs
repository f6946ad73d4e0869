//! Training-session monitoring: request validation, job submission, status
//! polling, and view projection.

pub mod api;
pub mod monitor;
pub mod request;
pub mod save;
pub mod snapshot;
pub mod view;
pub mod worker;

pub use api::TrainingApi;
pub use monitor::{JobId, SessionEvent, SessionState, TerminalOutcome, TrainingSessionMonitor};
pub use request::{TrainingRequest, ValidationError};
pub use save::TrainedModelDraft;
pub use snapshot::{JobPhase, StatusSnapshot};
pub use worker::TrainingSession;
