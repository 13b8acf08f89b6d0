use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Events emitted while a [`Session`](super::Session) is edited and submitted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A new stage was appended
    StageAdded { id: String },
    /// An existing stage was replaced by an edited copy
    StageUpdated { id: String },
    /// A stage was removed
    StageDeleted { id: String },
    /// A transformation request was prepared
    SubmissionStarted { generation: u64 },
    /// A response replaced the stage list
    ResponseApplied {
        generation: u64,
        /// Number of stages now held by the session
        stages: usize,
        /// Whether the stages were reconstructed from the SQL instead of supplied by the service
        extracted: bool,
    },
    /// A response arrived for a submission that is no longer the latest
    ResponseDiscarded { generation: u64, latest: u64 },
    /// The latest submission failed
    SubmissionFailed { generation: u64, message: String },
}

/// Receives every [`SessionEvent`] of a session
pub trait SessionListener: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

#[derive(Debug)]
pub struct LoggingSessionListener;

impl SessionListener for LoggingSessionListener {
    #[instrument(skip_all)]
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::StageAdded { id } => info!("Added stage: {id}"),
            SessionEvent::StageUpdated { id } => info!("Updated stage: {id}"),
            SessionEvent::StageDeleted { id } => info!("Deleted stage: {id}"),
            SessionEvent::SubmissionStarted { generation } => {
                info!("Submitting transformation #{generation}")
            }
            SessionEvent::ResponseApplied {
                generation,
                stages,
                extracted,
            } => {
                let origin = if *extracted {
                    "extracted from SQL"
                } else {
                    "from service"
                };
                info!("Applied transformation #{generation}: {stages} stages {origin}");
            }
            SessionEvent::ResponseDiscarded { generation, latest } => {
                warn!("Discarded stale transformation #{generation} (latest is #{latest})")
            }
            SessionEvent::SubmissionFailed {
                generation,
                message,
            } => warn!("Transformation #{generation} failed: {message}"),
        }
    }
}
