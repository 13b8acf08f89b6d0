//! The pipeline controller.
//!
//! A [`Session`] owns every piece of mutable state around a pipeline: the ordered stages, the
//! table schema they run against, the last applied transformation and the submission counter.
//! Graph and prompt are never stored; they are derived from the stages on every read.
//!
//! Submissions are guarded by a monotonically increasing generation. Only a response carrying
//! the latest generation is applied, so a slow answer to an old request can never overwrite the
//! result of a newer one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use tracing::{debug, instrument, warn};
use wrangler_schemas::{
    ChartConfig, ColumnSchema, ParsedStage, Stage, StageKind, TransformRequest, TransformResponse,
};

use crate::extract::extract_stages;
use crate::graph::{build_graph, DependencyGraph};
use crate::prompt::describe_pipeline;
use crate::reasoning::{ReasoningError, ReasoningService};
use crate::validation::is_complete;

mod events;

pub use events::{LoggingSessionListener, SessionEvent, SessionListener};

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum SessionError {
    #[error("No API key configured")]
    #[diagnostic(
        code(wrangler::session::missing_api_key),
        help("Store a key with `wrangler key set <KEY>` or set WRANGLER_API_KEY")
    )]
    MissingApiKey,

    #[error("Nothing to submit: the transformation request is empty")]
    #[diagnostic(
        code(wrangler::session::empty_prompt),
        help("Add complete stages to the pipeline or pass a prompt explicitly")
    )]
    EmptyPrompt,

    #[error("Stage not found: '{0}'")]
    #[diagnostic(code(wrangler::session::stage_not_found))]
    StageNotFound(String),

    #[error("Column '{column}' used as {axis} is not part of the current schema")]
    #[diagnostic(
        code(wrangler::session::unknown_column),
        help("Pick one of the columns of the current table")
    )]
    UnknownColumn { axis: &'static str, column: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Reasoning(#[from] ReasoningError),
}

/// A prepared request together with the generation it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub generation: u64,
    pub request: TransformRequest,
}

/// Whether a response was applied or dropped as stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied { generation: u64, extracted: bool },
    Discarded { generation: u64, latest: u64 },
}

/// Last successfully applied transformation
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    pub generation: u64,
    pub sql: String,
    pub chart: ChartConfig,
    pub explanation: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct Session {
    stages: Vec<Stage>,
    schema: Vec<ColumnSchema>,
    generation: u64,
    outcome: Option<TransformOutcome>,
    last_error: Option<String>,
    listener: Option<Arc<dyn SessionListener>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("stages", &self.stages.len())
            .field("schema", &self.schema.len())
            .field("generation", &self.generation)
            .field("outcome", &self.outcome)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stages(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            ..Self::default()
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(listener) = &self.listener {
            listener.on_event(&event);
        }
    }

    // -- stage editing --

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.id == id)
    }

    /// Append a new stage with a fresh id and timestamp, returning the id
    pub fn add_stage(&mut self, kind: StageKind, description: impl Into<String>) -> String {
        let stage = Stage::new(kind, description);
        let id = stage.id.clone();

        self.stages.push(stage);
        self.emit(SessionEvent::StageAdded { id: id.clone() });

        id
    }

    /// Store an edited stage.
    ///
    /// A stage whose id is already present replaces it in place and keeps the original id and
    /// creation time. Any other stage is appended as a brand-new one with a fresh id and
    /// timestamp. Returns the id under which the stage is stored.
    pub fn save_stage(&mut self, mut stage: Stage) -> String {
        match self.stages.iter_mut().find(|existing| existing.id == stage.id) {
            Some(existing) => {
                stage.created_at = existing.created_at;
                *existing = stage;

                let id = existing.id.clone();
                self.emit(SessionEvent::StageUpdated { id: id.clone() });
                id
            }
            None => {
                stage.id = Stage::generate_id();
                stage.created_at = Utc::now();

                let id = stage.id.clone();
                self.stages.push(stage);
                self.emit(SessionEvent::StageAdded { id: id.clone() });
                id
            }
        }
    }

    pub fn delete_stage(&mut self, id: &str) -> bool {
        let before = self.stages.len();
        self.stages.retain(|stage| stage.id != id);

        let deleted = self.stages.len() != before;
        if deleted {
            self.emit(SessionEvent::StageDeleted { id: id.to_string() });
        }

        deleted
    }

    /// Move a stage to `index`, clamped to the end of the list
    pub fn move_stage(&mut self, id: &str, index: usize) -> Result<(), SessionError> {
        let from = self
            .stages
            .iter()
            .position(|stage| stage.id == id)
            .ok_or_else(|| SessionError::StageNotFound(id.to_string()))?;

        let stage = self.stages.remove(from);
        let to = index.min(self.stages.len());
        self.stages.insert(to, stage);

        debug!("Moved stage {id} from {from} to {to}");
        Ok(())
    }

    pub fn replace_stages(&mut self, stages: Vec<Stage>) {
        self.stages = stages;
    }

    // -- derived views --

    pub fn describable_stages(&self) -> Vec<&Stage> {
        self.stages.iter().filter(|stage| is_complete(stage)).collect()
    }

    pub fn prompt(&self) -> String {
        describe_pipeline(&self.stages)
    }

    pub fn graph(&self) -> DependencyGraph {
        build_graph(&self.stages)
    }

    // -- schema and results --

    pub fn schema(&self) -> &[ColumnSchema] {
        &self.schema
    }

    pub fn set_schema(&mut self, schema: Vec<ColumnSchema>) {
        self.schema = schema;
    }

    pub fn outcome(&self) -> Option<&TransformOutcome> {
        self.outcome.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Swap the chart of the last outcome for a preset, provided every axis is a known column
    pub fn apply_chart_preset(&mut self, chart: ChartConfig) -> Result<(), SessionError> {
        let axes = [
            ("xAxis", Some(&chart.x_axis)),
            ("yAxis", Some(&chart.y_axis)),
            ("zAxis", chart.z_axis.as_ref()),
        ];

        for (axis, column) in axes {
            let Some(column) = column.filter(|column| !column.is_empty()) else {
                continue;
            };

            if !self.schema.iter().any(|c| &c.column_name == column) {
                return Err(SessionError::UnknownColumn {
                    axis,
                    column: column.clone(),
                });
            }
        }

        match &mut self.outcome {
            Some(outcome) => outcome.chart = chart,
            None => {
                self.outcome = Some(TransformOutcome {
                    generation: self.generation,
                    sql: String::new(),
                    chart,
                    explanation: String::new(),
                    applied_at: Utc::now(),
                })
            }
        }

        Ok(())
    }

    // -- submissions --

    /// Start a new submission, superseding every earlier one
    pub fn begin_submission(
        &mut self,
        user_prompt: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Submission, SessionError> {
        let user_prompt = user_prompt.into();
        let api_key = api_key.into();

        if api_key.trim().is_empty() {
            return Err(SessionError::MissingApiKey);
        }
        if user_prompt.trim().is_empty() {
            return Err(SessionError::EmptyPrompt);
        }

        self.generation += 1;
        self.emit(SessionEvent::SubmissionStarted {
            generation: self.generation,
        });

        Ok(Submission {
            generation: self.generation,
            request: TransformRequest {
                schema: self.schema.clone(),
                user_prompt,
                api_key,
            },
        })
    }

    /// Apply a response if it answers the latest submission.
    ///
    /// The stage list is replaced by the structured stages of the response, or, when the
    /// service sent none, by stages reconstructed from its SQL.
    #[instrument(skip(self, response), fields(latest = self.generation))]
    pub fn apply_response(&mut self, generation: u64, response: TransformResponse) -> Applied {
        if generation != self.generation {
            self.emit(SessionEvent::ResponseDiscarded {
                generation,
                latest: self.generation,
            });
            return Applied::Discarded {
                generation,
                latest: self.generation,
            };
        }

        let chart = response.chart();
        let (parsed, extracted) = match response.transformation_stages {
            Some(stages) if !stages.is_empty() => (stages, false),
            _ => (extract_stages(&response.sql, &response.explanation), true),
        };

        self.stages = parsed.into_iter().map(ParsedStage::into_stage).collect();
        self.last_error = None;
        self.outcome = Some(TransformOutcome {
            generation,
            sql: response.sql,
            chart,
            explanation: response.explanation,
            applied_at: Utc::now(),
        });

        self.emit(SessionEvent::ResponseApplied {
            generation,
            stages: self.stages.len(),
            extracted,
        });

        Applied::Applied {
            generation,
            extracted,
        }
    }

    /// Record the failure of a submission; failures of superseded submissions are ignored
    pub fn fail_submission(&mut self, generation: u64, message: impl Into<String>) -> bool {
        if generation != self.generation {
            debug!("Ignoring failure of superseded submission #{generation}");
            return false;
        }

        let message = message.into();
        self.emit(SessionEvent::SubmissionFailed {
            generation,
            message: message.clone(),
        });
        self.last_error = Some(message);

        true
    }

    /// Submit `user_prompt` to the service and apply the answer
    #[instrument(skip_all, fields(generation = self.generation + 1))]
    pub async fn transform(
        &mut self,
        service: &dyn ReasoningService,
        user_prompt: &str,
        api_key: &str,
    ) -> Result<Applied, SessionError> {
        let Submission {
            generation,
            request,
        } = self.begin_submission(user_prompt, api_key)?;

        match service.transform(&request).await {
            Ok(response) => Ok(self.apply_response(generation, response)),
            Err(error) => {
                warn!("Transformation #{generation} failed: {error}");
                self.fail_submission(generation, error.to_string());
                Err(error.into())
            }
        }
    }
}
