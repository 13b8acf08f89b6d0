//! # Wrangler Core
//!
//! The translation layer between the three representations of a pipeline: the ordered stage
//! list, the dependency graph derived from it, and the natural-language / SQL text exchanged
//! with the reasoning service.
//!
//! - [`validation`] decides whether a stage is complete
//! - [`prompt`] turns complete stages into instructions
//! - [`graph`] infers dependencies from table-name references
//! - [`extract`] reconstructs stages from SQL when the service sends none
//! - [`session`] owns the editable state and guards overlapping submissions
//!
//! The first four are pure functions that never fail. Only loading definitions
//! ([`templating`]) and talking to the service ([`reasoning`]) return errors.
//!
//! ```
//! use wrangler_core::prelude::*;
//!
//! let stages = vec![
//!     Stage::new(
//!         StageKind::Load(LoadStage::builder().table_name("orders".to_string()).build()),
//!         "Orders export",
//!     ),
//!     Stage::new(
//!         StageKind::Select(
//!             SelectStage::builder()
//!                 .table("orders".to_string())
//!                 .columns(vec!["region".to_string()])
//!                 .build(),
//!         ),
//!         "",
//!     ),
//! ];
//!
//! assert_eq!(describe_pipeline(&stages), "Orders export. Select columns: region.");
//! assert_eq!(build_graph(&stages).node(&stages[1].id).unwrap().level, 1);
//! ```

pub mod error;
pub mod extract;
pub mod graph;
pub mod prompt;
pub mod reasoning;
pub mod session;
pub mod templating;
pub mod validation;

pub use wrangler_schemas as schemas;

pub type Result<T> = core::result::Result<T, error::Error>;

/// Prelude to import the stage model and every component
pub mod prelude {
    pub use wrangler_schemas::*;

    pub use crate::extract::extract_stages;
    pub use crate::graph::{build_graph, DependencyGraph, GraphNode, RenderEdge};
    pub use crate::prompt::{describe_pipeline, describe_stage};
    pub use crate::reasoning::{HttpReasoningService, ReasoningError, ReasoningService};
    pub use crate::session::{
        Applied, LoggingSessionListener, Session, SessionError, SessionEvent, SessionListener,
        Submission, TransformOutcome,
    };
    pub use crate::templating::{format_from_path, TemplateError, TemplateFormat, TemplateLoader};
    pub use crate::validation::is_complete;

    pub use crate::Result;
}
