//! Wrangler - keep declarative table pipelines, their dependency graph and their SQL in sync
//!
//! This crate is a meta-package that re-exports the most commonly used types and functions of
//! the wrangler crates.
//!
//! # Features
//!
//! - **core**: validation, prompt synthesis, graphs, SQL extraction and the session
//!   (enabled by default)
//! - **keystore**: encrypted API key storage (enabled by default)
//! - **yaml**: YAML pipeline definitions (enabled by default)
//! - **json**: JSON pipeline definitions
//! - **toml**: TOML pipeline definitions
//! - **schema_gen**: JSON schema derive for the stage model
//! - **full**: All features
//!
//! # Examples
//!
//! ```
//! use wrangler::prelude::*;
//!
//! let mut session = Session::new();
//! session.add_stage(
//!     StageKind::Load(LoadStage::builder().table_name("orders".to_string()).build()),
//!     "Orders export",
//! );
//! session.add_stage(
//!     StageKind::Sort(
//!         SortStage::builder()
//!             .table("orders".to_string())
//!             .order_by(vec![OrderBy::builder()
//!                 .column("amount".to_string())
//!                 .direction(SortDirection::Desc)
//!                 .build()])
//!             .build(),
//!     ),
//!     "",
//! );
//!
//! assert_eq!(session.prompt(), "Orders export. Sort by amount DESC.");
//! assert_eq!(session.graph().levels().len(), 2);
//! ```

pub use wrangler_schemas::{self as schemas};

// Re-exports from core
#[cfg(feature = "core")]
pub use wrangler_core::{self as core, prelude as core_prelude};

#[cfg(feature = "core")]
pub use wrangler_core::{
    error, extract, graph, prompt, reasoning, session, templating, validation, Result,
};

// Re-exports from keystore
#[cfg(feature = "keystore")]
pub use wrangler_keystore::{self as keystore, ApiKeyStore, KeyStoreError};

/// Prelude module that exports commonly used types and functions.
///
/// This module provides a convenient way to import all the necessary
/// components with a single `use wrangler::prelude::*;` statement.
pub mod prelude {
    pub use wrangler_schemas::*;

    #[cfg(feature = "core")]
    pub use wrangler_core::prelude::*;

    #[cfg(feature = "keystore")]
    pub use wrangler_keystore::{ApiKeyStore, KeyStoreError};
}

/// A simpler API for common use cases
#[cfg(feature = "core")]
pub mod api {
    use std::collections::HashMap;
    use std::path::Path;

    use wrangler_core::graph::{build_graph, DependencyGraph};
    use wrangler_core::prompt::describe_pipeline;
    use wrangler_core::templating::{format_from_path, TemplateError, TemplateLoader};
    use wrangler_schemas::Pipeline;

    /// Load a pipeline definition, inferring the format from the file extension
    pub fn load_pipeline_file<P: AsRef<Path>>(
        path: P,
        params: HashMap<String, String>,
    ) -> Result<Pipeline, TemplateError> {
        let path = path.as_ref();
        Pipeline::from_file(path, format_from_path(path), params)
    }

    /// Instruction text of the pipeline defined in a file
    pub fn describe_file<P: AsRef<Path>>(
        path: P,
        params: HashMap<String, String>,
    ) -> Result<String, TemplateError> {
        let pipeline = load_pipeline_file(path, params)?;
        Ok(describe_pipeline(&pipeline.stages))
    }

    /// Dependency graph of the pipeline defined in a file
    pub fn graph_file<P: AsRef<Path>>(
        path: P,
        params: HashMap<String, String>,
    ) -> Result<(Pipeline, DependencyGraph), TemplateError> {
        let pipeline = load_pipeline_file(path, params)?;
        let graph = build_graph(&pipeline.stages);
        Ok((pipeline, graph))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_describe_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("pipeline.yml");
            std::fs::write(
                &path,
                "stages:\n  - id: s1\n    type: SELECT\n    data:\n      columns: [a, b]\n",
            )
            .unwrap();

            assert_eq!(
                describe_file(&path, HashMap::new()).unwrap(),
                "Select columns: a, b."
            );

            let (pipeline, graph) = graph_file(&path, HashMap::new()).unwrap();
            assert_eq!(pipeline.len(), 1);
            assert_eq!(graph.node("s1").unwrap().level, 0);
        }

        #[test]
        fn test_missing_file() {
            let result = load_pipeline_file("missing/pipeline.yml", HashMap::new());
            assert!(matches!(result, Err(TemplateError::NotFound { .. })));
        }
    }
}
