use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::{collections::HashMap, path::Path};

use miette::{Diagnostic, NamedSource, SourceOffset, SourceSpan};
use regex::Regex;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};
use tracing::debug;
use wrangler_schemas::{Pipeline, StageKind};

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum TemplateError {
    #[error("Cannot read pipeline definition '{file_path}'")]
    #[diagnostic(
        code(wrangler::template::file_not_found),
        help("Pass the path of an existing pipeline file with -f")
    )]
    NotFound {
        #[source]
        source: std::io::Error,
        file_path: String,
    },

    #[error("Pipeline definitions in '{0}' format are not supported")]
    #[diagnostic(
        code(wrangler::template::unknown_format),
        help(
            "Formats enabled in this build: {}. The json, yaml and toml features enable the others",
            TemplateFormat::enabled_list()
        )
    )]
    UnknownFormat(TemplateFormat),

    #[error("No value for template parameters {0:?}")]
    #[diagnostic(
        code(wrangler::template::missing_params),
        help("Pass a value for every ${{name}} placeholder, e.g. -p table=orders -p threshold=500")
    )]
    MissingParams(HashSet<String>),

    #[error("Invalid {format} pipeline definition")]
    #[diagnostic(code(wrangler::template::parse_error))]
    Parse {
        format: TemplateFormat,
        #[source_code]
        source_code: Arc<NamedSource<String>>,
        #[label("{error}")]
        span: SourceSpan,
        #[source]
        error: BoxedError,
    },

    #[error("SQL syntax error in custom stage")]
    #[diagnostic(
        code(wrangler::template::sql_validation_error),
        help("Check the SQL of custom stage '{stage_id}'")
    )]
    SqlValidation {
        #[source_code]
        source_code: Arc<NamedSource<String>>,
        #[source]
        error: ParserError,
        #[label("syntax error in stage '{stage_id}'")]
        span: SourceSpan,
        stage_id: String,
    },
}

/// Serialization format of a pipeline definition file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateFormat {
    Json,
    Toml,
    Yaml,
    Unknown(String),
}

impl TemplateFormat {
    /// Formats compiled into this build
    pub fn enabled() -> Vec<TemplateFormat> {
        [
            cfg!(feature = "json").then_some(TemplateFormat::Json),
            cfg!(feature = "yaml").then_some(TemplateFormat::Yaml),
            cfg!(feature = "toml").then_some(TemplateFormat::Toml),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn enabled_list() -> String {
        let enabled = Self::enabled();
        if enabled.is_empty() {
            return "none".to_string();
        }

        enabled
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateFormat::Json => f.write_str("json"),
            TemplateFormat::Toml => f.write_str("toml"),
            TemplateFormat::Yaml => f.write_str("yaml"),
            TemplateFormat::Unknown(ext) if ext.is_empty() => f.write_str("<no extension>"),
            TemplateFormat::Unknown(ext) => f.write_str(ext),
        }
    }
}

/// Loading of pipeline definitions with `${name}` parameter substitution.
///
/// Parameters are replaced in the raw text before parsing, so they can stand in for any value
/// (a table name, a threshold, a whole SQL fragment). Any `${...}` left after substitution is an
/// error. The SQL of every CUSTOM stage is syntax checked once the pipeline is parsed.
pub trait TemplateLoader {
    /// Load a pipeline definition from a file
    fn from_file<P: AsRef<Path>>(
        path: P,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Pipeline, TemplateError>;

    /// Load a pipeline definition from a string
    fn from_str<T: AsRef<str>>(
        value: T,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Pipeline, TemplateError>;

    /// Replace every `${name}` with its value, failing on names without a value
    fn substitute_params(
        raw: &str,
        params: HashMap<String, String>,
    ) -> Result<String, TemplateError> {
        static PARAM_REGEX: OnceLock<Regex> = OnceLock::new();
        let mut definition = raw.to_string();

        for (name, value) in params {
            definition = definition.replace(&format!("${{{name}}}"), &value);
        }

        let missing_params = PARAM_REGEX
            .get_or_init(|| Regex::new(r"\$\{([a-zA-Z0-9_]+)\}").expect("invalid regex"))
            .captures_iter(&definition)
            .filter_map(|capture| capture.get(1))
            .map(|name| name.as_str().to_string())
            .collect::<HashSet<String>>();

        if !missing_params.is_empty() {
            return Err(TemplateError::MissingParams(missing_params));
        }

        Ok(definition)
    }

    /// Syntax check the SQL of every CUSTOM stage with the generic dialect
    fn validate_sql(pipeline: &Pipeline) -> Result<(), TemplateError> {
        let dialect = GenericDialect {};

        for stage in pipeline.iter() {
            let StageKind::Custom(custom) = &stage.kind else {
                continue;
            };
            let Some(sql) = custom.sql.as_deref().filter(|sql| !sql.trim().is_empty()) else {
                continue;
            };

            Parser::parse_sql(&dialect, sql).map_err(|error| {
                let span = match Self::try_extract_error_position(&error.to_string()) {
                    Some((line, column)) => SourceSpan::new(
                        SourceOffset::from_location(sql, line as usize, column as usize),
                        1,
                    ),
                    None => SourceSpan::new(0.into(), sql.len()),
                };

                TemplateError::SqlValidation {
                    source_code: Arc::new(
                        NamedSource::new(&stage.id, sql.to_string()).with_language("SQL"),
                    ),
                    error,
                    span,
                    stage_id: stage.id.clone(),
                }
            })?;
        }

        Ok(())
    }

    /// sqlparser only reports positions inside its message text (`Line: 2, Column: 10`)
    fn try_extract_error_position(error_msg: &str) -> Option<(u64, u64)> {
        static ERROR_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = ERROR_REGEX.get_or_init(|| {
            Regex::new(r"(?:at\s+)?Line:\s*(\d+),\s*Column:\s*(\d+)").expect("invalid regex")
        });

        let captures = regex.captures(error_msg)?;
        let line = captures.get(1)?.as_str().parse::<u64>().ok()?;
        let column = captures.get(2)?.as_str().parse::<u64>().ok()?;

        Some((line, column))
    }
}

impl TemplateLoader for Pipeline {
    fn from_file<T: AsRef<Path>>(
        path: T,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Pipeline, TemplateError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| TemplateError::NotFound {
            source: e,
            file_path: path.display().to_string(),
        })?;
        Self::from_str(contents, format, params)
    }

    fn from_str<T: AsRef<str>>(
        value: T,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Pipeline, TemplateError> {
        debug!("Parsing pipeline definition with format: {format}");

        let definition = Self::substitute_params(value.as_ref(), params)?;

        let pipeline = parse(definition, format)?;

        debug!("Parsed pipeline with {} stages", pipeline.len());

        Self::validate_sql(&pipeline)?;

        Ok(pipeline)
    }
}

/// Deserialize a pipeline, pointing parse errors at their position in the definition
fn parse(definition: String, format: TemplateFormat) -> Result<Pipeline, TemplateError> {
    let parsed: Result<Pipeline, (SourceOffset, BoxedError)> = match &format {
        #[cfg(feature = "json")]
        TemplateFormat::Json => serde_json::from_str(&definition).map_err(|error| {
            let offset = SourceOffset::from_location(&definition, error.line(), error.column());
            (offset, error.into())
        }),
        #[cfg(feature = "yaml")]
        TemplateFormat::Yaml => serde_yml::from_str(&definition).map_err(|error| {
            let offset = error
                .location()
                .map(|at| SourceOffset::from_location(&definition, at.line(), at.column()))
                .unwrap_or_else(|| 0.into());
            (offset, error.into())
        }),
        #[cfg(feature = "toml")]
        TemplateFormat::Toml => toml::from_str(&definition).map_err(|error| {
            let offset = error
                .span()
                .map(|span| span.start.into())
                .unwrap_or_else(|| 0.into());
            (offset, error.into())
        }),
        other => return Err(TemplateError::UnknownFormat(other.clone())),
    };

    parsed.map_err(|(offset, error)| TemplateError::Parse {
        source_code: Arc::new(NamedSource::new(format!("pipeline.{format}"), definition)),
        span: SourceSpan::new(offset, 1),
        format,
        error,
    })
}

/// Infer the definition format from the file extension, ignoring case
pub fn format_from_path<P: AsRef<Path>>(path: P) -> TemplateFormat {
    let Some(ext) = path.as_ref().extension().and_then(|ext| ext.to_str()) else {
        return TemplateFormat::Unknown(String::new());
    };

    match ext.to_ascii_lowercase().as_str() {
        "json" => TemplateFormat::Json,
        "yaml" | "yml" => TemplateFormat::Yaml,
        "toml" => TemplateFormat::Toml,
        other => TemplateFormat::Unknown(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_custom_sql_valid_query() {
        let yaml_content = r#"
stages:
  - id: load_orders
    type: LOAD
    data:
      tableName: orders
  - id: custom_rollup
    type: CUSTOM
    data:
      sql: SELECT region, SUM(amount) AS total FROM orders GROUP BY region
"#;

        let pipeline = Pipeline::from_str(yaml_content, TemplateFormat::Yaml, HashMap::new())
            .expect("valid pipeline");
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn test_custom_sql_invalid_query() {
        let yaml_content = r#"
stages:
  - id: custom_broken
    type: CUSTOM
    data:
      sql: SELECTT region FROM orders
"#;

        let result = Pipeline::from_str(yaml_content, TemplateFormat::Yaml, HashMap::new());

        match result {
            Err(TemplateError::SqlValidation {
                source_code,
                stage_id,
                ..
            }) => {
                assert!(source_code.inner().contains("SELECTT"));
                assert_eq!(stage_id, "custom_broken");
            }
            other => panic!("Expected SqlValidation error, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_custom_sql_is_not_validated() {
        let yaml_content = r#"
stages:
  - id: custom_draft
    type: CUSTOM
"#;

        let result = Pipeline::from_str(yaml_content, TemplateFormat::Yaml, HashMap::new());
        assert!(result.is_ok());
    }

    #[test]
    fn test_params_are_substituted() {
        let json_content = r#"{
            "stages": [{
                "id": "filter_big",
                "type": "FILTER",
                "data": {"table": "${table}", "column": "amount", "operator": ">", "value": ${threshold}}
            }]
        }"#;

        let params = HashMap::from([
            ("table".to_string(), "orders".to_string()),
            ("threshold".to_string(), "500".to_string()),
        ]);
        let pipeline = Pipeline::from_str(json_content, TemplateFormat::Json, params)
            .expect("valid pipeline");

        match &pipeline.stages[0].kind {
            StageKind::Filter(filter) => {
                assert_eq!(filter.table.as_deref(), Some("orders"));
                assert_eq!(filter.value, Some(serde_json::json!(500)));
            }
            other => panic!("Expected FILTER, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_params() {
        let result = Pipeline::substitute_params("table: ${table} ${other}", HashMap::new());

        match result {
            Err(TemplateError::MissingParams(missing)) => {
                assert_eq!(
                    missing,
                    HashSet::from(["table".to_string(), "other".to_string()])
                );
            }
            other => panic!("Expected MissingParams, got {other:?}"),
        }
    }

    #[test]
    fn test_json_parse_error_points_into_source() {
        let result = Pipeline::from_str("{\"stages\": [", TemplateFormat::Json, HashMap::new());
        match result {
            Err(TemplateError::Parse {
                format, source_code, ..
            }) => {
                assert_eq!(format, TemplateFormat::Json);
                assert!(source_code.inner().contains("stages"));
            }
            other => panic!("Expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_format() {
        let result = Pipeline::from_str(
            "stages: []",
            TemplateFormat::Unknown("ini".into()),
            HashMap::new(),
        );
        assert!(matches!(result, Err(TemplateError::UnknownFormat(_))));
    }

    #[test]
    fn test_error_position_extraction() {
        let position = Pipeline::try_extract_error_position(
            "sql parser error: Expected: an SQL statement, found: SELECTT at Line: 2, Column: 10",
        );
        assert_eq!(position, Some((2, 10)));
        assert_eq!(Pipeline::try_extract_error_position("no position"), None);
    }

    #[rstest]
    #[case("pipeline.json", TemplateFormat::Json)]
    #[case("pipeline.yml", TemplateFormat::Yaml)]
    #[case("dir/pipeline.yaml", TemplateFormat::Yaml)]
    #[case("pipeline.toml", TemplateFormat::Toml)]
    #[case("PIPELINE.YML", TemplateFormat::Yaml)]
    #[case("pipeline.ini", TemplateFormat::Unknown("ini".into()))]
    #[case("pipeline", TemplateFormat::Unknown(String::new()))]
    fn test_format_from_path(#[case] path: &str, #[case] expected: TemplateFormat) {
        assert_eq!(format_from_path(path), expected);
    }
}
