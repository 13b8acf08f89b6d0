use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::{collections::HashMap, error::Error, path::PathBuf, str::FromStr, sync::Arc};
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wrangler::api::{graph_file, load_pipeline_file};
use wrangler::prelude::*;

mod config;
mod output;

use config::{Config, LogFormat};

/// Keep declarative table pipelines, their dependency graph and their SQL in sync
#[derive(Debug, Parser)]
#[command(name = "wrangler", version, about, long_about = None)]
struct Args {
    /// Base URL of the reasoning service
    #[arg(long, env = "WRANGLER_SERVICE_URL", default_value = "http://localhost:3001")]
    service_url: String,

    /// Directory holding the encrypted API key
    #[arg(long, env = "WRANGLER_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// API key for the reasoning service, takes precedence over the stored key
    #[arg(long, env = "WRANGLER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Timeout of reasoning-service requests in seconds
    #[arg(long, env = "WRANGLER_TIMEOUT", default_value = "120")]
    timeout: u64,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, env = "WRANGLER_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Format of the log lines written to stderr
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the instructions synthesized from a pipeline
    Describe {
        /// Path to the pipeline definition file
        #[arg(short, long)]
        file: PathBuf,

        /// k=v list of parameters to pass to the definition file
        /// e.g. wrangler describe -f pipeline.yml -p table=orders -p threshold=500
        #[arg(short, long, value_parser = parse_key_val::<String, String>)]
        params: Option<Vec<(String, String)>>,
    },

    /// Print the dependency graph of a pipeline
    Graph {
        /// Path to the pipeline definition file
        #[arg(short, long)]
        file: PathBuf,

        /// k=v list of parameters to pass to the definition file
        #[arg(short, long, value_parser = parse_key_val::<String, String>)]
        params: Option<Vec<(String, String)>>,

        /// Print nodes, levels and edges as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reconstruct stages from a SQL query
    Extract {
        /// SQL query text
        #[arg(long, conflicts_with = "sql_file", required_unless_present = "sql_file")]
        sql: Option<String>,

        /// File containing the SQL query
        #[arg(long)]
        sql_file: Option<PathBuf>,

        /// Explanation used as description of a custom fallback stage
        #[arg(long, default_value = "")]
        explanation: String,
    },

    /// Send a pipeline to the reasoning service and print the resulting SQL and stages
    Transform {
        /// Path to the pipeline definition file
        #[arg(short, long)]
        file: PathBuf,

        /// k=v list of parameters to pass to the definition file
        #[arg(short, long, value_parser = parse_key_val::<String, String>)]
        params: Option<Vec<(String, String)>>,

        /// JSON file with the columns of the current table
        #[arg(short, long)]
        schema: PathBuf,

        /// Request to send instead of the instructions synthesized from the pipeline
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Debug, Subcommand)]
enum KeyAction {
    /// Encrypt and store an API key
    Set {
        /// The API key to store
        key: String,
    },
    /// Report whether a usable key is stored
    Status,
    /// Remove the stored key
    Clear,
}

fn parse_key_val<T, U>(s: &str) -> std::result::Result<(T, U), Box<dyn Error + Send + Sync + 'static>>
where
    T: std::str::FromStr,
    T::Err: Error + Send + Sync + 'static,
    U: std::str::FromStr,
    U::Err: Error + Send + Sync + 'static,
{
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    Ok((s[..pos].parse()?, s[pos + 1..].parse()?))
}

/// Turn a diagnostic into an error that keeps miette's rendering
fn report<E>(error: E) -> anyhow::Error
where
    E: miette::Diagnostic + Send + Sync + 'static,
{
    anyhow!("{:?}", miette::Report::new(error))
}

fn init_tracing(log_level: &str, format: LogFormat) {
    let log_level = Level::from_str(log_level.to_lowercase().as_str()).unwrap_or(Level::WARN);

    let (json, text) = match format {
        LogFormat::Json => (
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
        LogFormat::Text => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(json)
        .with(text)
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();
}

#[tokio::main]
async fn main() -> std::result::Result<(), anyhow::Error> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    let config = Config::try_new(args.service_url, args.data_dir, args.timeout, args.api_key)
        .context("invalid configuration")?;
    debug!(
        "Using service {} with data directory {}",
        config.service_url,
        config.data_dir.display()
    );

    match args.command {
        Commands::Describe { file, params } => {
            let params = HashMap::from_iter(params.unwrap_or_default());
            let pipeline = load_pipeline_file(&file, params).map_err(report)?;

            println!("{}", describe_pipeline(&pipeline.stages));
        }
        Commands::Graph { file, params, json } => {
            let params = HashMap::from_iter(params.unwrap_or_default());
            let (pipeline, graph) = graph_file(&file, params).map_err(report)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&output::graph_json(&graph))?);
            } else {
                print!("{}", output::render_graph(&pipeline.stages, &graph));
            }
        }
        Commands::Extract {
            sql,
            sql_file,
            explanation,
        } => {
            let sql = match (sql, sql_file) {
                (Some(sql), _) => sql,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read SQL from {}", path.display()))?,
                (None, None) => return Err(anyhow!("either --sql or --sql-file is required")),
            };

            let stages = extract_stages(&sql, &explanation);
            println!("{}", serde_json::to_string_pretty(&stages)?);
        }
        Commands::Transform {
            file,
            params,
            schema,
            prompt,
        } => {
            let params = HashMap::from_iter(params.unwrap_or_default());
            let pipeline = load_pipeline_file(&file, params).map_err(report)?;

            let schema = std::fs::read_to_string(&schema)
                .with_context(|| format!("failed to read schema from {}", schema.display()))?;
            let schema = serde_json::from_str::<Vec<ColumnSchema>>(&schema)
                .context("schema must be a JSON array of columns")?;

            let mut session = Session::with_stages(pipeline.stages)
                .with_listener(Arc::new(LoggingSessionListener));
            session.set_schema(schema);

            let prompt = prompt.unwrap_or_else(|| session.prompt());
            let api_key = config
                .api_key
                .clone()
                .or_else(|| ApiKeyStore::new(&config.data_dir).load())
                .unwrap_or_default();

            let service =
                HttpReasoningService::new(&config.service_url).with_timeout(config.timeout);

            info!("Sending transformation request to {}", service.endpoint());
            session
                .transform(&service, &prompt, &api_key)
                .await
                .map_err(report)?;

            if let Some(outcome) = session.outcome() {
                println!("{}\n", outcome.sql);
                println!(
                    "Chart: {} (x: {}, y: {}{})",
                    outcome.chart.chart_type,
                    outcome.chart.x_axis,
                    outcome.chart.y_axis,
                    outcome
                        .chart
                        .z_axis
                        .as_deref()
                        .map(|z| format!(", z: {z}"))
                        .unwrap_or_default()
                );
                if !outcome.explanation.is_empty() {
                    println!("{}", outcome.explanation);
                }
                println!();
            }

            print!("{}", output::render_graph(session.stages(), &session.graph()));
        }
        Commands::Key { action } => {
            let store = ApiKeyStore::new(&config.data_dir);

            match action {
                KeyAction::Set { key } => {
                    if key.trim().is_empty() {
                        return Err(anyhow!("API key cannot be empty"));
                    }
                    store.save(key.trim()).map_err(report)?;
                    println!("API key stored in {}", store.dir().display());
                }
                KeyAction::Status => {
                    if store.has_key() {
                        println!("API key configured");
                    } else {
                        println!("No API key stored");
                    }
                }
                KeyAction::Clear => {
                    if store.clear().map_err(report)? {
                        println!("API key removed");
                    } else {
                        println!("No API key stored");
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[rstest]
    #[case("table=orders", ("table", "orders"))]
    #[case("filter=a=b", ("filter", "a=b"))]
    #[case("empty=", ("empty", ""))]
    fn test_parse_key_val(#[case] input: &str, #[case] expected: (&str, &str)) {
        let (key, value) = parse_key_val::<String, String>(input).unwrap();
        assert_eq!((key.as_str(), value.as_str()), expected);
    }

    #[test]
    fn test_parse_key_val_without_separator() {
        assert!(parse_key_val::<String, String>("orders").is_err());
    }

    #[test]
    fn test_extract_requires_sql() {
        let result = Args::try_parse_from(["wrangler", "extract"]);
        assert!(result.is_err());

        let result = Args::try_parse_from(["wrangler", "extract", "--sql", "SELECT 1"]);
        assert!(result.is_ok());
    }
}
