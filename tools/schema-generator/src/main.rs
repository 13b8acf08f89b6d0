//! Generate the JSON schema of wrangler pipeline definitions
//!
//! Writes `json_schema/pipeline.schema.json` at the workspace root, for editor completion of
//! pipeline files and for the documentation.

use schemars::schema_for;
use std::path::Path;
use wrangler_schemas::Pipeline;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let schema = schema_for!(Pipeline);
    let schema_json = serde_json::to_string_pretty(&schema)?;

    let output_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .ok_or("workspace root not found")?
        .join("json_schema")
        .join("pipeline.schema.json");

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output_path, schema_json)?;

    println!("Generated JSON schema at: {}", output_path.display());

    Ok(())
}
