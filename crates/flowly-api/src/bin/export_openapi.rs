// Export OpenAPI specification as JSON
//
// Usage: cargo run --bin export-openapi > docs/api/openapi.json
//
// Generates the OpenAPI spec without starting the API server.

use anyhow::{Context, Result};
use flowly_api::openapi::ApiDoc;

fn main() -> Result<()> {
    let json = ApiDoc::to_json().context("Failed to serialize OpenAPI spec")?;
    println!("{}", json);
    Ok(())
}
