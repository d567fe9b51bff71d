//! Writes the Voxbridge OpenAPI document.
//!
//! Usage: `openapi [output-path]` (defaults to `openapi.json`).

use anyhow::Context;
use utoipa::OpenApi;
use voxbridge_api::router::ApiDoc;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());

    let mut doc = ApiDoc::openapi();
    doc.info.title = "Voxbridge API".to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();

    let json = doc
        .to_pretty_json()
        .context("Failed to serialize the OpenAPI document")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {path}"))?;
    println!("Wrote OpenAPI document to {path}");
    Ok(())
}
