//! Manifest loading
//!
//! `.yaml`/`.yml` plans are read with `serde_yaml_ng`, `.toml` with `toml` and
//! anything else as JSON. A YAML stream of several `---` documents becomes a
//! document list. Key order is preserved because declaration order breaks
//! ties between independent phases.

use anyhow::{Context, Result};
use declarative::{Plan, Resource};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Supported plan file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
    Yaml,
}

impl Format {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::Toml,
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Parse manifest text in the given format
pub fn parse_manifest(content: &str, format: Format) -> Result<Value> {
    match format {
        Format::Json => serde_json::from_str(content).context("Invalid JSON manifest"),
        Format::Toml => {
            let table: toml::Table = toml::from_str(content).context("Invalid TOML manifest")?;
            serde_json::to_value(table).context("TOML manifest is not representable as JSON")
        }
        Format::Yaml => parse_yaml_stream(content),
    }
}

/// One document as-is, several documents as a list; empty documents are dropped
fn parse_yaml_stream(content: &str) -> Result<Value> {
    let mut docs = serde_yaml_ng::Deserializer::from_str(content)
        .map(|doc| Value::deserialize(doc).context("Invalid YAML manifest"))
        .filter(|doc| !matches!(doc, Ok(Value::Null)))
        .collect::<Result<Vec<_>>>()?;

    Ok(match docs.len() {
        0 => Value::Null,
        1 => docs.remove(0),
        _ => Value::Array(docs),
    })
}

/// Read a manifest file into a generic document
pub fn load_manifest(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file: {}", path.display()))?;
    parse_manifest(&content, Format::from_path(path))
        .with_context(|| format!("Failed to parse plan file: {}", path.display()))
}

/// Read and normalise a plan file
pub fn load_plan(path: &Path) -> Result<Plan> {
    let doc = load_manifest(path)?;
    let plan = Plan::from_manifest(&doc)
        .with_context(|| format!("Invalid plan: {}", path.display()))?;
    log::info!(
        "Loaded {} phase(s) and {} resource(s) from {}",
        plan.phases.len(),
        plan.pool.len(),
        path.display()
    );
    Ok(plan)
}

/// Read a live environment snapshot: a JSON list of resource documents
pub fn load_environment(path: &Path) -> Result<Vec<Resource>> {
    let doc = load_manifest(path)?;
    let Value::Array(docs) = doc else {
        anyhow::bail!(
            "Environment snapshot must be a list of resources: {}",
            path.display()
        );
    };

    docs.iter()
        .map(|doc| Resource::from_document(doc).map_err(anyhow::Error::from))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Invalid environment snapshot: {}", path.display()))
}
