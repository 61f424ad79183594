//! JSON Schema validation for manifest documents.
//!
//! The bundled schema lives under `schema/module_manifest.schema.json` and is
//! compiled once per validator. Validation reports every violation with its
//! instance path so a broken manifest can be fixed in one pass.

use crate::manifest::ManifestEntry;
use anyhow::{Context, Result, anyhow, bail};
use jsonschema::JSONSchema;
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const BUNDLED_SCHEMA: &str = include_str!("../../schema/module_manifest.schema.json");

/// Compiled manifest schema.
#[derive(Debug)]
pub struct ManifestValidator {
    compiled: JSONSchema,
}

impl ManifestValidator {
    /// Compile the schema shipped with the crate.
    pub fn bundled() -> Result<Self> {
        let schema: Value =
            serde_json::from_str(BUNDLED_SCHEMA).context("parsing bundled manifest schema")?;
        Self::compile(&schema).context("compiling bundled manifest schema")
    }

    /// Compile a schema from disk, e.g. a newer revision than the bundled one.
    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("opening schema {}", path.display()))?;
        let schema: Value = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing schema {}", path.display()))?;
        Self::compile(&schema).with_context(|| format!("compiling schema {}", path.display()))
    }

    fn compile(schema: &Value) -> Result<Self> {
        let compiled = JSONSchema::compile(schema).map_err(|err| anyhow!("{err}"))?;
        Ok(Self { compiled })
    }

    /// Every schema violation in `value`; empty when the document is valid.
    pub fn violations(&self, value: &Value) -> Vec<String> {
        match self.compiled.validate(value) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|err| {
                    let pointer = err.instance_path.to_string();
                    if pointer.is_empty() {
                        err.to_string()
                    } else {
                        format!("{pointer}: {err}")
                    }
                })
                .collect(),
        }
    }

    /// Validate a parsed document and convert it into a `ManifestEntry`.
    pub fn parse_value(&self, value: Value) -> Result<ManifestEntry> {
        let violations = self.violations(&value);
        if !violations.is_empty() {
            bail!("manifest failed schema validation:\n{}", violations.join("\n"));
        }
        serde_json::from_value(value).context("converting manifest document")
    }

    /// Read, validate, and parse a manifest file.
    pub fn load_manifest(&self, path: &Path) -> Result<ManifestEntry> {
        let file = File::open(path)
            .with_context(|| format!("opening manifest {}", path.display()))?;
        let value: Value = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing manifest {}", path.display()))?;
        self.parse_value(value)
            .with_context(|| format!("validating manifest {}", path.display()))
    }
}
