//! Deserializable representation of a module manifest document.
//!
//! The types mirror `schema/module_manifest.schema.json` so sources and tests
//! can describe capabilities without ad-hoc JSON handling. Use
//! `ManifestValidator` when documents come from untrusted files; use these
//! structs directly when the content is already known to be well formed.

use serde::{Deserialize, Serialize};

/// A declared capability parameter: a name plus the type it accepts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterConstraint {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// One (action, parameter list) pair a manifest can satisfy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentFilter {
    pub action: String,
    #[serde(default)]
    pub parameter_constraints: Vec<ParameterConstraint>,
}

/// Descriptor advertising one executable's capabilities.
///
/// Entries are immutable once installed in the index; a later delivery with
/// the same id replaces the whole entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub module_id: String,
    #[serde(default)]
    pub intent_filters: Vec<IntentFilter>,
}

impl ParameterConstraint {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

impl IntentFilter {
    pub fn new(action: impl Into<String>, parameter_constraints: Vec<ParameterConstraint>) -> Self {
        Self {
            action: action.into(),
            parameter_constraints,
        }
    }
}

impl ManifestEntry {
    pub fn new(module_id: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            intent_filters: Vec::new(),
        }
    }

    /// Append an intent filter; handy when assembling manifests in code.
    pub fn with_filter(
        mut self,
        action: impl Into<String>,
        parameter_constraints: Vec<ParameterConstraint>,
    ) -> Self {
        self.intent_filters
            .push(IntentFilter::new(action, parameter_constraints));
        self
    }
}
