//! Manifest index and module resolver.
//!
//! Independent sources contribute manifests (descriptors advertising what an
//! executable module can do) to a shared index. The resolver answers two
//! kinds of lookups against it: action-named queries with named, typed
//! parameters (`query`), and type-only queries that enumerate every way the
//! caller's parameters can feed a manifest's declared parameters
//! (`permutation`). `service` runs the index behind a single task and holds
//! new bindings until every source has delivered its initial snapshot.

use anyhow::{Result, anyhow, bail};

pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod permutation;
pub mod query;
pub mod readiness;
pub mod service;
pub mod source;

pub use config::ResolverConfig;
pub use error::ResolverError;
pub use manifest::{
    EntryId, IntentFilter, ManifestEntry, ManifestId, ManifestIndex, ManifestValidator,
    ParameterConstraint, SourceName,
};
pub use permutation::{
    FindModulesByTypesQuery, FindModulesByTypesResponse, FindModulesByTypesResult,
    ParameterMapping, TypedParameterQuery, find_modules_by_types,
};
pub use query::{
    FindModulesQuery, FindModulesResponse, FindModulesResult, FindModulesStatus, ParameterQuery,
    find_modules, module_manifest,
};
pub use readiness::{Admission, ReadinessGate};
pub use service::{ModuleResolver, ResolverClient};
pub use source::{
    DirectorySource, ManifestSource, SourceEvent, SourceMessage, SourceSink,
    collect_manifest_files,
};

/// Split comma- or whitespace-delimited lists (e.g. `gps, place`) into tokens.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .replace(',', " ")
        .split_whitespace()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `NAME=VALUE` command-line pairs such as `--source local=./manifests`
/// or `--param start=gps,place`.
pub fn parse_assignment(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() {
        bail!("missing name in '{raw}'");
    }
    if value.is_empty() {
        bail!("missing value in '{raw}'");
    }
    Ok((name.to_string(), value.to_string()))
}
