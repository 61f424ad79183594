//! Action-named queries.
//!
//! Candidates narrow by intersection: the handler's manifests, then the
//! action's manifests, then for each constraint the manifests declaring a
//! parameter with that exact name and one of the accepted types. Survivors
//! contribute one result per intent filter whose action matches.

use crate::manifest::{ManifestEntry, ManifestId, ManifestIndex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A named caller parameter and the types it can be supplied as.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterQuery {
    pub name: String,
    pub types: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindModulesQuery {
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub parameter_constraints: Vec<ParameterQuery>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindModulesStatus {
    Success,
    UnknownHandler,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindModulesResult {
    pub module_id: String,
    /// Copy of the whole manifest that produced this result.
    pub manifest: ManifestEntry,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindModulesResponse {
    pub status: FindModulesStatus,
    pub results: Vec<FindModulesResult>,
}

impl ParameterQuery {
    pub fn new<I, S>(name: impl Into<String>, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            types: types.into_iter().map(Into::into).collect(),
        }
    }
}

impl FindModulesQuery {
    pub fn for_action(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..Self::default()
        }
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterQuery) -> Self {
        self.parameter_constraints.push(parameter);
        self
    }
}

impl FindModulesResponse {
    fn unknown_handler() -> Self {
        Self {
            status: FindModulesStatus::UnknownHandler,
            results: Vec::new(),
        }
    }

    /// Module ids in result order; mostly useful for assertions and logs.
    pub fn module_ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.module_id.as_str()).collect()
    }
}

/// Resolve an action-named query against the current index.
///
/// Total over well-formed input: unknown actions, types, or names produce an
/// empty successful response; only an unmatched handler changes the status.
pub fn find_modules(index: &ManifestIndex, query: &FindModulesQuery) -> FindModulesResponse {
    // `None` means "not narrowed yet": every manifest is still a candidate.
    let mut candidates: Option<BTreeSet<ManifestId>> = None;

    if let Some(handler) = &query.handler {
        let ids = index.by_module(handler);
        if ids.is_empty() {
            return FindModulesResponse::unknown_handler();
        }
        candidates = Some(ids.clone());
    }

    if let Some(action) = &query.action {
        narrow(&mut candidates, index.by_action(action));
    }

    for constraint in &query.parameter_constraints {
        let matched: BTreeSet<ManifestId> = constraint
            .types
            .iter()
            .flat_map(|type_name| index.by_type_and_name(type_name, &constraint.name))
            .cloned()
            .collect();
        narrow(&mut candidates, &matched);
    }

    let mut results = Vec::new();
    let mut emit = |entry: &ManifestEntry| {
        for filter in &entry.intent_filters {
            if query.action.as_ref().is_none_or(|action| &filter.action == action) {
                results.push(FindModulesResult {
                    module_id: entry.module_id.clone(),
                    manifest: entry.clone(),
                });
            }
        }
    };

    match &candidates {
        Some(ids) => {
            for id in ids {
                if let Some(entry) = index.get(id) {
                    emit(entry);
                }
            }
        }
        None => {
            for (_, entry) in index.iter() {
                emit(entry);
            }
        }
    }

    FindModulesResponse {
        status: FindModulesStatus::Success,
        results,
    }
}

/// Manifest for `module_id`, taken from the first source in id order that
/// provides one.
pub fn module_manifest(index: &ManifestIndex, module_id: &str) -> Option<ManifestEntry> {
    index
        .by_module(module_id)
        .iter()
        .find_map(|id| index.get(id))
        .cloned()
}

fn narrow(candidates: &mut Option<BTreeSet<ManifestId>>, allowed: &BTreeSet<ManifestId>) {
    match candidates {
        Some(current) => current.retain(|id| allowed.contains(id)),
        None => *candidates = Some(allowed.clone()),
    }
}
