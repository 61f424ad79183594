//! Type-only queries: every injective wiring of caller parameters into a
//! manifest's declared parameters.
//!
//! Candidates are gathered by *union* over every accepted type, which is a
//! deliberately wide scan; exact compatibility is then checked per intent
//! filter. For a filter with `k` parameters and `n` mutually compatible
//! caller constraints the enumeration yields `n!/(n-k)!` assignments.

use crate::manifest::{IntentFilter, ManifestEntry, ManifestId, ManifestIndex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Score attached to every type-only match; ranking is not performed.
pub const DEFAULT_SCORE: f32 = 1.0;

/// One caller-side parameter slot and the types it can be supplied as.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedParameterQuery {
    pub constraint_name: String,
    pub types: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindModulesByTypesQuery {
    pub parameter_constraints: Vec<TypedParameterQuery>,
}

/// Caller constraint `query_constraint_name` feeds the filter parameter
/// `intent_filter_param_name`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterMapping {
    pub query_constraint_name: String,
    pub intent_filter_param_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FindModulesByTypesResult {
    pub module_id: String,
    pub action: String,
    pub score: f32,
    pub manifest: ManifestEntry,
    pub parameter_mappings: Vec<ParameterMapping>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FindModulesByTypesResponse {
    pub results: Vec<FindModulesByTypesResult>,
}

impl TypedParameterQuery {
    pub fn new<I, S>(constraint_name: impl Into<String>, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            constraint_name: constraint_name.into(),
            types: types.into_iter().map(Into::into).collect(),
        }
    }
}

impl FindModulesByTypesQuery {
    pub fn new(parameter_constraints: Vec<TypedParameterQuery>) -> Self {
        Self {
            parameter_constraints,
        }
    }
}

/// Enumerate every valid parameter assignment for every candidate filter.
pub fn find_modules_by_types(
    index: &ManifestIndex,
    query: &FindModulesByTypesQuery,
) -> FindModulesByTypesResponse {
    let constraints = &query.parameter_constraints;
    let candidates: BTreeSet<&ManifestId> = constraints
        .iter()
        .flat_map(|constraint| constraint.types.iter())
        .flat_map(|type_name| index.by_type(type_name))
        .collect();

    let mut results = Vec::new();
    for id in candidates {
        let Some(entry) = index.get(id) else {
            continue;
        };
        for filter in &entry.intent_filters {
            if constraints.len() < filter.parameter_constraints.len() {
                continue;
            }
            for assignment in enumerate_assignments(filter, constraints) {
                let parameter_mappings = assignment
                    .iter()
                    .zip(&filter.parameter_constraints)
                    .map(|(&slot, param)| ParameterMapping {
                        query_constraint_name: constraints[slot].constraint_name.clone(),
                        intent_filter_param_name: param.name.clone(),
                    })
                    .collect();
                results.push(FindModulesByTypesResult {
                    module_id: entry.module_id.clone(),
                    action: filter.action.clone(),
                    score: DEFAULT_SCORE,
                    manifest: entry.clone(),
                    parameter_mappings,
                });
            }
        }
    }

    FindModulesByTypesResponse { results }
}

/// All injective assignments of filter parameters to caller constraints.
///
/// Each assignment lists, per filter parameter in declared order, the index
/// of the constraint bound to it.
fn enumerate_assignments(
    filter: &IntentFilter,
    constraints: &[TypedParameterQuery],
) -> Vec<Vec<usize>> {
    let compatible: Vec<Vec<usize>> = filter
        .parameter_constraints
        .iter()
        .map(|param| {
            constraints
                .iter()
                .enumerate()
                .filter(|(_, c)| c.types.iter().any(|t| t == &param.type_name))
                .map(|(slot, _)| slot)
                .collect()
        })
        .collect();

    // A parameter nothing can feed rules the filter out before searching.
    if compatible.iter().any(Vec::is_empty) {
        return Vec::new();
    }

    let mut found = Vec::new();
    let mut used = vec![false; constraints.len()];
    let mut current = Vec::with_capacity(compatible.len());
    backtrack(&compatible, &mut used, &mut current, &mut found);
    found
}

fn backtrack(
    compatible: &[Vec<usize>],
    used: &mut [bool],
    current: &mut Vec<usize>,
    found: &mut Vec<Vec<usize>>,
) {
    let depth = current.len();
    if depth == compatible.len() {
        found.push(current.clone());
        return;
    }
    for &slot in &compatible[depth] {
        if used[slot] {
            continue;
        }
        used[slot] = true;
        current.push(slot);
        backtrack(compatible, used, current, found);
        current.pop();
        used[slot] = false;
    }
}
