//! Authoritative manifest table plus its derived lookup caches.
//!
//! Every cache is rebuilt from the table entry it describes: inserting an
//! entry adds its id to each cache key the entry's filters imply, and
//! removing it reverses exactly those insertions. Empty cache sets are
//! dropped so no key outlives its last member. All collections are ordered,
//! which gives queries their deterministic (source, entry) result order.

use crate::manifest::{ManifestEntry, ManifestId};
use std::collections::{BTreeMap, BTreeSet};

static EMPTY: BTreeSet<ManifestId> = BTreeSet::new();

/// Manifest table keyed by `ManifestId` with action/type/module caches.
#[derive(Debug, Default)]
pub struct ManifestIndex {
    manifests: BTreeMap<ManifestId, ManifestEntry>,
    by_action: BTreeMap<String, BTreeSet<ManifestId>>,
    by_type_and_name: BTreeMap<(String, String), BTreeSet<ManifestId>>,
    by_type: BTreeMap<String, BTreeSet<ManifestId>>,
    by_module: BTreeMap<String, BTreeSet<ManifestId>>,
}

impl ManifestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `entry` under `id`, fully replacing any prior entry.
    ///
    /// Returns the replaced entry, if there was one.
    pub fn upsert(&mut self, id: ManifestId, entry: ManifestEntry) -> Option<ManifestEntry> {
        let previous = self.remove(&id);

        insert_member(&mut self.by_module, entry.module_id.clone(), &id);
        for filter in &entry.intent_filters {
            insert_member(&mut self.by_action, filter.action.clone(), &id);
            for constraint in &filter.parameter_constraints {
                insert_member(
                    &mut self.by_type_and_name,
                    (constraint.type_name.clone(), constraint.name.clone()),
                    &id,
                );
                insert_member(&mut self.by_type, constraint.type_name.clone(), &id);
            }
        }
        self.manifests.insert(id, entry);
        previous
    }

    /// Remove the entry for `id` and every cache reference to it.
    ///
    /// Returns `None` when the id was never installed; callers decide whether
    /// that deserves a log line.
    pub fn remove(&mut self, id: &ManifestId) -> Option<ManifestEntry> {
        let entry = self.manifests.remove(id)?;

        remove_member(&mut self.by_module, &entry.module_id, id);
        for filter in &entry.intent_filters {
            remove_member(&mut self.by_action, &filter.action, id);
            for constraint in &filter.parameter_constraints {
                remove_member(
                    &mut self.by_type_and_name,
                    &(constraint.type_name.clone(), constraint.name.clone()),
                    id,
                );
                remove_member(&mut self.by_type, &constraint.type_name, id);
            }
        }
        Some(entry)
    }

    /// Drop every entry and cache.
    pub fn clear(&mut self) {
        self.manifests.clear();
        self.by_action.clear();
        self.by_type_and_name.clear();
        self.by_type.clear();
        self.by_module.clear();
    }

    pub fn get(&self, id: &ManifestId) -> Option<&ManifestEntry> {
        self.manifests.get(id)
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// Iterates installed manifests in (source, entry) order.
    pub fn iter(&self) -> impl Iterator<Item = (&ManifestId, &ManifestEntry)> {
        self.manifests.iter()
    }

    pub fn by_action(&self, action: &str) -> &BTreeSet<ManifestId> {
        self.by_action.get(action).unwrap_or(&EMPTY)
    }

    pub fn by_type(&self, type_name: &str) -> &BTreeSet<ManifestId> {
        self.by_type.get(type_name).unwrap_or(&EMPTY)
    }

    pub fn by_type_and_name(&self, type_name: &str, name: &str) -> &BTreeSet<ManifestId> {
        self.by_type_and_name
            .get(&(type_name.to_string(), name.to_string()))
            .unwrap_or(&EMPTY)
    }

    pub fn by_module(&self, module_id: &str) -> &BTreeSet<ManifestId> {
        self.by_module.get(module_id).unwrap_or(&EMPTY)
    }

    /// Audit the caches against the table in both directions.
    ///
    /// Returns every violation found rather than stopping at the first, so a
    /// broken sequence of mutations shows its full damage in one assertion.
    pub fn consistency_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (id, entry) in &self.manifests {
            if !self.by_module(&entry.module_id).contains(id) {
                errors.push(format!("{id} missing from module cache '{}'", entry.module_id));
            }
            for filter in &entry.intent_filters {
                if !self.by_action(&filter.action).contains(id) {
                    errors.push(format!("{id} missing from action cache '{}'", filter.action));
                }
                for constraint in &filter.parameter_constraints {
                    if !self
                        .by_type_and_name(&constraint.type_name, &constraint.name)
                        .contains(id)
                    {
                        errors.push(format!(
                            "{id} missing from type/name cache ({}, {})",
                            constraint.type_name, constraint.name
                        ));
                    }
                    if !self.by_type(&constraint.type_name).contains(id) {
                        errors.push(format!(
                            "{id} missing from type cache '{}'",
                            constraint.type_name
                        ));
                    }
                }
            }
        }

        for (action, ids) in &self.by_action {
            self.audit_members("action", action, ids, &mut errors, |entry| {
                entry.intent_filters.iter().any(|f| &f.action == action)
            });
        }
        for ((type_name, name), ids) in &self.by_type_and_name {
            let key = format!("({type_name}, {name})");
            self.audit_members("type/name", &key, ids, &mut errors, |entry| {
                entry.intent_filters.iter().any(|f| {
                    f.parameter_constraints
                        .iter()
                        .any(|c| &c.type_name == type_name && &c.name == name)
                })
            });
        }
        for (type_name, ids) in &self.by_type {
            self.audit_members("type", type_name, ids, &mut errors, |entry| {
                entry.intent_filters.iter().any(|f| {
                    f.parameter_constraints
                        .iter()
                        .any(|c| &c.type_name == type_name)
                })
            });
        }
        for (module_id, ids) in &self.by_module {
            self.audit_members("module", module_id, ids, &mut errors, |entry| {
                &entry.module_id == module_id
            });
        }

        errors
    }

    fn audit_members(
        &self,
        cache: &str,
        key: &str,
        ids: &BTreeSet<ManifestId>,
        errors: &mut Vec<String>,
        matches: impl Fn(&ManifestEntry) -> bool,
    ) {
        if ids.is_empty() {
            errors.push(format!("{cache} cache keeps empty set for '{key}'"));
        }
        for id in ids {
            match self.manifests.get(id) {
                None => errors.push(format!("{cache} cache '{key}' references absent {id}")),
                Some(entry) if !matches(entry) => {
                    errors.push(format!("{cache} cache '{key}' holds non-matching {id}"))
                }
                Some(_) => {}
            }
        }
    }
}

fn insert_member<K: Ord>(cache: &mut BTreeMap<K, BTreeSet<ManifestId>>, key: K, id: &ManifestId) {
    cache.entry(key).or_default().insert(id.clone());
}

fn remove_member<K, Q>(cache: &mut BTreeMap<K, BTreeSet<ManifestId>>, key: &Q, id: &ManifestId)
where
    K: Ord + std::borrow::Borrow<Q>,
    Q: Ord + ?Sized,
{
    if let Some(ids) = cache.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            cache.remove(key);
        }
    }
}
