// Integration suite for the resolver: index invariants under mutation,
// readiness gating, both query paths through the service, and the directory
// source end to end.
mod support;

use anyhow::{Context, Result};
use module_resolver::{
    DirectorySource, FindModulesByTypesQuery, FindModulesQuery, FindModulesStatus, ManifestEntry,
    ManifestId, ManifestIndex, ModuleResolver, ParameterConstraint, ParameterQuery,
    ResolverConfig, ResolverError, TypedParameterQuery, find_modules,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use support::{ManualSource, RecordingLayer, manifest, write_manifest};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::SubscriberExt;

const WAIT: Duration = Duration::from_secs(1);

fn manifest_shapes() -> Vec<ManifestEntry> {
    vec![
        manifest("maps", "nav", &[("start", "gps"), ("end", "gps")]),
        manifest("maps", "show", &[("where", "place")]),
        manifest("notes", "write", &[("body", "text")]),
        ManifestEntry::new("multi")
            .with_filter("nav", vec![ParameterConstraint::new("end", "gps")])
            .with_filter("write", vec![ParameterConstraint::new("body", "text")])
            .with_filter("nav", vec![]),
        ManifestEntry::new("bare"),
    ]
}

fn manifest_ids() -> Vec<ManifestId> {
    ["a", "b", "c"]
        .iter()
        .flat_map(|source| ["1", "2", "3"].iter().map(move |entry| ManifestId::new(*source, *entry)))
        .collect()
}

/// `(remove?, id index, shape index)` steps over a small id space so that
/// replacements and removals of live entries are frequent.
fn mutation_steps() -> impl Strategy<Value = Vec<(bool, usize, usize)>> {
    prop::collection::vec((prop::bool::weighted(0.3), 0..9usize, 0..5usize), 1..120)
}

proptest! {
    /// Upsert/remove sequences never leave an orphaned or missing cache
    /// entry, and the caches always agree with a brute-force scan of the table.
    #[test]
    fn index_caches_track_table_under_mutation(steps in mutation_steps()) {
        let shapes = manifest_shapes();
        let ids = manifest_ids();
        let mut index = ManifestIndex::new();
        let mut model: BTreeMap<ManifestId, ManifestEntry> = BTreeMap::new();

        for (step, (remove, id_idx, shape_idx)) in steps.into_iter().enumerate() {
            let id = ids[id_idx].clone();
            if remove {
                let expected = model.remove(&id);
                prop_assert_eq!(index.remove(&id), expected, "step {}", step);
            } else {
                let entry = shapes[shape_idx].clone();
                let expected = model.insert(id.clone(), entry.clone());
                prop_assert_eq!(index.upsert(id, entry), expected, "step {}", step);
            }

            let errors = index.consistency_errors();
            prop_assert!(errors.is_empty(), "step {}: {:#?}", step, errors);
            prop_assert_eq!(index.len(), model.len());

            for action in ["nav", "show", "write", "missing"] {
                let expected: BTreeSet<ManifestId> = model
                    .iter()
                    .filter(|(_, e)| e.intent_filters.iter().any(|f| f.action == action))
                    .map(|(id, _)| id.clone())
                    .collect();
                prop_assert_eq!(index.by_action(action), &expected, "step {} action {}", step, action);
            }
            for type_name in ["gps", "place", "text"] {
                let expected: BTreeSet<ManifestId> = model
                    .iter()
                    .filter(|(_, e)| {
                        e.intent_filters
                            .iter()
                            .flat_map(|f| &f.parameter_constraints)
                            .any(|c| c.type_name == type_name)
                    })
                    .map(|(id, _)| id.clone())
                    .collect();
                prop_assert_eq!(index.by_type(type_name), &expected, "step {} type {}", step, type_name);
            }
        }
    }
}

#[test]
fn reinserting_identical_manifest_is_invisible_to_queries() {
    let mut index = ManifestIndex::new();
    let id = ManifestId::new("s", "maps");
    let entry = manifest("maps", "nav", &[("end", "gps")]);
    index.upsert(id.clone(), entry.clone());
    index.upsert(ManifestId::new("t", "other"), manifest("other", "nav", &[]));

    let query = FindModulesQuery::for_action("nav");
    let before = find_modules(&index, &query);
    index.upsert(id, entry);
    let after = find_modules(&index, &query);

    assert_eq!(before, after);
    assert!(index.consistency_errors().is_empty());
}

// A binding requested before every source is idle only resolves after the
// last source reports idle; a repeated idle from one source does not count.
#[tokio::test(start_paused = true)]
async fn connect_waits_for_every_source() -> Result<()> {
    let resolver = ModuleResolver::start(ResolverConfig::default());
    let first = ManualSource::default();
    let second = ManualSource::default();
    resolver.add_source("first", first.clone()).await?;
    resolver.add_source("second", second.clone()).await?;

    let connect = resolver.connect();
    tokio::pin!(connect);
    assert!(timeout(WAIT, &mut connect).await.is_err());

    first.sink().on_idle();
    first.sink().on_idle();
    assert!(timeout(WAIT, &mut connect).await.is_err());

    second.sink().on_idle();
    let client = timeout(WAIT, &mut connect)
        .await
        .context("binding should resolve once all sources are idle")??;

    // Established bindings stay usable; new bindings are admitted at once.
    first.sink().on_idle();
    client.find_modules(FindModulesQuery::default()).await?;
    timeout(WAIT, resolver.connect()).await??;

    resolver.shutdown().await;
    Ok(())
}

// The sweep only runs while bindings wait: it logs the pending source on
// every tick, never admits early, and stops once the source goes idle.
#[tokio::test(start_paused = true)]
async fn readiness_sweep_runs_only_while_bindings_wait() -> Result<()> {
    let recorder = RecordingLayer::default();
    let _guard = tracing::subscriber::set_default(Registry::default().with(recorder.clone()));
    let sweep_events = || recorder.with_message("still waiting on sources");

    let config = ResolverConfig::default().with_readiness_log_interval(Duration::from_millis(100));
    let resolver = ModuleResolver::start(config);
    let slow = ManualSource::default();
    resolver.add_source("slow", slow.clone()).await?;

    sleep(Duration::from_secs(1)).await;
    assert!(sweep_events().is_empty(), "no binding is waiting yet");

    let first = resolver.connect();
    let second = resolver.connect();
    tokio::pin!(first);
    tokio::pin!(second);
    assert!(timeout(Duration::from_secs(5), &mut first).await.is_err());
    assert!(timeout(WAIT, &mut second).await.is_err());

    let ticks = sweep_events();
    assert!(ticks.len() >= 20, "expected periodic sweeps, got {}", ticks.len());
    assert!(
        ticks
            .iter()
            .all(|event| event.get("pending_sources").map(String::as_str) == Some("slow"))
    );

    slow.sink().on_idle();
    timeout(WAIT, &mut first).await??;
    timeout(WAIT, &mut second).await??;

    let after_release = sweep_events().len();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(sweep_events().len(), after_release, "sweep kept ticking after release");

    resolver.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn sources_cannot_register_after_binding_begins() -> Result<()> {
    let resolver = ModuleResolver::start(ResolverConfig::default());
    resolver.add_source("early", ManualSource::default()).await?;
    assert_eq!(
        resolver.add_source("early", ManualSource::default()).await,
        Err(ResolverError::DuplicateSource {
            name: "early".into()
        })
    );

    // Polling the binding once queues it ahead of the next registration.
    let pending = resolver.connect();
    tokio::pin!(pending);
    assert!(timeout(WAIT, &mut pending).await.is_err());

    let late = resolver.add_source("late", ManualSource::default()).await;
    assert_eq!(
        late,
        Err(ResolverError::LateSourceRegistration {
            name: "late".into()
        })
    );

    resolver.shutdown().await;
    assert!(matches!(pending.await, Err(ResolverError::ServiceStopped)));
    Ok(())
}

#[tokio::test]
async fn action_queries_require_matching_parameter_names() -> Result<()> {
    let resolver = ModuleResolver::start(ResolverConfig::default());
    let source = ManualSource::default();
    resolver.add_source("s", source.clone()).await?;
    source
        .sink()
        .on_new("maps", manifest("maps", "nav", &[("end", "foo")]));
    source.sink().on_idle();
    let client = resolver.connect().await?;

    let wrong_name = client
        .find_modules(
            FindModulesQuery::for_action("nav").with_parameter(ParameterQuery::new("start", ["foo"])),
        )
        .await?;
    assert_eq!(wrong_name.status, FindModulesStatus::Success);
    assert!(wrong_name.results.is_empty());

    let right_name = client
        .find_modules(
            FindModulesQuery::for_action("nav").with_parameter(ParameterQuery::new("end", ["foo"])),
        )
        .await?;
    assert_eq!(right_name.module_ids(), vec!["maps"]);

    let unknown_handler = client
        .find_modules(FindModulesQuery::for_action("nav").with_handler("nobody"))
        .await?;
    assert_eq!(unknown_handler.status, FindModulesStatus::UnknownHandler);

    resolver.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn type_queries_enumerate_every_wiring() -> Result<()> {
    let resolver = ModuleResolver::start(ResolverConfig::default());
    let source = ManualSource::default();
    resolver.add_source("s", source.clone()).await?;
    let sink = source.sink();
    sink.on_new(
        "three",
        manifest("three", "route", &[("a", "gps"), ("b", "gps"), ("c", "gps")]),
    );
    sink.on_new("two", manifest("two", "route", &[("a", "gps"), ("b", "gps")]));
    sink.on_idle();
    let client = resolver.connect().await?;

    let gps = |names: &[&str]| {
        FindModulesByTypesQuery::new(
            names
                .iter()
                .map(|name| TypedParameterQuery::new(*name, ["gps"]))
                .collect(),
        )
    };

    let count_by_module = |response: &module_resolver::FindModulesByTypesResponse| {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for result in &response.results {
            *counts.entry(result.module_id.clone()).or_default() += 1;
        }
        counts
    };

    let three = client.find_modules_by_types(gps(&["x", "y", "z"])).await?;
    let counts = count_by_module(&three);
    assert_eq!(counts.get("three"), Some(&6));
    assert_eq!(counts.get("two"), Some(&6));

    let two = client.find_modules_by_types(gps(&["x", "y"])).await?;
    let counts = count_by_module(&two);
    assert_eq!(counts.get("three"), None);
    assert_eq!(counts.get("two"), Some(&2));

    resolver.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn removing_last_contributor_empties_action() -> Result<()> {
    let resolver = ModuleResolver::start(ResolverConfig::default());
    let s1 = ManualSource::default();
    let s2 = ManualSource::default();
    resolver.add_source("s1", s1.clone()).await?;
    resolver.add_source("s2", s2.clone()).await?;
    s1.sink().on_new("m1", manifest("m1", "nav", &[]));
    s2.sink().on_new("m2", manifest("m2", "nav", &[]));
    s1.sink().on_idle();
    s2.sink().on_idle();
    let client = resolver.connect().await?;

    let query = FindModulesQuery::for_action("nav");
    assert_eq!(client.find_modules(query.clone()).await?.module_ids(), vec!["m1", "m2"]);

    s1.sink().on_removed("m1");
    s1.sink().on_removed("never-delivered");
    assert_eq!(client.find_modules(query.clone()).await?.module_ids(), vec!["m2"]);

    s2.sink().on_removed("m2");
    assert!(client.find_modules(query).await?.results.is_empty());
    assert_eq!(client.get_module_manifest("m1").await?, None);

    resolver.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn results_ignore_registration_and_delivery_order() -> Result<()> {
    let resolver = ModuleResolver::start(ResolverConfig::default());
    let b = ManualSource::default();
    let a = ManualSource::default();
    resolver.add_source("b", b.clone()).await?;
    resolver.add_source("a", a.clone()).await?;
    b.sink().on_new("x", manifest("from-b", "nav", &[]));
    a.sink().on_new("y", manifest("from-a-y", "nav", &[]));
    a.sink().on_new("x", manifest("from-a-x", "nav", &[]));
    b.sink().on_idle();
    a.sink().on_idle();
    let client = resolver.connect().await?;

    let response = client.find_modules(FindModulesQuery::for_action("nav")).await?;
    assert_eq!(response.module_ids(), vec!["from-a-x", "from-a-y", "from-b"]);

    resolver.shutdown().await;
    Ok(())
}

// Reconnecting sources redeliver their snapshot and go idle again; the index
// replaces entries in place and answers exactly as before.
#[tokio::test]
async fn redelivery_after_reconnect_is_idempotent() -> Result<()> {
    let resolver = ModuleResolver::start(ResolverConfig::default());
    let source = ManualSource::default();
    resolver.add_source("s", source.clone()).await?;
    let sink = source.sink();
    let maps = manifest("maps", "nav", &[("end", "gps")]);
    sink.on_new("maps", maps.clone());
    sink.on_idle();
    let client = resolver.connect().await?;

    let query = FindModulesQuery::for_action("nav")
        .with_parameter(ParameterQuery::new("end", ["gps"]));
    let before = client.find_modules(query.clone()).await?;

    sink.on_new("maps", maps.clone());
    sink.on_idle();
    let after = client.find_modules(query.clone()).await?;
    assert_eq!(before, after);

    // A live update under the same id replaces the manifest wholesale.
    sink.on_new("maps", manifest("maps", "nav", &[("start", "gps")]));
    assert!(client.find_modules(query).await?.results.is_empty());

    resolver.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn directory_sources_feed_the_service() -> Result<()> {
    let local = TempDir::new()?;
    let remote = TempDir::new()?;
    write_manifest(local.path(), "m1", &manifest("m1", "nav", &[]));
    write_manifest(remote.path(), "m2", &manifest("m2", "nav", &[("end", "gps")]));
    std::fs::write(remote.path().join("broken.json"), r#"{"module_id": 3}"#)?;

    let resolver = ModuleResolver::start(ResolverConfig::default());
    resolver
        .add_source("s1", DirectorySource::new(local.path()))
        .await?;
    resolver
        .add_source("s2", DirectorySource::new(remote.path()))
        .await?;
    let client = timeout(Duration::from_secs(10), resolver.connect()).await??;

    let response = client.find_modules(FindModulesQuery::for_action("nav")).await?;
    assert_eq!(response.module_ids(), vec!["m1", "m2"]);

    let manifest = client
        .get_module_manifest("m2")
        .await?
        .context("m2 should be indexed")?;
    assert_eq!(manifest.intent_filters[0].parameter_constraints[0].name, "end");

    resolver.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn shutdown_fails_waiting_bindings() -> Result<()> {
    let resolver = ModuleResolver::start(ResolverConfig::default());
    resolver.add_source("never", ManualSource::default()).await?;
    let pending = tokio::spawn(resolver.connect());
    tokio::task::yield_now().await;

    resolver.shutdown().await;
    assert!(matches!(pending.await?, Err(ResolverError::ServiceStopped)));
    Ok(())
}
