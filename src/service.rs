//! Resolver service: one task owns the index and the readiness gate.
//!
//! Every mutation (source events) and every query is a message handled to
//! completion by that task, so a query never observes a half-applied update.
//! Source events are drained ahead of commands, which keeps an event sent
//! before a query visible to that query.
//!
//! `ModuleResolver` is the owning handle: it registers sources, hands out
//! gated `ResolverClient` bindings, and shuts the task down. Clients carry the
//! query operations and may be cloned freely.

use crate::config::ResolverConfig;
use crate::error::{ResolverError, Result};
use crate::manifest::{ManifestEntry, ManifestId, ManifestIndex, SourceName};
use crate::permutation::{FindModulesByTypesQuery, FindModulesByTypesResponse, find_modules_by_types};
use crate::query::{FindModulesQuery, FindModulesResponse, find_modules, module_manifest};
use crate::readiness::{Admission, ReadinessGate};
use crate::source::{ManifestSource, SourceEvent, SourceMessage, SourceSink};
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{Instrument, debug, error, info, info_span, warn};

enum Command {
    AddSource {
        name: SourceName,
        source: Box<dyn ManifestSource>,
        reply: oneshot::Sender<Result<()>>,
    },
    Connect {
        reply: oneshot::Sender<()>,
    },
    FindModules {
        query: FindModulesQuery,
        reply: oneshot::Sender<FindModulesResponse>,
    },
    FindModulesByTypes {
        query: FindModulesByTypesQuery,
        reply: oneshot::Sender<FindModulesByTypesResponse>,
    },
    GetModuleManifest {
        module_id: String,
        reply: oneshot::Sender<Option<ManifestEntry>>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

enum Step {
    Source(SourceMessage),
    Command(Option<Command>),
    Sweep,
}

/// Owning handle to a running resolver service.
pub struct ModuleResolver {
    tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// A binding admitted by the readiness gate.
#[derive(Clone, Debug)]
pub struct ResolverClient {
    tx: mpsc::UnboundedSender<Command>,
}

impl ModuleResolver {
    /// Spawn the service task on the current tokio runtime.
    pub fn start(config: ResolverConfig) -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        let (source_tx, source_rx) = mpsc::unbounded_channel();
        let service = ResolverService {
            config,
            index: ManifestIndex::new(),
            gate: ReadinessGate::new(),
            sources: BTreeMap::new(),
            commands,
            source_tx,
            source_rx,
            sweep: None,
        };
        let task = tokio::spawn(service.run().instrument(info_span!("module_resolver")));
        Self { tx, task }
    }

    /// Register `source` under `name` and start watching it.
    ///
    /// Must happen before the first `connect`; later registrations are
    /// rejected with `LateSourceRegistration`.
    pub async fn add_source(
        &self,
        name: impl Into<SourceName>,
        source: impl ManifestSource,
    ) -> Result<()> {
        let name = name.into();
        let source: Box<dyn ManifestSource> = Box::new(source);
        request(&self.tx, |reply| Command::AddSource {
            name,
            source,
            reply,
        })
        .await?
    }

    /// Bind a client once every registered source has reported idle.
    ///
    /// The returned future does not borrow the resolver, so a binding can be
    /// awaited on another task while this handle keeps registering or shuts
    /// down.
    pub fn connect(&self) -> impl Future<Output = Result<ResolverClient>> + Send + use<> {
        let tx = self.tx.clone();
        async move {
            request(&tx, |reply| Command::Connect { reply }).await?;
            Ok(ResolverClient { tx })
        }
    }

    /// Stop accepting work, drop all sources and entries, and wait for the
    /// service task to finish. Bindings still waiting on readiness fail with
    /// `ServiceStopped`.
    pub async fn shutdown(self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Shutdown { ack }).is_ok() {
            let _ = done.await;
        }
        if let Err(err) = self.task.await {
            error!(error = %err, "resolver task ended abnormally");
        }
    }
}

impl ResolverClient {
    pub async fn find_modules(&self, query: FindModulesQuery) -> Result<FindModulesResponse> {
        request(&self.tx, |reply| Command::FindModules { query, reply }).await
    }

    pub async fn find_modules_by_types(
        &self,
        query: FindModulesByTypesQuery,
    ) -> Result<FindModulesByTypesResponse> {
        request(&self.tx, |reply| Command::FindModulesByTypes { query, reply }).await
    }

    pub async fn get_module_manifest(
        &self,
        module_id: impl Into<String>,
    ) -> Result<Option<ManifestEntry>> {
        let module_id = module_id.into();
        request(&self.tx, |reply| Command::GetModuleManifest { module_id, reply }).await
    }
}

async fn request<R>(
    tx: &mpsc::UnboundedSender<Command>,
    build: impl FnOnce(oneshot::Sender<R>) -> Command,
) -> Result<R> {
    let (reply, response) = oneshot::channel();
    tx.send(build(reply))
        .map_err(|_| ResolverError::ServiceStopped)?;
    response.await.map_err(|_| ResolverError::ServiceStopped)
}

struct ResolverService {
    config: ResolverConfig,
    index: ManifestIndex,
    gate: ReadinessGate<oneshot::Sender<()>>,
    sources: BTreeMap<SourceName, Box<dyn ManifestSource>>,
    commands: mpsc::UnboundedReceiver<Command>,
    source_tx: mpsc::UnboundedSender<SourceMessage>,
    source_rx: mpsc::UnboundedReceiver<SourceMessage>,
    sweep: Option<Interval>,
}

impl ResolverService {
    async fn run(mut self) {
        info!("resolver service started");
        loop {
            let step = tokio::select! {
                biased;
                Some(message) = self.source_rx.recv() => Step::Source(message),
                command = self.commands.recv() => Step::Command(command),
                () = next_sweep(&mut self.sweep) => Step::Sweep,
            };

            match step {
                Step::Source(message) => self.apply_source_event(message),
                Step::Command(Some(Command::Shutdown { ack })) => {
                    self.stop();
                    let _ = ack.send(());
                    return;
                }
                Step::Command(Some(command)) => self.handle(command),
                Step::Command(None) => break,
                Step::Sweep => {
                    let released = self.gate.sweep();
                    release(released);
                }
            }
            self.sync_sweep_timer();
        }
        self.stop();
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::AddSource {
                name,
                source,
                reply,
            } => {
                let _ = reply.send(self.add_source(name, source));
            }
            Command::Connect { reply } => match self.gate.await_ready(reply) {
                Admission::Ready(reply) => {
                    let _ = reply.send(());
                }
                Admission::Buffered => {
                    debug!(
                        waiting = self.gate.waiting_bindings(),
                        "binding deferred until sources are ready"
                    );
                }
            },
            Command::FindModules { query, reply } => {
                let response = find_modules(&self.index, &query);
                debug!(
                    action = query.action.as_deref().unwrap_or(""),
                    results = response.results.len(),
                    "find_modules"
                );
                let _ = reply.send(response);
            }
            Command::FindModulesByTypes { query, reply } => {
                let response = find_modules_by_types(&self.index, &query);
                debug!(
                    constraints = query.parameter_constraints.len(),
                    results = response.results.len(),
                    "find_modules_by_types"
                );
                let _ = reply.send(response);
            }
            Command::GetModuleManifest { module_id, reply } => {
                let _ = reply.send(module_manifest(&self.index, &module_id));
            }
            Command::Shutdown { ack } => {
                // `run` intercepts shutdown before dispatching here.
                let _ = ack.send(());
            }
        }
    }

    fn add_source(&mut self, name: SourceName, mut source: Box<dyn ManifestSource>) -> Result<()> {
        if let Err(err) = self.gate.register_source(name.clone()) {
            error!(source = %name, error = %err, "source registration rejected");
            return Err(err);
        }
        info!(source = %name, "watching manifest source");
        source.watch(SourceSink::new(name.clone(), self.source_tx.clone()));
        self.sources.insert(name, source);
        Ok(())
    }

    fn apply_source_event(&mut self, message: SourceMessage) {
        let SourceMessage { source, event } = message;
        match event {
            SourceEvent::Idle => {
                let released = self.gate.on_idle(&source);
                release(released);
            }
            SourceEvent::New { entry, manifest } => {
                let id = ManifestId {
                    source,
                    entry,
                };
                let replaced = self.index.upsert(id.clone(), manifest).is_some();
                debug!(manifest = %id, replaced, "manifest indexed");
            }
            SourceEvent::Removed { entry } => {
                let id = ManifestId {
                    source,
                    entry,
                };
                if self.index.remove(&id).is_some() {
                    debug!(manifest = %id, "manifest removed");
                } else {
                    warn!(manifest = %id, "removal of unknown manifest ignored");
                }
            }
        }
    }

    fn sync_sweep_timer(&mut self) {
        if !self.gate.sweep_scheduled() {
            self.sweep = None;
        } else if self.sweep.is_none() {
            let period = self.config.readiness_log_interval;
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.sweep = Some(interval);
        }
    }

    fn stop(&mut self) {
        let abandoned = self.gate.drain_pending().len();
        self.sweep = None;
        self.sources.clear();
        self.index.clear();
        info!(abandoned_bindings = abandoned, "resolver service stopped");
    }
}

fn release(bindings: Vec<oneshot::Sender<()>>) {
    for binding in bindings {
        let _ = binding.send(());
    }
}

async fn next_sweep(sweep: &mut Option<Interval>) {
    match sweep {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
