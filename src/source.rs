//! Manifest sources and the sink they report through.
//!
//! A source owns one namespace of entry ids. After `watch` it delivers every
//! entry it knows, signals idle once that snapshot is complete, and keeps
//! reporting additions and removals afterwards. The sink only enqueues
//! messages for the service task, so it may be called from any thread.
//! Dropping a source must stop further callbacks.

use crate::manifest::{EntryId, ManifestEntry, ManifestValidator, SourceName};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Supplier of manifests for one source namespace.
pub trait ManifestSource: Send + 'static {
    /// Start delivering events to `sink`. Called exactly once.
    fn watch(&mut self, sink: SourceSink);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceEvent {
    /// The initial snapshot has been delivered. May repeat after reconnects.
    Idle,
    New { entry: EntryId, manifest: ManifestEntry },
    Removed { entry: EntryId },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceMessage {
    pub source: SourceName,
    pub event: SourceEvent,
}

/// Callback handle given to a source by `watch`.
#[derive(Clone, Debug)]
pub struct SourceSink {
    source: SourceName,
    tx: mpsc::UnboundedSender<SourceMessage>,
}

impl SourceSink {
    pub(crate) fn new(source: SourceName, tx: mpsc::UnboundedSender<SourceMessage>) -> Self {
        Self { source, tx }
    }

    /// A sink whose messages land in the returned receiver instead of a
    /// service. Useful for driving a source on its own.
    pub fn channel(source: SourceName) -> (Self, mpsc::UnboundedReceiver<SourceMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(source, tx), rx)
    }

    pub fn source(&self) -> &SourceName {
        &self.source
    }

    pub fn on_idle(&self) {
        self.send(SourceEvent::Idle);
    }

    pub fn on_new(&self, entry: impl Into<EntryId>, manifest: ManifestEntry) {
        self.send(SourceEvent::New {
            entry: entry.into(),
            manifest,
        });
    }

    pub fn on_removed(&self, entry: impl Into<EntryId>) {
        self.send(SourceEvent::Removed {
            entry: entry.into(),
        });
    }

    /// Whether the receiving side is gone; sources may stop early.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: SourceEvent) {
        let message = SourceMessage {
            source: self.source.clone(),
            event,
        };
        if self.tx.send(message).is_err() {
            trace!(source = %self.source, "receiver gone; dropping source event");
        }
    }
}

/// Snapshot source backed by a directory of `*.json` manifest files.
///
/// Each file becomes one entry keyed by its file stem. Files that fail schema
/// validation are logged and skipped. Delivery runs on a background thread
/// and ends with a single idle signal; the directory is not watched for
/// later changes.
pub struct DirectorySource {
    dir: PathBuf,
    cancelled: Arc<AtomicBool>,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ManifestSource for DirectorySource {
    fn watch(&mut self, sink: SourceSink) {
        let dir = self.dir.clone();
        let cancelled = Arc::clone(&self.cancelled);
        let thread_name = format!("manifest-dir-{}", sink.source());
        let spawned = thread::Builder::new()
            .name(thread_name)
            .spawn(move || deliver_directory(&dir, &sink, &cancelled));
        if let Err(err) = spawned {
            warn!(dir = %self.dir.display(), error = %err, "unable to start directory source");
        }
    }
}

impl Drop for DirectorySource {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

fn deliver_directory(dir: &Path, sink: &SourceSink, cancelled: &AtomicBool) {
    let validator = match ManifestValidator::bundled() {
        Ok(validator) => Some(validator),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "manifest schema unavailable");
            None
        }
    };

    match collect_manifest_files(dir) {
        Ok(files) => {
            for (stem, path) in files {
                if cancelled.load(Ordering::SeqCst) || sink.is_closed() {
                    return;
                }
                let Some(validator) = &validator else {
                    break;
                };
                match validator.load_manifest(&path) {
                    Ok(manifest) => {
                        debug!(source = %sink.source(), entry = %stem, "delivering manifest");
                        sink.on_new(stem, manifest);
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %format!("{err:#}"), "skipping manifest");
                    }
                }
            }
        }
        Err(err) => {
            // An unreadable directory counts as an empty snapshot.
            warn!(dir = %dir.display(), error = %format!("{err:#}"), "unable to list manifests");
        }
    }

    if !cancelled.load(Ordering::SeqCst) {
        sink.on_idle();
    }
}

/// List `*.json` files directly under `dir`, keyed and ordered by file stem.
pub fn collect_manifest_files(dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut files = BTreeMap::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading manifest dir {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => {
                files.insert(stem.to_string(), path);
            }
            None => warn!(path = %path.display(), "skipping manifest with non-UTF-8 name"),
        }
    }
    Ok(files)
}
