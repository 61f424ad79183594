//! Startup readiness gate.
//!
//! Sources are registered up front; each reports idle once its initial
//! snapshot has been delivered. New bindings wait here until every registered
//! source has been idle at least once. The gate is plain state: the service
//! task owns the timer and calls `sweep` while `sweep_scheduled` holds.

use crate::error::{ResolverError, Result};
use crate::manifest::SourceName;
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, info, warn};

/// Outcome of asking the gate to admit a binding.
#[derive(Debug)]
pub enum Admission<T> {
    /// All sources are ready; the binding proceeds immediately.
    Ready(T),
    /// The binding was queued until the remaining sources go idle.
    Buffered,
}

#[derive(Debug)]
pub struct ReadinessGate<T> {
    sources: BTreeSet<SourceName>,
    ready: BTreeSet<SourceName>,
    pending: VecDeque<T>,
    binding_started: bool,
    sweep_scheduled: bool,
}

impl<T> Default for ReadinessGate<T> {
    fn default() -> Self {
        Self {
            sources: BTreeSet::new(),
            ready: BTreeSet::new(),
            pending: VecDeque::new(),
            binding_started: false,
            sweep_scheduled: false,
        }
    }
}

impl<T> ReadinessGate<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source whose idle signal gates new bindings.
    ///
    /// Registration closes as soon as the first binding arrives.
    pub fn register_source(&mut self, name: SourceName) -> Result<()> {
        if self.binding_started {
            return Err(ResolverError::LateSourceRegistration { name });
        }
        if self.sources.contains(&name) {
            return Err(ResolverError::DuplicateSource { name });
        }
        self.sources.insert(name);
        Ok(())
    }

    /// Mark `name` ready. Repeated signals are no-ops.
    ///
    /// Returns the bindings released by this signal, in arrival order.
    pub fn on_idle(&mut self, name: &SourceName) -> Vec<T> {
        if !self.sources.contains(name) {
            warn!(source = %name, "idle signal from unregistered source ignored");
            return Vec::new();
        }
        if !self.ready.insert(name.clone()) {
            debug!(source = %name, "duplicate idle signal");
            return Vec::new();
        }
        debug!(source = %name, "source ready");
        self.release_if_ready()
    }

    pub fn all_ready(&self) -> bool {
        self.ready.len() == self.sources.len()
    }

    /// Admit `binding` now or buffer it until every source is ready.
    ///
    /// Buffering schedules the diagnostic sweep if it is not already running.
    pub fn await_ready(&mut self, binding: T) -> Admission<T> {
        self.binding_started = true;
        if self.all_ready() {
            return Admission::Ready(binding);
        }
        self.pending.push_back(binding);
        self.sweep_scheduled = true;
        Admission::Buffered
    }

    /// Periodic diagnostic pass.
    ///
    /// Logs the sources still outstanding; once none are, releases the
    /// buffered bindings and unschedules itself.
    pub fn sweep(&mut self) -> Vec<T> {
        if !self.all_ready() {
            let waiting: Vec<&str> = self.pending_sources().map(SourceName::as_str).collect();
            info!(
                waiting_bindings = self.pending.len(),
                pending_sources = %waiting.join(", "),
                "still waiting on sources"
            );
            return Vec::new();
        }
        self.release_if_ready()
    }

    /// Whether the service should keep ticking the sweep timer.
    pub fn sweep_scheduled(&self) -> bool {
        self.sweep_scheduled
    }

    /// Registered sources that have not reported idle yet, in name order.
    pub fn pending_sources(&self) -> impl Iterator<Item = &SourceName> {
        self.sources.difference(&self.ready)
    }

    pub fn waiting_bindings(&self) -> usize {
        self.pending.len()
    }

    /// Remove every buffered binding without admitting it (shutdown).
    pub fn drain_pending(&mut self) -> Vec<T> {
        self.sweep_scheduled = false;
        self.pending.drain(..).collect()
    }

    fn release_if_ready(&mut self) -> Vec<T> {
        if !self.all_ready() {
            return Vec::new();
        }
        self.sweep_scheduled = false;
        if !self.pending.is_empty() {
            info!(
                released = self.pending.len(),
                "all sources ready; releasing buffered bindings"
            );
        }
        self.pending.drain(..).collect()
    }
}
