use module_resolver::{ManifestEntry, ManifestSource, ParameterConstraint, SourceSink};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Source driven by the test through the sink captured at `watch`.
#[derive(Clone, Default)]
pub struct ManualSource {
    sink: Arc<Mutex<Option<SourceSink>>>,
}

impl ManifestSource for ManualSource {
    fn watch(&mut self, sink: SourceSink) {
        *self.sink.lock().unwrap_or_else(|err| err.into_inner()) = Some(sink);
    }
}

impl ManualSource {
    pub fn sink(&self) -> SourceSink {
        self.sink
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
            .expect("source was never watched")
    }
}

/// Manifest with a single intent filter.
pub fn manifest(module_id: &str, action: &str, params: &[(&str, &str)]) -> ManifestEntry {
    ManifestEntry::new(module_id).with_filter(
        action,
        params
            .iter()
            .map(|(name, type_name)| ParameterConstraint::new(*name, *type_name))
            .collect(),
    )
}

pub fn write_manifest(dir: &Path, stem: &str, manifest: &ManifestEntry) {
    let body = serde_json::to_string_pretty(manifest).expect("manifest serializes");
    fs::write(dir.join(format!("{stem}.json")), body).expect("write manifest fixture");
}

/// Fields of one captured tracing event; the message lives under `message`.
pub type CapturedEvent = BTreeMap<String, String>;

/// Layer that keeps every event so tests can assert on service logging.
#[derive(Clone, Default)]
pub struct RecordingLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl RecordingLayer {
    /// Captured events whose message equals `message`.
    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .iter()
            .filter(|event| event.get("message").map(String::as_str) == Some(message))
            .cloned()
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for RecordingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = CapturedEvent::new();
        event.record(&mut FieldVisitor {
            fields: &mut fields,
        });
        self.events
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(fields);
    }
}

struct FieldVisitor<'a> {
    fields: &'a mut CapturedEvent,
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), format!("{value:?}"));
    }
}
