//! Custom tracing layer for JSONL output.
//!
//! Writes one JSON object per event to stderr, keeping stdout clean for
//! reports and exports. Correlation fields (`run_id`, `estimator`,
//! `stage`) are lifted to the top level whether they were recorded on the
//! event itself or on an enclosing span.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::events::Level;

const CORRELATION_KEYS: [&str; 3] = ["run_id", "estimator", "stage"];

/// Correlation data stored on spans.
#[derive(Debug, Clone, Default)]
struct SpanContext {
    run_id: Option<String>,
    estimator: Option<String>,
    stage: Option<String>,
}

impl SpanContext {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "run_id" => self.run_id = Some(value),
            "estimator" => self.estimator = Some(value),
            "stage" => self.stage = Some(value),
            _ => {}
        }
    }
}

/// Extracts field values from tracing events.
struct JsonFieldVisitor {
    fields: serde_json::Map<String, serde_json::Value>,
    message: Option<String>,
}

impl JsonFieldVisitor {
    fn new() -> Self {
        JsonFieldVisitor {
            fields: serde_json::Map::new(),
            message: None,
        }
    }
}

impl tracing::field::Visit for JsonFieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let s = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(s);
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::String(s));
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(value.into()),
        );
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(value.into()),
        );
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

struct SpanContextVisitor {
    context: SpanContext,
}

impl tracing::field::Visit for SpanContextVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.context.set(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.context.set(field.name(), format!("{:?}", value));
    }
}

/// JSONL tracing layer, stderr by default.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    pub fn stderr() -> Self {
        JsonlLayer {
            writer: Mutex::new(io::stderr()),
        }
    }
}

impl<W: Write> JsonlLayer<W> {
    /// Layer writing to a custom sink.
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = SpanContextVisitor {
            context: SpanContext::default(),
        };
        attrs.record(&mut visitor);

        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(visitor.context);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let ts = Utc::now();

        let mut inherited = SpanContext::default();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(span_ctx) = span.extensions().get::<SpanContext>() {
                    if inherited.run_id.is_none() {
                        inherited.run_id.clone_from(&span_ctx.run_id);
                    }
                    if inherited.estimator.is_none() {
                        inherited.estimator.clone_from(&span_ctx.estimator);
                    }
                    if inherited.stage.is_none() {
                        inherited.stage.clone_from(&span_ctx.stage);
                    }
                }
            }
        }

        let mut visitor = JsonFieldVisitor::new();
        event.record(&mut visitor);

        let level: Level = (*event.metadata().level()).into();
        let mut obj = serde_json::Map::new();

        obj.insert("ts".to_string(), serde_json::json!(ts.to_rfc3339()));
        obj.insert("level".to_string(), serde_json::json!(level));
        obj.insert(
            "event".to_string(),
            serde_json::json!(event.metadata().target()),
        );

        // event-level correlation fields win over span-level ones
        for key in CORRELATION_KEYS {
            let inherited_value = match key {
                "run_id" => inherited.run_id.take(),
                "estimator" => inherited.estimator.take(),
                _ => inherited.stage.take(),
            };
            let value = visitor
                .fields
                .remove(key)
                .or_else(|| inherited_value.map(serde_json::Value::String));
            if let Some(value) = value {
                obj.insert(key.to_string(), value);
            }
        }

        if let Some(msg) = visitor.message {
            obj.insert("message".to_string(), serde_json::json!(msg));
        }
        if !visitor.fields.is_empty() {
            obj.insert(
                "fields".to_string(),
                serde_json::Value::Object(visitor.fields),
            );
        }

        let json = serde_json::to_string(&serde_json::Value::Object(obj)).unwrap_or_default();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    struct BufWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for BufWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> serde_json::Value {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = JsonlLayer::new(BufWriter(buffer.clone()));
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);
        let output = buffer.lock().unwrap();
        let line = String::from_utf8_lossy(&output);
        serde_json::from_str(line.trim()).unwrap()
    }

    #[test]
    fn layer_writes_level_and_message() {
        let parsed = capture(|| {
            tracing::warn!(target: "test.warn", message = "danger");
        });
        assert_eq!(parsed["level"], "warn");
        assert_eq!(parsed["message"], "danger");
        assert_eq!(parsed["event"], "test.warn");
        assert!(parsed["ts"].is_string());
    }

    #[test]
    fn layer_lifts_correlation_fields() {
        let parsed = capture(|| {
            tracing::info!(
                target: "score.users",
                run_id = "run-1",
                estimator = "lens",
                stage = "score",
                users = 12u64,
                message = "scored"
            );
        });
        assert_eq!(parsed["run_id"], "run-1");
        assert_eq!(parsed["estimator"], "lens");
        assert_eq!(parsed["stage"], "score");
        assert_eq!(parsed["fields"]["users"], 12);
        assert!(parsed["fields"].get("run_id").is_none());
    }

    #[test]
    fn layer_inherits_span_context() {
        let parsed = capture(|| {
            let span = tracing::info_span!("run", run_id = "run-9", estimator = "dud");
            let _guard = span.enter();
            tracing::info!(target: "test.span", converged = true, message = "inside");
        });
        assert_eq!(parsed["run_id"], "run-9");
        assert_eq!(parsed["estimator"], "dud");
        assert_eq!(parsed["fields"]["converged"], true);
    }
}
