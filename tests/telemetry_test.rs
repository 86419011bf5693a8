//! Tests for telemetry initialization and span helpers.

use std::fmt;
use std::sync::{Arc, Mutex};

use hive_todo::TodoEngine;
use hive_todo::config::EngineConfig;
use hive_todo::memory::InMemoryStore;
use hive_todo::model::{NewTodo, Priority};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Records each event's message together with the span it was emitted in.
#[derive(Clone, Default)]
struct SpanRecorder {
    seen: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl SpanRecorder {
    fn span_of(&self, message: &str) -> Option<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _)| m == message)
            .unwrap_or_else(|| panic!("no event {message:?} recorded"))
            .1
            .clone()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S> Layer<S> for SpanRecorder
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut message = MessageVisitor(String::new());
        event.record(&mut message);
        let span = ctx.event_span(event).map(|s| s.name().to_string());
        self.seen.lock().unwrap().push((message.0, span));
    }
}

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process; try_init()
    // returns Err instead of panicking if another test got there first.
    let config = hive_todo::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "hive-todo-test".to_string(),
        default_level: "debug".to_string(),
    };
    if let Ok(guard) = hive_todo::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn event_span_records_fields() {
    let span = hive_todo::telemetry::todo::start_event_span("agentRegistered");
    span.record("event.handlers", 2_u64);
    span.record("event.failures", 0_u64);
}

#[test]
fn todo_span_records_transition() {
    let span = hive_todo::telemetry::todo::start_todo_span("complete", "todo_1_abc");
    hive_todo::telemetry::todo::record_status_transition(&span, "pending", "completed");
}

#[test]
fn metric_instruments_are_usable_without_provider() {
    use hive_todo::telemetry::metrics;
    use opentelemetry::KeyValue;

    metrics::todos_created().add(1, &[KeyValue::new("priority", "high")]);
    metrics::handler_failures().add(1, &[KeyValue::new("event", "taskFailed")]);
}

#[tokio::test]
async fn lifecycle_work_runs_inside_its_span() {
    let recorder = SpanRecorder::default();
    let subscriber = tracing_subscriber::registry().with(recorder.clone());
    let _default = tracing::subscriber::set_default(subscriber);

    let engine = TodoEngine::with_memory(EngineConfig::default(), Arc::new(InMemoryStore::new()));
    let todo = engine
        .create_todo(NewTodo::new("Restart scheduler", "unit_test").priority(Priority::Critical))
        .await
        .unwrap();
    engine.complete_todo(&todo.id, None).await.unwrap();

    let lifecycle = Some("hive_todo.lifecycle".to_string());
    assert_eq!(recorder.span_of("status_transition"), lifecycle);
    assert_eq!(recorder.span_of("todo completed"), lifecycle);

    // The monitor follow-up is created while completing.
    let created_in: Vec<Option<String>> = recorder
        .seen
        .lock()
        .unwrap()
        .iter()
        .filter(|(m, _)| m == "todo created")
        .map(|(_, span)| span.clone())
        .collect();
    assert_eq!(created_in, vec![None, lifecycle]);
}
