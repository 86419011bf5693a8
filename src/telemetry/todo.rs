//! Span helpers for event dispatch and todo lifecycle.

use tracing::Span;

/// Span covering the dispatch of one hive event.
///
/// `handlers` and `failures` are declared empty and filled in as the
/// dispatch proceeds.
pub fn start_event_span(event: &str) -> Span {
    tracing::info_span!(
        "hive_todo.process_event",
        "event.name" = event,
        "event.handlers" = tracing::field::Empty,
        "event.failures" = tracing::field::Empty,
    )
}

/// Span covering a lifecycle operation on one todo.
pub fn start_todo_span(operation: &str, todo_id: &str) -> Span {
    tracing::info_span!(
        "hive_todo.lifecycle",
        "todo.operation" = operation,
        "todo.id" = todo_id,
    )
}

/// Emit a status transition event scoped to `span`.
pub fn record_status_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "status_transition");
    });
}
