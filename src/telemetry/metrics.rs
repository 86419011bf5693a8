//! Metric instruments for hive-todo.
//!
//! Built from the globally registered `MeterProvider`; without one they
//! are no-ops.

use opentelemetry::metrics::{Counter, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("hive-todo")
}

/// Counter: hive events received.
/// Labels: `event`, `handled` ("true" | "false").
pub fn events_processed() -> Counter<u64> {
    meter()
        .u64_counter("hive_todo.events.processed")
        .with_description("Number of hive events dispatched to the engine")
        .build()
}

/// Counter: todos created.
/// Labels: `triggered_by`, `priority`.
pub fn todos_created() -> Counter<u64> {
    meter()
        .u64_counter("hive_todo.todos.created")
        .with_description("Number of todos created")
        .build()
}

/// Counter: todos completed.
/// Labels: `priority`.
pub fn todos_completed() -> Counter<u64> {
    meter()
        .u64_counter("hive_todo.todos.completed")
        .with_description("Number of todos completed")
        .build()
}

/// Counter: handler invocations that returned an error.
/// Labels: `event`.
pub fn handler_failures() -> Counter<u64> {
    meter()
        .u64_counter("hive_todo.handler.failures")
        .with_description("Number of failed handler invocations")
        .build()
}

/// Counter: writes to the memory store.
/// Labels: `operation` ("create" | "update"), `result` ("ok" | "error").
pub fn memory_writes() -> Counter<u64> {
    meter()
        .u64_counter("hive_todo.memory.writes")
        .with_description("Number of memory store writes")
        .build()
}
