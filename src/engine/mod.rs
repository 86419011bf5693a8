//! The todo engine. The public API for feeding hive events in and
//! managing the todos they produce.
//!
//! The engine owns the handler registry, the in-memory todo table, and the
//! notification stream. The table is authoritative for the process
//! lifetime; every write is mirrored to the memory store on a best-effort
//! basis.

mod lifecycle;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio::sync::broadcast;
use tracing::{Instrument, debug, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::event::{Notification, NotificationKind};
use crate::handlers;
use crate::memory::{MemoryEntry, MemoryStore};
use crate::model::{Priority, Todo, TodoId};
use crate::registry::{EventHandler, HandlerRegistry};
use crate::telemetry::metrics;
use crate::telemetry::todo::start_event_span;

/// Reacts to hive events by generating todos. One per process; share it
/// behind an `Arc`.
pub struct TodoEngine {
    config: EngineConfig,
    registry: RwLock<HandlerRegistry>,
    todos: Mutex<HashMap<TodoId, Todo>>,
    memory: OnceLock<Arc<dyn MemoryStore>>,
    notifications: broadcast::Sender<Notification>,
    /// Last sequence number handed out. Held while sending so receivers
    /// observe notifications in sequence order.
    seq: Mutex<u64>,
}

impl TodoEngine {
    /// Create an engine with the built-in handlers registered.
    ///
    /// The engine cannot process events until [`initialize`](Self::initialize)
    /// installs a memory store.
    pub fn new(config: EngineConfig) -> Self {
        let mut registry = HandlerRegistry::empty();
        handlers::register_builtin(&mut registry);

        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));

        Self {
            config,
            registry: RwLock::new(registry),
            todos: Mutex::new(HashMap::new()),
            memory: OnceLock::new(),
            notifications,
            seq: Mutex::new(0),
        }
    }

    /// Create an engine that is ready to use.
    pub fn with_memory(config: EngineConfig, memory: Arc<dyn MemoryStore>) -> Self {
        let engine = Self::new(config);
        // A fresh OnceLock is always empty.
        let _ = engine.memory.set(memory);
        engine
    }

    /// Install the memory store. Allowed exactly once.
    pub fn initialize(&self, memory: Arc<dyn MemoryStore>) -> Result<()> {
        self.memory
            .set(memory)
            .map_err(|_| Error::AlreadyInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.memory.get().is_some()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Append a handler for `event`, after any already registered.
    pub fn register(&self, event: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(event, handler);
    }

    /// Names of events that currently have handlers.
    pub fn registered_events(&self) -> Vec<String> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .events()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Receive notifications emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Run every handler registered for `event`, in registration order.
    ///
    /// A failing handler is reported as an `error` notification and does not
    /// stop the others. Unknown events are accepted and do nothing.
    pub async fn process_event(&self, event: &str, data: &serde_json::Value) -> Result<()> {
        self.memory()?;

        // Snapshot so no lock is held while handlers run.
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers_for(event)
            .to_vec();

        metrics::events_processed().add(
            1,
            &[
                KeyValue::new("event", event.to_string()),
                KeyValue::new("handled", (!handlers.is_empty()).to_string()),
            ],
        );

        if handlers.is_empty() {
            debug!(event, "no handlers for event");
            return Ok(());
        }

        let span = start_event_span(event);
        span.record("event.handlers", handlers.len());

        let failures = self
            .run_handlers(event, data, &handlers)
            .instrument(span.clone())
            .await;
        span.record("event.failures", failures);
        Ok(())
    }

    async fn run_handlers(
        &self,
        event: &str,
        data: &serde_json::Value,
        handlers: &[Arc<dyn EventHandler>],
    ) -> usize {
        let mut failures = 0;
        for (index, handler) in handlers.iter().enumerate() {
            if let Err(e) = handler.handle(self, data).await {
                failures += 1;
                warn!(event, handler = index, error = %e, "handler failed");
                metrics::handler_failures().add(1, &[KeyValue::new("event", event.to_string())]);
                self.notify(NotificationKind::Error {
                    message: format!("todo generation failed for event {event}: {e}"),
                });
            }
        }
        failures
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Pending and in-progress todos, in no particular order.
    pub fn active_todos(&self) -> Vec<Todo> {
        self.select(|todo| todo.is_active())
    }

    /// Active todos with exactly this priority.
    pub fn todos_by_priority(&self, priority: Priority) -> Vec<Todo> {
        self.select(|todo| todo.is_active() && todo.priority == priority)
    }

    /// Active todos routed to `role`.
    pub fn todos_for_agent(&self, role: &str) -> Vec<Todo> {
        self.select(|todo| todo.is_active() && todo.assigned_agent.as_deref() == Some(role))
    }

    /// Every todo regardless of status.
    pub fn all_todos(&self) -> Vec<Todo> {
        self.select(|_| true)
    }

    /// The oldest active todo whose content contains `fragment`.
    pub fn find_active(&self, fragment: &str) -> Option<Todo> {
        self.lock_todos()
            .values()
            .filter(|todo| todo.is_active() && todo.content.contains(fragment))
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .cloned()
    }

    /// Look up one todo by id.
    pub fn get(&self, id: &TodoId) -> Option<Todo> {
        self.lock_todos().get(id).cloned()
    }

    fn select(&self, keep: impl Fn(&Todo) -> bool) -> Vec<Todo> {
        self.lock_todos()
            .values()
            .filter(|todo| keep(todo))
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn memory(&self) -> Result<&Arc<dyn MemoryStore>> {
        self.memory.get().ok_or(Error::NotInitialized)
    }

    fn lock_todos(&self) -> MutexGuard<'_, HashMap<TodoId, Todo>> {
        self.todos.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Broadcast a notification. Having no subscribers is fine.
    fn notify(&self, kind: NotificationKind) {
        let mut seq = self.seq.lock().unwrap_or_else(PoisonError::into_inner);
        *seq += 1;
        let _ = self.notifications.send(Notification {
            seq: *seq,
            timestamp: Utc::now(),
            kind,
        });
    }

    /// Write `todo` to the memory store. Failures are logged and surfaced as
    /// an `error` notification; the in-memory table is left as is.
    async fn mirror(&self, memory: &Arc<dyn MemoryStore>, todo: &Todo, ttl_secs: Option<u64>) {
        let operation = if ttl_secs.is_some() { "create" } else { "update" };

        let outcome = match serde_json::to_string(todo) {
            Ok(value) => {
                memory
                    .store(MemoryEntry {
                        key: format!("todo/{}", todo.id),
                        value,
                        namespace: self.config.namespace.clone(),
                        ttl_secs,
                    })
                    .await
            }
            Err(e) => Err(Error::Json(e)),
        };

        let result = if outcome.is_ok() { "ok" } else { "error" };
        metrics::memory_writes().add(
            1,
            &[
                KeyValue::new("operation", operation),
                KeyValue::new("result", result),
            ],
        );

        if let Err(e) = outcome {
            warn!(id = %todo.id, operation, error = %e, "failed to persist todo");
            self.notify(NotificationKind::Error {
                message: format!("failed to persist todo {}: {e}", todo.id),
            });
        }
    }
}
