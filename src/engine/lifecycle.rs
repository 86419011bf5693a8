//! Todo creation, status transitions, and follow-up synthesis.

use std::sync::Arc;

use chrono::Utc;
use opentelemetry::KeyValue;
use serde_json::{Value, json};
use tracing::{Instrument, Span, debug, info};

use super::TodoEngine;
use crate::error::{Error, Result};
use crate::event::{NotificationKind, triggers};
use crate::handlers::display_value;
use crate::memory::MemoryStore;
use crate::model::{NewTodo, Priority, Status, Todo, TodoId};
use crate::telemetry::metrics;
use crate::telemetry::todo::{record_status_transition, start_todo_span};

impl TodoEngine {
    /// Create a pending todo, mirror it, and announce it.
    pub async fn create_todo(&self, new: NewTodo) -> Result<Todo> {
        let memory = self.memory()?.clone();

        if new.content.trim().is_empty() {
            return Err(Error::InvalidTodo("content must not be empty".to_string()));
        }
        if new.triggered_by.trim().is_empty() {
            return Err(Error::InvalidTodo("triggered_by must not be empty".to_string()));
        }

        let now = Utc::now();
        let todo = {
            let mut todos = self.lock_todos();
            let mut id = TodoId::generate();
            while todos.contains_key(&id) {
                id = TodoId::generate();
            }

            let todo = Todo {
                id: id.clone(),
                content: new.content,
                priority: new.priority,
                status: Status::Pending,
                triggered_by: new.triggered_by,
                context: new.context,
                dependencies: new.dependencies,
                assigned_agent: new.assigned_agent,
                deadline: new.deadline,
                created_at: now,
                updated_at: now,
                completed_at: None,
            };
            todos.insert(id, todo.clone());
            todo
        };

        self.mirror(&memory, &todo, Some(self.config.todo_ttl_secs))
            .await;

        metrics::todos_created().add(
            1,
            &[
                KeyValue::new("triggered_by", todo.triggered_by.clone()),
                KeyValue::new("priority", todo.priority.as_str()),
            ],
        );
        info!(
            id = %todo.id,
            priority = %todo.priority,
            triggered_by = %todo.triggered_by,
            "todo created"
        );

        self.notify(NotificationKind::TodoCreated { todo: todo.clone() });
        Ok(todo)
    }

    /// Mark a todo completed and synthesize its follow-ups.
    ///
    /// Unknown ids and already-completed todos are ignored: completion may
    /// race with external cleanup, and `completed` is terminal.
    pub async fn complete_todo(&self, id: &TodoId, result: Option<Value>) -> Result<()> {
        let memory = self.memory()?.clone();
        let span = start_todo_span("complete", id.as_str());
        self.complete_in_span(&memory, id, result, &span)
            .instrument(span.clone())
            .await
    }

    async fn complete_in_span(
        &self,
        memory: &Arc<dyn MemoryStore>,
        id: &TodoId,
        result: Option<Value>,
        span: &Span,
    ) -> Result<()> {
        let (todo, from) = {
            let mut todos = self.lock_todos();
            let Some(todo) = todos.get_mut(id) else {
                debug!(%id, "completion for unknown todo ignored");
                return Ok(());
            };
            if todo.status.is_terminal() {
                debug!(%id, "todo already completed");
                return Ok(());
            }
            let from = apply_status(todo, Status::Completed)?;
            (todo.clone(), from)
        };
        record_status_transition(span, &from.to_string(), &Status::Completed.to_string());

        self.mirror(memory, &todo, None).await;

        let followups = self.synthesize_followups(&todo, result.as_ref()).await?;

        metrics::todos_completed().add(1, &[KeyValue::new("priority", todo.priority.as_str())]);
        info!(id = %todo.id, followups = followups.len(), "todo completed");

        self.notify(NotificationKind::TodoCompleted { todo, result });
        Ok(())
    }

    /// Move a pending todo to in-progress.
    pub async fn start_todo(&self, id: &TodoId) -> Result<Todo> {
        self.transition(id, Status::InProgress).await
    }

    /// Park a pending todo.
    pub async fn block_todo(&self, id: &TodoId) -> Result<Todo> {
        self.transition(id, Status::Blocked).await
    }

    async fn transition(&self, id: &TodoId, to: Status) -> Result<Todo> {
        let memory = self.memory()?.clone();
        let span = start_todo_span("transition", id.as_str());
        self.transition_in_span(&memory, id, to, &span)
            .instrument(span.clone())
            .await
    }

    async fn transition_in_span(
        &self,
        memory: &Arc<dyn MemoryStore>,
        id: &TodoId,
        to: Status,
        span: &Span,
    ) -> Result<Todo> {
        let (todo, from) = {
            let mut todos = self.lock_todos();
            let todo = todos
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(id.clone()))?;
            let from = apply_status(todo, to)?;
            (todo.clone(), from)
        };
        record_status_transition(span, &from.to_string(), &to.to_string());

        self.mirror(memory, &todo, None).await;
        Ok(todo)
    }

    /// Follow-up rules, evaluated against a just-completed todo. Both may
    /// fire for the same todo.
    async fn synthesize_followups(
        &self,
        completed: &Todo,
        result: Option<&Value>,
    ) -> Result<Vec<Todo>> {
        let mut created = Vec::new();

        if completed.triggered_by == triggers::AGENT_REGISTERED
            && completed.content.to_lowercase().contains("verify")
        {
            let agent = completed
                .context
                .get("agentId")
                .map(display_value)
                .unwrap_or_else(|| "unknown".to_string());

            created.push(
                self.create_todo(
                    NewTodo::new(
                        format!("Integrate verified agent {agent} into active assignments"),
                        triggers::AGENT_VERIFIED,
                    )
                    .priority(Priority::Medium)
                    .context(Value::Object(completed.context.clone()))
                    .depends_on(completed.id.clone()),
                )
                .await?,
            );
        }

        if completed.priority == Priority::Critical {
            created.push(
                self.create_todo(
                    NewTodo::new(
                        format!(
                            "Monitor for recurrence of resolved issue: {}",
                            completed.content
                        ),
                        triggers::CRITICAL_RESOLVED,
                    )
                    .priority(Priority::Low)
                    .context(json!({
                        "resolvedTodo": completed.id,
                        "result": result.cloned().unwrap_or(Value::Null),
                    }))
                    .depends_on(completed.id.clone()),
                )
                .await?,
            );
        }

        Ok(created)
    }
}

/// Validate and apply a status change. Returns the previous status.
fn apply_status(todo: &mut Todo, to: Status) -> Result<Status> {
    let from = todo.status;
    if !from.can_transition_to(to) {
        return Err(Error::InvalidTransition {
            id: todo.id.clone(),
            from,
            to,
        });
    }

    let now = Utc::now();
    todo.status = to;
    todo.updated_at = now;
    if to == Status::Completed {
        todo.completed_at = Some(now);
    }
    Ok(from)
}
