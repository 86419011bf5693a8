//! Built-in reaction rules: which todos each hive event produces.
//!
//! Each handler parses its payload into a typed shape and calls
//! [`TodoEngine::create_todo`]. A payload that does not fit is reported as
//! [`Error::InvalidPayload`] and becomes an `error` notification upstream.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::engine::TodoEngine;
use crate::error::{Error, Result};
use crate::event::{names, triggers};
use crate::model::{NewTodo, Priority};
use crate::registry::{EventHandler, HandlerRegistry};

/// Identity refresh reasons that call for a Queen authority check.
const AUTHORITY_CHECK_REASONS: [&str; 2] = ["memory_compaction", "memory_restore"];

/// One built-in rule per recognized event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinHandler {
    AgentRegistered,
    TaskSubmitted,
    TaskCompleted,
    TaskFailed,
    ConsensusReached,
    AgentFailed,
    IdentityRefresh,
    MemoryCompressed,
    MemoryRestored,
    PerformanceIssue,
    ResourceConstraint,
    ErrorOccurred,
    BottleneckDetected,
    ScalingNeeded,
}

impl BuiltinHandler {
    /// Every built-in rule with the event it listens to, in registration
    /// order. The identity check also listens to `agentFailed`, after the
    /// reassignment rule.
    pub const BINDINGS: [(&'static str, BuiltinHandler); 15] = [
        (names::AGENT_REGISTERED, BuiltinHandler::AgentRegistered),
        (names::TASK_SUBMITTED, BuiltinHandler::TaskSubmitted),
        (names::TASK_COMPLETED, BuiltinHandler::TaskCompleted),
        (names::TASK_FAILED, BuiltinHandler::TaskFailed),
        (names::CONSENSUS_REACHED, BuiltinHandler::ConsensusReached),
        (names::AGENT_FAILED, BuiltinHandler::AgentFailed),
        (names::AGENT_FAILED, BuiltinHandler::IdentityRefresh),
        (names::IDENTITY_REFRESH_TRIGGERED, BuiltinHandler::IdentityRefresh),
        (names::MEMORY_COMPRESSED, BuiltinHandler::MemoryCompressed),
        (names::MEMORY_RESTORED, BuiltinHandler::MemoryRestored),
        (names::PERFORMANCE_ISSUE, BuiltinHandler::PerformanceIssue),
        (names::RESOURCE_CONSTRAINT, BuiltinHandler::ResourceConstraint),
        (names::ERROR_OCCURRED, BuiltinHandler::ErrorOccurred),
        (names::BOTTLENECK_DETECTED, BuiltinHandler::BottleneckDetected),
        (names::SCALING_NEEDED, BuiltinHandler::ScalingNeeded),
    ];
}

/// Register every built-in rule.
pub fn register_builtin(registry: &mut HandlerRegistry) {
    for (event, handler) in BuiltinHandler::BINDINGS {
        registry.register(event, Arc::new(handler));
    }
}

#[async_trait]
impl EventHandler for BuiltinHandler {
    async fn handle(&self, engine: &TodoEngine, data: &Value) -> Result<()> {
        match self {
            BuiltinHandler::AgentRegistered => on_agent_registered(engine, data).await,
            BuiltinHandler::TaskSubmitted => on_task_submitted(engine, data).await,
            BuiltinHandler::TaskCompleted => on_task_completed(engine, data).await,
            BuiltinHandler::TaskFailed => on_task_failed(engine, data).await,
            BuiltinHandler::ConsensusReached => on_consensus_reached(engine, data).await,
            BuiltinHandler::AgentFailed => on_agent_failed(engine, data).await,
            BuiltinHandler::IdentityRefresh => on_identity_refresh(engine, data).await,
            BuiltinHandler::MemoryCompressed => on_memory_compressed(engine, data).await,
            BuiltinHandler::MemoryRestored => on_memory_restored(engine, data).await,
            BuiltinHandler::PerformanceIssue => on_performance_issue(engine, data).await,
            BuiltinHandler::ResourceConstraint => on_resource_constraint(engine, data).await,
            BuiltinHandler::ErrorOccurred => on_error_occurred(engine, data).await,
            BuiltinHandler::BottleneckDetected => on_bottleneck_detected(engine, data).await,
            BuiltinHandler::ScalingNeeded => on_scaling_needed(engine, data).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AgentPayload {
    agent: AgentRef,
}

#[derive(Debug, Deserialize)]
struct AgentRef {
    id: Value,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmittedPayload {
    task: SubmittedTask,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmittedTask {
    id: Value,
    description: Value,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    require_consensus: bool,
}

#[derive(Debug, Deserialize)]
struct CompletedPayload {
    task: TaskRef,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct FailedPayload {
    task: TaskRef,
    error: FailureDetail,
}

#[derive(Debug, Deserialize)]
struct TaskRef {
    id: Value,
}

/// Failures arrive either as `{ "message": ... }` or as a bare string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FailureDetail {
    Structured { message: String },
    Text(String),
}

impl FailureDetail {
    fn message(&self) -> &str {
        match self {
            FailureDetail::Structured { message } | FailureDetail::Text(message) => message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConsensusPayload {
    proposal: Value,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct IdentityRefreshPayload {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompressedPayload {
    #[serde(default)]
    namespace: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestoredPayload {
    #[serde(default)]
    backup_id: Value,
}

fn parse<T: DeserializeOwned>(event: &str, data: &Value) -> Result<T> {
    T::deserialize(data).map_err(|e| Error::InvalidPayload {
        event: event.to_string(),
        message: e.to_string(),
    })
}

/// Fetch a field that must be present and non-null, rendered for display.
fn required_field(event: &str, data: &Value, field: &str) -> Result<String> {
    match data.get(field) {
        Some(Value::Null) | None => Err(Error::InvalidPayload {
            event: event.to_string(),
            message: format!("missing field `{field}`"),
        }),
        Some(value) => Ok(display_value(value)),
    }
}

/// Strings render bare; anything else renders as compact JSON.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Queen events
// ---------------------------------------------------------------------------

async fn on_agent_registered(engine: &TodoEngine, data: &Value) -> Result<()> {
    let AgentPayload { agent } = parse(names::AGENT_REGISTERED, data)?;
    let agent_id = display_value(&agent.id);

    let verify = engine
        .create_todo(
            NewTodo::new(
                format!("Verify agent {agent_id} capabilities and performance"),
                triggers::AGENT_REGISTERED,
            )
            .priority(Priority::Medium)
            .context(json!({ "agentId": agent.id, "agentType": agent.kind }))
            .assign("monitor"),
        )
        .await?;

    engine
        .create_todo(
            NewTodo::new(
                format!("Integrate agent {agent_id} into optimal task assignments"),
                triggers::AGENT_REGISTERED,
            )
            .priority(Priority::High)
            .context(json!({ "agentId": agent.id }))
            .depends_on(verify.id),
        )
        .await?;
    Ok(())
}

async fn on_task_submitted(engine: &TodoEngine, data: &Value) -> Result<()> {
    let SubmittedPayload { task } = parse(names::TASK_SUBMITTED, data)?;
    let task_id = display_value(&task.id);

    let priority = if task.priority.as_deref() == Some("critical") {
        Priority::Critical
    } else {
        Priority::High
    };

    let analyze = engine
        .create_todo(
            NewTodo::new(
                format!(
                    "Analyze task complexity: \"{}\"",
                    display_value(&task.description)
                ),
                triggers::TASK_SUBMITTED,
            )
            .priority(priority)
            .context(json!({ "taskId": task.id, "taskDescription": task.description }))
            .assign("analyst"),
        )
        .await?;

    if task.require_consensus {
        engine
            .create_todo(
                NewTodo::new(
                    format!("Prepare consensus process for task {task_id}"),
                    triggers::TASK_SUBMITTED,
                )
                .priority(Priority::High)
                .context(json!({ "taskId": task.id }))
                .depends_on(analyze.id),
            )
            .await?;
    }
    Ok(())
}

async fn on_task_completed(engine: &TodoEngine, data: &Value) -> Result<()> {
    let CompletedPayload { task, result } = parse(names::TASK_COMPLETED, data)?;
    let task_id = display_value(&task.id);

    engine
        .create_todo(
            NewTodo::new(
                format!("Analyze success patterns from completed task {task_id}"),
                triggers::TASK_COMPLETED,
            )
            .priority(Priority::Low)
            .context(json!({ "taskId": task.id, "result": result }))
            .assign("analyst"),
        )
        .await?;

    engine
        .create_todo(
            NewTodo::new(
                format!("Update agent performance metrics for task {task_id}"),
                triggers::TASK_COMPLETED,
            )
            .priority(Priority::Medium)
            .context(json!({ "taskId": task.id, "result": result })),
        )
        .await?;
    Ok(())
}

async fn on_task_failed(engine: &TodoEngine, data: &Value) -> Result<()> {
    let FailedPayload { task, error } = parse(names::TASK_FAILED, data)?;
    let message = error.message();
    let task_id = display_value(&task.id);

    engine
        .create_todo(
            NewTodo::new(
                format!("URGENT: Investigate task failure - {task_id}"),
                triggers::TASK_FAILED,
            )
            .priority(Priority::Critical)
            .context(json!({ "taskId": task.id, "error": message }))
            .assign("reviewer"),
        )
        .await?;

    engine
        .create_todo(
            NewTodo::new(
                "Implement failure prevention for similar tasks",
                triggers::TASK_FAILED,
            )
            .priority(Priority::High)
            .context(json!({ "taskId": task.id, "failurePattern": message })),
        )
        .await?;
    Ok(())
}

async fn on_agent_failed(engine: &TodoEngine, data: &Value) -> Result<()> {
    let AgentPayload { agent } = parse(names::AGENT_FAILED, data)?;
    let agent_id = display_value(&agent.id);
    let agent_type = agent.kind.as_deref().unwrap_or("unknown");

    engine
        .create_todo(
            NewTodo::new(
                format!("CRITICAL: Reassign tasks from failed agent {agent_id}"),
                triggers::AGENT_FAILED,
            )
            .priority(Priority::Critical)
            .context(json!({ "agentId": agent.id, "agentType": agent.kind })),
        )
        .await?;

    engine
        .create_todo(
            NewTodo::new(
                format!("Analyze failure patterns for agent type {agent_type}"),
                triggers::AGENT_FAILED,
            )
            .priority(Priority::High)
            .context(json!({ "agentId": agent.id, "agentType": agent.kind }))
            .assign("analyst"),
        )
        .await?;
    Ok(())
}

async fn on_consensus_reached(engine: &TodoEngine, data: &Value) -> Result<()> {
    let ConsensusPayload { proposal, result } = parse(names::CONSENSUS_REACHED, data)?;
    let decision = required_field(names::CONSENSUS_REACHED, &proposal, "task")?;

    engine
        .create_todo(
            NewTodo::new(
                format!("Implement consensus decision: {decision}"),
                triggers::CONSENSUS_REACHED,
            )
            .priority(Priority::High)
            .context(json!({ "proposal": proposal, "result": result })),
        )
        .await?;

    engine
        .create_todo(
            NewTodo::new(
                "Document consensus rationale for future reference",
                triggers::CONSENSUS_REACHED,
            )
            .priority(Priority::Medium)
            .context(json!({ "proposal": proposal, "result": result }))
            .assign("documenter"),
        )
        .await?;
    Ok(())
}

async fn on_identity_refresh(engine: &TodoEngine, data: &Value) -> Result<()> {
    let IdentityRefreshPayload { reason } = parse(names::IDENTITY_REFRESH_TRIGGERED, data)?;
    let Some(reason) = reason.filter(|r| AUTHORITY_CHECK_REASONS.contains(&r.as_str())) else {
        return Ok(());
    };

    engine
        .create_todo(
            NewTodo::new(
                format!("Verify all agents acknowledge Queen authority after {reason}"),
                triggers::IDENTITY_REFRESH,
            )
            .priority(Priority::High)
            .context(json!({ "reason": reason })),
        )
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Memory events
// ---------------------------------------------------------------------------

async fn on_memory_compressed(engine: &TodoEngine, data: &Value) -> Result<()> {
    let CompressedPayload { namespace } = parse(names::MEMORY_COMPRESSED, data)?;

    engine
        .create_todo(
            NewTodo::new(
                "Verify critical memory integrity after compression",
                triggers::MEMORY_COMPRESSED,
            )
            .priority(Priority::High)
            .context(json!({ "namespace": namespace }))
            .assign("monitor"),
        )
        .await?;

    engine
        .create_todo(
            NewTodo::new(
                "Refresh Queen identity after memory compression",
                triggers::MEMORY_COMPRESSED,
            )
            .priority(Priority::Critical)
            .context(json!({ "operation": "compression" })),
        )
        .await?;
    Ok(())
}

async fn on_memory_restored(engine: &TodoEngine, data: &Value) -> Result<()> {
    let RestoredPayload { backup_id } = parse(names::MEMORY_RESTORED, data)?;

    engine
        .create_todo(
            NewTodo::new(
                "Validate restored memory consistency",
                triggers::MEMORY_RESTORED,
            )
            .priority(Priority::High)
            .context(json!({ "backup": backup_id })),
        )
        .await?;

    engine
        .create_todo(
            NewTodo::new(
                "Re-establish agent hierarchies after memory restore",
                triggers::MEMORY_RESTORED,
            )
            .priority(Priority::Critical)
            .context(json!({ "backup": backup_id })),
        )
        .await?;
    Ok(())
}

async fn on_performance_issue(engine: &TodoEngine, data: &Value) -> Result<()> {
    let component = required_field(names::PERFORMANCE_ISSUE, data, "component")?;

    engine
        .create_todo(
            NewTodo::new(
                format!("Optimize performance bottleneck: {component}"),
                triggers::PERFORMANCE_ISSUE,
            )
            .priority(Priority::High)
            .context(data.clone())
            .assign("optimizer"),
        )
        .await?;
    Ok(())
}

async fn on_resource_constraint(engine: &TodoEngine, data: &Value) -> Result<()> {
    let resource = required_field(names::RESOURCE_CONSTRAINT, data, "resource")?;

    engine
        .create_todo(
            NewTodo::new(
                format!("Scale resources to handle constraint: {resource}"),
                triggers::RESOURCE_CONSTRAINT,
            )
            .priority(Priority::Critical)
            .context(data.clone()),
        )
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// System events
// ---------------------------------------------------------------------------

async fn on_error_occurred(engine: &TodoEngine, data: &Value) -> Result<()> {
    let error = required_field(names::ERROR_OCCURRED, data, "error")?;

    engine
        .create_todo(
            NewTodo::new(format!("Debug and fix error: {error}"), triggers::ERROR_OCCURRED)
                .priority(Priority::High)
                .context(data.clone())
                .assign("reviewer"),
        )
        .await?;
    Ok(())
}

async fn on_bottleneck_detected(engine: &TodoEngine, data: &Value) -> Result<()> {
    let component = required_field(names::BOTTLENECK_DETECTED, data, "component")?;

    engine
        .create_todo(
            NewTodo::new(
                format!("Resolve bottleneck in {component}"),
                triggers::BOTTLENECK_DETECTED,
            )
            .priority(Priority::High)
            .context(data.clone())
            .assign("optimizer"),
        )
        .await?;
    Ok(())
}

async fn on_scaling_needed(engine: &TodoEngine, data: &Value) -> Result<()> {
    let load = required_field(names::SCALING_NEEDED, data, "currentLoad")?;

    engine
        .create_todo(
            NewTodo::new(
                format!("Scale swarm capacity for load: {load}"),
                triggers::SCALING_NEEDED,
            )
            .priority(Priority::Critical)
            .context(data.clone()),
        )
        .await?;
    Ok(())
}
