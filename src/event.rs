//! Notifications emitted by the engine, and the names of the hive events
//! it reacts to.
//!
//! Subscribers receive notifications through a broadcast channel
//! (`TodoEngine::subscribe`). Notifications are the engine's voice; they
//! are never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Todo;

/// A notification emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Monotonic sequence number. Subscribers can detect gaps.
    pub seq: u64,
    /// When this notification was emitted.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: NotificationKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    TodoCreated {
        todo: Todo,
    },
    TodoCompleted {
        todo: Todo,
        result: Option<serde_json::Value>,
    },
    Error {
        message: String,
    },
}

/// Inbound hive event names with built-in handlers.
pub mod names {
    pub const AGENT_REGISTERED: &str = "agentRegistered";
    pub const TASK_SUBMITTED: &str = "taskSubmitted";
    pub const TASK_COMPLETED: &str = "taskCompleted";
    pub const TASK_FAILED: &str = "taskFailed";
    pub const CONSENSUS_REACHED: &str = "consensusReached";
    pub const AGENT_FAILED: &str = "agentFailed";
    pub const IDENTITY_REFRESH_TRIGGERED: &str = "identityRefreshTriggered";
    pub const MEMORY_COMPRESSED: &str = "memoryCompressed";
    pub const MEMORY_RESTORED: &str = "memoryRestored";
    pub const PERFORMANCE_ISSUE: &str = "performanceIssue";
    pub const RESOURCE_CONSTRAINT: &str = "resourceConstraint";
    pub const ERROR_OCCURRED: &str = "errorOccurred";
    pub const BOTTLENECK_DETECTED: &str = "bottleneckDetected";
    pub const SCALING_NEEDED: &str = "scalingNeeded";
}

/// Values recorded in `Todo::triggered_by`.
pub mod triggers {
    pub const AGENT_REGISTERED: &str = "agent_registered";
    pub const AGENT_VERIFIED: &str = "agent_verified";
    pub const TASK_SUBMITTED: &str = "task_submitted";
    pub const TASK_COMPLETED: &str = "task_completed";
    pub const TASK_FAILED: &str = "task_failed";
    pub const CONSENSUS_REACHED: &str = "consensus_reached";
    pub const AGENT_FAILED: &str = "agent_failed";
    pub const IDENTITY_REFRESH: &str = "identity_refresh";
    pub const MEMORY_COMPRESSED: &str = "memory_compressed";
    pub const MEMORY_RESTORED: &str = "memory_restored";
    pub const PERFORMANCE_ISSUE: &str = "performance_issue";
    pub const RESOURCE_CONSTRAINT: &str = "resource_constraint";
    pub const ERROR_OCCURRED: &str = "error_occurred";
    pub const BOTTLENECK_DETECTED: &str = "bottleneck_detected";
    pub const SCALING_NEEDED: &str = "scaling_needed";
    pub const CRITICAL_RESOLVED: &str = "critical_resolved";
}
