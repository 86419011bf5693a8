//! Error types for hive-todo.

use thiserror::Error;

use crate::model::{Status, TodoId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("engine not initialized: a memory store must be installed before use")]
    NotInitialized,

    #[error("engine already initialized")]
    AlreadyInitialized,

    #[error("todo not found: {0}")]
    NotFound(TodoId),

    #[error("invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition { id: TodoId, from: Status, to: Status },

    #[error("invalid todo: {0}")]
    InvalidTodo(String),

    #[error("invalid payload for {event}: {message}")]
    InvalidPayload { event: String, message: String },

    #[error("memory store error: {0}")]
    Memory(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
