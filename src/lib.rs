//! # hive-todo
//!
//! Event-driven todo generation for hive orchestration.
//!
//! The Queen and her workers emit domain events (agent registered, task
//! failed, memory compressed, ...). [`TodoEngine`] reacts to each one by
//! synthesizing prioritized todos, tracks their lifecycle, and expands the
//! graph with follow-up todos when work completes. There are no timers and
//! no polling: callers push events in with [`TodoEngine::process_event`].

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod handlers;
pub mod memory;
pub mod model;
pub mod registry;
pub mod telemetry;

pub use engine::TodoEngine;
pub use error::{Error, Result};
