//! Integration tests for the todo engine: dispatch, lifecycle, queries.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use hive_todo::config::EngineConfig;
use hive_todo::event::{Notification, NotificationKind};
use hive_todo::memory::InMemoryStore;
use hive_todo::model::*;
use hive_todo::registry::{EventHandler, HandlerRegistry};
use hive_todo::{Error, TodoEngine};
use serde_json::{Value, json};
use tokio::sync::broadcast;

fn test_engine() -> (TodoEngine, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let engine = TodoEngine::with_memory(EngineConfig::default(), store.clone());
    (engine, store)
}

fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<NotificationKind> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n.kind);
    }
    out
}

fn errors(kinds: &[NotificationKind]) -> Vec<&str> {
    kinds
        .iter()
        .filter_map(|k| match k {
            NotificationKind::Error { message } => Some(message.as_str()),
            _ => None,
        })
        .collect()
}

fn completions(kinds: &[NotificationKind]) -> usize {
    kinds
        .iter()
        .filter(|k| matches!(k, NotificationKind::TodoCompleted { .. }))
        .count()
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn operations_before_initialize_fail() {
    let engine = TodoEngine::new(EngineConfig::default());
    assert!(!engine.is_initialized());

    let err = engine
        .process_event("agentRegistered", &json!({"agent": {"id": "a1"}}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotInitialized));

    let err = engine
        .complete_todo(&TodoId::from("todo_1"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotInitialized));

    let err = engine
        .create_todo(NewTodo::new("something", "test"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotInitialized));

    assert!(engine.all_todos().is_empty());
}

#[tokio::test]
async fn initialize_installs_store_once() {
    let engine = TodoEngine::new(EngineConfig::default());
    engine.initialize(Arc::new(InMemoryStore::new())).unwrap();
    assert!(engine.is_initialized());

    let err = engine
        .initialize(Arc::new(InMemoryStore::new()))
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyInitialized));

    engine
        .process_event("errorOccurred", &json!({"error": "boom"}))
        .await
        .unwrap();
    assert_eq!(engine.active_todos().len(), 1);
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_todo_applies_defaults_and_mirrors() {
    let (engine, store) = test_engine();

    let todo = engine
        .create_todo(NewTodo::new("Check the hive", "unit_test").context(json!({"k": 1})))
        .await
        .unwrap();

    assert_eq!(todo.status, Status::Pending);
    assert_eq!(todo.priority, Priority::Medium);
    assert_eq!(todo.triggered_by, "unit_test");
    assert!(todo.id.as_str().starts_with("todo_"));
    assert!(todo.dependencies.is_empty());
    assert!(todo.assigned_agent.is_none());

    let entry = store
        .get("event-driven-todos", &format!("todo/{}", todo.id))
        .expect("todo should be mirrored");
    assert_eq!(entry.ttl_secs, Some(7 * 24 * 60 * 60));

    let mirrored: Todo = serde_json::from_str(&entry.value).unwrap();
    assert_eq!(mirrored, todo);
}

#[tokio::test]
async fn create_todo_rejects_empty_content() {
    let (engine, store) = test_engine();

    let err = engine
        .create_todo(NewTodo::new("   ", "unit_test"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTodo(_)));

    let err = engine
        .create_todo(NewTodo::new("content", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTodo(_)));

    assert!(engine.all_todos().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn todo_ids_are_unique() {
    let (engine, _store) = test_engine();

    let mut ids = HashSet::new();
    for i in 0..500 {
        let todo = engine
            .create_todo(NewTodo::new(format!("todo {i}"), "unit_test"))
            .await
            .unwrap();
        ids.insert(todo.id);
    }

    assert_eq!(ids.len(), 500);
    assert_eq!(engine.all_todos().len(), 500);
}

#[tokio::test]
async fn mirror_failure_keeps_todo_and_reports_error() {
    let (engine, store) = test_engine();
    store.set_failing(true);
    let mut rx = engine.subscribe();

    engine
        .process_event("bottleneckDetected", &json!({"component": "router"}))
        .await
        .unwrap();

    let active = engine.active_todos();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].content, "Resolve bottleneck in router");
    assert!(store.is_empty());

    let kinds = drain(&mut rx);
    let errs = errors(&kinds);
    assert_eq!(errs.len(), 1);
    assert!(errs[0].contains("failed to persist"));
    assert!(
        kinds
            .iter()
            .any(|k| matches!(k, NotificationKind::TodoCreated { .. }))
    );
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

struct Probe {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    order: Arc<Mutex<Vec<&'static str>>>,
    fail: bool,
}

#[async_trait]
impl EventHandler for Probe {
    async fn handle(&self, _engine: &TodoEngine, _data: &Value) -> hive_todo::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.order.lock().unwrap().push(self.name);
        if self.fail {
            return Err(Error::Other(format!("{} exploded", self.name)));
        }
        Ok(())
    }
}

#[tokio::test]
async fn failing_handler_does_not_stop_siblings() {
    let (engine, _store) = test_engine();
    let order = Arc::new(Mutex::new(Vec::new()));
    let counters: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();

    for (i, name) in ["first", "second", "third"].into_iter().enumerate() {
        engine.register(
            "customEvent",
            Arc::new(Probe {
                name,
                calls: counters[i].clone(),
                order: order.clone(),
                fail: i == 1,
            }),
        );
    }

    let mut rx = engine.subscribe();
    engine.process_event("customEvent", &json!({})).await.unwrap();

    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);

    let kinds = drain(&mut rx);
    let errs = errors(&kinds);
    assert_eq!(errs.len(), 1);
    assert_eq!(
        errs[0],
        "todo generation failed for event customEvent: second exploded"
    );
}

#[tokio::test]
async fn same_handler_registered_twice_runs_twice() {
    let (engine, _store) = test_engine();
    let calls = Arc::new(AtomicUsize::new(0));
    let probe = Arc::new(Probe {
        name: "dup",
        calls: calls.clone(),
        order: Arc::new(Mutex::new(Vec::new())),
        fail: false,
    });

    engine.register("dupEvent", probe.clone());
    engine.register("dupEvent", probe);
    engine.process_event("dupEvent", &json!(null)).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(engine.registered_events().contains(&"dupEvent".to_string()));
}

#[test]
fn registry_keeps_builtin_bindings() {
    let mut registry = HandlerRegistry::empty();
    assert!(registry.is_empty());

    hive_todo::handlers::register_builtin(&mut registry);
    assert_eq!(registry.len(), 15);
    assert_eq!(registry.handlers_for("agentFailed").len(), 2);
    assert_eq!(registry.handlers_for("taskSubmitted").len(), 1);
    assert!(registry.handlers_for("totally_unknown_event").is_empty());
    assert_eq!(registry.events().len(), 14);
}

#[tokio::test]
async fn unrecognized_event_does_nothing() {
    let (engine, store) = test_engine();
    let mut rx = engine.subscribe();

    engine
        .process_event("totally_unknown_event", &json!({}))
        .await
        .unwrap();

    assert!(engine.all_todos().is_empty());
    assert!(store.is_empty());
    assert!(drain(&mut rx).is_empty());
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn complete_unknown_todo_is_silent() {
    let (engine, _store) = test_engine();
    let mut rx = engine.subscribe();

    engine
        .complete_todo(&TodoId::from("nonexistent_id"), None)
        .await
        .unwrap();

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn completing_twice_is_a_noop() {
    let (engine, _store) = test_engine();
    let todo = engine
        .create_todo(NewTodo::new("Fix it", "unit_test").priority(Priority::Critical))
        .await
        .unwrap();

    let mut rx = engine.subscribe();
    engine.complete_todo(&todo.id, None).await.unwrap();
    engine.complete_todo(&todo.id, None).await.unwrap();

    let kinds = drain(&mut rx);
    assert_eq!(completions(&kinds), 1);
    assert!(errors(&kinds).is_empty());

    let monitors: Vec<Todo> = engine
        .all_todos()
        .into_iter()
        .filter(|t| t.triggered_by == "critical_resolved")
        .collect();
    assert_eq!(monitors.len(), 1);
}

#[tokio::test]
async fn completion_is_mirrored_without_ttl() {
    let (engine, store) = test_engine();
    let todo = engine
        .create_todo(NewTodo::new("Ship it", "unit_test"))
        .await
        .unwrap();

    engine
        .complete_todo(&todo.id, Some(json!({"ok": true})))
        .await
        .unwrap();

    let entry = store
        .get("event-driven-todos", &format!("todo/{}", todo.id))
        .unwrap();
    assert_eq!(entry.ttl_secs, None);

    let mirrored: Todo = serde_json::from_str(&entry.value).unwrap();
    assert_eq!(mirrored.status, Status::Completed);
    assert!(mirrored.completed_at.is_some());

    let completed = engine.get(&todo.id).unwrap();
    assert_eq!(completed.status, Status::Completed);
    assert!(!completed.is_active());
}

#[tokio::test]
async fn completed_notification_carries_result() {
    let (engine, _store) = test_engine();
    let todo = engine
        .create_todo(NewTodo::new("Measure", "unit_test"))
        .await
        .unwrap();

    let mut rx = engine.subscribe();
    engine
        .complete_todo(&todo.id, Some(json!({"latency_ms": 12})))
        .await
        .unwrap();

    let kinds = drain(&mut rx);
    match kinds.last() {
        Some(NotificationKind::TodoCompleted { todo: done, result }) => {
            assert_eq!(done.id, todo.id);
            assert_eq!(done.status, Status::Completed);
            assert_eq!(result, &Some(json!({"latency_ms": 12})));
        }
        other => panic!("expected TodoCompleted, got {other:?}"),
    }
}

#[tokio::test]
async fn status_only_moves_forward() {
    let (engine, _store) = test_engine();
    let todo = engine
        .create_todo(NewTodo::new("Work", "unit_test"))
        .await
        .unwrap();

    let started = engine.start_todo(&todo.id).await.unwrap();
    assert_eq!(started.status, Status::InProgress);

    let err = engine.block_todo(&todo.id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: Status::InProgress,
            to: Status::Blocked,
            ..
        }
    ));

    engine.complete_todo(&todo.id, None).await.unwrap();
    let err = engine.start_todo(&todo.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
    assert_eq!(engine.get(&todo.id).unwrap().status, Status::Completed);

    let parked = engine
        .create_todo(NewTodo::new("Later", "unit_test"))
        .await
        .unwrap();
    assert_eq!(
        engine.block_todo(&parked.id).await.unwrap().status,
        Status::Blocked
    );
    assert!(engine.active_todos().iter().all(|t| t.id != parked.id));
    engine.complete_todo(&parked.id, None).await.unwrap();
    assert_eq!(engine.get(&parked.id).unwrap().status, Status::Completed);

    let err = engine
        .start_todo(&TodoId::from("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// ---------------------------------------------------------------------------
// Follow-up synthesis
// ---------------------------------------------------------------------------

#[tokio::test]
async fn verified_agent_gets_integration_followup() {
    let (engine, _store) = test_engine();
    engine
        .process_event(
            "agentRegistered",
            &json!({"agent": {"id": "agent-7", "type": "coder"}}),
        )
        .await
        .unwrap();

    let verify = engine
        .active_todos()
        .into_iter()
        .find(|t| t.content == "Verify agent agent-7 capabilities and performance")
        .expect("verify todo");

    engine.complete_todo(&verify.id, None).await.unwrap();

    let verified: Vec<Todo> = engine
        .all_todos()
        .into_iter()
        .filter(|t| t.triggered_by == "agent_verified")
        .collect();
    assert_eq!(verified.len(), 1);
    assert_eq!(
        verified[0].content,
        "Integrate verified agent agent-7 into active assignments"
    );
    assert_eq!(verified[0].priority, Priority::Medium);
    assert_eq!(verified[0].context, verify.context);
    assert_eq!(verified[0].dependencies, vec![verify.id.clone()]);
    assert_eq!(engine.all_todos().len(), 3);
}

#[tokio::test]
async fn integration_todo_completion_has_no_verification_followup() {
    let (engine, _store) = test_engine();
    engine
        .process_event("agentRegistered", &json!({"agent": {"id": "a2"}}))
        .await
        .unwrap();

    let integrate = engine
        .todos_by_priority(Priority::High)
        .pop()
        .expect("integrate todo");
    engine.complete_todo(&integrate.id, None).await.unwrap();

    assert!(
        engine
            .all_todos()
            .iter()
            .all(|t| t.triggered_by != "agent_verified")
    );
}

#[tokio::test]
async fn resolved_critical_todo_gets_monitor_followup() {
    let (engine, _store) = test_engine();
    engine
        .process_event("resourceConstraint", &json!({"resource": "memory"}))
        .await
        .unwrap();

    let critical = engine.todos_by_priority(Priority::Critical);
    assert_eq!(critical.len(), 1);
    let critical = &critical[0];

    engine
        .complete_todo(&critical.id, Some(json!("added two nodes")))
        .await
        .unwrap();

    let monitors = engine.todos_by_priority(Priority::Low);
    assert_eq!(monitors.len(), 1);
    let monitor = &monitors[0];
    assert_eq!(monitor.triggered_by, "critical_resolved");
    assert_eq!(
        monitor.content,
        "Monitor for recurrence of resolved issue: Scale resources to handle constraint: memory"
    );
    assert_eq!(monitor.context["resolvedTodo"], json!(critical.id.as_str()));
    assert_eq!(monitor.context["result"], json!("added two nodes"));
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn priority_query_filters_exactly_and_skips_completed() {
    let (engine, _store) = test_engine();

    let mut ids = Vec::new();
    for priority in [
        Priority::Low,
        Priority::High,
        Priority::Critical,
        Priority::High,
    ] {
        let todo = engine
            .create_todo(NewTodo::new(format!("{priority} work"), "unit_test").priority(priority))
            .await
            .unwrap();
        ids.push(todo.id);
    }

    let high = engine.todos_by_priority(Priority::High);
    assert_eq!(high.len(), 2);
    assert!(high.iter().all(|t| t.priority == Priority::High));

    engine.complete_todo(&ids[1], None).await.unwrap();

    let high = engine.todos_by_priority(Priority::High);
    assert_eq!(high.len(), 1);
    assert_eq!(high[0].id, ids[3]);
    assert_eq!(engine.active_todos().len(), 3);
}

#[tokio::test]
async fn agent_query_matches_role_of_active_todos() {
    let (engine, _store) = test_engine();
    let a = engine
        .create_todo(NewTodo::new("Profile", "unit_test").assign("optimizer"))
        .await
        .unwrap();
    engine
        .create_todo(NewTodo::new("Review", "unit_test").assign("reviewer"))
        .await
        .unwrap();
    let b = engine
        .create_todo(NewTodo::new("Tune", "unit_test").assign("optimizer"))
        .await
        .unwrap();

    engine.start_todo(&b.id).await.unwrap();
    assert_eq!(engine.todos_for_agent("optimizer").len(), 2);

    engine.complete_todo(&a.id, None).await.unwrap();
    let optimizer = engine.todos_for_agent("optimizer");
    assert_eq!(optimizer.len(), 1);
    assert_eq!(optimizer[0].id, b.id);
    assert!(engine.todos_for_agent("nobody").is_empty());
}

#[tokio::test]
async fn content_lookup_finds_oldest_active_match() {
    let (engine, _store) = test_engine();
    let first = engine
        .create_todo(NewTodo::new("Verify agent a1 capabilities", "unit_test"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let second = engine
        .create_todo(NewTodo::new("Verify agent a1 again", "unit_test"))
        .await
        .unwrap();

    assert_eq!(engine.find_active("Verify agent a1").unwrap().id, first.id);

    engine.complete_todo(&first.id, None).await.unwrap();
    assert_eq!(engine.find_active("Verify agent a1").unwrap().id, second.id);

    engine.block_todo(&second.id).await.unwrap();
    assert!(engine.find_active("Verify agent a1").is_none());
    assert!(engine.find_active("nothing like this").is_none());
}

#[tokio::test]
async fn every_todo_is_traceable() {
    let (engine, _store) = test_engine();
    let events = [
        ("agentRegistered", json!({"agent": {"id": "a1", "type": "coder"}})),
        ("taskFailed", json!({"task": {"id": "t1"}, "error": {"message": "timeout"}})),
        ("memoryCompressed", json!({"namespace": "swarm"})),
        ("scalingNeeded", json!({"currentLoad": 0.93})),
    ];
    for (event, data) in &events {
        engine.process_event(event, data).await.unwrap();
    }
    for todo in engine.active_todos() {
        if todo.priority == Priority::Critical {
            engine.complete_todo(&todo.id, None).await.unwrap();
        }
    }

    let now = Utc::now();
    let all = engine.all_todos();
    assert!(!all.is_empty());
    for todo in all {
        assert!(!todo.triggered_by.is_empty());
        assert!(todo.created_at <= now);
    }
}

#[tokio::test]
async fn notification_sequence_is_monotonic() {
    let (engine, _store) = test_engine();
    let mut rx = engine.subscribe();

    engine
        .process_event("taskCompleted", &json!({"task": {"id": "t9"}, "result": 42}))
        .await
        .unwrap();
    engine
        .process_event("errorOccurred", &json!({"error": "disk full"}))
        .await
        .unwrap();

    let mut seqs = Vec::new();
    while let Ok(n) = rx.try_recv() {
        seqs.push(n.seq);
    }
    assert_eq!(seqs.len(), 3);
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_events_broadcast_in_sequence_order() {
    let (engine, _store) = test_engine();
    let engine = Arc::new(engine);
    let mut rx = engine.subscribe();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .process_event("scalingNeeded", &json!({"currentLoad": i}))
                    .await
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let mut seqs = Vec::new();
    while let Ok(n) = rx.try_recv() {
        seqs.push(n.seq);
    }
    assert_eq!(seqs, (1..=16).collect::<Vec<u64>>());
}
