//! hive-todo CLI: feed hive events to the todo engine and inspect the
//! todos it generates.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use hive_todo::TodoEngine;
use hive_todo::config::Config;
use hive_todo::event::NotificationKind;
use hive_todo::memory::{InMemoryStore, MemoryStore, PgMemoryStore};
use hive_todo::model::{Priority, Todo, TodoId};
use hive_todo::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::broadcast::error::TryRecvError;

#[derive(Parser)]
#[command(name = "hive-todo", about = "Event-driven todo generation for the hive")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process a single event and print the todos it created
    Process {
        /// Event name (e.g. agentRegistered)
        event: String,
        /// JSON payload
        #[arg(long)]
        data: Option<String>,
    },
    /// Replay a JSON-lines script of events and completions
    Replay {
        /// Script path, or "-" for stdin
        script: PathBuf,
        /// Only show todos of this priority
        #[arg(long, conflicts_with = "agent")]
        priority: Option<Priority>,
        /// Only show todos routed to this role
        #[arg(long)]
        agent: Option<String>,
    },
}

/// One line of a replay script.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptLine {
    Event {
        event: String,
        #[serde(default)]
        data: serde_json::Value,
    },
    Complete {
        complete: TodoId,
        #[serde(default)]
        result: Option<serde_json::Value>,
    },
    /// Complete the oldest active todo whose content contains the text.
    CompleteMatching {
        complete_matching: String,
        #[serde(default)]
        result: Option<serde_json::Value>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "hive-todo".to_string(),
        default_level: config.log_level.clone(),
    })?;

    let memory = open_memory(&config).await?;
    let engine = TodoEngine::with_memory(config.engine.clone(), memory);

    match cli.command {
        Command::Process { event, data } => cmd_process(&engine, event, data).await,
        Command::Replay {
            script,
            priority,
            agent,
        } => cmd_replay(&engine, script, priority, agent).await,
    }
}

async fn open_memory(config: &Config) -> anyhow::Result<Arc<dyn MemoryStore>> {
    match config.database_url {
        Some(ref url) => {
            let store = PgMemoryStore::connect(url.expose_secret()).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

async fn cmd_process(
    engine: &TodoEngine,
    event: String,
    data: Option<String>,
) -> anyhow::Result<()> {
    let data: serde_json::Value = match data {
        Some(json) => serde_json::from_str(&json).context("--data is not valid JSON")?,
        None => serde_json::json!({}),
    };

    let mut notifications = engine.subscribe();
    engine.process_event(&event, &data).await?;

    let mut created = 0;
    loop {
        match notifications.try_recv() {
            Ok(n) => match n.kind {
                NotificationKind::TodoCreated { todo } => {
                    created += 1;
                    print_todo(&todo);
                }
                NotificationKind::Error { message } => eprintln!("error: {message}"),
                NotificationKind::TodoCompleted { .. } => {}
            },
            Err(TryRecvError::Lagged(n)) => eprintln!("warning: missed {n} notifications"),
            Err(_) => break,
        }
    }

    println!("\n{created} todo(s) created for {event}");
    Ok(())
}

async fn cmd_replay(
    engine: &TodoEngine,
    script: PathBuf,
    priority: Option<Priority>,
    agent: Option<String>,
) -> anyhow::Result<()> {
    let reader: Box<dyn BufRead> = if script.as_os_str() == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let file = std::fs::File::open(&script)
            .with_context(|| format!("cannot open {}", script.display()))?;
        Box::new(BufReader::new(file))
    };

    let mut errors = engine.subscribe();
    let mut lines = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let parsed: ScriptLine = serde_json::from_str(&line)
            .with_context(|| format!("line {}: not a valid script entry", index + 1))?;

        match parsed {
            ScriptLine::Event { event, data } => engine.process_event(&event, &data).await?,
            ScriptLine::Complete { complete, result } => {
                engine.complete_todo(&complete, result).await?
            }
            ScriptLine::CompleteMatching {
                complete_matching,
                result,
            } => match engine.find_active(&complete_matching) {
                Some(todo) => engine.complete_todo(&todo.id, result).await?,
                None => eprintln!(
                    "warning: line {}: no active todo matches {complete_matching:?}",
                    index + 1
                ),
            },
        }
        lines += 1;
    }

    loop {
        match errors.try_recv() {
            Ok(n) => {
                if let NotificationKind::Error { message } = n.kind {
                    eprintln!("error: {message}");
                }
            }
            Err(TryRecvError::Lagged(n)) => eprintln!("warning: missed {n} notifications"),
            Err(_) => break,
        }
    }

    let mut todos = match (priority, agent) {
        (Some(p), _) => engine.todos_by_priority(p),
        (None, Some(ref role)) => engine.todos_for_agent(role),
        (None, None) => engine.active_todos(),
    };
    todos.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
    });

    if todos.is_empty() {
        println!("No active todos.");
        return Ok(());
    }

    println!(
        "{:<30}  {:<8}  {:<11}  {:<10}  CONTENT",
        "ID", "PRIORITY", "STATUS", "AGENT"
    );
    println!("{}", "-".repeat(100));
    for todo in &todos {
        println!(
            "{:<30}  {:<8}  {:<11}  {:<10}  {}",
            todo.id,
            todo.priority,
            todo.status,
            todo.assigned_agent.as_deref().unwrap_or("-"),
            todo.content
        );
    }

    println!("\n{} active todo(s) after {lines} script line(s)", todos.len());
    Ok(())
}

fn print_todo(todo: &Todo) {
    println!("ID:         {}", todo.id);
    println!("Content:    {}", todo.content);
    println!("Priority:   {}", todo.priority);
    println!("Trigger:    {}", todo.triggered_by);
    println!(
        "Agent:      {}",
        todo.assigned_agent.as_deref().unwrap_or("-")
    );
    if !todo.dependencies.is_empty() {
        let deps: Vec<&str> = todo.dependencies.iter().map(TodoId::as_str).collect();
        println!("Depends on: {}", deps.join(", "));
    }
    println!("Created:    {}", todo.created_at);
    println!("---");
}
