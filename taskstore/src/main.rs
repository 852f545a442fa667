//! `taskstore` — inspect and administer the orchestration core's SQLite
//! database from the command line.

use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Context, Result};
use taskstore::{TaskId, TaskStatus, TaskStore};

#[derive(Parser)]
#[command(name = "taskstore", about = "Inspect the task orchestration store")]
struct Cli {
    /// Path to the SQLite database file.
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database file and run migrations if needed.
    Init,
    /// Print one task as JSON.
    ShowTask { id: String },
    /// List tasks in a given status, most recently updated first.
    ListTasks {
        #[arg(long, default_value = "pending")]
        status: String,
    },
    /// Print counts of undelivered outbox messages.
    OutboxStatus,
}

fn default_db_path() -> String {
    dirs::data_local_dir()
        .unwrap_or_else(|| ".".into())
        .join("orchestrator")
        .join("orchestrator.db")
        .to_string_lossy()
        .into_owned()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.clone().unwrap_or_else(default_db_path);
    let store = TaskStore::open(&db_path)
        .await
        .wrap_err_with(|| format!("opening store at {db_path}"))?;

    match cli.command {
        Command::Init => {
            println!("{}", format!("store ready at {db_path}").green());
        }
        Command::ShowTask { id } => {
            let id: TaskId = id.parse().wrap_err("parsing task id")?;
            let task = store.get_task(id).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Command::ListTasks { status } => {
            let status = TaskStatus::parse(&status)
                .ok_or_else(|| eyre::eyre!("unknown status {status:?}"))?;
            let tasks = store.find_stale(status, i64::MAX).await?;
            for task in tasks {
                println!("{}  {:<10}  {}", task.id, task.status.as_str(), task.title);
            }
        }
        Command::OutboxStatus => {
            let pending = store.fetch_outbox_batch(1000).await?;
            println!("{} undelivered outbox message(s)", pending.len());
        }
    }
    Ok(())
}
