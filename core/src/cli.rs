//! CLI command definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Task orchestration core: submits, executes and tracks code-change tasks.
#[derive(Parser)]
#[command(name = "orchestrator", about = "Task orchestration core for LLM-driven code changes", version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite store (overrides config/storage-path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Submit a new task and print its id
    Submit {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        override_strategy: Option<String>,
        #[arg(long)]
        client_token: Option<String>,
    },

    /// Run a submitted task to completion, in-process
    Run {
        task_id: String,
    },

    /// Print the current state of a task
    Get {
        task_id: String,
    },

    /// Signal cancellation of a running task
    Cancel {
        task_id: String,
    },

    /// Run the worker pool, reaper and event publisher loops until killed
    Serve,

    /// Run a single reaper sweep and exit
    Reap,
}
