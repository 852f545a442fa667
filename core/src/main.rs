//! `orchestrator` — submit, run, and serve task orchestration.

use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};

use taskstore::{Priority, TaskId, TaskStore};

use orchestrator_core::cli::{Cli, Command};
use orchestrator_core::classifier::{ClassifierAdapter, ClassifierPolicy};
use orchestrator_core::config::Config;
use orchestrator_core::events::{EventPublisher, LoggingEventBus};
use orchestrator_core::executor::TaskExecutor;
use orchestrator_core::gatherer::{ContextGatherer, EmptyContextGatherer, KeywordContextGatherer};
use orchestrator_core::intake::SubmitTaskRequest;
use orchestrator_core::llm;
use orchestrator_core::reaper::Reaper;
use orchestrator_core::validator::Validator;

fn gatherer_from_config(config: &Config) -> Arc<dyn ContextGatherer> {
    match &config.context.project_root {
        Some(root) => Arc::new(KeywordContextGatherer::new(
            root.clone(),
            config.context.source_globs.clone(),
            config.context.max_files,
        )),
        None => Arc::new(EmptyContextGatherer),
    }
}

async fn build_executor(config: Config, store: TaskStore) -> Result<TaskExecutor> {
    let prices = llm::PriceTable::default();
    let llm_client = llm::create_client(&config.llm, prices).wrap_err("constructing LLM client")?;
    let classifier_policy = ClassifierPolicy {
        timeout: std::time::Duration::from_millis(config.classifier.timeout_ms),
        retries: config.classifier.retries,
        retry_delay: std::time::Duration::from_millis(50),
        cb_threshold: config.classifier.cb_threshold,
        cb_reset: std::time::Duration::from_secs(config.classifier.cb_reset_sec),
    };
    let classifier = ClassifierAdapter::new(None, classifier_policy);
    let gatherer = gatherer_from_config(&config);
    let validator = Arc::new(Validator::new());
    Ok(TaskExecutor::new(store, classifier, gatherer, llm_client, validator, config))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).wrap_err("loading configuration")?;
    let db_path = cli.db.clone().unwrap_or_else(|| config.storage.resolved_path());
    let store = TaskStore::open(&db_path).await.wrap_err_with(|| format!("opening store at {}", db_path.display()))?;

    match cli.command {
        Command::Submit {
            user_id,
            title,
            description,
            override_strategy,
            client_token,
        } => {
            let executor = build_executor(config, store).await?;
            let task_id = executor
                .submit(SubmitTaskRequest {
                    user_id,
                    title,
                    description,
                    type_hint: None,
                    override_strategy,
                    priority: Some(Priority::NORMAL),
                    client_token,
                })
                .await
                .wrap_err("submitting task")?;
            println!("{}", task_id.to_string().green());
        }
        Command::Run { task_id } => {
            let id: TaskId = task_id.parse().wrap_err("parsing task id")?;
            let executor = build_executor(config, store).await?;
            let task = executor.run(id).await.wrap_err("running task")?;
            println!("{}  {:<10}  {}", task.id, task.status.as_str(), task.title);
        }
        Command::Get { task_id } => {
            let id: TaskId = task_id.parse().wrap_err("parsing task id")?;
            let task = store.get_task(id).await.wrap_err("fetching task")?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Command::Cancel { task_id } => {
            let id: TaskId = task_id.parse().wrap_err("parsing task id")?;
            let executor = build_executor(config, store).await?;
            executor.cancel(id);
            println!("{}", format!("cancellation requested for {id}").yellow());
        }
        Command::Reap => {
            let reaper = Reaper::new(store, config.reaper.clone());
            let reaped = reaper.sweep_once().await.wrap_err("reaper sweep")?;
            println!("reaped {reaped} stale task(s)");
        }
        Command::Serve => serve(config, store).await?,
    }

    Ok(())
}

/// Run the worker pool, reaper, and event publisher until interrupted.
async fn serve(config: Config, store: TaskStore) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let reaper = Reaper::new(store.clone(), config.reaper.clone());
    let reaper_shutdown = shutdown_rx.clone();
    let reaper_task = tokio::spawn(async move { reaper.run_forever(reaper_shutdown).await });

    let publisher = EventPublisher::new(store.clone(), Arc::new(LoggingEventBus), config.outbox.clone(), hostname());
    let publisher_shutdown = shutdown_rx.clone();
    let publisher_task = tokio::spawn(async move { publisher.run_forever(publisher_shutdown).await });

    let worker_pool_size = config.worker.worker_pool_size;
    let poll_interval = std::time::Duration::from_millis(config.outbox.poll_interval_ms.max(250));
    let executor = Arc::new(build_executor(config, store.clone()).await?);
    let semaphore = Arc::new(tokio::sync::Semaphore::new(worker_pool_size));
    let mut worker_shutdown = shutdown_rx.clone();

    tracing::info!(worker_pool_size, "orchestrator: serving");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {
                let pending = store.find_stale(taskstore::TaskStatus::Pending, taskstore::ids::now_ms()).await?;
                for task in pending {
                    let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                        break;
                    };
                    let executor = executor.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = executor.run(task.id).await {
                            tracing::warn!(task_id = %task.id, error = %e, "orchestrator: task run failed");
                        }
                    });
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("orchestrator: received interrupt, shutting down");
                let _ = shutdown_tx.send(true);
                break;
            }
            _ = worker_shutdown.changed() => {
                if *worker_shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let _ = reaper_task.await;
    let _ = publisher_task.await;
    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "orchestrator-node".to_string())
}
