//! Courier Worker
//!
//! Demo worker process. Connects to the queue service, registers an `echo`
//! worker that returns its input and a typed `greet` worker, then runs until
//! Ctrl-C. On shutdown it cancels the engine and waits for in-flight tasks to
//! report their results.

use anyhow::{Context, Result};
use courier_worker::config::Config;
use courier_worker::handler::{HandlerError, TaskOutput};
use courier_worker::repository::HttpTaskRepository;
use courier_worker::runner::TaskRunner;
use courier_worker::worker::{Worker, WorkerOptions};
use courier_worker::{RunnerError, TaskContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Deserialize)]
struct GreetInput {
    name: String,
}

#[derive(Debug, Serialize)]
struct GreetOutput {
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Courier Worker");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: worker_id={}, server_url={}",
        config.worker_id, config.server_url
    );

    let runner = connect_with_retry(&config).await?;

    let options = WorkerOptions {
        domain: config.domain.clone(),
        batch_size: config.batch_size.max(1),
        poll_interval: config.poll_interval,
        ..WorkerOptions::default()
    };

    runner
        .register_workers([
            Worker::from_fn("echo", |ctx: TaskContext, task| async move {
                ctx.log(format!("echoing {} input field(s)", task.input_data.len()));
                TaskOutput::completed(task.input_data)
            })
            .with_options(options.clone()),
            Worker::typed("greet", |ctx: TaskContext, input: GreetInput| async move {
                if input.name.trim().is_empty() {
                    return Err(HandlerError::terminal("name cannot be empty"));
                }
                ctx.log(format!("greeting {}", input.name));
                Ok(GreetOutput {
                    message: format!("Hello, {}!", input.name),
                })
            })
            .with_options(options),
        ])
        .context("Failed to register workers")?;

    info!("Worker initialized successfully, press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutting down, waiting for in-flight tasks");
    runner.cancel();
    runner.wait_all().await;

    match runner.metrics().encode_text() {
        Ok(text) => info!("Final metrics:\n{}", text),
        Err(e) => warn!("Failed to encode metrics: {}", e),
    }

    info!("Courier Worker stopped");
    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(_) => {
            info!("Failed to load config from environment, using defaults");
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Connects to the queue service with retry logic and exponential backoff
///
/// This handles the case where the queue service may not be ready yet when
/// the worker starts (common in container environments).
async fn connect_with_retry(config: &Config) -> Result<TaskRunner> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let repository = Arc::new(HttpTaskRepository::from_config(config));
    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match TaskRunner::connect(repository.clone(), config.clone()).await {
            Ok(runner) => {
                if attempt > 1 {
                    info!(
                        "Connected to queue service after {} attempt(s)",
                        attempt
                    );
                }
                return Ok(runner);
            }
            Err(RunnerError::Unreachable(e)) if attempt < MAX_RETRIES => {
                warn!(
                    "Failed to reach queue service (attempt {}/{}): {:#}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
            Err(e) => {
                error!(
                    "Failed to connect to queue service after {} attempt(s)",
                    attempt
                );
                return Err(e).context("Failed to start task runner");
            }
        }
    }
}
