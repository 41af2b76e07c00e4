//! Courier Worker
//!
//! A client-side engine that polls a remote task queue for registered task
//! types, runs a handler for every task with bounded concurrency per type and
//! reports each result back.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Repositories: Communication with the queue service (HTTP or in-memory)
//! - Services: Per-task logic (handler execution, result delivery)
//! - Scheduler: Registry, capacity tracking and one poll loop per task type
//! - Runner: Public control surface (registration, scaling, pause, shutdown)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use courier_worker::config::Config;
//! use courier_worker::handler::TaskOutput;
//! use courier_worker::repository::HttpTaskRepository;
//! use courier_worker::runner::TaskRunner;
//! use courier_worker::worker::Worker;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let repository = Arc::new(HttpTaskRepository::from_config(&config));
//!     let runner = TaskRunner::connect(repository, config).await?;
//!
//!     runner.register_worker(
//!         Worker::from_fn("echo", |_ctx, task| async move {
//!             TaskOutput::completed(task.input_data)
//!         })
//!         .with_batch_size(4),
//!     )?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     runner.cancel();
//!     runner.wait_all().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod repository;
pub mod runner;
pub mod scheduler;
pub mod service;
pub mod worker;

// Re-export commonly used types
pub use context::TaskContext;
pub use error::RunnerError;
pub use handler::{HandlerError, TaskHandler, TaskOutput};
pub use runner::TaskRunner;
pub use worker::{Worker, WorkerOptions};
