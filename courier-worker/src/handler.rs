//! Task handlers
//!
//! A handler turns one task into either an output document or an error. The
//! engine never sees handler internals: it only receives the [`TaskOutput`] or
//! [`HandlerError`] and maps it to a result status.
//!
//! Three ways to provide a handler:
//! - implement [`TaskHandler`] directly;
//! - wrap an async closure over the raw [`Task`] with [`handler_fn`];
//! - wrap an async closure over a typed input with [`TypedHandler`], which binds
//!   the task input through an [`InputBinder`].

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::domain::task::Task;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::context::TaskContext;

/// Output document of a task
pub type OutputData = Map<String, Value>;

/// Successful handler outcome
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    /// The task is done
    Completed(OutputData),
    /// Work continues elsewhere; the queue re-offers the task after `callback_after`
    InProgress {
        output: OutputData,
        callback_after: Duration,
    },
}

impl TaskOutput {
    /// Completed output from any serializable value
    ///
    /// Objects are used as-is, `null` becomes an empty document and any other
    /// value is stored under `"result"`.
    pub fn completed(value: impl Serialize) -> Result<Self, HandlerError> {
        Ok(Self::Completed(to_output_data(value)?))
    }

    /// In-progress output from any serializable value
    pub fn in_progress(value: impl Serialize, callback_after: Duration) -> Result<Self, HandlerError> {
        Ok(Self::InProgress {
            output: to_output_data(value)?,
            callback_after,
        })
    }
}

/// Errors a handler may return
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Execution failed; the queue may retry the task
    #[error("{0}")]
    Failed(String),

    /// Execution failed and must not be retried
    #[error("{0}")]
    Terminal(String),

    /// The task input could not be bound to the handler's input type
    #[error("input binding error for task {task_type}: {source}")]
    Binding {
        task_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// The handler output could not be serialized
    #[error("failed to serialize task output: {0}")]
    Output(#[source] serde_json::Error),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal(message.into())
    }

    /// Whether the queue must not retry the task
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{:#}", err))
    }
}

fn to_output_data(value: impl Serialize) -> Result<OutputData, HandlerError> {
    match serde_json::to_value(value).map_err(HandlerError::Output)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            Ok(map)
        }
    }
}

// =============================================================================
// Handler trait
// =============================================================================

/// Executes tasks of one type
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Executes `task`
    ///
    /// # Arguments
    /// * `ctx` - Task metadata, cancellation and execution log
    /// * `task` - The task as received from the queue
    async fn execute(&self, ctx: TaskContext, task: Task) -> Result<TaskOutput, HandlerError>;
}

/// Handler backed by an async closure over the raw task
pub struct FnHandler<F> {
    f: F,
}

/// Wraps an async closure as a [`TaskHandler`]
///
/// # Example
/// ```
/// use courier_worker::handler::{handler_fn, TaskOutput};
///
/// let echo = handler_fn(|_ctx, task| async move {
///     TaskOutput::completed(task.input_data)
/// });
/// # let _ = echo;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(TaskContext, Task) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskOutput, HandlerError>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext, Task) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskOutput, HandlerError>> + Send,
{
    async fn execute(&self, ctx: TaskContext, task: Task) -> Result<TaskOutput, HandlerError> {
        (self.f)(ctx, task).await
    }
}

// =============================================================================
// Typed handlers
// =============================================================================

/// Converts a task input document into a typed value
pub trait InputBinder: Send + Sync {
    fn bind<T: DeserializeOwned>(&self, input: &Map<String, Value>) -> Result<T, serde_json::Error>;
}

/// Binds through serde_json
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBinder;

impl InputBinder for JsonBinder {
    fn bind<T: DeserializeOwned>(&self, input: &Map<String, Value>) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(input.clone()))
    }
}

/// Handler over a typed input and output
///
/// # Example
/// ```
/// use courier_worker::handler::{HandlerError, TypedHandler};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Deserialize)]
/// struct Greet { name: String }
///
/// #[derive(Serialize)]
/// struct Greeting { message: String }
///
/// let greet = TypedHandler::new(|_ctx, input: Greet| async move {
///     Ok::<_, HandlerError>(Greeting { message: format!("Hello, {}", input.name) })
/// });
/// # let _ = greet;
/// ```
pub struct TypedHandler<I, O, F, B = JsonBinder> {
    f: F,
    binder: B,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O, F, Fut> TypedHandler<I, O, F, JsonBinder>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(TaskContext, I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, HandlerError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            binder: JsonBinder,
            _types: PhantomData,
        }
    }
}

impl<I, O, F, B> TypedHandler<I, O, F, B> {
    /// Replaces the input binding strategy
    pub fn with_binder<B2: InputBinder>(self, binder: B2) -> TypedHandler<I, O, F, B2> {
        TypedHandler {
            f: self.f,
            binder,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<I, O, F, Fut, B> TaskHandler for TypedHandler<I, O, F, B>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(TaskContext, I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, HandlerError>> + Send,
    B: InputBinder,
{
    async fn execute(&self, ctx: TaskContext, task: Task) -> Result<TaskOutput, HandlerError> {
        let input: I = self
            .binder
            .bind(&task.input_data)
            .map_err(|source| HandlerError::Binding {
                task_type: task.definition_name().to_string(),
                source,
            })?;

        let output = (self.f)(ctx, input).await?;
        TaskOutput::completed(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn task_with_input(input: Value) -> Task {
        let Value::Object(input) = input else {
            panic!("input must be an object");
        };
        Task::new("greet", "t-1", "wf-1", input)
    }

    fn ctx(task: &Task) -> TaskContext {
        TaskContext::new(task, CancellationToken::new())
    }

    #[derive(Deserialize)]
    struct Greet {
        name: String,
    }

    #[derive(Serialize)]
    struct Greeting {
        message: String,
    }

    #[test]
    fn test_output_shapes() {
        let object = TaskOutput::completed(json!({"a": 1})).unwrap();
        assert_eq!(object, TaskOutput::Completed(json!({"a": 1}).as_object().unwrap().clone()));

        let null = TaskOutput::completed(()).unwrap();
        assert_eq!(null, TaskOutput::Completed(Map::new()));

        let scalar = TaskOutput::completed(7).unwrap();
        let TaskOutput::Completed(map) = scalar else {
            panic!("expected completed output");
        };
        assert_eq!(map["result"], 7);
    }

    #[test]
    fn test_anyhow_converts_to_failed() {
        let err: HandlerError = anyhow::anyhow!("disk full").context("writing report").into();
        assert!(!err.is_terminal());
        assert_eq!(err.to_string(), "writing report: disk full");
    }

    #[tokio::test]
    async fn test_fn_handler_receives_task() {
        let handler = handler_fn(|_ctx, task: Task| async move {
            TaskOutput::completed(json!({"id": task.task_id}))
        });

        let task = task_with_input(json!({}));
        let output = handler.execute(ctx(&task), task.clone()).await.unwrap();
        assert_eq!(
            output,
            TaskOutput::Completed(json!({"id": "t-1"}).as_object().unwrap().clone())
        );
    }

    #[tokio::test]
    async fn test_typed_handler_binds_input() {
        let handler = TypedHandler::new(|_ctx, input: Greet| async move {
            Ok::<_, HandlerError>(Greeting {
                message: format!("Hello, {}", input.name),
            })
        });

        let task = task_with_input(json!({"name": "Ada", "extra": true}));
        let output = handler.execute(ctx(&task), task.clone()).await.unwrap();

        let TaskOutput::Completed(map) = output else {
            panic!("expected completed output");
        };
        assert_eq!(map["message"], "Hello, Ada");
    }

    #[tokio::test]
    async fn test_typed_handler_reports_binding_error() {
        let handler = TypedHandler::new(|_ctx, input: Greet| async move {
            Ok::<_, HandlerError>(input.name)
        });

        let task = task_with_input(json!({"name": 12}));
        let err = handler.execute(ctx(&task), task.clone()).await.unwrap_err();

        assert!(matches!(err, HandlerError::Binding { .. }));
        assert!(err.to_string().contains("input binding error for task greet"));
    }
}
