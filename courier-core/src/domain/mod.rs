//! Core domain types
//!
//! These types mirror the documents exchanged with the remote task queue.
//! They are shared between the HTTP client (for transport) and the worker
//! engine (for execution and reporting).

pub mod log;
pub mod task;
pub mod task_result;
