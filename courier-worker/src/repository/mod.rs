//! Repository layer
//!
//! Repositories abstract communication with the task-queue service. They
//! provide simple, focused interfaces for the three calls the engine needs
//! without any business logic.
//!
//! All repositories are trait-based to enable testing and mocking.

mod memory;
mod tasks;

// Re-export traits
pub use tasks::TaskRepository;

// Re-export implementations
pub use memory::{InMemoryTaskRepository, PollCall};
pub use tasks::HttpTaskRepository;
