//! Service layer
//!
//! Services contain the per-task business logic of the engine: running a
//! handler safely and delivering its result. Both are trait-based so the
//! scheduler can be driven by test doubles.

mod execution;
mod reporter;

// Re-export traits
pub use execution::ExecutionService;
pub use reporter::ResultReporter;

// Re-export implementations
pub use execution::StandardExecutionService;
pub use reporter::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_STEP, RetryPolicy, RetryingReporter};
