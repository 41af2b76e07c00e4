//! Data Transfer Objects for the task-queue service
//!
//! Request shapes the worker engine sends to the queue. They are kept separate
//! from the domain types because they describe calls, not stored documents.

pub mod poll;
