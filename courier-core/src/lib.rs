//! Courier Core
//!
//! Core types shared by the Courier task-queue client and worker engine.
//!
//! This crate contains:
//! - Domain types: units of work handed out by the queue and their outcomes
//! - DTOs: request shapes exchanged with the task-queue service

pub mod domain;
pub mod dto;
