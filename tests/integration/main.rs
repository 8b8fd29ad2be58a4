//! Integration tests for taskloom
//!
//! These tests drive the engine end to end with scripted planners,
//! executors, reporters and oracles, and exercise the CLI binary.

// Test utilities and common setup
mod common;

mod engine_tests;
mod plan_tests;

// Re-export common utilities for use by test modules
pub use common::*;
