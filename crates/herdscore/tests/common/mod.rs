//! Shared test utilities for herdscore integration tests.
//!
//! This module provides:
//! - `TestHarness` for running a field station in an isolated data directory
//! - Builders for configurations, breed standards and captured images

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
