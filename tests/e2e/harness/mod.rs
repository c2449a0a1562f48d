//! E2E test harness for Muse.
//!
//! This module contains test infrastructure with builders, variants, and
//! methods that not every scenario uses.

#![allow(dead_code)]

pub mod assertions;
pub mod docs;
pub mod runner;
pub mod scenario;
pub mod steps;
pub mod workspace;

// Re-export commonly used types
pub use assertions::{Assertion, OutcomeMatch};
pub use scenario::Scenario;
