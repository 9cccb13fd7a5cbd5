//! Shared contract tests.
//!
//! Tests the Backend interface and the command surface against every
//! backend. Each backend's test binary builds a store and runs the macros.

pub mod backend_tests;
pub mod command_tests;
