//! Hyperclient Tracker - Library interface
//!
//! Re-exports internal modules for use in integration tests.

pub mod commands;
pub mod config;
