//! CLI tool for exploring segment placement.
//!
//! Provides commands for:
//! - Simulating a cluster that grows and rebalances
//! - Inspecting the table computed for a given membership

pub mod commands;
pub mod config;

pub use commands::Command;
pub use config::CliConfig;
