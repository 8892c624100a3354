//! Subcommands of `segmentctl`.

pub mod inspect;
pub mod simulate;

use clap::Subcommand;

use crate::config::{InspectArgs, SimulateArgs};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Grow a simulated cluster and report rebalance cost and balance.
    Simulate(SimulateArgs),
    /// Compute and print the table for a membership file.
    Inspect(InspectArgs),
}
